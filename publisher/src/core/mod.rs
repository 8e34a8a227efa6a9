pub mod client;
pub mod config;
pub mod timer;

pub use config::Config;
