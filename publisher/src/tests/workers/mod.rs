pub mod announcer;
pub mod batching;
pub mod capacity;
pub mod monitor;
pub mod publisher;
