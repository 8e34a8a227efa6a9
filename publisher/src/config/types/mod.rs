pub mod batching;
pub mod chain;
pub mod ipfs;
pub mod monitor;
pub mod publishing;
pub mod queues;
pub mod store;
pub mod webhooks;

pub use batching::*;
pub use chain::*;
pub use ipfs::*;
pub use monitor::*;
pub use publishing::*;
pub use queues::*;
pub use store::*;
pub use webhooks::*;

pub use crate::types::capacity::CapacityLimits;
