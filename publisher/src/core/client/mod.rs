pub mod queue;
pub mod storage;
pub mod store;
pub mod webhook;

pub use queue::{JobQueue, QueuedJob};
pub use storage::ContentStore;
pub use store::StateStore;
pub use webhook::Notifier;
