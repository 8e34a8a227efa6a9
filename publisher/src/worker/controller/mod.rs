pub mod queue_worker;
pub mod worker_controller;

pub use queue_worker::{JobProcessor, QueueWorker};
pub use worker_controller::WorkerController;
