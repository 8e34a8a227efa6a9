pub mod announcement;
pub mod batch;
pub mod capacity;
pub mod jobs;
pub mod queue;
pub mod queue_control;
pub mod transaction;
