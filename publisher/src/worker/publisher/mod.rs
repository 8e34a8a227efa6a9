pub mod message_publisher;
pub mod service;

pub use message_publisher::MessagePublisher;
pub use service::PublishingService;
