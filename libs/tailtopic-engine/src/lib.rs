pub mod config;
pub mod consumer;
pub mod error;

pub use config::ConsumerConfig;
pub use consumer::TopicConsumer;
pub use error::ConsumeError;
