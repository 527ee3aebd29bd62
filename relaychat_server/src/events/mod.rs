pub mod bus;
pub mod memory;
pub mod transport;
pub mod types;

pub use bus::{EventBus, RetryConfig};
pub use transport::NatsTransport;
pub use types::{MessageStatusChanged, TOPIC_CHAT_MESSAGES, TOPIC_MESSAGE_STATUS};
