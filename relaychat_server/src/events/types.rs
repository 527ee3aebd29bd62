use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relaychat_core::{ChatId, Message, MessageId, MessageStatus, UserId};

/// New-message records; partition key is the chat id, so messages of one
/// chat are observed in publication order.
pub const TOPIC_CHAT_MESSAGES: &str = "chat.messages";

/// Delivery-status records; partition key is the message id, so updates for
/// one message are observed in publication order.
pub const TOPIC_MESSAGE_STATUS: &str = "chat.message.status";

/// Status-update record carried on `chat.message.status`.
///
/// Carries the chat id as well so subscribers can fan out to the chat room
/// without a storage round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusChanged {
  pub message_id: MessageId,
  pub chat_id: ChatId,
  pub sender_id: UserId,
  #[serde(rename = "newStatus")]
  pub status: MessageStatus,
  pub timestamp: DateTime<Utc>,
}

impl MessageStatusChanged {
  pub fn new(message: &Message, status: MessageStatus) -> Self {
    Self {
      message_id: message.id,
      chat_id: message.chat_id,
      sender_id: message.sender_id,
      status,
      timestamp: Utc::now(),
    }
  }
}
