//! Wire frames of the WebSocket protocol. Inbound and outbound frames are
//! tagged variants; unknown tags fail at the serde boundary and never reach
//! a handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relaychat_core::{ChatId, Message, MessageId, MessageStatus, UserId};

/// A frame received from a client: a tagged event plus an optional `ack`
/// correlation id. Events carrying an `ack` are answered with an
/// [`ServerEvent::Ack`] holding the same id.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
  #[serde(flatten)]
  pub event: ClientEvent,
  #[serde(default)]
  pub ack: Option<u64>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
  /// Look up (or create) the chat with `recipientId`, returning its id and
  /// full history.
  #[serde(rename = "chat:get")]
  #[serde(rename_all = "camelCase")]
  ChatGet { recipient_id: UserId },

  /// Join the room of a chat the caller participates in.
  #[serde(rename = "chat:join")]
  #[serde(rename_all = "camelCase")]
  ChatJoin { chat_id: ChatId },

  #[serde(rename = "chat:leave")]
  #[serde(rename_all = "camelCase")]
  ChatLeave { chat_id: ChatId },

  /// Send a message. `id` is the optional client-assigned message id used
  /// as the idempotency key.
  #[serde(rename = "message")]
  #[serde(rename_all = "camelCase")]
  Message {
    chat_id: ChatId,
    content: String,
    #[serde(default)]
    id: Option<MessageId>,
  },

  #[serde(rename = "message:read")]
  #[serde(rename_all = "camelCase")]
  MessageRead { message_id: MessageId },

  #[serde(rename = "users:list")]
  UsersList,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
  #[serde(rename = "connection:established")]
  #[serde(rename_all = "camelCase")]
  ConnectionEstablished { user_id: UserId },

  #[serde(rename = "users:update")]
  #[serde(rename_all = "camelCase")]
  UsersUpdate { user_id: UserId, is_online: bool },

  #[serde(rename = "message")]
  Message(Message),

  #[serde(rename = "message:status")]
  #[serde(rename_all = "camelCase")]
  MessageStatus {
    message_id: MessageId,
    status: MessageStatus,
    timestamp: DateTime<Utc>,
  },

  /// Emitted to the sender after its message was successfully persisted.
  #[serde(rename = "message:ack")]
  #[serde(rename_all = "camelCase")]
  MessageAck { message_id: MessageId },

  #[serde(rename = "message:error")]
  #[serde(rename_all = "camelCase")]
  MessageError {
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<MessageId>,
    error: String,
  },

  /// Response to a client frame that carried an `ack` id.
  #[serde(rename = "ack")]
  Ack { ack: u64, data: serde_json::Value },
}
