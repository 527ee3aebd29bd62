use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{ChatId, MessageId, UserId};

/// Delivery status of a message.
///
/// Transitions only move forward: SENT -> DELIVERED -> READ. SENT -> READ is
/// legal (the DELIVERED hop may never have been observed on the wire; READ
/// subsumes it). The derived `Ord` follows transition order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
  Sent,
  Delivered,
  Read,
}

impl MessageStatus {
  /// Whether moving from `self` to `next` is a legal (non-regressing) step.
  /// Equal states are legal: status updates are idempotent.
  pub fn can_advance_to(self, next: MessageStatus) -> bool {
    next >= self
  }

  pub fn as_str(self) -> &'static str {
    match self {
      MessageStatus::Sent => "SENT",
      MessageStatus::Delivered => "DELIVERED",
      MessageStatus::Read => "READ",
    }
  }
}

#[derive(Debug, Serialize, Deserialize, FromRow, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Message {
  pub id: MessageId,
  pub chat_id: ChatId,
  pub sender_id: UserId,
  pub content: String,
  pub status: MessageStatus,
  pub created_at: DateTime<Utc>,
}

/// Input for persisting a new message.
///
/// The id is client-assignable; resubmitting the same `(chat, sender, id)`
/// returns the already-stored row instead of inserting a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
  pub content: String,
  #[serde(default)]
  pub id: Option<MessageId>,
}

impl CreateMessage {
  pub fn new(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      id: None,
    }
  }

  pub fn with_id(content: impl Into<String>, id: MessageId) -> Self {
    Self {
      content: content.into(),
      id: Some(id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_transitions_are_monotonic() {
    use MessageStatus::*;

    // (from, to, legal)
    let table = [
      (Sent, Sent, true),
      (Sent, Delivered, true),
      (Sent, Read, true),
      (Delivered, Delivered, true),
      (Delivered, Read, true),
      (Read, Read, true),
      (Delivered, Sent, false),
      (Read, Delivered, false),
      (Read, Sent, false),
    ];

    for (from, to, legal) in table {
      assert_eq!(
        from.can_advance_to(to),
        legal,
        "{from:?} -> {to:?} should be legal={legal}"
      );
    }
  }

  #[test]
  fn status_serializes_uppercase() {
    assert_eq!(
      serde_json::to_string(&MessageStatus::Delivered).unwrap(),
      r#""DELIVERED""#
    );
    let parsed: MessageStatus = serde_json::from_str(r#""READ""#).unwrap();
    assert_eq!(parsed, MessageStatus::Read);
  }

  #[test]
  fn message_serializes_camel_case() {
    let msg = Message {
      id: MessageId::generate(),
      chat_id: ChatId::generate(),
      sender_id: UserId::generate(),
      content: "hi".to_string(),
      status: MessageStatus::Sent,
      created_at: Utc::now(),
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert!(json.get("chatId").is_some());
    assert!(json.get("senderId").is_some());
    assert_eq!(json["status"], "SENT");
  }
}
