//! Newtype wrappers for the id types in the system.
//!
//! Ids are opaque uuids; the newtypes keep user, chat and message ids from
//! being mixed up at compile time.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt;
use uuid::Uuid;

/// User ID newtype
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

/// Chat ID newtype
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ChatId(pub Uuid);

/// Message ID newtype
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for ChatId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl fmt::Display for MessageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<Uuid> for UserId {
  fn from(id: Uuid) -> Self {
    UserId(id)
  }
}

impl From<Uuid> for ChatId {
  fn from(id: Uuid) -> Self {
    ChatId(id)
  }
}

impl From<Uuid> for MessageId {
  fn from(id: Uuid) -> Self {
    MessageId(id)
  }
}

impl From<UserId> for Uuid {
  fn from(id: UserId) -> Self {
    id.0
  }
}

impl From<ChatId> for Uuid {
  fn from(id: ChatId) -> Self {
    id.0
  }
}

impl From<MessageId> for Uuid {
  fn from(id: MessageId) -> Self {
    id.0
  }
}

impl UserId {
  pub fn generate() -> Self {
    UserId(Uuid::new_v4())
  }

  pub fn inner(&self) -> Uuid {
    self.0
  }
}

impl ChatId {
  pub fn generate() -> Self {
    ChatId(Uuid::new_v4())
  }

  pub fn inner(&self) -> Uuid {
    self.0
  }
}

impl MessageId {
  pub fn generate() -> Self {
    MessageId(Uuid::new_v4())
  }

  pub fn inner(&self) -> Uuid {
    self.0
  }
}
