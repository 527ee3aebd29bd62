//! Contract traits between the domain layer and the infrastructure the
//! server wires in: Postgres repositories and the NATS event transport.
//! Services depend on these traits, never on the concrete implementations.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::{CoreError, PublishError};
use crate::models::{
  Chat, ChatId, CreateMessage, CreateUser, Message, MessageId, MessageStatus, SigninUser, User,
  UserId,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
  /// Create a user. Fails with `EmailTaken` when the (case-insensitive)
  /// email is already registered.
  async fn create(&self, input: &CreateUser) -> Result<User, CoreError>;

  async fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError>;

  async fn find_by_id(&self, id: UserId) -> Result<Option<User>, CoreError>;

  async fn list_all(&self) -> Result<Vec<User>, CoreError>;

  /// Verify credentials; `Ok(None)` on unknown email or bad password.
  async fn authenticate(&self, input: &SigninUser) -> Result<Option<User>, CoreError>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
  /// Atomically create the chat for an unordered participant pair.
  /// Fails with `ChatAlreadyExists` when the pair already has a chat and
  /// `UserNotFound` when either participant does not exist.
  async fn create(&self, a: UserId, b: UserId) -> Result<Chat, CoreError>;

  async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, CoreError>;

  async fn find_by_participants(&self, a: UserId, b: UserId) -> Result<Option<Chat>, CoreError>;

  /// Chats the user participates in, most-recent-activity first.
  async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Chat>, CoreError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
  /// Persist a message with status SENT. Resubmission of the same
  /// `(chat, sender, id)` returns the stored row; the same id under a
  /// different chat or sender fails with `DuplicateMessageId`. Fails with
  /// `NotAParticipant` when the sender is not in the chat.
  async fn save(
    &self,
    chat_id: ChatId,
    sender_id: UserId,
    input: &CreateMessage,
  ) -> Result<Message, CoreError>;

  async fn get(&self, id: MessageId) -> Result<Option<Message>, CoreError>;

  /// Messages of a chat ascending by creation time.
  async fn list_for_chat(&self, chat_id: ChatId) -> Result<Vec<Message>, CoreError>;

  /// Advance the delivery status. Idempotent when `status` equals the
  /// current one; fails with `IllegalTransition` on regression and
  /// `MessageNotFound` for unknown ids.
  async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<(), CoreError>;

  /// Backlog: messages in the user's chats, sent by someone else, still SENT.
  async fn list_undelivered(
    &self,
    user_id: UserId,
    chat_id: Option<ChatId>,
  ) -> Result<Vec<Message>, CoreError>;
}

/// A raw record delivered by the transport.
#[derive(Debug, Clone)]
pub struct TransportMessage {
  pub subject: String,
  pub payload: Bytes,
}

/// Low-level publish/subscribe over broker subjects. The bus adapter builds
/// the topic+key discipline and the shutdown gate on top of this.
#[async_trait]
pub trait EventTransport: Send + Sync {
  /// Publish a payload to a subject; per-subject publication order is
  /// preserved by the broker.
  async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError>;

  /// Subscribe to a subject (wildcards allowed); the stream ends when the
  /// transport closes.
  async fn subscribe(
    &self,
    subject: &str,
  ) -> Result<BoxStream<'static, TransportMessage>, PublishError>;

  /// Transport type name for logging/debugging
  fn transport_type(&self) -> &'static str;

  /// Check if the transport is connected/healthy
  async fn is_healthy(&self) -> bool;
}
