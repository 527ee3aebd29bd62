use std::sync::Arc;

use relaychat_core::{
  Chat, ChatId, CoreError, CreateMessage, Message, MessageId, MessageStatus, UserId,
  contracts::{ChatRepository, MessageRepository},
};
use tracing::debug;

/// Message persistence and the delivery-status state machine. Holds no
/// socket state; every operation is authorized against chat membership.
pub struct MessageService {
  messages: Arc<dyn MessageRepository>,
  chats: Arc<dyn ChatRepository>,
  max_length: usize,
}

/// Outcome of a status-advance request: the message, and whether storage
/// actually moved (regressions and repeats are silent no-ops).
#[derive(Debug, Clone)]
pub struct StatusAdvance {
  pub message: Message,
  pub changed: bool,
}

impl MessageService {
  pub fn new(
    messages: Arc<dyn MessageRepository>,
    chats: Arc<dyn ChatRepository>,
    max_length: usize,
  ) -> Self {
    Self {
      messages,
      chats,
      max_length,
    }
  }

  /// Persist a message with status SENT. `input.id` makes the call
  /// idempotent: resubmission returns the stored row.
  pub async fn send(
    &self,
    chat_id: ChatId,
    sender_id: UserId,
    input: CreateMessage,
  ) -> Result<Message, CoreError> {
    if input.content.is_empty() {
      return Err(CoreError::Validation("message content must not be empty".to_string()));
    }
    if input.content.chars().count() > self.max_length {
      return Err(CoreError::Validation(format!(
        "message content exceeds {} characters",
        self.max_length
      )));
    }

    self.messages.save(chat_id, sender_id, &input).await
  }

  /// SENT -> DELIVERED, on the recipient's behalf. No-op when the message
  /// already advanced past SENT.
  pub async fn mark_delivered(
    &self,
    message_id: MessageId,
    recipient_id: UserId,
  ) -> Result<StatusAdvance, CoreError> {
    self.advance(message_id, recipient_id, MessageStatus::Delivered).await
  }

  /// -> READ, on the recipient's behalf. SENT -> READ is legal: the
  /// DELIVERED hop may have been lost on the wire, READ subsumes it.
  pub async fn mark_read(
    &self,
    message_id: MessageId,
    recipient_id: UserId,
  ) -> Result<StatusAdvance, CoreError> {
    self.advance(message_id, recipient_id, MessageStatus::Read).await
  }

  async fn advance(
    &self,
    message_id: MessageId,
    recipient_id: UserId,
    target: MessageStatus,
  ) -> Result<StatusAdvance, CoreError> {
    let message = self
      .messages
      .get(message_id)
      .await?
      .ok_or_else(|| CoreError::MessageNotFound(format!("message {message_id} not found")))?;

    let chat = self
      .chats
      .find_by_id(message.chat_id)
      .await?
      .ok_or_else(|| CoreError::ChatNotFound(format!("chat {} not found", message.chat_id)))?;

    self.check_recipient(&chat, &message, recipient_id)?;

    if !message.status.can_advance_to(target) || message.status == target {
      // Already there or past it; regressions are silently ignored.
      debug!(%message_id, current = message.status.as_str(), target = target.as_str(),
        "status advance is a no-op");
      return Ok(StatusAdvance {
        message,
        changed: false,
      });
    }

    match self.messages.update_status(message_id, target).await {
      Ok(()) => {}
      // Lost a race against a concurrent advance; treat as no-op.
      Err(CoreError::IllegalTransition(_)) => {
        return Ok(StatusAdvance {
          message,
          changed: false,
        });
      }
      Err(e) => return Err(e),
    }

    let message = Message {
      status: target,
      ..message
    };
    Ok(StatusAdvance {
      message,
      changed: true,
    })
  }

  fn check_recipient(
    &self,
    chat: &Chat,
    message: &Message,
    recipient_id: UserId,
  ) -> Result<(), CoreError> {
    if !chat.has_participant(recipient_id) {
      return Err(CoreError::NotAParticipant(format!(
        "user {recipient_id} is not a participant of chat {}",
        chat.id
      )));
    }
    if message.sender_id == recipient_id {
      return Err(CoreError::Unauthorized(
        "a sender cannot acknowledge its own message".to_string(),
      ));
    }
    Ok(())
  }

  /// Backlog: messages the user should have received whose wire delivery is
  /// unconfirmed (status SENT, sender is someone else).
  pub async fn undelivered_for(
    &self,
    user_id: UserId,
    chat_id: Option<ChatId>,
  ) -> Result<Vec<Message>, CoreError> {
    self.messages.list_undelivered(user_id, chat_id).await
  }

  /// Full history of a chat ascending by creation time, restricted to
  /// participants.
  pub async fn list_for_chat(
    &self,
    chat_id: ChatId,
    requester_id: UserId,
  ) -> Result<Vec<Message>, CoreError> {
    let chat = self
      .chats
      .find_by_id(chat_id)
      .await?
      .ok_or_else(|| CoreError::ChatNotFound(format!("chat {chat_id} not found")))?;

    if !chat.has_participant(requester_id) {
      return Err(CoreError::NotAParticipant(format!(
        "user {requester_id} is not a participant of chat {chat_id}"
      )));
    }

    self.messages.list_for_chat(chat_id).await
  }
}
