use std::sync::Arc;

use relaychat_core::{
  Chat, ChatId, CoreError, UserId,
  contracts::{ChatRepository, UserRepository},
};
use tracing::debug;

/// Chat lookup and creation. Holds no socket state.
pub struct ChatService {
  chats: Arc<dyn ChatRepository>,
  users: Arc<dyn UserRepository>,
}

impl ChatService {
  pub fn new(chats: Arc<dyn ChatRepository>, users: Arc<dyn UserRepository>) -> Self {
    Self { chats, users }
  }

  /// Look up the chat for the pair, creating it when absent. Idempotent
  /// under concurrent callers: the loser of the insert race re-reads and
  /// returns the winner's row.
  pub async fn get_or_create(
    &self,
    requester_id: UserId,
    other_id: UserId,
  ) -> Result<(Chat, bool), CoreError> {
    if let Some(chat) = self.chats.find_by_participants(requester_id, other_id).await? {
      return Ok((chat, false));
    }

    match self.create(requester_id, other_id).await {
      Ok(chat) => Ok((chat, true)),
      Err(CoreError::ChatAlreadyExists(_)) => {
        debug!(%requester_id, %other_id, "lost chat-create race, re-reading");
        let chat = self
          .chats
          .find_by_participants(requester_id, other_id)
          .await?
          .ok_or_else(|| {
            CoreError::Internal("chat vanished after duplicate-key conflict".to_string())
          })?;
        Ok((chat, false))
      }
      Err(e) => Err(e),
    }
  }

  /// Strict creation: fails with `ChatAlreadyExists` when the pair already
  /// has a chat. The REST surface uses this; the socket path uses
  /// `get_or_create`.
  pub async fn create(&self, requester_id: UserId, other_id: UserId) -> Result<Chat, CoreError> {
    if self.users.find_by_id(other_id).await?.is_none() {
      return Err(CoreError::UserNotFound(format!("user {other_id} not found")));
    }

    self.chats.create(requester_id, other_id).await
  }

  pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Chat>, CoreError> {
    self.chats.list_for_user(user_id).await
  }

  /// Fetch the chat and require `user_id` to be one of its participants.
  pub async fn ensure_participant(
    &self,
    chat_id: ChatId,
    user_id: UserId,
  ) -> Result<Chat, CoreError> {
    let chat = self
      .chats
      .find_by_id(chat_id)
      .await?
      .ok_or_else(|| CoreError::ChatNotFound(format!("chat {chat_id} not found")))?;

    if !chat.has_participant(user_id) {
      return Err(CoreError::NotAParticipant(format!(
        "user {user_id} is not a participant of chat {chat_id}"
      )));
    }

    Ok(chat)
  }
}
