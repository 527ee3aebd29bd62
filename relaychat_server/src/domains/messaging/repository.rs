use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use relaychat_core::{
  ChatId, CoreError, CreateMessage, Message, MessageId, MessageStatus, UserId, contracts,
};

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, status, created_at";

pub struct MessageRepository {
  pool: Arc<PgPool>,
}

impl MessageRepository {
  pub fn new(pool: Arc<PgPool>) -> Self {
    Self { pool }
  }

  async fn find_existing(&self, id: MessageId) -> Result<Option<Message>, CoreError> {
    let message = sqlx::query_as::<_, Message>(&format!(
      "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&*self.pool)
    .await?;

    Ok(message)
  }

  /// Resolve a stored row for a resubmitted id: same chat and sender means
  /// idempotent replay, anything else is an id collision.
  fn check_resubmission(
    existing: Message,
    chat_id: ChatId,
    sender_id: UserId,
  ) -> Result<Message, CoreError> {
    if existing.chat_id == chat_id && existing.sender_id == sender_id {
      Ok(existing)
    } else {
      Err(CoreError::DuplicateMessageId(format!(
        "message {} already exists in another chat or under another sender",
        existing.id
      )))
    }
  }
}

#[async_trait]
impl contracts::MessageRepository for MessageRepository {
  async fn save(
    &self,
    chat_id: ChatId,
    sender_id: UserId,
    input: &CreateMessage,
  ) -> Result<Message, CoreError> {
    // Resubmission short-circuit before touching the chat.
    if let Some(id) = input.id {
      if let Some(existing) = self.find_existing(id).await? {
        return Self::check_resubmission(existing, chat_id, sender_id);
      }
    }

    let mut tx = self.pool.begin().await?;

    let chat_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)")
      .bind(chat_id)
      .fetch_one(&mut *tx)
      .await?;
    if !chat_exists {
      return Err(CoreError::ChatNotFound(format!("chat {chat_id} not found")));
    }

    let is_participant: bool = sqlx::query_scalar(
      "SELECT EXISTS(SELECT 1 FROM chat_participants WHERE chat_id = $1 AND user_id = $2)",
    )
    .bind(chat_id)
    .bind(sender_id)
    .fetch_one(&mut *tx)
    .await?;
    if !is_participant {
      return Err(CoreError::NotAParticipant(format!(
        "user {sender_id} is not a participant of chat {chat_id}"
      )));
    }

    let id = input.id.unwrap_or_else(MessageId::generate);

    let inserted = sqlx::query_as::<_, Message>(&format!(
      "INSERT INTO messages (id, chat_id, sender_id, content)
       VALUES ($1, $2, $3, $4)
       RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(id)
    .bind(chat_id)
    .bind(sender_id)
    .bind(&input.content)
    .fetch_one(&mut *tx)
    .await;

    let message = match inserted {
      Ok(message) => message,
      Err(e) => {
        let err = CoreError::from_database_error(e);
        if let CoreError::DuplicateMessageId(_) = err {
          // Lost an insert race against the same id; the transaction is
          // aborted, so re-read from the pool.
          drop(tx);
          let existing = self.find_existing(id).await?.ok_or(err)?;
          return Self::check_resubmission(existing, chat_id, sender_id);
        }
        return Err(err);
      }
    };

    // Keep the chat's activity ordering key fresh.
    sqlx::query("UPDATE chats SET updated_at = now() WHERE id = $1")
      .bind(chat_id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;

    Ok(message)
  }

  async fn get(&self, id: MessageId) -> Result<Option<Message>, CoreError> {
    self.find_existing(id).await
  }

  async fn list_for_chat(&self, chat_id: ChatId) -> Result<Vec<Message>, CoreError> {
    let messages = sqlx::query_as::<_, Message>(&format!(
      "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = $1 ORDER BY created_at ASC"
    ))
    .bind(chat_id)
    .fetch_all(&*self.pool)
    .await?;

    Ok(messages)
  }

  async fn update_status(&self, id: MessageId, status: MessageStatus) -> Result<(), CoreError> {
    // message_status enum order is declaration order (sent < delivered <
    // read), so the predicate admits only forward or equal transitions.
    let result = sqlx::query("UPDATE messages SET status = $2 WHERE id = $1 AND status <= $2")
      .bind(id)
      .bind(status)
      .execute(&*self.pool)
      .await?;

    if result.rows_affected() == 0 {
      let current: Option<MessageStatus> =
        sqlx::query_scalar("SELECT status FROM messages WHERE id = $1")
          .bind(id)
          .fetch_optional(&*self.pool)
          .await?;

      return match current {
        None => Err(CoreError::MessageNotFound(format!("message {id} not found"))),
        Some(current) => Err(CoreError::IllegalTransition(format!(
          "message {id}: {} -> {} is a regression",
          current.as_str(),
          status.as_str()
        ))),
      };
    }

    Ok(())
  }

  async fn list_undelivered(
    &self,
    user_id: UserId,
    chat_id: Option<ChatId>,
  ) -> Result<Vec<Message>, CoreError> {
    let messages = sqlx::query_as::<_, Message>(&format!(
      "SELECT m.{} FROM messages m
       JOIN chat_participants cp ON cp.chat_id = m.chat_id AND cp.user_id = $1
       WHERE m.sender_id <> $1
         AND m.status = 'sent'
         AND ($2::uuid IS NULL OR m.chat_id = $2)
       ORDER BY m.created_at ASC",
      MESSAGE_COLUMNS.replace(", ", ", m.")
    ))
    .bind(user_id)
    .bind(chat_id)
    .fetch_all(&*self.pool)
    .await?;

    Ok(messages)
  }
}
