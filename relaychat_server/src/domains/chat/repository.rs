use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use relaychat_core::{Chat, ChatId, CoreError, UserId, contracts, models::chat::participant_pair};

const CHAT_COLUMNS: &str =
  "id, ARRAY[participant_low, participant_high] AS participants, created_at, updated_at";

pub struct ChatRepository {
  pool: Arc<PgPool>,
}

impl ChatRepository {
  pub fn new(pool: Arc<PgPool>) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl contracts::ChatRepository for ChatRepository {
  async fn create(&self, a: UserId, b: UserId) -> Result<Chat, CoreError> {
    let (low, high) = participant_pair(a, b)?;

    // The chat row and both junction rows must appear atomically; the unique
    // constraint on (participant_low, participant_high) turns a concurrent
    // create into ChatAlreadyExists for the losing caller.
    let mut tx = self.pool.begin().await?;

    let chat = sqlx::query_as::<_, Chat>(&format!(
      "INSERT INTO chats (participant_low, participant_high)
       VALUES ($1, $2)
       RETURNING {CHAT_COLUMNS}"
    ))
    .bind(low)
    .bind(high)
    .fetch_one(&mut *tx)
    .await?;

    for user_id in [low, high] {
      sqlx::query("INSERT INTO chat_participants (chat_id, user_id) VALUES ($1, $2)")
        .bind(chat.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(chat)
  }

  async fn find_by_id(&self, id: ChatId) -> Result<Option<Chat>, CoreError> {
    let chat =
      sqlx::query_as::<_, Chat>(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

    Ok(chat)
  }

  async fn find_by_participants(&self, a: UserId, b: UserId) -> Result<Option<Chat>, CoreError> {
    let (low, high) = participant_pair(a, b)?;

    let chat = sqlx::query_as::<_, Chat>(&format!(
      "SELECT {CHAT_COLUMNS} FROM chats
       WHERE participant_low = $1 AND participant_high = $2"
    ))
    .bind(low)
    .bind(high)
    .fetch_optional(&*self.pool)
    .await?;

    Ok(chat)
  }

  async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Chat>, CoreError> {
    // updated_at is touched on every message save, so it is the
    // most-recent-activity ordering key.
    let chats = sqlx::query_as::<_, Chat>(&format!(
      "SELECT {CHAT_COLUMNS} FROM chats
       WHERE $1 IN (participant_low, participant_high)
       ORDER BY updated_at DESC"
    ))
    .bind(user_id)
    .fetch_all(&*self.pool)
    .await?;

    Ok(chats)
  }
}
