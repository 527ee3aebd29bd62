use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::CoreError;
use crate::models::{ChatId, UserId};

/// A two-party conversation.
///
/// The participant pair is unordered on the wire but stored ordered
/// (`participant_low < participant_high` by uuid byte order) so the database
/// can enforce at-most-one chat per pair with a plain unique constraint.
#[derive(Debug, Serialize, Deserialize, FromRow, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
  pub id: ChatId,
  pub participants: Vec<UserId>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Chat {
  pub fn has_participant(&self, user_id: UserId) -> bool {
    self.participants.contains(&user_id)
  }

  /// The peer of `user_id` in this chat, if `user_id` is a participant.
  pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
    if !self.has_participant(user_id) {
      return None;
    }
    self.participants.iter().copied().find(|&p| p != user_id)
  }
}

/// Order an unordered participant pair into its canonical `(low, high)` form.
///
/// Rejects `a == b`: a chat always has two distinct participants.
pub fn participant_pair(a: UserId, b: UserId) -> Result<(UserId, UserId), CoreError> {
  if a == b {
    return Err(CoreError::Validation(
      "a chat requires two distinct participants".to_string(),
    ));
  }
  if a.0 < b.0 {
    Ok((a, b))
  } else {
    Ok((b, a))
  }
}
