use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event publishing error types
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum PublishError {
  /// Serialization errors
  #[error("serialization error: {0}")]
  Serialize(String),

  /// Network connection errors
  #[error("network error: {0}")]
  Network(String),

  /// Timeout errors
  #[error("timeout error: {0}")]
  Timeout(String),

  /// Configuration errors
  #[error("configuration error: {0}")]
  Configuration(String),
}

impl PublishError {
  /// Check if this error type is retryable
  pub fn is_retryable(&self) -> bool {
    match self {
      PublishError::Network(_) | PublishError::Timeout(_) => true,
      PublishError::Serialize(_) | PublishError::Configuration(_) => false,
    }
  }
}

/// Core domain error types.
///
/// These errors represent business domain issues, not technical
/// implementation details. Every fallible operation of the repository, the
/// services and the bus returns one of these kinds.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum CoreError {
  /// Database errors from sqlx
  #[error("database error: {0}")]
  Database(String),

  /// Validation errors for business rules
  #[error("validation error: {0}")]
  Validation(String),

  /// A user with this email already exists
  #[error("email already taken: {0}")]
  EmailTaken(String),

  /// User not found errors
  #[error("user not found: {0}")]
  UserNotFound(String),

  /// Chat not found errors
  #[error("chat not found: {0}")]
  ChatNotFound(String),

  /// Message not found errors
  #[error("message not found: {0}")]
  MessageNotFound(String),

  /// Generic not found errors
  #[error("not found: {0}")]
  NotFound(String),

  /// A chat for this participant pair already exists
  #[error("chat already exists: {0}")]
  ChatAlreadyExists(String),

  /// A message with this id already exists
  #[error("duplicate message id: {0}")]
  DuplicateMessageId(String),

  /// Caller is not a participant of the chat
  #[error("not a participant: {0}")]
  NotAParticipant(String),

  /// Attempted backward delivery-status transition
  #[error("illegal status transition: {0}")]
  IllegalTransition(String),

  /// Token authentication errors
  #[error("authentication error: {0}")]
  Authentication(String),

  /// Unauthorized access errors
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  /// Event publishing errors
  #[error("publish error: {0}")]
  Publish(PublishError),

  /// The service is shutting down; new work is rejected
  #[error("shutting down")]
  ShuttingDown,

  /// Internal/unexpected errors
  #[error("internal error: {0}")]
  Internal(String),
}

impl CoreError {
  /// Stable error kind string surfaced on the wire (`message:error` frames
  /// and REST error bodies). Clients key retry behavior off these.
  pub fn kind(&self) -> &'static str {
    match self {
      CoreError::Database(_) => "database",
      CoreError::Validation(_) => "validation",
      CoreError::EmailTaken(_) => "email_taken",
      CoreError::UserNotFound(_) => "user_not_found",
      CoreError::ChatNotFound(_) => "chat_not_found",
      CoreError::MessageNotFound(_) => "message_not_found",
      CoreError::NotFound(_) => "not_found",
      CoreError::ChatAlreadyExists(_) => "chat_already_exists",
      CoreError::DuplicateMessageId(_) => "duplicate_message_id",
      CoreError::NotAParticipant(_) => "not_a_participant",
      CoreError::IllegalTransition(_) => "illegal_transition",
      CoreError::Authentication(_) => "authentication",
      CoreError::Unauthorized(_) => "unauthorized",
      CoreError::Publish(_) => "transient",
      CoreError::ShuttingDown => "shutting_down",
      CoreError::Internal(_) => "internal",
    }
  }

  /// Map sqlx database errors to specific CoreError variants
  pub fn from_database_error(error: sqlx::Error) -> Self {
    if let Some(db_err) = error.as_database_error() {
      if db_err.is_foreign_key_violation() {
        return Self::map_foreign_key_error(&error.to_string());
      }

      if db_err.is_unique_violation() {
        return Self::map_unique_constraint_error(&error.to_string());
      }

      if db_err.is_check_violation() {
        return CoreError::Validation(format!("data validation failed: {}", db_err.message()));
      }
    }

    CoreError::Database(error.to_string())
  }

  /// Map foreign key constraint errors to specific business errors
  fn map_foreign_key_error(error_msg: &str) -> Self {
    if error_msg.contains("chats_participant_low_fkey")
      || error_msg.contains("chats_participant_high_fkey")
    {
      CoreError::UserNotFound("cannot create chat: participant does not exist".to_string())
    } else if error_msg.contains("chat_participants_user_id_fkey") {
      CoreError::UserNotFound("cannot add participant: user does not exist".to_string())
    } else if error_msg.contains("chat_participants_chat_id_fkey") {
      CoreError::ChatNotFound("cannot add participant: chat does not exist".to_string())
    } else if error_msg.contains("messages_chat_id_fkey") {
      CoreError::ChatNotFound("cannot send message: chat does not exist".to_string())
    } else if error_msg.contains("messages_sender_id_fkey") {
      CoreError::UserNotFound("cannot send message: sender does not exist".to_string())
    } else {
      CoreError::NotFound(format!("referenced resource not found: {}", error_msg))
    }
  }

  /// Map unique constraint errors to specific business errors
  fn map_unique_constraint_error(error_msg: &str) -> Self {
    if error_msg.contains("users_email_key") {
      CoreError::EmailTaken("a user with this email already exists".to_string())
    } else if error_msg.contains("chats_participant_pair_key") {
      CoreError::ChatAlreadyExists(
        "a chat for this participant pair already exists".to_string(),
      )
    } else if error_msg.contains("messages_pkey") {
      CoreError::DuplicateMessageId("a message with this id already exists".to_string())
    } else {
      CoreError::Database(format!("resource already exists: {}", error_msg))
    }
  }
}

impl From<sqlx::Error> for CoreError {
  fn from(err: sqlx::Error) -> Self {
    CoreError::from_database_error(err)
  }
}

impl From<jsonwebtoken::errors::Error> for CoreError {
  fn from(err: jsonwebtoken::errors::Error) -> Self {
    CoreError::Authentication(err.to_string())
  }
}

impl From<anyhow::Error> for CoreError {
  fn from(err: anyhow::Error) -> Self {
    CoreError::Internal(err.to_string())
  }
}

impl From<PublishError> for CoreError {
  fn from(err: PublishError) -> Self {
    CoreError::Publish(err)
  }
}

impl From<serde_json::Error> for PublishError {
  fn from(err: serde_json::Error) -> Self {
    PublishError::Serialize(err.to_string())
  }
}

impl From<std::io::Error> for PublishError {
  fn from(err: std::io::Error) -> Self {
    match err.kind() {
      std::io::ErrorKind::TimedOut => PublishError::Timeout(err.to_string()),
      _ => PublishError::Network(err.to_string()),
    }
  }
}
