use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use relaychat_core::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
  #[error(transparent)]
  Core(#[from] CoreError),

  #[error("IO error: {0}")]
  IoError(#[from] std::io::Error),

  #[error("config error: {0}")]
  Config(String),

  #[error("any error: {0}")]
  AnyError(#[from] anyhow::Error),
}

/// Wire shape of REST error bodies.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOutput {
  pub error: String,
  pub kind: String,
}

impl ErrorOutput {
  pub fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      kind: kind.into(),
    }
  }
}

fn core_status(err: &CoreError) -> StatusCode {
  match err {
    CoreError::Validation(_) | CoreError::IllegalTransition(_) => StatusCode::BAD_REQUEST,
    CoreError::Authentication(_) => StatusCode::UNAUTHORIZED,
    CoreError::Unauthorized(_) | CoreError::NotAParticipant(_) => StatusCode::FORBIDDEN,
    CoreError::UserNotFound(_)
    | CoreError::ChatNotFound(_)
    | CoreError::MessageNotFound(_)
    | CoreError::NotFound(_) => StatusCode::NOT_FOUND,
    CoreError::EmailTaken(_)
    | CoreError::ChatAlreadyExists(_)
    | CoreError::DuplicateMessageId(_) => StatusCode::CONFLICT,
    CoreError::Publish(_) | CoreError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    CoreError::Database(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      AppError::Core(err) => (
        core_status(err),
        ErrorOutput::new(err.to_string(), err.kind()),
      ),
      AppError::IoError(err) => (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorOutput::new(err.to_string(), "internal"),
      ),
      AppError::Config(msg) => (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorOutput::new(msg.clone(), "internal"),
      ),
      AppError::AnyError(err) => (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorOutput::new(err.to_string(), "internal"),
      ),
    };

    (status, Json(body)).into_response()
  }
}
