use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use validator::Validate;

use relaychat_core::{CoreError, CreateUser, SigninUser};

use crate::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
  #[validate(email)]
  pub email: String,
  #[validate(length(min = 8, max = 128))]
  pub password: String,
  #[validate(length(min = 1, max = 128))]
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
  pub email: String,
  pub password: String,
}

/// POST /auth/register
pub async fn register_handler(
  State(state): State<AppState>,
  Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
  payload
    .validate()
    .map_err(|e| CoreError::Validation(e.to_string()))?;

  let tokens = state
    .auth_service
    .register(&CreateUser::new(&payload.name, &payload.email, &payload.password))
    .await?;

  Ok((StatusCode::CREATED, Json(tokens)))
}

/// POST /auth/login
pub async fn login_handler(
  State(state): State<AppState>,
  Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
  let tokens = state
    .auth_service
    .login(&SigninUser::new(&payload.email, &payload.password))
    .await?;

  Ok(Json(tokens))
}
