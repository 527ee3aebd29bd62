use axum::{
  Extension, Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;

use relaychat_core::{AuthUser, Chat, ChatId, Message, UserId};

use crate::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
  pub user_id: UserId,
}

/// GET /chats — the requester's chats, most recent activity first.
pub async fn list_chats_handler(
  Extension(user): Extension<AuthUser>,
  State(state): State<AppState>,
) -> Result<Json<Vec<Chat>>, AppError> {
  let chats = state.chat_service.list_for_user(user.id).await?;
  Ok(Json(chats))
}

/// POST /chats — create the chat with another user. 409 when the pair
/// already has one.
pub async fn create_chat_handler(
  Extension(user): Extension<AuthUser>,
  State(state): State<AppState>,
  Json(payload): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, AppError> {
  let chat = state.chat_service.create(user.id, payload.user_id).await?;
  Ok((StatusCode::CREATED, Json(chat)))
}

/// GET /chats/{id}/messages — full history, ascending.
pub async fn list_messages_handler(
  Extension(user): Extension<AuthUser>,
  State(state): State<AppState>,
  Path(chat_id): Path<ChatId>,
) -> Result<Json<Vec<Message>>, AppError> {
  let messages = state.message_service.list_for_chat(chat_id, user.id).await?;
  Ok(Json(messages))
}
