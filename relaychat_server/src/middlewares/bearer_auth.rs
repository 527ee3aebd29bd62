use axum::{
  Json,
  extract::{Request, State},
  http::{StatusCode, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use tracing::debug;

use crate::AppState;
use crate::error::ErrorOutput;

/// Require a valid `Authorization: Bearer <token>` header; on success the
/// resolved [`relaychat_core::AuthUser`] is attached as a request extension.
pub async fn verify_token_middleware(
  State(state): State<AppState>,
  mut request: Request,
  next: Next,
) -> Response {
  let token = request
    .headers()
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(ToOwned::to_owned);

  match state.authenticator.authenticate(token.as_deref()).await {
    Ok(user) => {
      request.extensions_mut().insert(user);
      next.run(request).await
    }
    Err(e) => {
      debug!(error = %e, "rejecting request");
      (
        StatusCode::UNAUTHORIZED,
        Json(ErrorOutput::new(e.to_string(), e.kind())),
      )
        .into_response()
    }
  }
}
