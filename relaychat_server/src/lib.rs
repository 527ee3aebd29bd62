//! Server-side core of the relaychat real-time messaging service.
//!
//! Layering: config -> state -> domains/events -> gateway/handlers. The
//! gateway owns every runtime entity (sessions, rooms, presence); the
//! repositories own every persistent one; the bus decouples the two across
//! instances.

pub mod config;
pub mod domains;
pub mod error;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod middlewares;
pub mod state;

#[cfg(test)]
pub mod test_utils;

pub use config::AppConfig;
pub use error::{AppError, ErrorOutput};
pub use state::AppState;

use axum::{
  Router,
  http::HeaderValue,
  middleware::from_fn_with_state,
  routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use handlers::{
  create_chat_handler, health_handler, list_chats_handler, list_messages_handler, login_handler,
  register_handler,
};
use middlewares::verify_token_middleware;

/// Build the application router and start the gateway background work (bus
/// fan-out subscriptions, idle scavenger).
pub async fn get_router(state: AppState) -> Result<Router, AppError> {
  gateway::start(&state).await.map_err(AppError::Core)?;

  let api_routes = Router::new()
    .route("/chats", get(list_chats_handler).post(create_chat_handler))
    .route("/chats/{id}/messages", get(list_messages_handler))
    .layer(from_fn_with_state(state.clone(), verify_token_middleware));

  let public_routes = Router::new()
    .route("/auth/register", post(register_handler))
    .route("/auth/login", post(login_handler))
    .route("/ws", get(gateway::ws_handler))
    .route("/health", get(health_handler));

  let cors_origin = state.config.server.cors_origin.clone();

  let mut app = Router::new()
    .merge(api_routes)
    .merge(public_routes)
    .layer(TraceLayer::new_for_http())
    .with_state(state);

  if let Some(origin) = cors_origin {
    let origin = origin
      .parse::<HeaderValue>()
      .map_err(|e| AppError::Config(format!("invalid CORS origin: {e}")))?;
    app = app.layer(
      CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any),
    );
  }

  Ok(app)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{AuthConfig, GatewayConfig, MessageConfig, MessagingConfig, NatsConfig, ServerConfig};
  use crate::events::memory::MemoryTransport;
  use crate::test_utils::setup_test_pool;
  use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
  };
  use http_body_util::BodyExt;
  use serde_json::{Value, json};
  use sqlx_db_tester::TestPg;
  use std::sync::Arc;
  use tower::ServiceExt;

  fn test_config() -> AppConfig {
    AppConfig {
      server: ServerConfig {
        port: 0,
        db_url: String::new(),
        cors_origin: None,
      },
      auth: AuthConfig {
        secret: "test-secret-not-for-production".to_string(),
        token_expiration_secs: 3600,
      },
      messaging: MessagingConfig {
        nats: NatsConfig {
          url: String::new(),
          client_id: "test".to_string(),
          group: "test".to_string(),
        },
      },
      gateway: GatewayConfig::default(),
      message: MessageConfig::default(),
    }
  }

  async fn test_app() -> (TestPg, AppState, Router) {
    let (tdb, pool) = setup_test_pool().await;
    let state = AppState::with_parts(test_config(), pool, Arc::new(MemoryTransport::new()));
    let app = get_router(state.clone()).await.unwrap();
    (tdb, state, app)
  }

  async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
  }

  fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
  }

  async fn register(app: &Router, email: &str, name: &str) -> (String, Value) {
    let response = app
      .clone()
      .oneshot(post_json(
        "/auth/register",
        None,
        json!({ "email": email, "password": "password-123", "name": name }),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let token = body["accessToken"].as_str().unwrap().to_string();
    let user = body["user"].clone();
    (token, user)
  }

  #[tokio::test]
  async fn register_login_round_trip() {
    let (_tdb, _state, app) = test_app().await;

    let (token, user) = register(&app, "alice@x.test", "Alice").await;
    assert!(!token.is_empty());
    assert_eq!(user["email"], "alice@x.test");
    assert!(user.get("passwordHash").is_none(), "hash never leaves the server");

    // Duplicate email is a conflict.
    let response = app
      .clone()
      .oneshot(post_json(
        "/auth/register",
        None,
        json!({ "email": "alice@x.test", "password": "password-123", "name": "Alice2" }),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Login with good and bad credentials.
    let response = app
      .clone()
      .oneshot(post_json(
        "/auth/login",
        None,
        json!({ "email": "alice@x.test", "password": "password-123" }),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
      .clone()
      .oneshot(post_json(
        "/auth/login",
        None,
        json!({ "email": "alice@x.test", "password": "wrong-password" }),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn register_validates_payload() {
    let (_tdb, _state, app) = test_app().await;

    let response = app
      .clone()
      .oneshot(post_json(
        "/auth/register",
        None,
        json!({ "email": "not-an-email", "password": "password-123", "name": "A" }),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
      .clone()
      .oneshot(post_json(
        "/auth/register",
        None,
        json!({ "email": "a@x.test", "password": "short", "name": "A" }),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn chats_require_bearer_token() {
    let (_tdb, _state, app) = test_app().await;

    let response = app.clone().oneshot(get("/chats", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
      .clone()
      .oneshot(get("/chats", Some("not-a-real-token")))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn chat_creation_listing_and_conflict() {
    let (_tdb, _state, app) = test_app().await;

    let (alice_token, _) = register(&app, "alice@x.test", "Alice").await;
    let (_bob_token, bob) = register(&app, "bob@x.test", "Bob").await;
    let bob_id = bob["id"].clone();

    let response = app
      .clone()
      .oneshot(post_json("/chats", Some(&alice_token), json!({ "userId": bob_id })))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let chat = body_json(response).await;
    assert_eq!(chat["participants"].as_array().unwrap().len(), 2);

    // Same pair again: 409.
    let response = app
      .clone()
      .oneshot(post_json("/chats", Some(&alice_token), json!({ "userId": bob_id })))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Unknown recipient: 404.
    let response = app
      .clone()
      .oneshot(post_json(
        "/chats",
        Some(&alice_token),
        json!({ "userId": "1f4bd6ac-0f52-4a30-8bfe-5d4a45cf44bd" }),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
      .clone()
      .oneshot(get("/chats", Some(&alice_token)))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let chats = body_json(response).await;
    assert_eq!(chats.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn chat_messages_are_participant_only() {
    let (_tdb, _state, app) = test_app().await;

    let (alice_token, _) = register(&app, "alice@x.test", "Alice").await;
    let (_bob_token, bob) = register(&app, "bob@x.test", "Bob").await;
    let (mallory_token, _) = register(&app, "mallory@x.test", "Mallory").await;

    let response = app
      .clone()
      .oneshot(post_json(
        "/chats",
        Some(&alice_token),
        json!({ "userId": bob["id"] }),
      ))
      .await
      .unwrap();
    let chat = body_json(response).await;
    let chat_id = chat["id"].as_str().unwrap();

    let response = app
      .clone()
      .oneshot(get(&format!("/chats/{chat_id}/messages"), Some(&alice_token)))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
      .clone()
      .oneshot(get(&format!("/chats/{chat_id}/messages"), Some(&mallory_token)))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unknown chat: 404.
    let response = app
      .clone()
      .oneshot(get(
        "/chats/6e9bbd40-4b12-44f6-9f1c-0f2bb1e3a7d5/messages",
        Some(&alice_token),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn health_endpoint_is_public() {
    let (_tdb, _state, app) = test_app().await;

    let response = app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
  }
}
