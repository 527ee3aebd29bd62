use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{ops::Deref, sync::Arc};
use tokio_util::sync::CancellationToken;

use relaychat_core::{CoreError, TokenManager, contracts};

use crate::config::AppConfig;
use crate::domains::auth::{AuthService, Authenticator};
use crate::domains::chat::{ChatRepository as PgChatRepository, ChatService};
use crate::domains::messaging::{MessageRepository as PgMessageRepository, MessageService};
use crate::domains::user::UserRepository as PgUserRepository;
use crate::error::AppError;
use crate::events::{EventBus, NatsTransport};
use crate::gateway::SessionManager;

/// Composition root. Cheap to clone; every handler and the gateway share
/// the same inner state.
#[derive(Clone)]
pub struct AppState {
  inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
  pub config: AppConfig,
  pub pool: Arc<PgPool>,
  pub token_manager: Arc<TokenManager>,
  pub users: Arc<dyn contracts::UserRepository>,
  pub auth_service: AuthService,
  pub authenticator: Authenticator,
  pub chat_service: ChatService,
  pub message_service: MessageService,
  pub bus: Arc<EventBus>,
  pub sessions: Arc<SessionManager>,
  pub shutdown: CancellationToken,
}

impl Deref for AppState {
  type Target = AppStateInner;

  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

impl AppState {
  /// Production composition: connect Postgres and NATS, then wire the
  /// services. I/O handles are acquired here, released in LIFO order by
  /// `gateway::shutdown` and `main`.
  pub async fn try_new(config: AppConfig) -> Result<Self, AppError> {
    let pool = PgPoolOptions::new()
      .max_connections(10)
      .connect(&config.server.db_url)
      .await
      .map_err(CoreError::from)?;

    let transport = NatsTransport::connect_with_retry(
      &config.messaging.nats.url,
      &config.messaging.nats.client_id,
    )
    .await
    .map_err(CoreError::from)?;

    Ok(Self::with_parts(config, Arc::new(pool), Arc::new(transport)))
  }

  /// Composition over pre-built infrastructure; tests inject a throwaway
  /// database pool and an in-memory transport here.
  pub fn with_parts(
    config: AppConfig,
    pool: Arc<PgPool>,
    transport: Arc<dyn contracts::EventTransport>,
  ) -> Self {
    let shutdown = CancellationToken::new();
    let token_manager = Arc::new(TokenManager::from_config(&config.auth));

    let users: Arc<dyn contracts::UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let chats: Arc<dyn contracts::ChatRepository> = Arc::new(PgChatRepository::new(pool.clone()));
    let messages: Arc<dyn contracts::MessageRepository> =
      Arc::new(PgMessageRepository::new(pool.clone()));

    let auth_service = AuthService::new(users.clone(), token_manager.clone());
    let authenticator = Authenticator::new(token_manager.clone(), users.clone());
    let chat_service = ChatService::new(chats.clone(), users.clone());
    let message_service = MessageService::new(messages, chats, config.message.max_length);

    let bus = Arc::new(EventBus::new(transport, shutdown.clone()));
    let sessions = Arc::new(SessionManager::new());

    Self {
      inner: Arc::new(AppStateInner {
        config,
        pool,
        token_manager,
        users,
        auth_service,
        authenticator,
        chat_service,
        message_service,
        bus,
        sessions,
        shutdown,
      }),
    }
  }
}
