use relaychat_server::{AppConfig, AppError, AppState, gateway, get_router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
  let config = AppConfig::load().expect("failed to load configuration");

  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let state = AppState::try_new(config.clone()).await?;

  sqlx::migrate!()
    .run(&*state.pool)
    .await
    .map_err(|e| AppError::Config(format!("migration failed: {e}")))?;

  let app = get_router(state.clone()).await?;

  let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
  let listener = TcpListener::bind(addr).await?;
  info!("server listening on {}", addr);

  let shutdown = state.shutdown.clone();
  axum::serve(listener, app.into_make_service())
    .with_graceful_shutdown(async move {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = shutdown.cancelled() => {},
      }
    })
    .await?;

  // LIFO release: sockets and bus first, then the database pool.
  gateway::shutdown(&state).await;
  state.pool.close().await;
  info!("server stopped");

  Ok(())
}
