//! Session & presence manager: the WebSocket gateway.
//!
//! Sockets never talk to each other directly. A persisted message is
//! published to the bus, and every gateway instance's subscription fans it
//! out to the sessions in the matching room. This keeps multi-instance
//! deployments coherent: the origin socket and the receiver sockets may be
//! on different processes.

pub mod manager;
pub mod socket;
pub mod wire;

pub use manager::{Session, SessionId, SessionManager, chat_room, user_room};
pub use socket::ws_handler;
pub use wire::{ClientEvent, ClientFrame, ServerEvent};

use std::time::Duration;
use tracing::{info, warn};

use relaychat_core::{CoreError, Message};

use crate::AppState;
use crate::events::{MessageStatusChanged, TOPIC_CHAT_MESSAGES, TOPIC_MESSAGE_STATUS};

/// Wire the bus subscriptions that feed the room fan-out, and start the
/// idle scavenger. Called once at server start.
pub async fn start(state: &AppState) -> Result<(), CoreError> {
  subscribe_fanout(state).await?;
  spawn_scavenger(state.clone());
  Ok(())
}

async fn subscribe_fanout(state: &AppState) -> Result<(), CoreError> {
  let sessions = state.sessions.clone();
  state
    .bus
    .subscribe(TOPIC_CHAT_MESSAGES, move |message: Message| {
      let sessions = sessions.clone();
      async move {
        let room = chat_room(message.chat_id);
        sessions.broadcast_to_room(&room, &ServerEvent::Message(message));
        Ok(())
      }
    })
    .await?;

  let sessions = state.sessions.clone();
  state
    .bus
    .subscribe(TOPIC_MESSAGE_STATUS, move |record: MessageStatusChanged| {
      let sessions = sessions.clone();
      async move {
        // The chat room reaches whoever has the conversation open; the
        // sender's personal room reaches the sender even when it has not
        // joined the chat room on this instance.
        let event = ServerEvent::MessageStatus {
          message_id: record.message_id,
          status: record.status,
          timestamp: record.timestamp,
        };
        sessions.broadcast_to_rooms(
          &[chat_room(record.chat_id), user_room(record.sender_id)],
          &event,
        );
        Ok(())
      }
    })
    .await?;

  Ok(())
}

/// Periodically disconnect sessions whose socket is gone or whose last
/// activity is older than the idle threshold.
fn spawn_scavenger(state: AppState) {
  let interval = Duration::from_secs(state.config.gateway.scavenge_interval_secs);
  let idle_threshold = Duration::from_secs(state.config.gateway.idle_threshold_secs);
  let shutdown = state.shutdown.clone();

  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => break,
        _ = ticker.tick() => {}
      }

      for session in state.sessions.stale_sessions(idle_threshold) {
        warn!(
          session_id = %session.id,
          user_id = %session.user.id,
          idle_secs = session.idle_for().as_secs(),
          closed = session.is_closed(),
          "scavenging stale session"
        );

        // Cancelling makes the socket task run the regular disconnect
        // cleanup. For sessions whose task is already gone, clean up the
        // registration directly.
        session.disconnect();
        if session.is_closed() {
          socket::disconnect_session(&state, session.id);
        }
      }
    }

    info!("idle scavenger stopped");
  });
}

/// Graceful shutdown: stop accepting connections, disconnect every live
/// session, wait for the socket tasks to drain within the configured
/// deadline, then stop the bus. Resources release in LIFO order of their
/// acquisition.
pub async fn shutdown(state: &AppState) {
  info!("gateway shutting down");
  state.shutdown.cancel();

  for session in state.sessions.all_sessions() {
    session.disconnect();
  }

  let deadline = Duration::from_secs(state.config.gateway.shutdown_deadline_secs);
  let drained = tokio::time::timeout(deadline, async {
    while !state.sessions.is_empty() {
      tokio::time::sleep(Duration::from_millis(25)).await;
    }
  })
  .await;

  if drained.is_err() {
    warn!(
      remaining = state.sessions.session_count(),
      "shutdown deadline elapsed; abandoning remaining sessions"
    );
  }

  state.bus.stop().await;
  info!("gateway stopped");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{
    AppConfig, AuthConfig, GatewayConfig, MessageConfig, MessagingConfig, NatsConfig, ServerConfig,
  };
  use crate::events::memory::MemoryTransport;
  use crate::test_utils::setup_test_pool;
  use relaychat_core::{AuthUser, UserId};
  use sqlx_db_tester::TestPg;
  use std::sync::Arc;
  use tokio::sync::mpsc;

  fn test_config(gateway: GatewayConfig) -> AppConfig {
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
      gateway,
      message: MessageConfig::default(),
    }
  }

  async fn test_state(gateway: GatewayConfig) -> (TestPg, AppState) {
    let (tdb, pool) = setup_test_pool().await;
    let state = AppState::with_parts(test_config(gateway), pool, Arc::new(MemoryTransport::new()));
    (tdb, state)
  }

  fn auth_user() -> AuthUser {
    AuthUser {
      id: UserId::generate(),
      fullname: "Test".to_string(),
      email: "t@example.com".to_string(),
    }
  }

  #[tokio::test]
  async fn shutdown_drains_sessions_and_stops_the_bus() {
    let (_tdb, state) = test_state(GatewayConfig::default()).await;
    start(&state).await.unwrap();

    // Simulate the socket task: on forced disconnect it runs the regular
    // cleanup path.
    let (tx, _rx) = mpsc::unbounded_channel();
    let session = socket::connect_session(&state, auth_user(), tx);
    let cancel = session.cancel_token();
    let cleanup_state = state.clone();
    let session_id = session.id;
    tokio::spawn(async move {
      cancel.cancelled().await;
      socket::disconnect_session(&cleanup_state, session_id);
    });

    shutdown(&state).await;

    assert!(state.sessions.is_empty(), "sessions drained before the deadline");
    assert!(state.bus.is_shutting_down());

    let err = state
      .bus
      .publish("t", "k", &serde_json::json!({}))
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::ShuttingDown));
  }

  #[tokio::test]
  async fn shutdown_gives_up_after_the_deadline() {
    let gateway = GatewayConfig {
      shutdown_deadline_secs: 0,
      ..GatewayConfig::default()
    };
    let (_tdb, state) = test_state(gateway).await;

    // No socket task listens for the cancellation, so the session never
    // cleans up and the deadline must fire.
    let (tx, _rx) = mpsc::unbounded_channel();
    let _session = socket::connect_session(&state, auth_user(), tx);

    shutdown(&state).await;
    assert_eq!(state.sessions.session_count(), 1, "abandoned, not leaked into a hang");
  }

  #[tokio::test]
  async fn scavenger_cleans_up_closed_sessions() {
    let (_tdb, state) = test_state(GatewayConfig::default()).await;

    let observer = auth_user();
    let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
    socket::connect_session(&state, observer.clone(), obs_tx);

    let ghost = auth_user();
    let (tx, rx) = mpsc::unbounded_channel();
    socket::connect_session(&state, ghost.clone(), tx);
    // The observer saw the ghost come online.
    let online = obs_rx.recv().await.unwrap();
    assert!(matches!(online, ServerEvent::UsersUpdate { is_online: true, .. }));

    // The socket dies without running its cleanup path.
    drop(rx);
    assert_eq!(state.sessions.session_count(), 2);

    // The scavenger's first tick fires immediately.
    spawn_scavenger(state.clone());

    let offline = tokio::time::timeout(Duration::from_secs(2), obs_rx.recv())
      .await
      .expect("scavenger should broadcast the offline transition")
      .unwrap();
    assert!(matches!(
      offline,
      ServerEvent::UsersUpdate { user_id, is_online: false } if user_id == ghost.id
    ));

    assert_eq!(state.sessions.session_count(), 1);
    assert!(!state.sessions.is_online(ghost.id));
  }
}
