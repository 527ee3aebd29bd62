//! WebSocket upgrade and the per-connection socket loop.
//!
//! The bearer token is validated before the upgrade is accepted; invalid
//! tokens get a plain 401 without an upgrade attempt. Tokens arrive either
//! as `?token=<access_token>` (WebSocket upgrades are plain GETs and cannot
//! carry an Authorization header reliably across client environments) or as
//! a standard `Authorization: Bearer` header.

use axum::{
  extract::{
    Query, State,
    ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
  },
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use relaychat_core::{CoreError, CreateMessage};

use crate::AppState;
use crate::events::{MessageStatusChanged, TOPIC_CHAT_MESSAGES, TOPIC_MESSAGE_STATUS};

use super::manager::{Session, chat_room};
use super::wire::{ClientEvent, ClientFrame, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct WsParams {
  pub token: Option<String>,
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(ToOwned::to_owned)
}

/// GET /ws — authenticate the handshake, then upgrade.
pub async fn ws_handler(
  ws: WebSocketUpgrade,
  Query(params): Query<WsParams>,
  State(state): State<AppState>,
  headers: HeaderMap,
) -> Response {
  if state.shutdown.is_cancelled() {
    return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
  }

  let token = params.token.or_else(|| bearer_from_headers(&headers));

  let user = match state.authenticator.authenticate(token.as_deref()).await {
    Ok(user) => user,
    Err(e) => {
      debug!(error = %e, "rejecting websocket handshake");
      return (StatusCode::UNAUTHORIZED, e.kind()).into_response();
    }
  };

  ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// Register the session and run the connect side effects: greet the socket
/// and, on a presence 0 -> 1 transition, announce the user online to
/// everyone else.
pub(crate) fn connect_session(
  state: &AppState,
  user: relaychat_core::AuthUser,
  tx: mpsc::UnboundedSender<ServerEvent>,
) -> Arc<Session> {
  let (session, came_online) = state.sessions.register(user.clone(), tx);

  // The greeting goes through the outbound channel so it is ordered before
  // any fan-out that may already be targeting the personal room.
  session.send(ServerEvent::ConnectionEstablished { user_id: user.id });

  if came_online {
    state.sessions.broadcast_except_user(
      user.id,
      &ServerEvent::UsersUpdate {
        user_id: user.id,
        is_online: true,
      },
    );
  }

  session
}

/// Drop the session and, on a presence 1 -> 0 transition, announce the user
/// offline. Safe to call for an already-removed session.
pub(crate) fn disconnect_session(state: &AppState, session_id: super::manager::SessionId) {
  if let Some((session, went_offline)) = state.sessions.unregister(session_id) {
    if went_offline {
      state.sessions.broadcast_except_user(
        session.user.id,
        &ServerEvent::UsersUpdate {
          user_id: session.user.id,
          is_online: false,
        },
      );
    }
  }
}

async fn handle_socket(socket: WebSocket, state: AppState, user: relaychat_core::AuthUser) {
  let (mut ws_sender, mut ws_receiver) = socket.split();
  let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

  let session = connect_session(&state, user, tx);

  // Forward outbound events from the mpsc channel to the WebSocket.
  let mut send_task = tokio::spawn(async move {
    while let Some(event) = rx.recv().await {
      let Ok(text) = serde_json::to_string(&event) else {
        continue;
      };
      if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
        break;
      }
    }
  });

  // Handle inbound frames. Cancellation (scavenger, shutdown) interrupts
  // the wait for the next frame, never a handler that already started: a
  // disconnect mid-handler lets the database write complete, and the
  // result is then dropped by the dead outbound channel.
  let recv_state = state.clone();
  let recv_session = session.clone();
  let cancel = session.cancel_token();
  let mut recv_task = tokio::spawn(async move {
    loop {
      let maybe = tokio::select! {
        _ = cancel.cancelled() => None,
        message = ws_receiver.next() => message,
      };

      match maybe {
        Some(Ok(WsMessage::Text(text))) => {
          recv_session.touch();
          handle_frame(&recv_state, &recv_session, text.as_str()).await;
        }
        Some(Ok(WsMessage::Close(_))) => break,
        // Ping/Pong are handled by the library; binary frames are ignored.
        Some(Ok(_)) => recv_session.touch(),
        Some(Err(e)) => {
          debug!(session_id = %recv_session.id, error = %e, "websocket receive error");
          break;
        }
        None => break,
      }
    }
  });

  // Wait for either task to finish, then abort the other.
  tokio::select! {
    _ = &mut send_task => recv_task.abort(),
    _ = &mut recv_task => send_task.abort(),
  }

  disconnect_session(&state, session.id);
}

/// Parse and dispatch one inbound text frame.
async fn handle_frame(state: &AppState, session: &Arc<Session>, text: &str) {
  let frame: ClientFrame = match serde_json::from_str(text) {
    Ok(frame) => frame,
    Err(e) => {
      debug!(session_id = %session.id, error = %e, "malformed client frame");
      session.send(ServerEvent::MessageError {
        message_id: None,
        error: "validation".to_string(),
      });
      return;
    }
  };

  let ack = frame.ack;
  match dispatch(state, session, frame.event).await {
    Ok(data) => {
      if let Some(ack) = ack {
        session.send(ServerEvent::Ack { ack, data });
      }
    }
    Err(e) => {
      warn!(session_id = %session.id, error = %e, "event handler failed");
      match ack {
        Some(ack) => {
          session.send(ServerEvent::Ack {
            ack,
            data: json!({
              "status": "error",
              "message": e.to_string(),
              "kind": e.kind(),
            }),
          });
        }
        None => {
          session.send(ServerEvent::MessageError {
            message_id: None,
            error: e.kind().to_string(),
          });
        }
      }
    }
  }
}

async fn dispatch(
  state: &AppState,
  session: &Arc<Session>,
  event: ClientEvent,
) -> Result<serde_json::Value, CoreError> {
  let user_id = session.user.id;

  match event {
    ClientEvent::ChatGet { recipient_id } => {
      let (chat, _created) = state.chat_service.get_or_create(user_id, recipient_id).await?;
      let messages = state.message_service.list_for_chat(chat.id, user_id).await?;
      Ok(json!({ "chatId": chat.id, "messages": messages }))
    }

    ClientEvent::ChatJoin { chat_id } => {
      state.chat_service.ensure_participant(chat_id, user_id).await?;
      state.sessions.join_room(session, &chat_room(chat_id));

      // Joining the chat room is the canonical "becomes DELIVERED" moment:
      // drain the backlog and announce each advance.
      let backlog = state
        .message_service
        .undelivered_for(user_id, Some(chat_id))
        .await?;

      for message in backlog {
        session.send(ServerEvent::Message(message.clone()));

        match state.message_service.mark_delivered(message.id, user_id).await {
          Ok(advance) if advance.changed => {
            let record =
              MessageStatusChanged::new(&advance.message, advance.message.status);
            if let Err(e) = state
              .bus
              .publish(TOPIC_MESSAGE_STATUS, &record.message_id.to_string(), &record)
              .await
            {
              warn!(message_id = %message.id, error = %e, "failed to publish status update");
            }
          }
          Ok(_) => {}
          Err(e) => {
            warn!(message_id = %message.id, error = %e, "failed to mark backlog message delivered");
          }
        }
      }

      Ok(json!({ "status": "ok" }))
    }

    ClientEvent::ChatLeave { chat_id } => {
      state.sessions.leave_room(session, &chat_room(chat_id));
      Ok(json!({ "success": true }))
    }

    ClientEvent::Message { chat_id, content, id } => {
      let message = state
        .message_service
        .send(chat_id, user_id, CreateMessage { content, id })
        .await?;

      // Persisted: acknowledge to the sender before the fan-out publish.
      session.send(ServerEvent::MessageAck {
        message_id: message.id,
      });

      if let Err(e) = state
        .bus
        .publish(TOPIC_CHAT_MESSAGES, &chat_id.to_string(), &message)
        .await
      {
        warn!(message_id = %message.id, error = %e, "failed to publish message");
        session.send(ServerEvent::MessageError {
          message_id: Some(message.id),
          error: e.kind().to_string(),
        });
      }

      Ok(serde_json::to_value(&message).map_err(|e| CoreError::Internal(e.to_string()))?)
    }

    ClientEvent::MessageRead { message_id } => {
      let advance = state.message_service.mark_read(message_id, user_id).await?;

      if advance.changed {
        let record = MessageStatusChanged::new(&advance.message, advance.message.status);
        if let Err(e) = state
          .bus
          .publish(TOPIC_MESSAGE_STATUS, &record.message_id.to_string(), &record)
          .await
        {
          warn!(%message_id, error = %e, "failed to publish status update");
          session.send(ServerEvent::MessageError {
            message_id: Some(message_id),
            error: e.kind().to_string(),
          });
        }
      }

      Ok(json!({ "status": "ok" }))
    }

    ClientEvent::UsersList => {
      let users = state.users.list_all().await?;
      let users: Vec<_> = users
        .into_iter()
        .map(|u| {
          json!({
            "id": u.id,
            "name": u.fullname,
            "email": u.email,
            "isOnline": state.sessions.is_online(u.id),
          })
        })
        .collect();
      Ok(json!({ "users": users }))
    }
  }
}
