use chrono::Utc;
use dashmap::DashMap;
use std::{
  collections::HashSet,
  sync::{
    Arc, RwLock,
    atomic::{AtomicI64, Ordering},
  },
  time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use relaychat_core::{AuthUser, ChatId, UserId};

use super::wire::ServerEvent;

pub type SessionId = Uuid;

pub fn user_room(user_id: UserId) -> String {
  format!("user:{user_id}")
}

pub fn chat_room(chat_id: ChatId) -> String {
  format!("chat:{chat_id}")
}

/// One live authenticated socket. Owned by the session manager; the socket
/// task holds an `Arc` for the lifetime of the connection.
pub struct Session {
  pub id: SessionId,
  pub user: AuthUser,
  tx: mpsc::UnboundedSender<ServerEvent>,
  last_activity: AtomicI64,
  rooms: RwLock<HashSet<String>>,
  cancel: CancellationToken,
}

impl Session {
  fn new(user: AuthUser, tx: mpsc::UnboundedSender<ServerEvent>) -> Arc<Self> {
    Arc::new(Self {
      id: Uuid::new_v4(),
      user,
      tx,
      last_activity: AtomicI64::new(Utc::now().timestamp()),
      rooms: RwLock::new(HashSet::new()),
      cancel: CancellationToken::new(),
    })
  }

  /// Queue an event for the socket. Sends to a dead socket silently no-op.
  pub fn send(&self, event: ServerEvent) -> bool {
    self.tx.send(event).is_ok()
  }

  pub fn touch(&self) {
    self.last_activity.store(Utc::now().timestamp(), Ordering::Relaxed);
  }

  pub fn idle_for(&self) -> Duration {
    let last = self.last_activity.load(Ordering::Relaxed);
    let idle = (Utc::now().timestamp() - last).max(0);
    Duration::from_secs(idle as u64)
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Token cancelled to force-disconnect this session (idle scavenger,
  /// shutdown). The socket task selects on it.
  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  pub fn disconnect(&self) {
    self.cancel.cancel();
  }

  pub fn rooms(&self) -> HashSet<String> {
    self.rooms.read().unwrap().clone()
  }
}

/// The set of live sessions, the room index and the presence counters.
///
/// Reads (fan-out lookups) vastly outnumber writes (connect/disconnect), so
/// everything lives in sharded maps. Presence transitions are decided under
/// the owning shard's entry lock, which makes the 0<->1 detection atomic.
#[derive(Default)]
pub struct SessionManager {
  sessions: DashMap<SessionId, Arc<Session>>,
  rooms: DashMap<String, HashSet<SessionId>>,
  presence: DashMap<UserId, usize>,
}

impl SessionManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a new session: store it, bump presence, join the personal
  /// room. Returns the session and whether the user just came online
  /// (presence 0 -> 1).
  pub fn register(
    &self,
    user: AuthUser,
    tx: mpsc::UnboundedSender<ServerEvent>,
  ) -> (Arc<Session>, bool) {
    let session = Session::new(user, tx);
    let user_id = session.user.id;

    self.sessions.insert(session.id, session.clone());

    let came_online = {
      let mut count = self.presence.entry(user_id).or_insert(0);
      *count += 1;
      *count == 1
    };

    self.join_room(&session, &user_room(user_id));

    info!(session_id = %session.id, %user_id, came_online, "session registered");
    (session, came_online)
  }

  /// Remove a session: leave all rooms, drop presence. Returns the session
  /// and whether the user just went offline (presence 1 -> 0). Safe to call
  /// twice; the second call is a no-op returning `None`.
  pub fn unregister(&self, session_id: SessionId) -> Option<(Arc<Session>, bool)> {
    let (_, session) = self.sessions.remove(&session_id)?;
    let user_id = session.user.id;

    for room in session.rooms() {
      self.remove_from_room_index(session_id, &room);
    }
    session.rooms.write().unwrap().clear();

    let went_offline = {
      match self.presence.get_mut(&user_id) {
        Some(mut count) => {
          *count = count.saturating_sub(1);
          *count == 0
        }
        None => false,
      }
    };
    if went_offline {
      self.presence.remove_if(&user_id, |_, count| *count == 0);
    }

    info!(%session_id, %user_id, went_offline, "session unregistered");
    Some((session, went_offline))
  }

  pub fn join_room(&self, session: &Session, room: &str) {
    session.rooms.write().unwrap().insert(room.to_string());
    self
      .rooms
      .entry(room.to_string())
      .or_default()
      .insert(session.id);
    debug!(session_id = %session.id, room, "joined room");
  }

  pub fn leave_room(&self, session: &Session, room: &str) {
    session.rooms.write().unwrap().remove(room);
    self.remove_from_room_index(session.id, room);
    debug!(session_id = %session.id, room, "left room");
  }

  fn remove_from_room_index(&self, session_id: SessionId, room: &str) {
    if let Some(mut members) = self.rooms.get_mut(room) {
      members.remove(&session_id);
    }
    self.rooms.remove_if(room, |_, members| members.is_empty());
  }

  pub fn get(&self, session_id: SessionId) -> Option<Arc<Session>> {
    self.sessions.get(&session_id).map(|s| s.clone())
  }

  pub fn sessions_in_room(&self, room: &str) -> Vec<Arc<Session>> {
    let Some(members) = self.rooms.get(room) else {
      return Vec::new();
    };
    members
      .iter()
      .filter_map(|id| self.sessions.get(id).map(|s| s.clone()))
      .collect()
  }

  /// Emit an event to every session in a room. Dead sockets are skipped.
  pub fn broadcast_to_room(&self, room: &str, event: &ServerEvent) -> usize {
    let mut sent = 0;
    for session in self.sessions_in_room(room) {
      if session.send(event.clone()) {
        sent += 1;
      }
    }
    sent
  }

  /// Emit to the union of several rooms, once per session even when it is
  /// in more than one of them.
  pub fn broadcast_to_rooms(&self, rooms: &[String], event: &ServerEvent) -> usize {
    let mut seen: HashSet<SessionId> = HashSet::new();
    let mut sent = 0;
    for room in rooms {
      for session in self.sessions_in_room(room) {
        if seen.insert(session.id) && session.send(event.clone()) {
          sent += 1;
        }
      }
    }
    sent
  }

  /// Emit to every session except those belonging to `user_id`; used for
  /// the presence broadcasts, which a user does not receive about itself.
  pub fn broadcast_except_user(&self, user_id: UserId, event: &ServerEvent) -> usize {
    let mut sent = 0;
    for entry in self.sessions.iter() {
      let session = entry.value();
      if session.user.id != user_id && session.send(event.clone()) {
        sent += 1;
      }
    }
    sent
  }

  pub fn is_online(&self, user_id: UserId) -> bool {
    self.presence.get(&user_id).map(|c| *c > 0).unwrap_or(false)
  }

  pub fn session_count(&self) -> usize {
    self.sessions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.is_empty()
  }

  pub fn all_sessions(&self) -> Vec<Arc<Session>> {
    self.sessions.iter().map(|e| e.value().clone()).collect()
  }

  /// Sessions that should be scavenged: socket already closed, or idle past
  /// the threshold.
  pub fn stale_sessions(&self, idle_threshold: Duration) -> Vec<Arc<Session>> {
    self
      .sessions
      .iter()
      .map(|e| e.value().clone())
      .filter(|s| s.is_closed() || s.idle_for() >= idle_threshold)
      .collect()
  }
}
