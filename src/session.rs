//! Session registry (C4): opaque session ids, per-session outbound
//! message queues, activity tracking, and idle reaping.
//!
//! Grounded on the teacher's `services/game/store.rs` `Games` service: a
//! `parking_lot::RwLock`-guarded index of ids to `Arc<RwLock<T>>` entries,
//! with mutations taking the per-entity lock and enumerations taking the
//! index lock only long enough to snapshot (spec.md §5 "Shared-resource
//! policy").

use crate::room::RoomId;
use base64::{engine::general_purpose::STANDARD, Engine};
use hashbrown::HashMap;
use log::warn;
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Maximum number of queued outbound frames per session before the oldest
/// enqueue starts dropping the newest frame (spec.md §4.4 "Queue
/// discipline").
pub const MAX_QUEUE_LEN: usize = 1024;

pub type SessionId = String;
pub type SessionRef = Arc<RwLock<Session>>;

/// A single logical SFS2X connection, whether backed by BlueBox or a
/// direct TCP socket.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub client_ip: String,
    /// Peer port, meaningful for direct-TCP sessions (spec.md §3
    /// "CombinedID"); BlueBox sessions leave this at 0 since an HTTP
    /// client's ephemeral port carries no identity.
    pub client_port: i32,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub player: Option<crate::identity::PlayerId>,
    pub room: Option<RoomId>,
    queue: VecDeque<String>,
}

impl Session {
    fn new(id: SessionId, client_ip: String, now: Instant) -> Self {
        Self {
            id,
            client_ip,
            client_port: 0,
            created_at: now,
            last_activity: now,
            player: None,
            room: None,
            queue: VecDeque::new(),
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Service for storing and operating on all currently live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionRef>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new session bound to `client_ip`, retrying id generation
    /// on the (astronomically unlikely) chance of a collision with a live
    /// session (spec.md §4.4 "ID generation").
    pub fn create(&self, client_ip: impl Into<String>) -> SessionRef {
        let client_ip = client_ip.into();
        let now = Instant::now();

        let mut sessions = self.sessions.write();
        loop {
            let id = generate_session_id();
            if sessions.contains_key(&id) {
                continue;
            }
            let session = Arc::new(RwLock::new(Session::new(id.clone(), client_ip, now)));
            sessions.insert(id, session.clone());
            return session;
        }
    }

    pub fn get(&self, id: &str) -> Option<SessionRef> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Refreshes a session's last-activity timestamp. Returns `false` if
    /// the session is no longer live.
    pub fn touch(&self, id: &str) -> bool {
        match self.get(id) {
            Some(session) => {
                session.write().touch(Instant::now());
                true
            }
            None => false,
        }
    }

    pub fn bind_player(&self, id: &str, player: crate::identity::PlayerId) -> bool {
        match self.get(id) {
            Some(session) => {
                session.write().player = Some(player);
                true
            }
            None => false,
        }
    }

    /// Snapshots every currently live session bound to `room`. Used by the
    /// message processor to fan room events out to the right queues
    /// without the room registry needing to know about sessions at all
    /// (spec.md §4.6 "Fan-out").
    pub fn sessions_in_room(&self, room: RoomId) -> Vec<SessionRef> {
        self.sessions
            .read()
            .values()
            .filter(|session| session.read().room == Some(room))
            .cloned()
            .collect()
    }

    pub fn bind_room(&self, id: &str, room: RoomId) -> bool {
        match self.get(id) {
            Some(session) => {
                session.write().room = Some(room);
                true
            }
            None => false,
        }
    }

    /// Appends a base64-encoded frame to a session's outbound queue. Drops
    /// the newest frame and logs when the queue is already at
    /// [`MAX_QUEUE_LEN`] (spec.md §4.4/§7 "QueueFull").
    pub fn enqueue(&self, id: &str, frame_b64: impl Into<String>) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };
        let mut session = session.write();
        if session.queue.len() >= MAX_QUEUE_LEN {
            warn!("session {} outbound queue full, dropping newest frame", id);
            return false;
        }
        session.queue.push_back(frame_b64.into());
        true
    }

    /// Non-blocking FIFO pop of the oldest queued frame, if any.
    pub fn poll(&self, id: &str) -> Option<String> {
        let session = self.get(id)?;
        session.write().queue.pop_front()
    }

    /// Removes a session from the registry entirely. Returns `false` if it
    /// was already gone.
    pub fn disconnect(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Removes every session idle longer than `idle_cutoff`, returning the
    /// count reaped (spec.md §4.4 "Reaping").
    pub fn reap(&self, idle_cutoff: Duration) -> Vec<SessionRef> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| session.read().idle_for(now) >= idle_cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect()
    }
}

/// 64 random bits rendered as uppercase hex, prefixed `SESS_`
/// (spec.md §4.4). Matches `/^SESS_[0-9A-F]{16}$/` (spec.md §8).
fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut id = String::with_capacity(22);
    id.push_str("SESS_");
    for byte in bytes {
        id.push_str(&format!("{:02X}", byte));
    }
    id
}

/// Base64-encodes a raw frame for queueing/transport over BlueBox
/// (spec.md §4.1 "BlueBox framing").
pub fn encode_frame_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_frame_b64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn session_id_matches_expected_shape() {
        let id = generate_session_id();
        assert!(id.starts_with("SESS_"));
        assert_eq!(id.len(), 5 + 16);
        assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn create_and_get_roundtrip() {
        let registry = SessionRegistry::new();
        let session = registry.create("127.0.0.1");
        let id = session.read().id.clone();

        let fetched = registry.get(&id).expect("session should exist");
        assert_eq!(fetched.read().client_ip, "127.0.0.1");
    }

    #[test]
    fn queue_is_strict_fifo() {
        let registry = SessionRegistry::new();
        let session = registry.create("127.0.0.1");
        let id = session.read().id.clone();

        registry.enqueue(&id, "f1");
        registry.enqueue(&id, "f2");
        registry.enqueue(&id, "f3");

        assert_eq!(registry.poll(&id), Some("f1".to_string()));
        assert_eq!(registry.poll(&id), Some("f2".to_string()));
        assert_eq!(registry.poll(&id), Some("f3".to_string()));
        assert_eq!(registry.poll(&id), None);
    }

    #[test]
    fn poll_on_empty_queue_is_none() {
        let registry = SessionRegistry::new();
        let session = registry.create("127.0.0.1");
        let id = session.read().id.clone();
        assert_eq!(registry.poll(&id), None);
    }

    #[test]
    fn enqueue_overflow_drops_newest() {
        let registry = SessionRegistry::new();
        let session = registry.create("127.0.0.1");
        let id = session.read().id.clone();

        for i in 0..MAX_QUEUE_LEN {
            assert!(registry.enqueue(&id, format!("f{i}")));
        }
        // Queue is now full; the next enqueue is dropped.
        assert!(!registry.enqueue(&id, "overflow"));
        assert_eq!(registry.poll(&id), Some("f0".to_string()));
    }

    #[test]
    fn disconnect_removes_session() {
        let registry = SessionRegistry::new();
        let session = registry.create("127.0.0.1");
        let id = session.read().id.clone();

        assert!(registry.disconnect(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.disconnect(&id));
    }

    #[test]
    fn sessions_in_room_filters_by_bound_room() {
        let registry = SessionRegistry::new();
        let a = registry.create("10.0.0.1");
        let a_id = a.read().id.clone();
        drop(a);
        let b = registry.create("10.0.0.2");
        let b_id = b.read().id.clone();
        drop(b);

        registry.bind_room(&a_id, 7);

        let members = registry.sessions_in_room(7);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].read().id, a_id);
        assert!(registry.sessions_in_room(99).is_empty());
        let _ = b_id;
    }

    #[test]
    fn reap_removes_idle_sessions_only() {
        let registry = SessionRegistry::new();
        let stale = registry.create("10.0.0.1");
        let stale_id = stale.read().id.clone();
        drop(stale);

        sleep(Duration::from_millis(20));

        let fresh = registry.create("10.0.0.2");
        let fresh_id = fresh.read().id.clone();
        drop(fresh);

        let reaped = registry.reap(Duration::from_millis(10));
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].read().id, stale_id);
        assert!(registry.get(&stale_id).is_none());
        assert!(registry.get(&fresh_id).is_some());
    }
}
