//! Room registry (C5): room creation, membership, ready/start
//! negotiation, ownership transfer, and timed reaping.
//!
//! Grounded on the teacher's `services/game/store.rs` `Games`/`Game`
//! split: a `RwLock`-guarded index of room ids to `Arc<RwLock<Room>>`
//! entries. Mutations take a room's own lock; enumerations take the index
//! read-lock only long enough to clone the set of refs they need
//! (spec.md §5).

use crate::error::RoomError;
use crate::identity::{CombinedId, PlayerId};
use crate::settings::LobbySettings;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type RoomId = i32;
pub type RoomRef = Arc<RwLock<Room>>;

/// Minimum and maximum allowed `maxPlayers` (spec.md §3 "Room").
pub const MIN_PLAYERS: u32 = 2;
pub const MAX_PLAYERS: u32 = 10;

pub const DEFAULT_GROUP: &str = "lobbies";

/// Per-member state tracked alongside a room's membership.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: CombinedId,
    pub ready: bool,
    pub join_time: Instant,
}

/// Event emitted by a mutating room operation, to be fanned out by the
/// caller (the message processor, C6) to the relevant session(s)
/// (spec.md §4.6 "Fan-out").
#[derive(Debug, Clone)]
pub enum RoomEvent {
    UserJoined { room: RoomId, member: CombinedId },
    UserLeft { room: RoomId, member: CombinedId },
    UserVariableUpdate { room: RoomId, member: CombinedId, ready: bool },
    RoomVariablesUpdate { room: RoomId, settings: LobbySettings },
    OwnerChanged { room: RoomId, new_owner: PlayerId },
    GameStarted { room: RoomId, owner: CombinedId },
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub group: String,
    pub owner: PlayerId,
    pub password: String,
    pub settings: LobbySettings,
    pub max_players: u32,
    pub members: Vec<Member>,
    pub created_at: Instant,
    /// Wall-clock creation time, carried only for external diagnostics
    /// display — reap/idle decisions use `created_at`'s monotonic
    /// `Instant`, never this.
    pub created_at_wall: DateTime<Utc>,
    pub last_activity: Instant,
    pub game_started: bool,
}

/// Read-only snapshot of a room's state, safe to hand to callers outside
/// the registry (spec.md §3 "Ownership": "external callers read immutable
/// snapshots").
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub group: String,
    pub owner: PlayerId,
    pub has_password: bool,
    pub settings: LobbySettings,
    pub max_players: u32,
    pub members: Vec<Member>,
    pub game_started: bool,
    pub created_at: DateTime<Utc>,
}

fn snapshot_of(room: &Room) -> RoomSnapshot {
    RoomSnapshot {
        id: room.id,
        group: room.group.clone(),
        owner: room.owner.clone(),
        has_password: !room.password.is_empty(),
        settings: room.settings.clone(),
        max_players: room.max_players,
        members: room.members.clone(),
        game_started: room.game_started,
        created_at: room.created_at_wall,
    }
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, RoomRef>>,
    next_id: AtomicI32,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_id: AtomicI32::new(1),
        }
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self) -> RoomId {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    /// Creates a new room owned by `owner`, inserting the owner as the
    /// first (not-ready) member (spec.md §4.5 `create`).
    pub fn create(
        &self,
        settings: LobbySettings,
        max_players: u32,
        owner: PlayerId,
        owner_endpoint: CombinedId,
        password: String,
    ) -> Result<RoomRef, RoomError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
            return Err(RoomError::RoomFull);
        }

        if self.get_by_owner(&owner).is_some() {
            return Err(RoomError::AlreadyOwnsRoom);
        }

        let now = Instant::now();
        let id = self.alloc_id();
        let room = Room {
            id,
            group: DEFAULT_GROUP.to_string(),
            owner,
            password,
            settings,
            max_players,
            members: vec![Member {
                id: owner_endpoint,
                ready: false,
                join_time: now,
            }],
            created_at: now,
            created_at_wall: Utc::now(),
            last_activity: now,
            game_started: false,
        };
        let room = Arc::new(RwLock::new(room));
        self.rooms.write().insert(id, room.clone());
        Ok(room)
    }

    pub fn get(&self, id: RoomId) -> Option<RoomRef> {
        self.rooms.read().get(&id).cloned()
    }

    pub fn get_snapshot(&self, id: RoomId) -> Option<RoomSnapshot> {
        self.get(id).map(|room| snapshot_of(&room.read()))
    }

    pub fn list_group(&self, group: &str) -> Vec<RoomSnapshot> {
        self.rooms
            .read()
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|room| room.read().clone())
            .filter(|room| room.group == group)
            .map(|room| snapshot_of(&room))
            .collect()
    }

    pub fn count_group(&self, group: &str) -> usize {
        self.rooms
            .read()
            .values()
            .filter(|room| room.read().group == group)
            .count()
    }

    /// All non-started, non-full rooms in `group` (spec.md §4.5
    /// `findJoinable`: password filtering happens at join-time, not here).
    pub fn find_joinable(&self, group: &str, limit: usize) -> Vec<RoomSnapshot> {
        let refs = self.refs_in_group(group);
        refs.into_iter()
            .map(|room| room.read().clone())
            .filter(|room| !room.game_started)
            .filter(|room| (room.members.len() as u32) < room.max_players)
            .take(limit)
            .map(|room| snapshot_of(&room))
            .collect()
    }

    pub fn get_by_owner(&self, owner: &PlayerId) -> Option<RoomSnapshot> {
        self.rooms
            .read()
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|room| room.read().clone())
            .find(|room| &room.owner == owner && !room.game_started)
            .map(|room| snapshot_of(&room))
    }

    /// Adds `user` as a member of room `id`. Fails if the room is absent,
    /// already started, full, or the password doesn't match
    /// (spec.md §4.5 `join`).
    pub fn join(&self, id: RoomId, user: CombinedId, password: &str) -> Result<RoomEvent, RoomError> {
        let room_ref = self.get(id).ok_or(RoomError::RoomNotFound)?;
        let mut room = room_ref.write();

        if room.game_started {
            return Err(RoomError::RoomFull);
        }
        if !room.password.is_empty() && room.password != password {
            return Err(RoomError::RoomPasswordMismatch);
        }
        if room.members.len() as u32 >= room.max_players {
            return Err(RoomError::RoomFull);
        }

        room.members.push(Member {
            id: user.clone(),
            ready: false,
            join_time: Instant::now(),
        });
        room.last_activity = Instant::now();

        Ok(RoomEvent::UserJoined { room: id, member: user })
    }

    /// Removes `user` from room `id`. If the owner leaves a non-empty
    /// room, ownership transfers to the earliest-joined remaining member;
    /// if membership becomes empty, the room is removed entirely
    /// (spec.md §4.5 `leave`).
    pub fn leave(&self, id: RoomId, user: &CombinedId) -> Result<Option<RoomEvent>, RoomError> {
        let room_ref = self.get(id).ok_or(RoomError::RoomNotFound)?;
        let mut owner_changed = None;
        let should_remove;
        {
            let mut room = room_ref.write();
            let before = room.members.len();
            room.members.retain(|m| &m.id != user);
            if room.members.len() == before {
                return Err(RoomError::RoomNotFound);
            }
            room.last_activity = Instant::now();

            if room.owner == user.player && !room.members.is_empty() {
                // Earliest join-time wins (members is already insertion-ordered).
                let new_owner = room.members[0].id.player.clone();
                room.owner = new_owner.clone();
                owner_changed = Some(new_owner);
            }
            should_remove = room.members.is_empty();
        }

        if should_remove {
            self.rooms.write().remove(&id);
            return Ok(Some(RoomEvent::UserLeft { room: id, member: user.clone() }));
        }

        if let Some(new_owner) = owner_changed {
            return Ok(Some(RoomEvent::OwnerChanged { room: id, new_owner }));
        }

        Ok(Some(RoomEvent::UserLeft { room: id, member: user.clone() }))
    }

    /// Sets a member's ready flag (spec.md §4.5 `setReady`).
    pub fn set_ready(&self, id: RoomId, user: &CombinedId, flag: bool) -> Result<RoomEvent, RoomError> {
        let room_ref = self.get(id).ok_or(RoomError::RoomNotFound)?;
        let mut room = room_ref.write();
        let member = room
            .members
            .iter_mut()
            .find(|m| &m.id == user)
            .ok_or(RoomError::RoomNotFound)?;
        member.ready = flag;
        room.last_activity = Instant::now();
        Ok(RoomEvent::UserVariableUpdate { room: id, member: user.clone(), ready: flag })
    }

    /// Replaces a room's settings. Only the owner may do this, and
    /// `new_max_players` may not drop below current membership
    /// (spec.md §4.5 `updateSettings`).
    pub fn update_settings(
        &self,
        id: RoomId,
        new_settings: LobbySettings,
        new_max_players: u32,
        requester: &PlayerId,
    ) -> Result<RoomEvent, RoomError> {
        let room_ref = self.get(id).ok_or(RoomError::RoomNotFound)?;
        let mut room = room_ref.write();
        if &room.owner != requester {
            return Err(RoomError::NotOwner);
        }
        if (new_max_players as usize) < room.members.len() {
            return Err(RoomError::RoomFull);
        }
        room.settings = new_settings.clone();
        room.max_players = new_max_players;
        room.last_activity = Instant::now();

        Ok(RoomEvent::RoomVariablesUpdate { room: id, settings: new_settings })
    }

    /// Starts the game. Requires the requester to be the owner, at least
    /// [`MIN_PLAYERS`] members, every non-owner member ready, and the game
    /// not already started (spec.md §4.5 `startGame`, §8 scenario 6).
    pub fn start_game(&self, id: RoomId, requester: &PlayerId) -> Result<RoomEvent, RoomError> {
        let room_ref = self.get(id).ok_or(RoomError::RoomNotFound)?;
        let mut room = room_ref.write();

        if room.game_started {
            return Err(RoomError::NotOwner);
        }
        if &room.owner != requester {
            return Err(RoomError::NotOwner);
        }
        if room.members.len() < MIN_PLAYERS as usize {
            return Err(RoomError::NotReady);
        }
        let owner_id = room.owner.clone();
        let all_ready = room
            .members
            .iter()
            .all(|m| m.id.player == owner_id || m.ready);
        if !all_ready {
            return Err(RoomError::NotReady);
        }

        room.game_started = true;
        room.last_activity = Instant::now();
        let owner_member = room
            .members
            .iter()
            .find(|m| m.id.player == owner_id)
            .expect("owner is always a member")
            .id
            .clone();

        Ok(RoomEvent::GameStarted { room: id, owner: owner_member })
    }

    pub fn remove_room(&self, id: RoomId) {
        self.rooms.write().remove(&id);
    }

    /// Removes rooms idle longer than `idle_cutoff` (spec.md §4.5 `reap`).
    pub fn reap(&self, idle_cutoff: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<RoomId> = {
            let rooms = self.rooms.read();
            rooms
                .iter()
                .filter(|(_, room)| now.saturating_duration_since(room.read().last_activity) >= idle_cutoff)
                .map(|(id, _)| *id)
                .collect()
        };
        let count = expired.len();
        let mut rooms = self.rooms.write();
        for id in expired {
            rooms.remove(&id);
        }
        count
    }

    fn refs_in_group(&self, group: &str) -> Vec<RoomRef> {
        self.rooms
            .read()
            .values()
            .filter(|room| room.read().group == group)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identity::{PlayerId, Storefront};

    fn player(id: &str) -> PlayerId {
        PlayerId::new(Storefront::None, id, id)
    }

    fn endpoint(id: &str, port: i32) -> CombinedId {
        CombinedId::new(player(id), "127.0.0.1", port)
    }

    #[test]
    fn create_inserts_owner_as_member() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();
        assert_eq!(room.read().members.len(), 1);
        assert_eq!(room.read().owner, player("A"));
    }

    #[test]
    fn create_rejects_second_non_started_room_for_same_owner() {
        let registry = RoomRegistry::new();
        registry
            .create(
                LobbySettings::defaults("First Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();

        let err = registry
            .create(
                LobbySettings::defaults("Second Lobby"),
                4,
                player("A"),
                endpoint("A", 2),
                String::new(),
            )
            .unwrap_err();
        assert!(matches!(err, RoomError::AlreadyOwnsRoom));
        assert_eq!(registry.count_group(DEFAULT_GROUP), 1);
    }

    #[test]
    fn owner_transfer_on_leave() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();
        let id = room.read().id;

        registry.join(id, endpoint("B", 2), "").unwrap();
        registry.leave(id, &endpoint("A", 1)).unwrap();

        let snap = registry.get_snapshot(id).unwrap();
        assert_eq!(snap.owner, player("B"));
        assert_eq!(snap.members.len(), 1);
    }

    #[test]
    fn room_removed_when_last_member_leaves() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();
        let id = room.read().id;

        registry.leave(id, &endpoint("A", 1)).unwrap();
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn start_rejected_when_non_owner_not_ready() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();
        let id = room.read().id;
        registry.join(id, endpoint("B", 2), "").unwrap();

        let err = registry.start_game(id, &player("A")).unwrap_err();
        assert_eq!(err, RoomError::NotReady);

        registry.set_ready(id, &endpoint("B", 2), true).unwrap();
        assert!(registry.start_game(id, &player("A")).is_ok());
    }

    #[test]
    fn start_does_not_require_owner_ready() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();
        let id = room.read().id;
        registry.join(id, endpoint("B", 2), "").unwrap();
        registry.set_ready(id, &endpoint("B", 2), true).unwrap();

        // Owner A never sets ready, but start still succeeds.
        assert!(registry.start_game(id, &player("A")).is_ok());
    }

    #[test]
    fn join_rejects_full_room() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                2,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();
        let id = room.read().id;

        registry.join(id, endpoint("B", 2), "").unwrap();
        let err = registry.join(id, endpoint("C", 3), "").unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
    }

    #[test]
    fn join_rejects_password_mismatch() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                "secret".to_string(),
            )
            .unwrap();
        let id = room.read().id;

        let err = registry.join(id, endpoint("B", 2), "wrong").unwrap_err();
        assert_eq!(err, RoomError::RoomPasswordMismatch);
        assert!(registry.join(id, endpoint("C", 3), "secret").is_ok());
    }

    #[test]
    fn update_settings_requires_owner() {
        let registry = RoomRegistry::new();
        let room = registry
            .create(
                LobbySettings::defaults("Test Lobby"),
                4,
                player("A"),
                endpoint("A", 1),
                String::new(),
            )
            .unwrap();
        let id = room.read().id;

        let err = registry
            .update_settings(id, LobbySettings::defaults("Renamed"), 4, &player("B"))
            .unwrap_err();
        assert_eq!(err, RoomError::NotOwner);
    }
}
