//! Message processor (C6): maps inbound decoded requests to state-machine
//! transitions across the session (C4) and room (C5) registries, and
//! synthesizes the encoded response/event frames that result.
//!
//! Dispatch is on the `(controller, action)` pair the way the teacher's
//! `session/router.rs` dispatches on `(component, command)`; SFS2X's
//! numeric codes aren't enumerated in the distilled spec (spec.md §9 Open
//! Question), so [`controller`]/[`action`] pin a table here that must be
//! re-checked against the exact 1.7.x client library before shipping
//! against a real client.

use crate::codec::{SfsMessage, SfsObject, TypedValue};
use crate::error::{GatewayError, RoomError, WIRE_ERROR_INVALID_DATA};
use crate::identity::{CombinedId, PlayerId, Storefront};
use crate::room::{RoomEvent, RoomRegistry};
use crate::session::{SessionId, SessionRegistry};
use crate::settings::LobbySettings;
use log::{debug, warn};

/// Controller ids (spec.md §4 "Framing": `"c"` key).
pub mod controller {
    pub const SYSTEM: i32 = 0;
    pub const EXTENSION: i32 = 1;
}

/// System-controller action ids. Pinned against the community-documented
/// SFS2X 1.7.x `SystemController` action table (see DESIGN.md's Open
/// Question note).
pub mod action {
    pub const HANDSHAKE: i16 = 0;
    pub const LOGIN: i16 = 1;
    pub const LOGOUT: i16 = 2;
    pub const PING: i16 = 3;
    pub const JOIN_ROOM: i16 = 4;
    pub const CREATE_ROOM: i16 = 5;
    pub const LEAVE_ROOM: i16 = 6;
    pub const SET_ROOM_VARIABLES: i16 = 7;
    pub const SET_USER_VARIABLES: i16 = 8;
    pub const START_GAME: i16 = 9;

    // Event ids used on frames the server emits (not dispatched on receipt).
    pub const USER_JOIN_ROOM: i16 = 20;
    pub const USER_LEAVE_ROOM: i16 = 21;
    pub const USER_VARIABLES_UPDATE: i16 = 22;
    pub const ROOM_VARIABLES_UPDATE: i16 = 23;
    pub const OWNERSHIP_CHANGE: i16 = 24;
    pub const GAME_START: i16 = 25;
}

/// An outbound frame and where it should be delivered.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Addressed to the session that sent the originating request.
    ToSender(Vec<u8>),
    /// Fanned out independently to every current member of a room
    /// (spec.md §4.6 "Fan-out": "N independent enqueue operations").
    ToRoomMembers { room: crate::room::RoomId, frame: Vec<u8> },
}

/// Shared handle to the two registries a processor dispatches against.
pub struct Processor<'a> {
    pub sessions: &'a SessionRegistry,
    pub rooms: &'a RoomRegistry,
}

impl<'a> Processor<'a> {
    pub fn new(sessions: &'a SessionRegistry, rooms: &'a RoomRegistry) -> Self {
        Self { sessions, rooms }
    }

    /// Handles one decoded message from `session_id`. Errors never escape
    /// this call: they are translated into an error-response frame
    /// addressed back to the sender (spec.md §7 "never escapes a request
    /// handler"). Every produced frame is pushed through the session
    /// registry's outbound queues rather than handed back to the caller —
    /// both transports drain those queues uniformly, the direct-TCP writer
    /// included (spec.md §8 "Fan-out through queues vs. direct sockets").
    /// The returned list mirrors what was enqueued, for callers that want
    /// to observe the outcome.
    pub fn handle(&self, session_id: &SessionId, message: SfsMessage) -> Vec<Outbound> {
        self.sessions.touch(session_id);

        if message.controller != controller::SYSTEM || message.action != action::PING {
            debug!("{session_id} -> {:?}", MessageDebug { message: &message });
        }

        let result = match message.controller {
            controller::SYSTEM => self.handle_system(session_id, &message),
            controller::EXTENSION => self.handle_extension(session_id, &message),
            other => {
                warn!("unknown controller id {other}");
                Err(GatewayError::Room(RoomError::RoomNotFound))
            }
        };

        let outbound = match result {
            Ok(outbound) => outbound,
            Err(err) => vec![Outbound::ToSender(encode_error_response(&err))],
        };

        for item in &outbound {
            match item {
                Outbound::ToSender(frame) => {
                    self.sessions.enqueue(session_id, crate::session::encode_frame_b64(frame));
                }
                Outbound::ToRoomMembers { room, frame } => {
                    let encoded = crate::session::encode_frame_b64(frame);
                    for member in self.sessions.sessions_in_room(*room) {
                        let id = member.read().id.clone();
                        self.sessions.enqueue(&id, encoded.clone());
                    }
                }
            }
        }

        outbound
    }

    fn handle_system(&self, session_id: &SessionId, message: &SfsMessage) -> Result<Vec<Outbound>, GatewayError> {
        match message.action {
            action::HANDSHAKE => Ok(vec![self.handshake(session_id)]),
            action::LOGIN => self.login(session_id, message),
            action::LOGOUT => self.logout(session_id),
            action::PING => Ok(vec![self.pong(session_id)]),
            action::CREATE_ROOM => self.create_room(session_id, message),
            action::JOIN_ROOM => self.join_room(session_id, message),
            action::LEAVE_ROOM => self.leave_room(session_id),
            action::SET_USER_VARIABLES => self.set_ready(session_id, message),
            action::SET_ROOM_VARIABLES => self.update_room_settings(session_id, message),
            action::START_GAME => self.start_game(session_id),
            other => {
                debug!("unhandled system action {other}");
                Ok(vec![])
            }
        }
    }

    fn handle_extension(&self, _session_id: &SessionId, message: &SfsMessage) -> Result<Vec<Outbound>, GatewayError> {
        // Extension commands are game-specific and identified by a `cmd`
        // string inside `p` (spec.md §4.6). No extension commands are
        // defined by this core; unrecognized ones are logged and ignored.
        if let Some(cmd) = message.params.get("cmd").and_then(|v| v.as_str().ok()) {
            debug!("unhandled extension command {cmd}");
        }
        Ok(vec![])
    }

    /// On first `HandshakeRequest`: the session token mirrors the session
    /// id, and compression/encryption thresholds are both disabled
    /// (spec.md §4.6 "Handshake sequence").
    fn handshake(&self, session_id: &SessionId) -> Outbound {
        let mut params = SfsObject::new();
        params.insert("token", TypedValue::Utf(session_id.clone()));
        params.insert("compThreshold", TypedValue::Int(i32::MAX));
        params.insert("encThreshold", TypedValue::Int(i32::MAX));
        params.insert("serverTime", TypedValue::Long(server_time_millis()));

        let response = SfsMessage::new(controller::SYSTEM, action::HANDSHAKE, params);
        Outbound::ToSender(response.encode().to_vec())
    }

    /// Accepts any non-empty username, binding a synthesized [`PlayerId`]
    /// to the session (spec.md §4.6 "Handshake sequence").
    fn login(&self, session_id: &SessionId, message: &SfsMessage) -> Result<Vec<Outbound>, GatewayError> {
        let username = message
            .params
            .get("name")
            .and_then(|v| v.as_str().ok())
            .unwrap_or_default();
        if username.is_empty() {
            return Err(GatewayError::SchemaMismatch(crate::error::SettingsError::WrongLength(0)));
        }

        let player = PlayerId::new(Storefront::None, session_id.clone(), username.to_string());
        self.sessions.bind_player(session_id, player.clone());

        let mut user_object = SfsObject::new();
        user_object.insert("id", TypedValue::Utf(player.canonical()));
        user_object.insert("name", TypedValue::Utf(player.display_name.clone()));

        let mut params = SfsObject::new();
        params.insert("user", TypedValue::SfsObject(user_object));

        let response = SfsMessage::new(controller::SYSTEM, action::LOGIN, params);
        Ok(vec![Outbound::ToSender(response.encode().to_vec())])
    }

    fn logout(&self, session_id: &SessionId) -> Result<Vec<Outbound>, GatewayError> {
        self.sessions.disconnect(session_id);
        Ok(vec![])
    }

    fn pong(&self, _session_id: &SessionId) -> Outbound {
        let response = SfsMessage::new(controller::SYSTEM, action::PING, SfsObject::new());
        Outbound::ToSender(response.encode().to_vec())
    }

    fn current_player(&self, session_id: &SessionId) -> Result<PlayerId, GatewayError> {
        let session = self.sessions.get(session_id).ok_or(GatewayError::UnknownSession)?;
        session.read().player.clone().ok_or(GatewayError::UnknownSession)
    }

    fn current_endpoint(&self, session_id: &SessionId, player: PlayerId) -> Result<CombinedId, GatewayError> {
        let session = self.sessions.get(session_id).ok_or(GatewayError::UnknownSession)?;
        let (ip, port) = {
            let session = session.read();
            (session.client_ip.clone(), session.client_port)
        };
        Ok(CombinedId::new(player, ip, port))
    }

    fn create_room(&self, session_id: &SessionId, message: &SfsMessage) -> Result<Vec<Outbound>, GatewayError> {
        let player = self.current_player(session_id)?;
        let endpoint = self.current_endpoint(session_id, player.clone())?;

        let settings_value = message.params.get("settings").ok_or(GatewayError::Room(RoomError::RoomNotFound))?;
        let settings = LobbySettings::from_tuple(settings_value)?;
        let max_players = message
            .params
            .get("maxPlayers")
            .and_then(|v| v.as_int().ok())
            .unwrap_or(crate::room::MIN_PLAYERS as i32) as u32;
        let password = message
            .params
            .get("password")
            .and_then(|v| v.as_str().ok())
            .unwrap_or_default()
            .to_string();

        let room = self.rooms.create(settings, max_players, player, endpoint, password)?;
        let room_id = room.read().id;
        self.sessions.bind_room(session_id, room_id);

        let mut params = SfsObject::new();
        params.insert("roomId", TypedValue::Int(room_id));
        let response = SfsMessage::new(controller::SYSTEM, action::CREATE_ROOM, params).with_room(room_id);
        Ok(vec![Outbound::ToSender(response.encode().to_vec())])
    }

    fn join_room(&self, session_id: &SessionId, message: &SfsMessage) -> Result<Vec<Outbound>, GatewayError> {
        let player = self.current_player(session_id)?;
        let endpoint = self.current_endpoint(session_id, player)?;
        let room_id = message.room.ok_or(GatewayError::Room(RoomError::RoomNotFound))?;
        let password = message
            .params
            .get("password")
            .and_then(|v| v.as_str().ok())
            .unwrap_or_default();

        let event = self.rooms.join(room_id, endpoint, password)?;
        self.sessions.bind_room(session_id, room_id);

        let mut outbound = vec![Outbound::ToSender(ack(room_id, action::JOIN_ROOM).encode().to_vec())];
        outbound.extend(self.fan_out(event));
        Ok(outbound)
    }

    fn leave_room(&self, session_id: &SessionId) -> Result<Vec<Outbound>, GatewayError> {
        let player = self.current_player(session_id)?;
        let room_id = {
            let session = self.sessions.get(session_id).ok_or(GatewayError::UnknownSession)?;
            session.read().room.ok_or(GatewayError::Room(RoomError::RoomNotFound))?
        };
        let endpoint = self.current_endpoint(session_id, player)?;

        let mut outbound = vec![];
        if let Some(event) = self.rooms.leave(room_id, &endpoint)? {
            outbound.extend(self.fan_out(event));
        }
        Ok(outbound)
    }

    fn set_ready(&self, session_id: &SessionId, message: &SfsMessage) -> Result<Vec<Outbound>, GatewayError> {
        let player = self.current_player(session_id)?;
        let room_id = message.room.ok_or(GatewayError::Room(RoomError::RoomNotFound))?;
        let endpoint = self.current_endpoint(session_id, player)?;
        let flag = message
            .params
            .get("ready")
            .and_then(|v| v.as_bool().ok())
            .unwrap_or(false);

        let event = self.rooms.set_ready(room_id, &endpoint, flag)?;
        Ok(self.fan_out(event))
    }

    fn update_room_settings(&self, session_id: &SessionId, message: &SfsMessage) -> Result<Vec<Outbound>, GatewayError> {
        let player = self.current_player(session_id)?;
        let room_id = message.room.ok_or(GatewayError::Room(RoomError::RoomNotFound))?;
        let settings_value = message.params.get("settings").ok_or(GatewayError::Room(RoomError::RoomNotFound))?;
        let settings = LobbySettings::from_tuple(settings_value)?;
        let max_players = message
            .params
            .get("maxPlayers")
            .and_then(|v| v.as_int().ok())
            .unwrap_or(crate::room::MAX_PLAYERS as i32) as u32;

        let event = self.rooms.update_settings(room_id, settings, max_players, &player)?;
        Ok(self.fan_out(event))
    }

    fn start_game(&self, session_id: &SessionId) -> Result<Vec<Outbound>, GatewayError> {
        let player = self.current_player(session_id)?;
        let room_id = {
            let session = self.sessions.get(session_id).ok_or(GatewayError::UnknownSession)?;
            session.read().room.ok_or(GatewayError::Room(RoomError::RoomNotFound))?
        };

        let event = self.rooms.start_game(room_id, &player)?;
        Ok(self.fan_out(event))
    }

    /// Encodes a [`RoomEvent`] as the appropriate wire frame and fans it
    /// out to the room's current membership (spec.md §4.5/§4.6).
    fn fan_out(&self, event: RoomEvent) -> Vec<Outbound> {
        match event {
            RoomEvent::UserJoined { room, member } => {
                vec![event_frame(room, action::USER_JOIN_ROOM, "user", &member.player.canonical())]
            }
            RoomEvent::UserLeft { room, member } => {
                vec![event_frame(room, action::USER_LEAVE_ROOM, "user", &member.player.canonical())]
            }
            RoomEvent::UserVariableUpdate { room, member, ready } => {
                let mut params = SfsObject::new();
                params.insert("user", TypedValue::Utf(member.player.canonical()));
                params.insert("ready", TypedValue::Bool(ready));
                vec![room_event(room, action::USER_VARIABLES_UPDATE, params)]
            }
            RoomEvent::RoomVariablesUpdate { room, settings } => {
                let mut params = SfsObject::new();
                params.insert("settings", settings.to_tuple());
                vec![room_event(room, action::ROOM_VARIABLES_UPDATE, params)]
            }
            RoomEvent::OwnerChanged { room, new_owner } => {
                vec![event_frame(room, action::OWNERSHIP_CHANGE, "owner", &new_owner.canonical())]
            }
            RoomEvent::GameStarted { room, owner } => {
                let mut params = SfsObject::new();
                params.insert("owner", TypedValue::Utf(owner.player.canonical()));
                params.insert("ip", TypedValue::Utf(owner.ip.clone()));
                params.insert("port", TypedValue::Int(owner.port));
                vec![room_event(room, action::GAME_START, params)]
            }
        }
        .into_iter()
        .map(|(room_id, frame)| Outbound::ToRoomMembers { room: room_id, frame })
        .collect()
    }
}

fn ack(room_id: crate::room::RoomId, action_id: i16) -> SfsMessage {
    SfsMessage::new(controller::SYSTEM, action_id, SfsObject::new()).with_room(room_id)
}

fn event_frame(room: crate::room::RoomId, action_id: i16, key: &str, value: &str) -> (crate::room::RoomId, Vec<u8>) {
    let mut params = SfsObject::new();
    params.insert(key, TypedValue::Utf(value.to_string()));
    room_event(room, action_id, params)
}

fn room_event(room: crate::room::RoomId, action_id: i16, params: SfsObject) -> (crate::room::RoomId, Vec<u8>) {
    let message = SfsMessage::new(controller::SYSTEM, action_id, params).with_room(room);
    (room, message.encode().to_vec())
}

/// Translates a [`GatewayError`] into an SFS2X error-response frame
/// carrying the wire code prescribed by spec.md §7.
fn encode_error_response(err: &GatewayError) -> Vec<u8> {
    let code = match err {
        GatewayError::Room(room_err) => room_err.wire_code(),
        _ => WIRE_ERROR_INVALID_DATA,
    };
    let mut params = SfsObject::new();
    params.insert("code", TypedValue::Short(code as i16));
    params.insert("msg", TypedValue::Utf(err.to_string()));

    let message = SfsMessage::new(controller::SYSTEM, -1, params);
    message.encode().to_vec()
}

/// Wraps a decoded message for human-readable `debug!` logging: resolves
/// controller/action names from this core's constant table and, unless
/// the noisy `large-packet-logging` feature is on, elides the params body
/// (spec.md ambient logging convention; grounded on the teacher's
/// `PacketDebug`).
pub struct MessageDebug<'a> {
    pub message: &'a SfsMessage,
}

impl<'a> std::fmt::Debug for MessageDebug<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let controller_name = match self.message.controller {
            controller::SYSTEM => "System",
            controller::EXTENSION => "Extension",
            _ => "Unknown",
        };
        write!(
            f,
            "Controller: {controller_name}({}) Action: {}({})",
            self.message.controller,
            action_name(self.message.controller, self.message.action),
            self.message.action
        )?;
        if let Some(room) = self.message.room {
            write!(f, " Room: {room}")?;
        }

        #[cfg(feature = "large-packet-logging")]
        write!(f, " {:?}", self.message.params)?;

        Ok(())
    }
}

fn action_name(controller: i32, action_id: i16) -> &'static str {
    match (controller, action_id) {
        (controller::SYSTEM, action::HANDSHAKE) => "Handshake",
        (controller::SYSTEM, action::LOGIN) => "Login",
        (controller::SYSTEM, action::LOGOUT) => "Logout",
        (controller::SYSTEM, action::PING) => "Ping",
        (controller::SYSTEM, action::JOIN_ROOM) => "JoinRoom",
        (controller::SYSTEM, action::CREATE_ROOM) => "CreateRoom",
        (controller::SYSTEM, action::LEAVE_ROOM) => "LeaveRoom",
        (controller::SYSTEM, action::SET_ROOM_VARIABLES) => "SetRoomVariables",
        (controller::SYSTEM, action::SET_USER_VARIABLES) => "SetUserVariables",
        (controller::SYSTEM, action::START_GAME) => "StartGame",
        (controller::SYSTEM, action::USER_JOIN_ROOM) => "UserJoinRoom",
        (controller::SYSTEM, action::USER_LEAVE_ROOM) => "UserLeaveRoom",
        (controller::SYSTEM, action::USER_VARIABLES_UPDATE) => "UserVariablesUpdate",
        (controller::SYSTEM, action::ROOM_VARIABLES_UPDATE) => "RoomVariablesUpdate",
        (controller::SYSTEM, action::OWNERSHIP_CHANGE) => "OwnershipChange",
        (controller::SYSTEM, action::GAME_START) => "GameStart",
        _ => "Unknown",
    }
}

/// Wall-clock milliseconds, used only for the handshake's `serverTime`
/// field — never fed back into state-machine decisions.
fn server_time_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::SfsObject;
    use crate::settings::LobbySettings;

    fn new_processor() -> (SessionRegistry, RoomRegistry) {
        (SessionRegistry::new(), RoomRegistry::new())
    }

    #[test]
    fn handshake_returns_session_token() {
        let (sessions, rooms) = new_processor();
        let session = sessions.create("127.0.0.1");
        let id = session.read().id.clone();
        drop(session);

        let processor = Processor::new(&sessions, &rooms);
        let request = SfsMessage::new(controller::SYSTEM, action::HANDSHAKE, SfsObject::new());
        let outbound = processor.handle(&id, request);

        assert_eq!(outbound.len(), 1);
        match &outbound[0] {
            Outbound::ToSender(bytes) => {
                let decoded = SfsMessage::decode(bytes).unwrap();
                let token = decoded.params.get("token").unwrap().as_str().unwrap();
                assert_eq!(token, id);
            }
            _ => panic!("expected a ToSender frame"),
        }
    }

    #[test]
    fn login_then_create_room_binds_player_and_room() {
        let (sessions, rooms) = new_processor();
        let session = sessions.create("127.0.0.1");
        let id = session.read().id.clone();
        drop(session);

        let processor = Processor::new(&sessions, &rooms);

        let mut login_params = SfsObject::new();
        login_params.insert("name", TypedValue::Utf("Alice".into()));
        let login = SfsMessage::new(controller::SYSTEM, action::LOGIN, login_params);
        processor.handle(&id, login);

        let mut create_params = SfsObject::new();
        create_params.insert("settings", LobbySettings::defaults("Test Lobby").to_tuple());
        create_params.insert("maxPlayers", TypedValue::Int(4));
        let create = SfsMessage::new(controller::SYSTEM, action::CREATE_ROOM, create_params);
        let outbound = processor.handle(&id, create);

        assert_eq!(outbound.len(), 1);
        let session_ref = sessions.get(&id).unwrap();
        assert!(session_ref.read().room.is_some());
    }

    #[test]
    fn unknown_session_player_action_errors_gracefully() {
        let (sessions, rooms) = new_processor();
        let processor = Processor::new(&sessions, &rooms);

        let request = SfsMessage::new(controller::SYSTEM, action::LEAVE_ROOM, SfsObject::new());
        let outbound = processor.handle(&"SESS_0000000000000000".to_string(), request);
        // No session exists, so touch() is a no-op and current_player fails;
        // the processor still returns a well-formed error frame rather than panicking.
        assert_eq!(outbound.len(), 1);
    }
}
