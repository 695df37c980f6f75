//! Transport layer: the BlueBox HTTP long-poll endpoint (C7) and the
//! direct SFS2X TCP endpoint (C8), both driving the same
//! [`crate::processor::Processor`] against shared registries.

pub mod bluebox;
pub mod tcp;

use crate::identity::PlayerId;
use crate::room::RoomId;
use crate::room::RoomRegistry;
use crate::session::SessionRegistry;
use log::debug;
use std::sync::Arc;

/// State shared by both transports and cloned cheaply into every
/// connection/request handler.
#[derive(Clone)]
pub struct GatewayState {
    pub sessions: Arc<SessionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub reverse_proxy: bool,
    pub max_frame_size: usize,
}

impl GatewayState {
    pub fn new(sessions: Arc<SessionRegistry>, rooms: Arc<RoomRegistry>, reverse_proxy: bool, max_frame_size: usize) -> Self {
        Self {
            sessions,
            rooms,
            reverse_proxy,
            max_frame_size,
        }
    }
}

/// Best-effort leave used by both transports (and the background reap
/// task) when a session goes away while still bound to a room (spec.md
/// §4.4: "for each room where its bound player is a member, a leave is
/// enqueued through C5"), fanning the resulting event out to whoever is
/// left. Takes the registries directly rather than [`GatewayState`] so the
/// reap task, which has no axum state of its own, can share it too.
pub fn leave_room_and_notify(sessions: &SessionRegistry, rooms: &RoomRegistry, room: RoomId, player: &PlayerId) {
    let Some(snapshot) = rooms.get_snapshot(room) else {
        return;
    };
    let Some(member) = snapshot.members.iter().find(|m| &m.id.player == player) else {
        return;
    };

    match rooms.leave(room, &member.id) {
        Ok(Some(crate::room::RoomEvent::UserLeft { member, .. })) => {
            let mut params = crate::codec::SfsObject::new();
            params.insert("user", crate::codec::TypedValue::Utf(member.player.canonical()));
            let frame = crate::codec::SfsMessage::new(
                crate::processor::controller::SYSTEM,
                crate::processor::action::USER_LEAVE_ROOM,
                params,
            )
            .with_room(room)
            .encode();
            let encoded = crate::session::encode_frame_b64(&frame);
            for session in sessions.sessions_in_room(room) {
                let id = session.read().id.clone();
                sessions.enqueue(&id, encoded.clone());
            }
        }
        Ok(Some(crate::room::RoomEvent::OwnerChanged { room, new_owner })) => {
            let mut params = crate::codec::SfsObject::new();
            params.insert("owner", crate::codec::TypedValue::Utf(new_owner.canonical()));
            let frame = crate::codec::SfsMessage::new(
                crate::processor::controller::SYSTEM,
                crate::processor::action::OWNERSHIP_CHANGE,
                params,
            )
            .with_room(room)
            .encode();
            let encoded = crate::session::encode_frame_b64(&frame);
            for session in sessions.sessions_in_room(room) {
                let id = session.read().id.clone();
                sessions.enqueue(&id, encoded.clone());
            }
        }
        Ok(Some(_)) | Ok(None) => {}
        Err(err) => debug!("leave-on-disconnect failed for room {room}: {err}"),
    }
}
