//! Direct SFS2X TCP endpoint (C8): length-framed raw SFS2X over a
//! persistent socket, one session bound to one connection.
//!
//! Accept-loop and per-connection shape grounded on the teacher's
//! `servers/redirector/mod.rs` `start_server`/`handle_client`: bind,
//! loop-accept, spawn-per-connection, `Framed::new(stream, PacketCodec)`
//! driven with `futures_util`'s `StreamExt`/`SinkExt`. Per spec.md §9
//! ("Fan-out through queues vs. direct sockets"), the message processor
//! never writes to the socket directly — it enqueues through the same
//! per-session queue BlueBox polls, and this connection's writer half is a
//! continuous drainer of that queue, grounded on the teacher's
//! `servers/ticker.rs` interval-loop shape.

use crate::codec::{PacketCodec, SfsMessage};
use crate::processor::Processor;
use crate::session::{decode_frame_b64, SessionId};
use crate::transport::GatewayState;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio_util::codec::Framed;

/// How often the writer half polls the session's outbound queue for newly
/// enqueued frames (spec.md §9: "the TCP writer becomes a continuous
/// drainer of that queue").
const QUEUE_DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// Binds the direct TCP listener and serves connections until `shutdown`
/// resolves. Honors spec.md §5's "closing listeners and letting in-flight
/// requests complete" cancellation policy: once `shutdown` fires, the
/// accept loop stops taking new connections but does not forcibly close
/// ones already in flight.
pub async fn serve(addr: SocketAddr, state: GatewayState, shutdown: impl std::future::Future<Output = ()>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("direct SFS2X TCP endpoint listening on {addr}");
            listener
        }
        Err(err) => {
            error!("failed to bind direct SFS2X TCP endpoint on {addr}: {err}");
            return;
        }
    };

    tokio::pin!(shutdown);
    loop {
        select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(value) => value,
                    Err(err) => {
                        warn!("failed to accept direct TCP connection: {err}");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, state).await;
                });
            }
            _ = &mut shutdown => {
                info!("direct SFS2X TCP endpoint shutting down, no longer accepting connections");
                break;
            }
        }
    }
}

/// Drives a single connection end to end: creates the bound session,
/// alternates between reading inbound frames and draining the outbound
/// queue, and tears the session down (cascading into any joined room) when
/// the socket closes or a decode error occurs (spec.md §4.8).
async fn handle_connection(stream: TcpStream, peer: SocketAddr, state: GatewayState) {
    let codec = PacketCodec::new(state.max_frame_size);
    let mut framed = Framed::new(stream, codec);

    let session = state.sessions.create(peer.ip().to_string());
    let session_id: SessionId = session.read().id.clone();
    session.write().client_port = peer.port() as i32;
    drop(session);

    info!("direct TCP session {session_id} connected from {peer}");

    let mut drain = tokio::time::interval(QUEUE_DRAIN_INTERVAL);
    let mut should_close = false;

    loop {
        if should_close {
            break;
        }

        select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(payload)) => {
                        if !dispatch_inbound(&state, &session_id, &payload) {
                            should_close = true;
                        }
                    }
                    Some(Err(err)) => {
                        debug!("direct TCP session {session_id} frame error: {err}");
                        should_close = true;
                    }
                    None => {
                        should_close = true;
                    }
                }
            }
            _ = drain.tick() => {}
        }

        while let Some(frame_b64) = state.sessions.poll(&session_id) {
            let Ok(bytes) = decode_frame_b64(&frame_b64) else {
                continue;
            };
            if framed.send(BytesMut::from(&bytes[..])).await.is_err() {
                should_close = true;
                break;
            }
        }
    }

    teardown_session(&state, &session_id);
    info!("direct TCP session {session_id} disconnected");
}

/// Decodes and dispatches a single inbound frame. Returns `false` if the
/// frame was malformed or the message was a logout, both of which close
/// the connection per spec.md §4.8 ("Close on any decode error or on
/// receipt of a logout").
fn dispatch_inbound(state: &GatewayState, session_id: &SessionId, payload: &BytesMut) -> bool {
    let message = match SfsMessage::decode(payload) {
        Ok(message) => message,
        Err(err) => {
            debug!("direct TCP session {session_id} malformed frame: {err}");
            return false;
        }
    };

    let is_logout = message.controller == crate::processor::controller::SYSTEM
        && message.action == crate::processor::action::LOGOUT;

    let processor = Processor::new(&state.sessions, &state.rooms);
    processor.handle(session_id, message);

    !is_logout
}

/// Removes the session and, if it was bound to a room, enqueues a leave
/// through the room registry and fans the resulting event out to the
/// room's remaining members (spec.md §4.4 "destroyed on ... transport
/// drop").
fn teardown_session(state: &GatewayState, session_id: &SessionId) {
    let Some(session) = state.sessions.get(session_id) else {
        return;
    };
    let (player, room) = {
        let session = session.read();
        (session.player.clone(), session.room)
    };

    if let (Some(player), Some(room)) = (player, room) {
        crate::transport::leave_room_and_notify(&state.sessions, &state.rooms, room, &player);
    }

    state.sessions.disconnect(session_id);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::room::RoomRegistry;
    use crate::session::SessionRegistry;
    use std::sync::Arc;

    fn test_state() -> GatewayState {
        GatewayState::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(RoomRegistry::new()),
            false,
            crate::codec::DEFAULT_MAX_FRAME_SIZE,
        )
    }

    #[test]
    fn logout_message_signals_close() {
        let state = test_state();
        let session = state.sessions.create("127.0.0.1");
        let id = session.read().id.clone();
        drop(session);

        let message = SfsMessage::new(
            crate::processor::controller::SYSTEM,
            crate::processor::action::LOGOUT,
            crate::codec::SfsObject::new(),
        );
        let bytes = message.encode();
        assert!(!dispatch_inbound(&state, &id, &bytes));
    }

    #[test]
    fn ping_message_keeps_connection_open() {
        let state = test_state();
        let session = state.sessions.create("127.0.0.1");
        let id = session.read().id.clone();
        drop(session);

        let message = SfsMessage::new(
            crate::processor::controller::SYSTEM,
            crate::processor::action::PING,
            crate::codec::SfsObject::new(),
        );
        let bytes = message.encode();
        assert!(dispatch_inbound(&state, &id, &bytes));
    }
}
