//! Entry point: loads configuration, wires the shared session/room
//! registries, starts the background reap task, and serves whichever
//! transports are enabled until a shutdown signal arrives.
//!
//! Grounded on the teacher's `src/main.rs`: load config, init logging,
//! build shared services, wire the routers, bind listeners, and run until
//! `tokio::signal::ctrl_c` with `axum::serve`'s graceful shutdown.

use log::{error, info};
use room::RoomRegistry;
use session::SessionRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use transport::GatewayState;

mod codec;
mod config;
mod error;
mod identity;
mod logging;
mod processor;
mod room;
mod session;
mod settings;
mod transport;

#[tokio::main]
async fn main() {
    let config = config::load_config().unwrap_or_default();
    logging::setup(config.logging);
    log_panics::init();

    info!(
        "starting sfs2x lobby gateway (bluebox:{} tcp:{})",
        config.protocol.enable_bluebox_http, config.protocol.enable_sfs2x_direct
    );

    let sessions = Arc::new(SessionRegistry::new());
    let rooms = Arc::new(RoomRegistry::new());
    let state = GatewayState::new(sessions.clone(), rooms.clone(), config.reverse_proxy, config.max_frame_size);

    tokio::spawn(reap_task(sessions, rooms, config.timeouts));

    let mut handles = Vec::new();

    if config.protocol.enable_bluebox_http {
        handles.push(tokio::spawn(serve_bluebox(config.ports.blue_box_http, state.clone())));
    }

    if config.protocol.enable_sfs2x_direct {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.ports.sfs2x_direct));
        handles.push(tokio::spawn(transport::tcp::serve(addr, state.clone(), shutdown_signal())));
    }

    if handles.is_empty() {
        error!("both protocol.enable_bluebox_http and protocol.enable_sfs2x_direct are false; nothing to serve");
        return;
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn serve_bluebox(port: u16, state: GatewayState) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let router = transport::bluebox::router(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("BlueBox HTTP endpoint listening on {addr}");
            listener
        }
        Err(err) => {
            error!("failed to bind BlueBox HTTP endpoint on {addr}: {err}");
            return;
        }
    };

    if let Err(err) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("BlueBox HTTP endpoint exited with error: {err}");
    }
}

/// Resolves on `ctrl_c`. Both the BlueBox server and the direct TCP
/// accept loop await an independent copy of this so each transport stops
/// taking new work without the other needing to coordinate a broadcast
/// (spec.md §5 "Cancellation").
async fn shutdown_signal() {
    if signal::ctrl_c().await.is_err() {
        error!("failed to install Ctrl+C handler; shutdown signal will never fire");
        std::future::pending::<()>().await;
    }
}

/// Periodically reaps idle sessions and rooms (spec.md §4.4/§4.5
/// "Reaping"), draining one sweep at a time so the loop can still exit
/// promptly on shutdown (spec.md §5: "finish the current pass, then
/// exit"). Grounded on the teacher's `servers/ticker.rs` interval-loop
/// shape.
async fn reap_task(sessions: Arc<SessionRegistry>, rooms: Arc<RoomRegistry>, timeouts: config::TimeoutsConfig) {
    let mut interval = tokio::time::interval(Duration::from_secs(timeouts.reap_interval_sec.max(1)));
    let session_idle = Duration::from_secs(timeouts.session_idle_min.saturating_mul(60));
    let room_idle = Duration::from_secs(timeouts.room_idle_min.saturating_mul(60));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let reaped_sessions = sessions.reap(session_idle);
                for session in &reaped_sessions {
                    let (player, room) = {
                        let session = session.read();
                        (session.player.clone(), session.room)
                    };
                    if let (Some(player), Some(room)) = (player, room) {
                        transport::leave_room_and_notify(&sessions, &rooms, room, &player);
                    }
                }

                let reaped_rooms = rooms.reap(room_idle);
                if !reaped_sessions.is_empty() || reaped_rooms > 0 {
                    info!("reap sweep: {} sessions, {} rooms", reaped_sessions.len(), reaped_rooms);
                }
            }
            _ = shutdown_signal() => {
                info!("reap task shutting down after finishing in-flight sweep");
                break;
            }
        }
    }
}
