//! BlueBox HTTP long-poll endpoint (C7): a single route that demultiplexes
//! `connect`/`poll`/`data`/`disconnect` over one URL for clients that can't
//! open a direct TCP connection.
//!
//! Route wiring follows the teacher's `routes/mod.rs` shape; client-IP
//! extraction is adapted from `middleware/ip_address.rs`'s `FromRequestParts`
//! impl (here preferring `X-Forwarded-For` over `X-Real-IP`, per spec.md §6);
//! the forced `text/plain` response wrapper follows `middleware/xml.rs`'s
//! content-type-overriding `IntoResponse`.

use crate::codec::SfsMessage;
use crate::processor::Processor;
use crate::session::decode_frame_b64;
use crate::transport::GatewayState;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::CONTENT_TYPE, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use log::warn;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/BlueBox/BlueBox.do", post(handle_bluebox))
        .with_state(state)
}

#[derive(Deserialize)]
struct BlueBoxForm {
    #[serde(rename = "sfsHttp")]
    sfs_http: String,
}

/// Wraps a string body, forcing the response content-type to `text/plain`
/// regardless of what the request's `Accept` header asked for (spec.md §6
/// "BlueBox content-type").
struct PlainText(String);

impl IntoResponse for PlainText {
    fn into_response(self) -> Response {
        let mut response = self.0.into_response();
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response
    }
}

/// Client IP as seen by the BlueBox endpoint: `X-Forwarded-For`'s first
/// comma-separated value, then `X-Real-IP`, then the transport peer
/// address (spec.md §6 "Client identity headers").
struct ClientIp(String);

#[async_trait]
impl FromRequestParts<GatewayState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &GatewayState) -> Result<Self, Self::Rejection> {
        if state.reverse_proxy {
            if let Some(ip) = extract_forwarded_for(&parts.headers) {
                return Ok(ClientIp(ip));
            }
            if let Some(ip) = extract_real_ip(&parts.headers) {
                return Ok(ClientIp(ip));
            }
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        Ok(ClientIp(peer))
    }
}

fn extract_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("X-Forwarded-For")?.to_str().ok()?;
    value.split(',').next().map(|s| s.trim().to_string())
}

fn extract_real_ip(headers: &HeaderMap) -> Option<String> {
    headers.get("X-Real-IP")?.to_str().ok().map(|s| s.trim().to_string())
}

async fn handle_bluebox(State(state): State<GatewayState>, ClientIp(ip): ClientIp, Form(form): Form<BlueBoxForm>) -> PlainText {
    let raw = form.sfs_http.trim_end_matches('\0');
    let mut fields = raw.splitn(3, '|');
    let session_id = fields.next().unwrap_or("null");
    let command = fields.next().unwrap_or("");
    let data = fields.next().unwrap_or("null");

    let body = match command {
        "connect" => handle_connect(&state, ip),
        "poll" => handle_poll(&state, session_id),
        "data" => handle_data(&state, session_id, data),
        "disconnect" => handle_disconnect(&state, session_id),
        other => {
            warn!("unknown BlueBox command {other}");
            "err01|Unknown command".to_string()
        }
    };

    PlainText(body)
}

fn handle_connect(state: &GatewayState, ip: String) -> String {
    let session = state.sessions.create(ip);
    format!("connect|{}", session.read().id)
}

fn handle_poll(state: &GatewayState, session_id: &str) -> String {
    if state.sessions.get(session_id).is_none() {
        return "err01|Invalid http session !".to_string();
    }
    state.sessions.touch(session_id);
    match state.sessions.poll(session_id) {
        Some(frame) => format!("poll|{frame}"),
        None => "poll|null".to_string(),
    }
}

fn handle_data(state: &GatewayState, session_id: &str, data: &str) -> String {
    if state.sessions.get(session_id).is_none() {
        return "err01|Invalid http session !".to_string();
    }

    let bytes = match decode_frame_b64(data) {
        Ok(bytes) => bytes,
        Err(_) => return "err01|Data error".to_string(),
    };
    let message = match SfsMessage::decode(&bytes) {
        Ok(message) => message,
        Err(_) => return "err01|Data error".to_string(),
    };

    let processor = Processor::new(&state.sessions, &state.rooms);
    processor.handle(&session_id.to_string(), message);
    "data|null".to_string()
}

fn handle_disconnect(state: &GatewayState, session_id: &str) -> String {
    let Some(session) = state.sessions.get(session_id) else {
        return "err01|Invalid http session !".to_string();
    };

    if let (Some(player), Some(room)) = (session.read().player.clone(), session.read().room) {
        crate::transport::leave_room_and_notify(&state.sessions, &state.rooms, room, &player);
    }

    state.sessions.disconnect(session_id);
    "disconnect|null".to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::room::RoomRegistry;
    use crate::session::SessionRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> GatewayState {
        GatewayState::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(RoomRegistry::new()),
            false,
            crate::codec::DEFAULT_MAX_FRAME_SIZE,
        )
    }

    #[tokio::test]
    async fn connect_returns_session_id() {
        let app = router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/BlueBox/BlueBox.do")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("sfsHttp=null%7Cconnect%7Cnull"))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("connect|SESS_"));
    }

    #[tokio::test]
    async fn poll_on_unknown_session_errors() {
        let app = router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/BlueBox/BlueBox.do")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("sfsHttp=BOGUS%7Cpoll%7Cnull"))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "err01|Invalid http session !".as_bytes());
    }

    #[test]
    fn forwarded_for_takes_first_value() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        assert_eq!(extract_forwarded_for(&headers).as_deref(), Some("1.2.3.4"));
    }
}
