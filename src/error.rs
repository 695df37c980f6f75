//! Crate-wide error kinds and their wire-visible translation.
//!
//! Every fallible operation in the core returns one of these variants.
//! Transport layers (`transport::bluebox`, `transport::tcp`) are the only
//! place an error is allowed to turn into bytes on the wire or a closed
//! connection; nothing here ever panics or escapes a handler.

use thiserror::Error;

/// Errors raised while decoding a wire frame or typed value.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame declared length {0} exceeds configured maximum")]
    FrameTooLarge(usize),

    #[error("frame used an unsupported flag (encrypted or compressed)")]
    UnsupportedFlags,

    #[error("unknown typed value tag byte {0:#04x}")]
    UnknownTag(u8),

    #[error("unexpected end of buffer while decoding")]
    UnexpectedEof,

    #[error("string bytes were not valid UTF-8")]
    InvalidUtf8,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Required by `tokio_util::codec::{Decoder, Encoder}`, whose `Error`
    /// associated type must implement `From<std::io::Error>` so a socket
    /// read/write failure can flow through the same `Result` as a decode
    /// failure (`src/codec/frame.rs`'s `PacketCodec`).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while converting a lobby settings tuple.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings array had {0} elements, expected 21")]
    WrongLength(usize),

    #[error("slot {slot} had the wrong type: expected {expected}, found {found}")]
    SlotTypeMismatch {
        slot: usize,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised while decoding an identity value's SimplifyIO binary form.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("expected key {expected:?}, found {found:?}")]
    KeyMismatch { expected: String, found: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised by room registry operations (C5).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    #[error("room is full")]
    RoomFull,
    #[error("room password did not match")]
    RoomPasswordMismatch,
    #[error("room does not exist")]
    RoomNotFound,
    #[error("requester is not the room owner")]
    NotOwner,
    #[error("not every non-owner member is ready")]
    NotReady,
    #[error("owner already has a non-started room")]
    AlreadyOwnsRoom,
}

/// SFS2X wire error codes sent back to the client for a [`RoomError`] or
/// [`SettingsError`]. These pin the constants spec.md §7 requires but leaves
/// unenumerated, following the same "pin it in one table" approach the
/// teacher's `ServerError` enum uses for Blaze error codes.
impl RoomError {
    pub const fn wire_code(self) -> u16 {
        match self {
            RoomError::RoomFull => 16,
            RoomError::RoomPasswordMismatch => 17,
            RoomError::RoomNotFound => 18,
            RoomError::NotOwner => 19,
            RoomError::NotReady => 20,
            RoomError::AlreadyOwnsRoom => 21,
        }
    }
}

/// Invalid-data error code used for [`SettingsError`] / malformed request
/// parameters (spec.md §7: "code 13, invalid-data").
pub const WIRE_ERROR_INVALID_DATA: u16 = 13;

/// Top-level gateway error, used where a single error type needs to unify
/// the above across a request-handling boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] CodecError),

    #[error("settings schema mismatch: {0}")]
    SchemaMismatch(#[from] SettingsError),

    #[error("unknown session")]
    UnknownSession,

    #[error("session outbound queue is full")]
    QueueFull,

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("server is shutting down")]
    Shutdown,
}
