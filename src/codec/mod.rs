//! The SFS2X typed-value wire codec (C1).
//!
//! Values are encoded as a 1-byte tag followed by a type-specific body.
//! Numeric fields are big-endian throughout; strings are UTF-8 and pick
//! their own length-prefix width on encode (§4.1 canonical encoding rule).
//!
//! Submodules:
//! - [`value`] the tagged [`value::TypedValue`] sum type and its codec
//! - [`message`] the `{c, a, p, r}` envelope every SFS2X message wears
//! - [`frame`] the length-prefixed framing used by the direct TCP transport

pub mod frame;
pub mod message;
pub mod value;

pub use frame::{FrameHeader, PacketCodec};
pub use message::SfsMessage;
pub use value::{SfsObject, TypedValue};

/// Default maximum frame size (16 MiB), per spec.md §5.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Wire tag numbers for each [`TypedValue`] variant.
///
/// SFS2X's tag numbers aren't enumerated anywhere in the distilled spec
/// (an Open Question flags this); the values below follow the layout
/// documented by the community-maintained SFS2X protocol notes and must be
/// re-pinned against the exact client library version before shipping
/// against a real client (see DESIGN.md).
pub mod tag {
    pub const NULL: u8 = 0x00;
    pub const BOOL: u8 = 0x01;
    pub const BYTE: u8 = 0x02;
    pub const SHORT: u8 = 0x03;
    pub const INT: u8 = 0x04;
    pub const LONG: u8 = 0x05;
    pub const FLOAT: u8 = 0x06;
    pub const DOUBLE: u8 = 0x07;
    pub const UTF_STRING: u8 = 0x08;
    pub const BOOL_ARRAY: u8 = 0x09;
    pub const BYTE_ARRAY: u8 = 0x0A;
    pub const SHORT_ARRAY: u8 = 0x0B;
    pub const INT_ARRAY: u8 = 0x0C;
    pub const LONG_ARRAY: u8 = 0x0D;
    pub const FLOAT_ARRAY: u8 = 0x0E;
    pub const DOUBLE_ARRAY: u8 = 0x0F;
    pub const UTF_STRING_ARRAY: u8 = 0x10;
    pub const SFS_ARRAY: u8 = 0x11;
    pub const SFS_OBJECT: u8 = 0x12;
    pub const TEXT: u8 = 0x14;
}
