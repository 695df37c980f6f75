//! Player and combined (player+endpoint) identity values (C3).
//!
//! [`PlayerId`] is the canonical per-player identity; [`CombinedId`] pairs
//! it with the network endpoint a session connected from, which is what
//! room membership is actually keyed on (spec.md §3 "CombinedID").

use crate::error::IdentityError;
use bytes::{Buf, BufMut, BytesMut};

/// Storefront tag, matching the teacher's tag-table approach for small
/// fixed enumerations (`utils/components.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storefront {
    None,
    Steam,
    Epic,
    Gog,
}

impl Storefront {
    fn as_str(self) -> &'static str {
        match self {
            Storefront::None => "none",
            Storefront::Steam => "steam",
            Storefront::Epic => "epic",
            Storefront::Gog => "gog",
        }
    }

    /// Unknown tokens map to [`Storefront::None`] (spec.md §4.3).
    fn parse_token(token: &str) -> Self {
        match token {
            "steam" => Storefront::Steam,
            "epic" => Storefront::Epic,
            "gog" => Storefront::Gog,
            _ => Storefront::None,
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            Storefront::None => 0,
            Storefront::Steam => 1,
            Storefront::Epic => 2,
            Storefront::Gog => 3,
        }
    }

    fn from_u32(value: u32) -> Self {
        match value {
            1 => Storefront::Steam,
            2 => Storefront::Epic,
            3 => Storefront::Gog,
            _ => Storefront::None,
        }
    }
}

/// A player's identity: which storefront issued it, the opaque id string,
/// and the display name shown to other players.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerId {
    pub storefront: Storefront,
    pub id: String,
    pub display_name: String,
}

impl PlayerId {
    pub fn new(storefront: Storefront, id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            storefront,
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Canonical string form: `"<storefront>:<id>"`, or bare `<id>` when
    /// the storefront is [`Storefront::None`] (spec.md §3).
    pub fn canonical(&self) -> String {
        match self.storefront {
            Storefront::None => self.id.clone(),
            other => format!("{}:{}", other.as_str(), self.id),
        }
    }

    /// Parses `"storefront:id"` or a bare `"id"`. An unrecognized
    /// storefront token maps to [`Storefront::None`] with the whole input
    /// treated as the id, matching spec.md §4.3's permissive parse rule.
    pub fn parse(display_name: impl Into<String>, input: &str) -> Self {
        match input.split_once(':') {
            Some((prefix, rest)) => {
                let storefront = Storefront::parse_token(prefix);
                if matches!(storefront, Storefront::None) {
                    PlayerId::new(Storefront::None, input, display_name)
                } else {
                    PlayerId::new(storefront, rest, display_name)
                }
            }
            None => PlayerId::new(Storefront::None, input, display_name),
        }
    }

    /// Binary form used inside [`CombinedId`] for direct-TCP compatibility
    /// (spec.md §4.3): 4-byte BE storefront enum + length-prefixed id +
    /// length-prefixed display name.
    pub fn encode_binary(&self, dst: &mut BytesMut) {
        dst.put_u32(self.storefront.as_u32());
        put_len_prefixed(dst, &self.id);
        put_len_prefixed(dst, &self.display_name);
    }

    pub fn decode_binary(src: &mut &[u8]) -> Result<Self, IdentityError> {
        let storefront = Storefront::from_u32(take_u32(src)?);
        let id = take_len_prefixed(src)?;
        let display_name = take_len_prefixed(src)?;
        Ok(PlayerId {
            storefront,
            id,
            display_name,
        })
    }
}

/// A player identity bound to the network endpoint their session
/// connected from. Equality spans all four fields (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CombinedId {
    pub player: PlayerId,
    pub ip: String,
    pub port: i32,
    pub provider: Option<String>,
}

impl CombinedId {
    pub fn new(player: PlayerId, ip: impl Into<String>, port: i32) -> Self {
        Self {
            player,
            ip: ip.into(),
            port,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Binary form: the player's binary form followed by SimplifyIO-keyed
    /// `ip`, `port`, and optional `provider` fields (spec.md §4.3.1).
    pub fn encode_binary(&self, dst: &mut BytesMut) {
        self.player.encode_binary(dst);
        simplify_io::write_string(dst, "ip", &self.ip);
        simplify_io::write_i32(dst, "port", self.port);
        if let Some(provider) = &self.provider {
            simplify_io::write_string(dst, "provider", provider);
        }
    }

    pub fn decode_binary(src: &mut &[u8]) -> Result<Self, IdentityError> {
        let player = PlayerId::decode_binary(src)?;
        let ip = simplify_io::read_string(src, "ip")?;
        let port = simplify_io::read_i32(src, "port")?;
        let provider = if src.is_empty() {
            None
        } else {
            Some(simplify_io::read_string(src, "provider")?)
        };
        Ok(CombinedId {
            player,
            ip,
            port,
            provider,
        })
    }
}

fn put_len_prefixed(dst: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    dst.put_u32(bytes.len() as u32);
    dst.extend_from_slice(bytes);
}

fn take_u32(src: &mut &[u8]) -> Result<u32, IdentityError> {
    if src.len() < 4 {
        return Err(IdentityError::Codec(crate::error::CodecError::UnexpectedEof));
    }
    Ok(src.get_u32())
}

fn take_len_prefixed(src: &mut &[u8]) -> Result<String, IdentityError> {
    let len = take_u32(src)? as usize;
    if src.len() < len {
        return Err(IdentityError::Codec(crate::error::CodecError::UnexpectedEof));
    }
    let bytes = &src[..len];
    src.advance(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| IdentityError::Codec(crate::error::CodecError::InvalidUtf8))
}

/// SimplifyIO keyed framing (spec.md §4.3.1): each field is
/// `<4-byte BE key-length><key-bytes><1-byte type-tag><value>`. This is a
/// simplified stand-in for the game's real SimplifyIO byte layout — see
/// DESIGN.md's Open Question note.
pub mod simplify_io {
    use super::*;

    pub const TAG_STRING: u8 = 1;
    pub const TAG_INT32: u8 = 2;
    pub const TAG_INT16: u8 = 3;
    pub const TAG_BYTE: u8 = 4;
    pub const TAG_BOOL: u8 = 5;
    pub const TAG_FLOAT: u8 = 6;
    pub const TAG_BOOL_ARRAY: u8 = 7;

    fn write_key(dst: &mut BytesMut, key: &str) {
        put_len_prefixed(dst, key);
    }

    fn read_key(src: &mut &[u8], expected: &str) -> Result<(), IdentityError> {
        let found = take_len_prefixed(src)?;
        if found != expected {
            return Err(IdentityError::KeyMismatch {
                expected: expected.to_string(),
                found,
            });
        }
        Ok(())
    }

    fn expect_tag(src: &mut &[u8], expected: u8) -> Result<(), IdentityError> {
        if src.is_empty() {
            return Err(IdentityError::Codec(crate::error::CodecError::UnexpectedEof));
        }
        let tag = src[0];
        src.advance(1);
        if tag != expected {
            return Err(IdentityError::Codec(crate::error::CodecError::UnknownTag(tag)));
        }
        Ok(())
    }

    pub fn write_string(dst: &mut BytesMut, key: &str, value: &str) {
        write_key(dst, key);
        dst.put_u8(TAG_STRING);
        put_len_prefixed(dst, value);
    }

    pub fn read_string(src: &mut &[u8], key: &str) -> Result<String, IdentityError> {
        read_key(src, key)?;
        expect_tag(src, TAG_STRING)?;
        take_len_prefixed(src)
    }

    pub fn write_i32(dst: &mut BytesMut, key: &str, value: i32) {
        write_key(dst, key);
        dst.put_u8(TAG_INT32);
        dst.put_i32(value);
    }

    pub fn read_i32(src: &mut &[u8], key: &str) -> Result<i32, IdentityError> {
        read_key(src, key)?;
        expect_tag(src, TAG_INT32)?;
        if src.len() < 4 {
            return Err(IdentityError::Codec(crate::error::CodecError::UnexpectedEof));
        }
        Ok(src.get_i32())
    }

    pub fn write_bool_array(dst: &mut BytesMut, key: &str, values: &[bool]) {
        write_key(dst, key);
        dst.put_u8(TAG_BOOL_ARRAY);
        dst.put_u32(values.len() as u32);
        for v in values {
            dst.put_u8(if *v { 1 } else { 0 });
        }
    }

    pub fn read_bool_array(src: &mut &[u8], key: &str) -> Result<Vec<bool>, IdentityError> {
        read_key(src, key)?;
        expect_tag(src, TAG_BOOL_ARRAY)?;
        let count = take_u32(src)? as usize;
        if src.len() < count {
            return Err(IdentityError::Codec(crate::error::CodecError::UnexpectedEof));
        }
        let values = src[..count].iter().map(|b| *b != 0).collect();
        src.advance(count);
        Ok(values)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_form_with_storefront() {
        let player = PlayerId::new(Storefront::Steam, "1001", "Alice");
        assert_eq!(player.canonical(), "steam:1001");
    }

    #[test]
    fn canonical_form_without_storefront() {
        let player = PlayerId::new(Storefront::None, "1001", "Alice");
        assert_eq!(player.canonical(), "1001");
    }

    #[test]
    fn parse_roundtrips_canonical_form() {
        let player = PlayerId::parse("Alice", "steam:1001");
        assert_eq!(player.storefront, Storefront::Steam);
        assert_eq!(player.id, "1001");
        assert_eq!(player.canonical(), "steam:1001");
    }

    #[test]
    fn parse_unknown_storefront_is_bare_id() {
        let player = PlayerId::parse("Bob", "xbox:777");
        assert_eq!(player.storefront, Storefront::None);
        assert_eq!(player.id, "xbox:777");
    }

    #[test]
    fn player_binary_roundtrip() {
        let player = PlayerId::new(Storefront::Epic, "42", "Carol");
        let mut buf = BytesMut::new();
        player.encode_binary(&mut buf);
        let mut src: &[u8] = &buf;
        let decoded = PlayerId::decode_binary(&mut src).unwrap();
        assert_eq!(decoded, player);
        assert!(src.is_empty());
    }

    #[test]
    fn combined_id_binary_roundtrip() {
        let player = PlayerId::new(Storefront::Steam, "1001", "Alice");
        let combined = CombinedId::new(player, "127.0.0.1", 7777).with_provider("relay-1");
        let mut buf = BytesMut::new();
        combined.encode_binary(&mut buf);
        let mut src: &[u8] = &buf;
        let decoded = CombinedId::decode_binary(&mut src).unwrap();
        assert_eq!(decoded, combined);
    }

    #[test]
    fn simplify_io_key_mismatch_errors() {
        let mut buf = BytesMut::new();
        simplify_io::write_string(&mut buf, "ip", "1.2.3.4");
        let mut src: &[u8] = &buf;
        let err = simplify_io::read_string(&mut src, "port").unwrap_err();
        assert!(matches!(err, IdentityError::KeyMismatch { .. }));
    }

    #[test]
    fn simplify_io_bool_array_roundtrip() {
        let mut buf = BytesMut::new();
        simplify_io::write_bool_array(&mut buf, "flags", &[true, false, true]);
        let mut src: &[u8] = &buf;
        let decoded = simplify_io::read_bool_array(&mut src, "flags").unwrap();
        assert_eq!(decoded, vec![true, false, true]);
    }
}
