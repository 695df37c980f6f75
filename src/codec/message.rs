//! The `{c, a, p, r}` message envelope every SFS2X request/response wears
//! (spec.md §3 "Message envelope"): a controller id, an action id, a
//! params object, and an optional target room id.

use super::value::{SfsObject, TypedValue};
use crate::error::CodecError;
use bytes::BytesMut;

/// A decoded or to-be-encoded SFS2X message.
#[derive(Debug, Clone, PartialEq)]
pub struct SfsMessage {
    pub controller: i32,
    pub action: i16,
    pub params: SfsObject,
    pub room: Option<i32>,
}

impl SfsMessage {
    pub fn new(controller: i32, action: i16, params: SfsObject) -> Self {
        Self {
            controller,
            action,
            params,
            room: None,
        }
    }

    pub fn with_room(mut self, room: i32) -> Self {
        self.room = Some(room);
        self
    }

    /// Encodes this message as a single `SFS_OBJECT` wrapping the `c`, `a`,
    /// `p`, and optional `r` keys, and returns its serialized wire bytes.
    pub fn encode(&self) -> BytesMut {
        let mut outer = SfsObject::new();
        outer.insert("c", TypedValue::Int(self.controller));
        outer.insert("a", TypedValue::Short(self.action));
        outer.insert("p", TypedValue::SfsObject(self.params.clone()));
        if let Some(room) = self.room {
            outer.insert("r", TypedValue::Int(room));
        }

        let mut buf = BytesMut::new();
        TypedValue::SfsObject(outer).encode(&mut buf);
        buf
    }

    /// Decodes a message from its wire-level `SFS_OBJECT` envelope.
    pub fn decode(src: &[u8]) -> Result<Self, CodecError> {
        let (value, _) = TypedValue::decode(src)?;
        let outer = value.as_object()?;

        let controller = outer
            .get("c")
            .ok_or(CodecError::UnexpectedEof)?
            .as_int()?;
        let action = outer
            .get("a")
            .ok_or(CodecError::UnexpectedEof)?
            .as_short()?;
        let params = match outer.get("p") {
            Some(value) => value.as_object()?.clone(),
            None => SfsObject::new(),
        };
        let room = match outer.get("r") {
            Some(value) => Some(value.as_int()?),
            None => None,
        };

        Ok(SfsMessage {
            controller,
            action,
            params,
            room,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_without_room() {
        let params = SfsObject::new().with("name", TypedValue::Utf("lobby-a".into()));
        let message = SfsMessage::new(0, 1, params);

        let bytes = message.encode();
        let decoded = SfsMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn roundtrip_with_room() {
        let params = SfsObject::new().with("ready", TypedValue::Bool(true));
        let message = SfsMessage::new(1, 5, params).with_room(42);

        let bytes = message.encode();
        let decoded = SfsMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.room, Some(42));
        assert_eq!(decoded, message);
    }

    #[test]
    fn missing_params_defaults_to_empty_object() {
        let mut outer = SfsObject::new();
        outer.insert("c", TypedValue::Int(0));
        outer.insert("a", TypedValue::Short(2));
        let mut buf = BytesMut::new();
        TypedValue::SfsObject(outer).encode(&mut buf);

        let decoded = SfsMessage::decode(&buf).unwrap();
        assert!(decoded.params.is_empty());
        assert_eq!(decoded.room, None);
    }
}
