//! Typed value representation and codec (C1).
//!
//! [`TypedValue`] is a tagged sum type mirroring the dynamic typing the
//! SFS2X wire format itself uses: the reader can't statically know what
//! shape a value has, so every accessor does a runtime tag check rather
//! than trying to fake static typing over a self-describing wire (see
//! spec.md §9 "Dynamic typing in the typed-value system").

use super::tag;
use crate::error::CodecError;
use bytes::{Buf, BufMut, BytesMut};

/// Threshold past which a string is written as `TEXT` (4-byte length
/// prefix) rather than `UTF_STRING` (2-byte length prefix). Decoders accept
/// either form everywhere a string appears (spec.md §4.1).
const MAX_SHORT_STRING_LEN: usize = i16::MAX as usize; // 32767, per spec.md

/// An ordered, unique-keyed map from `UTF_STRING` keys to [`TypedValue`]s —
/// the wire shape of `SFS_OBJECT`. Iteration order is insertion order;
/// inserting an existing key replaces its value in place rather than
/// moving it to the end, matching a plain ordered-dictionary's semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SfsObject {
    entries: Vec<(String, TypedValue)>,
}

impl SfsObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: TypedValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Builder-style insert, useful for constructing literal objects inline.
    pub fn with(mut self, key: impl Into<String>, value: TypedValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&TypedValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A tagged SFS2X value. See spec.md §3 for the full wire-width table.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Utf(String),
    BoolArray(Vec<bool>),
    ByteArray(Vec<i8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    UtfArray(Vec<String>),
    SfsArray(Vec<TypedValue>),
    SfsObject(SfsObject),
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $out:ty, $label:literal) => {
        pub fn $name(&self) -> Result<$out, CodecError> {
            match self {
                TypedValue::$variant(value) => Ok(value.clone()),
                other => Err(CodecError::TypeMismatch {
                    expected: $label,
                    found: other.type_name(),
                }),
            }
        }
    };
}

impl TypedValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Null => "NULL",
            TypedValue::Bool(_) => "BOOL",
            TypedValue::Byte(_) => "BYTE",
            TypedValue::Short(_) => "SHORT",
            TypedValue::Int(_) => "INT",
            TypedValue::Long(_) => "LONG",
            TypedValue::Float(_) => "FLOAT",
            TypedValue::Double(_) => "DOUBLE",
            TypedValue::Utf(_) => "UTF_STRING",
            TypedValue::BoolArray(_) => "BOOL_ARRAY",
            TypedValue::ByteArray(_) => "BYTE_ARRAY",
            TypedValue::ShortArray(_) => "SHORT_ARRAY",
            TypedValue::IntArray(_) => "INT_ARRAY",
            TypedValue::LongArray(_) => "LONG_ARRAY",
            TypedValue::FloatArray(_) => "FLOAT_ARRAY",
            TypedValue::DoubleArray(_) => "DOUBLE_ARRAY",
            TypedValue::UtfArray(_) => "UTF_STRING_ARRAY",
            TypedValue::SfsArray(_) => "SFS_ARRAY",
            TypedValue::SfsObject(_) => "SFS_OBJECT",
        }
    }

    accessor!(as_bool, Bool, bool, "BOOL");
    accessor!(as_byte, Byte, i8, "BYTE");
    accessor!(as_short, Short, i16, "SHORT");
    accessor!(as_int, Int, i32, "INT");
    accessor!(as_long, Long, i64, "LONG");
    accessor!(as_float, Float, f32, "FLOAT");
    accessor!(as_double, Double, f64, "DOUBLE");
    accessor!(as_bool_array, BoolArray, Vec<bool>, "BOOL_ARRAY");

    pub fn as_str(&self) -> Result<&str, CodecError> {
        match self {
            TypedValue::Utf(value) => Ok(value.as_str()),
            other => Err(CodecError::TypeMismatch {
                expected: "UTF_STRING",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_array(&self) -> Result<&[TypedValue], CodecError> {
        match self {
            TypedValue::SfsArray(value) => Ok(value.as_slice()),
            other => Err(CodecError::TypeMismatch {
                expected: "SFS_ARRAY",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_object(&self) -> Result<&SfsObject, CodecError> {
        match self {
            TypedValue::SfsObject(value) => Ok(value),
            other => Err(CodecError::TypeMismatch {
                expected: "SFS_OBJECT",
                found: other.type_name(),
            }),
        }
    }

    fn tag_byte(&self) -> u8 {
        match self {
            TypedValue::Null => tag::NULL,
            TypedValue::Bool(_) => tag::BOOL,
            TypedValue::Byte(_) => tag::BYTE,
            TypedValue::Short(_) => tag::SHORT,
            TypedValue::Int(_) => tag::INT,
            TypedValue::Long(_) => tag::LONG,
            TypedValue::Float(_) => tag::FLOAT,
            TypedValue::Double(_) => tag::DOUBLE,
            TypedValue::Utf(s) => {
                if s.len() > MAX_SHORT_STRING_LEN {
                    tag::TEXT
                } else {
                    tag::UTF_STRING
                }
            }
            TypedValue::BoolArray(_) => tag::BOOL_ARRAY,
            TypedValue::ByteArray(_) => tag::BYTE_ARRAY,
            TypedValue::ShortArray(_) => tag::SHORT_ARRAY,
            TypedValue::IntArray(_) => tag::INT_ARRAY,
            TypedValue::LongArray(_) => tag::LONG_ARRAY,
            TypedValue::FloatArray(_) => tag::FLOAT_ARRAY,
            TypedValue::DoubleArray(_) => tag::DOUBLE_ARRAY,
            TypedValue::UtfArray(_) => tag::UTF_STRING_ARRAY,
            TypedValue::SfsArray(_) => tag::SFS_ARRAY,
            TypedValue::SfsObject(_) => tag::SFS_OBJECT,
        }
    }

    /// Encodes `self` as a 1-byte tag followed by its body, appending to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.tag_byte());
        self.encode_body(dst);
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        match self {
            TypedValue::Null => {}
            TypedValue::Bool(v) => dst.put_u8(if *v { 1 } else { 0 }),
            TypedValue::Byte(v) => dst.put_i8(*v),
            TypedValue::Short(v) => dst.put_i16(*v),
            TypedValue::Int(v) => dst.put_i32(*v),
            TypedValue::Long(v) => dst.put_i64(*v),
            TypedValue::Float(v) => dst.put_f32(*v),
            TypedValue::Double(v) => dst.put_f64(*v),
            TypedValue::Utf(s) => encode_string_body(s, dst),
            TypedValue::BoolArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    dst.put_u8(if *v { 1 } else { 0 });
                }
            }
            TypedValue::ByteArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    dst.put_i8(*v);
                }
            }
            TypedValue::ShortArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    dst.put_i16(*v);
                }
            }
            TypedValue::IntArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    dst.put_i32(*v);
                }
            }
            TypedValue::LongArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    dst.put_i64(*v);
                }
            }
            TypedValue::FloatArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    dst.put_f32(*v);
                }
            }
            TypedValue::DoubleArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    dst.put_f64(*v);
                }
            }
            TypedValue::UtfArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    encode_string_body(v, dst);
                }
            }
            TypedValue::SfsArray(items) => {
                dst.put_u16(items.len() as u16);
                for v in items {
                    v.encode(dst);
                }
            }
            TypedValue::SfsObject(obj) => {
                dst.put_u16(obj.len() as u16);
                for (key, value) in obj.iter() {
                    encode_string_body(key, dst);
                    value.encode(dst);
                }
            }
        }
    }

    /// Decodes a tagged value from the front of `src`, returning the value
    /// and the number of bytes consumed.
    pub fn decode(src: &[u8]) -> Result<(TypedValue, usize), CodecError> {
        let mut cursor = Cursor::new(src);
        let value = decode_tagged(&mut cursor)?;
        Ok((value, cursor.pos))
    }
}

/// Picks `UTF_STRING` (2-byte prefix) unless the string would overflow it,
/// in which case it falls back to `TEXT` (4-byte prefix). Used for both the
/// top-level tag selection and for array/object elements that the wire
/// format always writes with a `UTF_STRING`-shaped body regardless of the
/// outer tag (only top-level standalone strings get promoted to `TEXT`).
fn encode_string_body(s: &str, dst: &mut BytesMut) {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_SHORT_STRING_LEN {
        dst.put_u32(bytes.len() as u32);
    } else {
        dst.put_u16(bytes.len() as u16);
    }
    dst.extend_from_slice(bytes);
}

struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.src.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.take(1)?[0] as i8)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let mut bytes = self.take(2)?;
        Ok(bytes.get_u16())
    }

    fn i16(&mut self) -> Result<i16, CodecError> {
        let mut bytes = self.take(2)?;
        Ok(bytes.get_i16())
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let mut bytes = self.take(4)?;
        Ok(bytes.get_u32())
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        let mut bytes = self.take(4)?;
        Ok(bytes.get_i32())
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        let mut bytes = self.take(8)?;
        Ok(bytes.get_i64())
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        let mut bytes = self.take(4)?;
        Ok(bytes.get_f32())
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        let mut bytes = self.take(8)?;
        Ok(bytes.get_f64())
    }

    /// Reads a length-prefixed string body. `wide` selects a 4-byte (TEXT)
    /// vs 2-byte (UTF_STRING) length prefix.
    fn string_body(&mut self, wide: bool) -> Result<String, CodecError> {
        let len = if wide {
            self.u32()? as usize
        } else {
            self.u16()? as usize
        };
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

fn decode_tagged(cursor: &mut Cursor<'_>) -> Result<TypedValue, CodecError> {
    let t = cursor.u8()?;
    decode_body(cursor, t)
}

fn decode_body(cursor: &mut Cursor<'_>, t: u8) -> Result<TypedValue, CodecError> {
    Ok(match t {
        tag::NULL => TypedValue::Null,
        tag::BOOL => TypedValue::Bool(cursor.u8()? != 0),
        tag::BYTE => TypedValue::Byte(cursor.i8()?),
        tag::SHORT => TypedValue::Short(cursor.i16()?),
        tag::INT => TypedValue::Int(cursor.i32()?),
        tag::LONG => TypedValue::Long(cursor.i64()?),
        tag::FLOAT => TypedValue::Float(cursor.f32()?),
        tag::DOUBLE => TypedValue::Double(cursor.f64()?),
        tag::UTF_STRING => TypedValue::Utf(cursor.string_body(false)?),
        tag::TEXT => TypedValue::Utf(cursor.string_body(true)?),
        tag::BOOL_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.u8()? != 0);
            }
            TypedValue::BoolArray(items)
        }
        tag::BYTE_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.i8()?);
            }
            TypedValue::ByteArray(items)
        }
        tag::SHORT_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.i16()?);
            }
            TypedValue::ShortArray(items)
        }
        tag::INT_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.i32()?);
            }
            TypedValue::IntArray(items)
        }
        tag::LONG_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.i64()?);
            }
            TypedValue::LongArray(items)
        }
        tag::FLOAT_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.f32()?);
            }
            TypedValue::FloatArray(items)
        }
        tag::DOUBLE_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.f64()?);
            }
            TypedValue::DoubleArray(items)
        }
        tag::UTF_STRING_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(cursor.string_body(false)?);
            }
            TypedValue::UtfArray(items)
        }
        tag::SFS_ARRAY => {
            let count = cursor.u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_tagged(cursor)?);
            }
            TypedValue::SfsArray(items)
        }
        tag::SFS_OBJECT => {
            let count = cursor.u16()? as usize;
            let mut obj = SfsObject::new();
            for _ in 0..count {
                let key = cursor.string_body(false)?;
                let value = decode_tagged(cursor)?;
                obj.insert(key, value);
            }
            TypedValue::SfsObject(obj)
        }
        other => return Err(CodecError::UnknownTag(other)),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(value: TypedValue) {
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        let (decoded, consumed) = TypedValue::decode(&buf).expect("decode failed");
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, value);

        // Idempotent: re-encoding the decoded value gives identical bytes.
        let mut buf2 = BytesMut::new();
        decoded.encode(&mut buf2);
        assert_eq!(buf, buf2);
    }

    #[test]
    fn roundtrip_primitives() {
        roundtrip(TypedValue::Null);
        roundtrip(TypedValue::Bool(true));
        roundtrip(TypedValue::Bool(false));
        roundtrip(TypedValue::Byte(-12));
        roundtrip(TypedValue::Short(-4096));
        roundtrip(TypedValue::Int(i32::MIN));
        roundtrip(TypedValue::Long(i64::MAX));
        roundtrip(TypedValue::Float(1.5));
        roundtrip(TypedValue::Double(-2.25));
        roundtrip(TypedValue::Utf("hello sfs2x".to_string()));
    }

    #[test]
    fn roundtrip_arrays() {
        roundtrip(TypedValue::BoolArray(vec![true, false, true]));
        roundtrip(TypedValue::ByteArray(vec![1, -1, 127, -128]));
        roundtrip(TypedValue::IntArray(vec![1, 2, 3]));
        roundtrip(TypedValue::UtfArray(vec!["a".into(), "bb".into()]));
    }

    #[test]
    fn roundtrip_nested_array_and_object() {
        let mut obj = SfsObject::new();
        obj.insert("name", TypedValue::Utf("Test Lobby".into()));
        obj.insert("max", TypedValue::Short(8));

        roundtrip(TypedValue::SfsArray(vec![
            TypedValue::Int(1),
            TypedValue::SfsObject(obj.clone()),
        ]));
        roundtrip(TypedValue::SfsObject(obj));
    }

    #[test]
    fn long_string_uses_text_tag() {
        let long = "x".repeat(40000);
        let value = TypedValue::Utf(long.clone());
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf[0], tag::TEXT);

        let (decoded, _) = TypedValue::decode(&buf).unwrap();
        assert_eq!(decoded.as_str().unwrap(), long);
    }

    #[test]
    fn unknown_tag_errors() {
        let bytes = [0xFFu8];
        let err = TypedValue::decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag(0xFF)));
    }

    #[test]
    fn truncated_buffer_errors() {
        let bytes = [tag::INT, 0x00, 0x00]; // declares an INT but only 2 body bytes
        let err = TypedValue::decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof));
    }

    #[test]
    fn object_keys_stay_unique_and_ordered() {
        let mut obj = SfsObject::new();
        obj.insert("a", TypedValue::Int(1));
        obj.insert("b", TypedValue::Int(2));
        obj.insert("a", TypedValue::Int(3));

        assert_eq!(obj.len(), 2);
        let keys: Vec<&str> = obj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(obj.get("a").unwrap().as_int().unwrap(), 3);
    }

    #[test]
    fn type_mismatch_accessor() {
        let value = TypedValue::Int(5);
        let err = value.as_str().unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }
}
