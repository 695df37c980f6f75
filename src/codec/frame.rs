//! Length-prefixed frame header and the `tokio_util` codec that drives the
//! direct TCP transport (C8).
//!
//! Every frame on the wire is a 1-byte flags field followed by either a
//! 2-byte or 4-byte big-endian length, chosen by the "big-size" bit in the
//! flags byte (spec.md §4.8 "Frame header"). Encryption and compression
//! flags exist in the bit layout for protocol compatibility but aren't
//! supported here; a frame that sets either is rejected rather than
//! silently misparsed.

use crate::error::CodecError;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const FLAG_BIG_SIZE: u8 = 0b0000_0001;
const FLAG_ENCRYPTED: u8 = 0b0000_0010;
const FLAG_COMPRESSED: u8 = 0b0000_0100;

/// The decoded form of a frame's 1-byte flags + length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub big_size: bool,
    pub length: usize,
}

impl FrameHeader {
    /// Size in bytes of this header once encoded (1 flag byte + 2 or 4 length bytes).
    pub fn encoded_len(&self) -> usize {
        1 + if self.big_size { 4 } else { 2 }
    }

    fn for_payload(len: usize) -> Self {
        FrameHeader {
            big_size: len > u16::MAX as usize,
            length: len,
        }
    }
}

/// A [`tokio_util::codec::Decoder`]/[`Encoder`] pair for the direct TCP
/// transport's frames, carrying raw payload bytes (an encoded
/// [`super::SfsMessage`]) in and out.
pub struct PacketCodec {
    max_frame_size: usize,
}

impl PacketCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(super::DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for PacketCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }

        let flags = src[0];
        if flags & (FLAG_ENCRYPTED | FLAG_COMPRESSED) != 0 {
            return Err(CodecError::UnsupportedFlags);
        }
        let big_size = flags & FLAG_BIG_SIZE != 0;
        let header_len = 1 + if big_size { 4 } else { 2 };

        if src.len() < header_len {
            return Ok(None);
        }

        let length = if big_size {
            u32::from_be_bytes(src[1..5].try_into().unwrap()) as usize
        } else {
            u16::from_be_bytes(src[1..3].try_into().unwrap()) as usize
        };

        if length > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(length));
        }

        if src.len() < header_len + length {
            src.reserve(header_len + length - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let payload = src.split_to(length);
        Ok(Some(payload))
    }
}

impl Encoder<BytesMut> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: BytesMut, dst: &mut BytesMut) -> Result<(), CodecError> {
        if item.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge(item.len()));
        }

        let header = FrameHeader::for_payload(item.len());
        dst.reserve(header.encoded_len() + item.len());

        let flags = if header.big_size { FLAG_BIG_SIZE } else { 0 };
        dst.put_u8(flags);
        if header.big_size {
            dst.put_u32(header.length as u32);
        } else {
            dst.put_u16(header.length as u16);
        }
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_small_frame() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();
        let payload = BytesMut::from(&b"hello"[..]);
        codec.encode(payload.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_frame_returns_none() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&[0u8, 0, 10][..]); // declares 10 bytes, has 0
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn big_size_flag_selects_wide_length() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();
        let payload = BytesMut::from(&vec![7u8; 70_000][..]);
        codec.encode(payload.clone(), &mut buf).unwrap();

        assert_eq!(buf[0] & FLAG_BIG_SIZE, FLAG_BIG_SIZE);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn encrypted_flag_rejected() {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::from(&[FLAG_ENCRYPTED, 0, 1, 9][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFlags));
    }

    #[test]
    fn oversized_declared_length_rejected() {
        let mut codec = PacketCodec::new(4);
        let mut buf = BytesMut::from(&[FLAG_BIG_SIZE, 0, 0, 0, 100][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge(100)));
    }
}
