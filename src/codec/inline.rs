//! Codec for the inlined-command wire layout.

use std::sync::Arc;

use crate::error::{FramelinkError, Result};
use crate::protocol::wire_format::{
    InlineHeader, ERROR_CODE_SIZE, INLINE_HEADER_SIZE, MAX_BODY_LEN,
};
use crate::protocol::Packet;

use super::{decode_body, encode_body, Codec, SchemaRegistry, Transform};

/// Codec using the 6-byte header that carries the command.
///
/// Frame layout: `[header][error code u32 LE, flag bit 2][body]`. The
/// length field counts body bytes only, so a zero-length ping packet is a
/// bare header.
pub struct InlineCodec {
    registry: SchemaRegistry,
    encode_transform: Option<Arc<dyn Transform>>,
    decode_transform: Option<Arc<dyn Transform>>,
}

impl InlineCodec {
    /// Create a codec over the given registry, with no transforms.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            encode_transform: None,
            decode_transform: None,
        }
    }

    /// Attach a pair of mutually inverse whole-packet transforms.
    pub fn with_transforms(
        mut self,
        encode: Arc<dyn Transform>,
        decode: Arc<dyn Transform>,
    ) -> Self {
        self.encode_transform = Some(encode);
        self.decode_transform = Some(decode);
        self
    }

    fn min_declared_len(header: &InlineHeader) -> usize {
        if header.has_error_code() {
            ERROR_CODE_SIZE
        } else {
            0
        }
    }
}

impl Codec for InlineCodec {
    fn header_size(&self) -> usize {
        INLINE_HEADER_SIZE
    }

    fn peek_frame_len(&self, prefix: &[u8]) -> Result<Option<usize>> {
        if prefix.len() < INLINE_HEADER_SIZE {
            return Ok(None);
        }
        let mut copy = [0u8; INLINE_HEADER_SIZE];
        copy.copy_from_slice(&prefix[..INLINE_HEADER_SIZE]);
        if let Some(transform) = &self.decode_transform {
            transform.apply(&mut copy)?;
        }
        let header = match InlineHeader::read_from(&copy) {
            Some(h) => h,
            None => return Ok(None),
        };
        let declared = header.len() as usize;
        if declared < Self::min_declared_len(&header) {
            return Err(FramelinkError::Protocol(format!(
                "declared length {} below minimum {}",
                declared,
                Self::min_declared_len(&header)
            )));
        }
        Ok(Some(INLINE_HEADER_SIZE + declared))
    }

    fn encode(&self, packet: &Packet) -> Result<Vec<u8>> {
        let body = encode_body(&self.registry, packet)?;
        if body.len() > MAX_BODY_LEN as usize {
            return Err(FramelinkError::Protocol(format!(
                "body of {} bytes exceeds 24-bit length field",
                body.len()
            )));
        }

        let mut buf = vec![0u8; INLINE_HEADER_SIZE + body.len()];
        InlineHeader::new(body.len() as u32, 0, packet.command()).write_to(&mut buf);
        buf[INLINE_HEADER_SIZE..].copy_from_slice(&body);

        if let Some(transform) = &self.encode_transform {
            transform.apply(&mut buf)?;
        }
        Ok(buf)
    }

    fn decode(&self, frame: &mut [u8]) -> Result<Packet> {
        if let Some(transform) = &self.decode_transform {
            transform.apply(frame)?;
        }

        let header = InlineHeader::read_from(frame).ok_or_else(|| {
            FramelinkError::Protocol(format!("frame of {} bytes has no header", frame.len()))
        })?;
        let declared = header.len() as usize;
        if frame.len() != INLINE_HEADER_SIZE + declared {
            return Err(FramelinkError::Protocol(format!(
                "frame length {} does not match declared {}",
                frame.len(),
                INLINE_HEADER_SIZE + declared
            )));
        }
        if declared < Self::min_declared_len(&header) {
            return Err(FramelinkError::Protocol(format!(
                "declared length {} below minimum {}",
                declared,
                Self::min_declared_len(&header)
            )));
        }

        let command = header.command();
        let mut offset = INLINE_HEADER_SIZE;
        let mut error_code = 0u32;
        if header.has_error_code() {
            error_code = u32::from_le_bytes([
                frame[offset],
                frame[offset + 1],
                frame[offset + 2],
                frame[offset + 3],
            ]);
            offset += ERROR_CODE_SIZE;
        }

        let body = decode_body(&self.registry, command, &frame[offset..])?;
        Ok(Packet::decoded(command, error_code, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::XorTransform;
    use crate::protocol::wire_format::flags;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Move {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_encode_exact_layout() {
        let codec = InlineCodec::new(SchemaRegistry::new());
        let bytes = codec.encode(&Packet::raw(0x0701, &b"\xAA\xBB"[..])).unwrap();
        // len=2, flags=0, command 0x0701 LE, then the body.
        assert_eq!(bytes, vec![0x02, 0x00, 0x00, 0x00, 0x01, 0x07, 0xAA, 0xBB]);
    }

    #[test]
    fn test_zero_length_body_is_a_valid_ping() {
        let codec = InlineCodec::new(SchemaRegistry::new());
        let mut bytes = codec.encode(&Packet::raw(12, Vec::new())).unwrap();
        assert_eq!(bytes.len(), INLINE_HEADER_SIZE);

        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.command(), 12);
        assert_eq!(packet.raw_body(), Some(&b""[..]));
    }

    #[test]
    fn test_structured_roundtrip() {
        let mut registry = SchemaRegistry::new();
        registry.register_msgpack::<Move>(2);
        let codec = InlineCodec::new(registry);

        let mut bytes = codec
            .encode(&Packet::message(2, Move { x: -4, y: 17 }))
            .unwrap();
        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.message_as::<Move>(), Some(&Move { x: -4, y: 17 }));
    }

    #[test]
    fn test_unknown_command_preserved_as_raw() {
        let codec = InlineCodec::new(SchemaRegistry::new());
        let mut bytes = codec.encode(&Packet::raw(600, &b"opaque"[..])).unwrap();
        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.command(), 600);
        assert_eq!(packet.raw_body(), Some(&b"opaque"[..]));
    }

    #[test]
    fn test_error_code_consumes_body_prefix() {
        let mut frame = Vec::new();
        let mut header = [0u8; INLINE_HEADER_SIZE];
        InlineHeader::new(4, flags::HAS_ERROR_CODE, 9).write_to(&mut header);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&77u32.to_le_bytes());

        let codec = InlineCodec::new(SchemaRegistry::new());
        let packet = codec.decode(&mut frame).unwrap();
        assert_eq!(packet.command(), 9);
        assert_eq!(packet.error_code(), 77);
        assert_eq!(packet.raw_body(), Some(&b""[..]));
    }

    #[test]
    fn test_error_flag_with_short_body_is_fatal() {
        let mut frame = vec![0u8; INLINE_HEADER_SIZE + 2];
        InlineHeader::new(2, flags::HAS_ERROR_CODE, 9).write_to(&mut frame);
        let codec = InlineCodec::new(SchemaRegistry::new());
        assert!(codec.decode(&mut frame).is_err());
        assert!(codec.peek_frame_len(&frame[..INLINE_HEADER_SIZE]).is_err());
    }

    #[test]
    fn test_peek_insufficient_data_is_none() {
        let codec = InlineCodec::new(SchemaRegistry::new());
        assert_eq!(codec.peek_frame_len(&[0x02, 0x00, 0x00, 0x00, 0x01]).unwrap(), None);
    }

    #[test]
    fn test_transform_roundtrip() {
        let transform = Arc::new(XorTransform::new(vec![0x5A, 0xC3]));
        let codec = InlineCodec::new(SchemaRegistry::new())
            .with_transforms(transform.clone(), transform.clone());

        let clear = InlineCodec::new(SchemaRegistry::new())
            .encode(&Packet::raw(5, &b"body"[..]))
            .unwrap();
        let mut bytes = codec.encode(&Packet::raw(5, &b"body"[..])).unwrap();
        assert_ne!(bytes, clear);
        assert_eq!(bytes.len(), clear.len());

        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.raw_body(), Some(&b"body"[..]));
    }
}
