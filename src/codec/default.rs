//! Codec for the separate-command wire layout.

use std::sync::Arc;

use crate::error::{FramelinkError, Result};
use crate::protocol::wire_format::{
    FrameHeader, COMMAND_SIZE, ERROR_CODE_SIZE, FRAME_HEADER_SIZE, MAX_BODY_LEN,
};
use crate::protocol::Packet;

use super::{decode_body, encode_body, Codec, SchemaRegistry, Transform};

/// Codec using the 4-byte header with the command after the header.
///
/// Frame layout: `[header][command u16 LE][error code u32 LE, flag bit 2]
/// [body]`. The header's length field counts everything after the header,
/// so the smallest valid declared length is the 2-byte command.
pub struct DefaultCodec {
    registry: SchemaRegistry,
    encode_transform: Option<Arc<dyn Transform>>,
    decode_transform: Option<Arc<dyn Transform>>,
}

impl DefaultCodec {
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

    /// Minimum declared length for a header with the given flags.
    fn min_declared_len(header: &FrameHeader) -> usize {
        if header.has_error_code() {
            COMMAND_SIZE + ERROR_CODE_SIZE
        } else {
            COMMAND_SIZE
        }
    }
}

impl Codec for DefaultCodec {
    fn header_size(&self) -> usize {
        FRAME_HEADER_SIZE
    }

    fn peek_frame_len(&self, prefix: &[u8]) -> Result<Option<usize>> {
        if prefix.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let mut copy = [0u8; FRAME_HEADER_SIZE];
        copy.copy_from_slice(&prefix[..FRAME_HEADER_SIZE]);
        if let Some(transform) = &self.decode_transform {
            transform.apply(&mut copy)?;
        }
        let header = match FrameHeader::read_from(&copy) {
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
        Ok(Some(FRAME_HEADER_SIZE + declared))
    }

    fn encode(&self, packet: &Packet) -> Result<Vec<u8>> {
        let body = encode_body(&self.registry, packet)?;
        let declared = COMMAND_SIZE + body.len();
        if declared > MAX_BODY_LEN as usize {
            return Err(FramelinkError::Protocol(format!(
                "body of {} bytes exceeds 24-bit length field",
                body.len()
            )));
        }

        let mut buf = vec![0u8; FRAME_HEADER_SIZE + declared];
        FrameHeader::new(declared as u32, 0).write_to(&mut buf);
        buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + COMMAND_SIZE]
            .copy_from_slice(&packet.command().to_le_bytes());
        buf[FRAME_HEADER_SIZE + COMMAND_SIZE..].copy_from_slice(&body);

        if let Some(transform) = &self.encode_transform {
            transform.apply(&mut buf)?;
        }
        Ok(buf)
    }

    fn decode(&self, frame: &mut [u8]) -> Result<Packet> {
        if let Some(transform) = &self.decode_transform {
            transform.apply(frame)?;
        }

        let header = FrameHeader::read_from(frame).ok_or_else(|| {
            FramelinkError::Protocol(format!("frame of {} bytes has no header", frame.len()))
        })?;
        let declared = header.len() as usize;
        if frame.len() != FRAME_HEADER_SIZE + declared {
            return Err(FramelinkError::Protocol(format!(
                "frame length {} does not match declared {}",
                frame.len(),
                FRAME_HEADER_SIZE + declared
            )));
        }
        if declared < Self::min_declared_len(&header) {
            return Err(FramelinkError::Protocol(format!(
                "declared length {} below minimum {}",
                declared,
                Self::min_declared_len(&header)
            )));
        }

        let command = u16::from_le_bytes([frame[FRAME_HEADER_SIZE], frame[FRAME_HEADER_SIZE + 1]]);
        let mut offset = FRAME_HEADER_SIZE + COMMAND_SIZE;
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
    struct Chat {
        text: String,
    }

    fn codec_with_chat() -> DefaultCodec {
        let mut registry = SchemaRegistry::new();
        registry.register_msgpack::<Chat>(1);
        DefaultCodec::new(registry)
    }

    #[test]
    fn test_encode_exact_layout() {
        // command=7, body 01 02 03: declared length 5 (2 command + 3 body),
        // header bytes 05 00 00 00, then 07 00, then the body.
        let codec = DefaultCodec::new(SchemaRegistry::new());
        let bytes = codec
            .encode(&Packet::raw(7, &b"\x01\x02\x03"[..]))
            .unwrap();
        assert_eq!(
            bytes,
            vec![0x05, 0x00, 0x00, 0x00, 0x07, 0x00, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn test_structured_roundtrip() {
        let codec = codec_with_chat();
        let original = Chat {
            text: "hello".to_string(),
        };
        let mut bytes = codec.encode(&Packet::message(1, Chat { text: "hello".to_string() })).unwrap();

        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.command(), 1);
        assert_eq!(packet.error_code(), 0);
        assert_eq!(packet.message_as::<Chat>(), Some(&original));
    }

    #[test]
    fn test_unknown_command_preserved_as_raw() {
        let codec = codec_with_chat();
        let mut bytes = codec.encode(&Packet::raw(99, &b"\xDE\xAD\xBE\xEF"[..])).unwrap();

        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.command(), 99);
        assert_eq!(packet.raw_body(), Some(&b"\xDE\xAD\xBE\xEF"[..]));
    }

    #[test]
    fn test_empty_body_roundtrip() {
        let codec = DefaultCodec::new(SchemaRegistry::new());
        let mut bytes = codec.encode(&Packet::raw(3, Vec::new())).unwrap();
        assert_eq!(bytes.len(), FRAME_HEADER_SIZE + COMMAND_SIZE);

        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.command(), 3);
        assert_eq!(packet.raw_body(), Some(&b""[..]));
    }

    #[test]
    fn test_structured_body_without_schema_is_encode_error() {
        let codec = DefaultCodec::new(SchemaRegistry::new());
        let err = codec
            .encode(&Packet::message(5, Chat { text: "x".to_string() }))
            .unwrap_err();
        assert!(matches!(err, FramelinkError::SchemaNotFound(5)));
    }

    #[test]
    fn test_error_code_shifts_body_offset() {
        // Hand-built frame: declared = 2 command + 4 error code + 2 body.
        let mut frame = Vec::new();
        let mut header = [0u8; FRAME_HEADER_SIZE];
        FrameHeader::new(8, flags::HAS_ERROR_CODE).write_to(&mut header);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&42u16.to_le_bytes());
        frame.extend_from_slice(&1002u32.to_le_bytes());
        frame.extend_from_slice(b"\x0A\x0B");

        let codec = DefaultCodec::new(SchemaRegistry::new());
        let packet = codec.decode(&mut frame).unwrap();
        assert_eq!(packet.command(), 42);
        assert_eq!(packet.error_code(), 1002);
        assert_eq!(packet.raw_body(), Some(&b"\x0A\x0B"[..]));
    }

    #[test]
    fn test_declared_length_below_command_is_fatal() {
        let mut frame = vec![0u8; FRAME_HEADER_SIZE + 1];
        FrameHeader::new(1, 0).write_to(&mut frame);
        let codec = DefaultCodec::new(SchemaRegistry::new());
        assert!(codec.decode(&mut frame).is_err());
        // The same header must already fail at peek time.
        assert!(codec.peek_frame_len(&frame[..FRAME_HEADER_SIZE]).is_err());
    }

    #[test]
    fn test_schema_parse_failure_is_fatal() {
        let codec = codec_with_chat();
        // Valid framing, body that is not a msgpack Chat.
        let mut bytes = {
            let plain = DefaultCodec::new(SchemaRegistry::new());
            plain.encode(&Packet::raw(1, &b"\xFF\xFF"[..])).unwrap()
        };
        assert!(codec.decode(&mut bytes).is_err());
    }

    #[test]
    fn test_peek_insufficient_data_is_none() {
        let codec = DefaultCodec::new(SchemaRegistry::new());
        assert_eq!(codec.peek_frame_len(&[0x05, 0x00]).unwrap(), None);
    }

    #[test]
    fn test_peek_reports_full_frame_len() {
        let codec = DefaultCodec::new(SchemaRegistry::new());
        let bytes = codec.encode(&Packet::raw(7, &b"\x01\x02\x03"[..])).unwrap();
        let len = codec.peek_frame_len(&bytes[..FRAME_HEADER_SIZE]).unwrap();
        assert_eq!(len, Some(bytes.len()));
    }

    #[test]
    fn test_transform_roundtrip() {
        let transform = Arc::new(XorTransform::new(vec![0x5A]));
        let mut registry = SchemaRegistry::new();
        registry.register_msgpack::<Chat>(1);
        let codec =
            DefaultCodec::new(registry).with_transforms(transform.clone(), transform.clone());

        let mut bytes = codec
            .encode(&Packet::message(1, Chat { text: "xor".to_string() }))
            .unwrap();
        // Whole packet is transformed: the header is no longer readable in
        // the clear.
        assert!(FrameHeader::read_from(&bytes)
            .map(|h| h.len() as usize != bytes.len() - FRAME_HEADER_SIZE)
            .unwrap_or(true));

        let len = codec.peek_frame_len(&bytes[..FRAME_HEADER_SIZE]).unwrap();
        assert_eq!(len, Some(bytes.len()));

        let packet = codec.decode(&mut bytes).unwrap();
        assert_eq!(packet.message_as::<Chat>().unwrap().text, "xor");
    }

    #[test]
    fn test_peek_does_not_mutate_prefix() {
        let transform = Arc::new(XorTransform::new(vec![0x5A]));
        let codec = DefaultCodec::new(SchemaRegistry::new())
            .with_transforms(transform.clone(), transform.clone());

        let bytes = codec.encode(&Packet::raw(7, &b"\x01\x02\x03"[..])).unwrap();
        let before = bytes.clone();
        codec.peek_frame_len(&bytes[..FRAME_HEADER_SIZE]).unwrap();
        codec.peek_frame_len(&bytes[..FRAME_HEADER_SIZE]).unwrap();
        assert_eq!(bytes, before);
    }

    #[test]
    fn test_corrupted_transformed_byte_does_not_silently_decode() {
        let transform = Arc::new(XorTransform::new(vec![0x5A]));
        let codec = DefaultCodec::new(SchemaRegistry::new())
            .with_transforms(transform.clone(), transform.clone());

        let mut bytes = codec.encode(&Packet::raw(7, &b"\x01\x02\x03"[..])).unwrap();
        bytes[0] ^= 0x01; // corrupt the transformed length byte
        assert!(codec.decode(&mut bytes).is_err());
    }
}
