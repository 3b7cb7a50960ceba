//! Codec module - packet framing and unframing.
//!
//! A [`Codec`] turns a [`Packet`] into framed wire bytes and back. Two
//! variants exist, forming a closed set selected at connection
//! configuration time:
//!
//! - [`DefaultCodec`] - 4-byte header, command carried after the header.
//!   Used on stream transports (TCP).
//! - [`InlineCodec`] - 6-byte header with the command inlined. Used on
//!   message-oriented transports (WebSocket).
//!
//! Both resolve structured bodies through a [`SchemaRegistry`] and run an
//! optional [`Transform`] over whole framed packets.

mod default;
mod inline;
mod registry;
mod transform;

pub use default::DefaultCodec;
pub use inline::InlineCodec;
pub use registry::{MessageSchema, MsgPackSchema, SchemaRegistry};
pub use transform::{Transform, XorTransform};

use bytes::Bytes;

use crate::error::{FramelinkError, Result};
use crate::protocol::{Packet, PacketBody};

/// Frames packets for the wire and decodes framed bytes back into packets.
pub trait Codec: Send + Sync {
    /// Fixed size of this codec's packet header.
    fn header_size(&self) -> usize;

    /// Determine the total framed length (header included) from a
    /// header-size prefix, without touching the original bytes.
    ///
    /// Works on a private copy so a configured decode transform never
    /// corrupts the live receive buffer. Returns `Ok(None)` when fewer
    /// than `header_size` bytes were supplied; errors mean the header is
    /// malformed and the connection must die.
    fn peek_frame_len(&self, prefix: &[u8]) -> Result<Option<usize>>;

    /// Encode a packet into a complete framed byte sequence.
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>>;

    /// Decode one complete framed packet.
    ///
    /// The slice must span exactly the framed length reported by
    /// [`peek_frame_len`](Codec::peek_frame_len). The decode transform is
    /// applied in place, destructively, exactly once; callers must not
    /// reuse the slice contents afterwards.
    fn decode(&self, frame: &mut [u8]) -> Result<Packet>;
}

/// Serialize a packet body, resolving structured messages through the
/// registry.
pub(crate) fn encode_body(registry: &SchemaRegistry, packet: &Packet) -> Result<Vec<u8>> {
    match packet.body() {
        PacketBody::Message(message) => registry
            .resolve(packet.command())
            .ok_or(FramelinkError::SchemaNotFound(packet.command()))?
            .encode(packet.command(), message.as_ref()),
        PacketBody::Raw(bytes) => Ok(bytes.to_vec()),
    }
}

/// Deserialize a packet body. Unknown commands keep their bytes verbatim.
pub(crate) fn decode_body(registry: &SchemaRegistry, command: u16, body: &[u8]) -> Result<PacketBody> {
    match registry.resolve(command) {
        Some(schema) => Ok(PacketBody::Message(schema.decode(body)?)),
        None => Ok(PacketBody::Raw(Bytes::copy_from_slice(body))),
    }
}
