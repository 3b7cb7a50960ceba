//! Packet type with typed accessors.
//!
//! A [`Packet`] is one decoded protocol unit: a command id, an error code
//! (0 when absent on the wire) and a body that is either a structured
//! message parsed by a registered schema or the raw body bytes of a command
//! nobody registered a schema for.

use std::any::Any;
use std::fmt;

use bytes::Bytes;

/// A structured message body.
///
/// Implemented automatically for every `'static` type that is `Debug`,
/// `Send` and `Sync`, so application message structs need no extra trait
/// impls. `as_any` exists so schema codecs can downcast back to the
/// concrete type.
pub trait Message: fmt::Debug + Send + Sync {
    /// Upcast for downcasting to the concrete message type.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> Message for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Body of a decoded packet. Exactly one representation is populated.
#[derive(Debug)]
pub enum PacketBody {
    /// Parsed by the schema registered for the packet's command.
    Message(Box<dyn Message>),
    /// Verbatim body bytes of a command with no registered schema.
    Raw(Bytes),
}

/// A decoded protocol unit.
#[derive(Debug)]
pub struct Packet {
    command: u16,
    error_code: u32,
    body: PacketBody,
}

impl Packet {
    /// Create a packet with a structured message body.
    pub fn message<M: Message + 'static>(command: u16, message: M) -> Self {
        Self {
            command,
            error_code: 0,
            body: PacketBody::Message(Box::new(message)),
        }
    }

    /// Create a packet from an already-boxed message.
    pub fn from_boxed(command: u16, message: Box<dyn Message>) -> Self {
        Self {
            command,
            error_code: 0,
            body: PacketBody::Message(message),
        }
    }

    /// Create a packet with an opaque byte body.
    pub fn raw(command: u16, body: impl Into<Bytes>) -> Self {
        Self {
            command,
            error_code: 0,
            body: PacketBody::Raw(body.into()),
        }
    }

    pub(crate) fn decoded(command: u16, error_code: u32, body: PacketBody) -> Self {
        Self {
            command,
            error_code,
            body,
        }
    }

    /// Command id of this packet.
    #[inline]
    pub fn command(&self) -> u16 {
        self.command
    }

    /// Error code carried by this packet, 0 when absent.
    #[inline]
    pub fn error_code(&self) -> u32 {
        self.error_code
    }

    /// The packet body.
    #[inline]
    pub fn body(&self) -> &PacketBody {
        &self.body
    }

    /// Consume the packet, returning its body.
    pub fn into_body(self) -> PacketBody {
        self.body
    }

    /// The structured message body, if this packet has one.
    pub fn message_body(&self) -> Option<&dyn Message> {
        match &self.body {
            PacketBody::Message(m) => Some(m.as_ref()),
            PacketBody::Raw(_) => None,
        }
    }

    /// Downcast the structured message body to a concrete type.
    pub fn message_as<T: 'static>(&self) -> Option<&T> {
        self.message_body()?.as_any().downcast_ref::<T>()
    }

    /// The raw byte body, if this packet carries one.
    pub fn raw_body(&self) -> Option<&[u8]> {
        match &self.body {
            PacketBody::Raw(b) => Some(b),
            PacketBody::Message(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn test_message_packet_accessors() {
        let packet = Packet::message(7, Ping { seq: 3 });
        assert_eq!(packet.command(), 7);
        assert_eq!(packet.error_code(), 0);
        assert!(packet.raw_body().is_none());
        assert_eq!(packet.message_as::<Ping>(), Some(&Ping { seq: 3 }));
    }

    #[test]
    fn test_raw_packet_accessors() {
        let packet = Packet::raw(9, &b"\x01\x02"[..]);
        assert_eq!(packet.command(), 9);
        assert!(packet.message_body().is_none());
        assert_eq!(packet.raw_body(), Some(&b"\x01\x02"[..]));
    }

    #[test]
    fn test_downcast_wrong_type_is_none() {
        let packet = Packet::message(1, Ping { seq: 0 });
        assert!(packet.message_as::<String>().is_none());
    }

    #[test]
    fn test_decoded_carries_error_code() {
        let packet = Packet::decoded(4, 1002, PacketBody::Raw(Bytes::new()));
        assert_eq!(packet.error_code(), 1002);
    }
}
