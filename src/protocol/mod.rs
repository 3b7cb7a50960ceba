//! Protocol module - wire format, packets, and stream reassembly.
//!
//! This module implements the framing layer:
//! - packed little-endian header encoding/decoding (both layouts)
//! - the decoded [`Packet`] type
//! - the [`Reassembler`] that turns chunked transport reads into packets

mod packet;
mod reassembler;
pub mod wire_format;

pub use packet::{Message, Packet, PacketBody};
pub use reassembler::Reassembler;
pub use wire_format::{
    flags, FrameHeader, InlineHeader, COMMAND_SIZE, ERROR_CODE_SIZE, FRAME_HEADER_SIZE,
    INLINE_HEADER_SIZE, MAX_BODY_LEN,
};
