//! Receive reassembler - turning a chunked byte stream into packets.
//!
//! The transport delivers bytes in arbitrary-sized chunks; the reassembler
//! accumulates them in a fixed-capacity buffer and peels off complete
//! framed packets. It handles a header split across reads (the peeked
//! header is cached until the body arrives), multiple packets arriving in
//! one read, and compacts the buffer after every drain so the write offset
//! stays correct.
//!
//! No byte is ever lost or duplicated: bytes are consumed only when a full
//! frame was decoded, and compaction moves the unconsumed tail to offset 0.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use framelink::codec::{Codec, DefaultCodec, SchemaRegistry};
//! use framelink::protocol::{Packet, Reassembler};
//!
//! let codec = Arc::new(DefaultCodec::new(SchemaRegistry::new()));
//! let bytes = codec.encode(&Packet::raw(7, &b"\x01\x02\x03"[..])).unwrap();
//!
//! let mut reassembler = Reassembler::new(codec, 1024, 1024);
//! // First chunk holds only the header: nothing to emit yet.
//! assert!(reassembler.push(&bytes[..4]).unwrap().is_empty());
//! let packets = reassembler.push(&bytes[4..]).unwrap();
//! assert_eq!(packets.len(), 1);
//! assert_eq!(packets[0].command(), 7);
//! ```

use std::sync::Arc;

use crate::codec::Codec;
use crate::error::{FramelinkError, Result};
use crate::protocol::Packet;

/// Stateful stream-to-packet reassembler over a fixed-capacity buffer.
pub struct Reassembler {
    codec: Arc<dyn Codec>,
    buf: Box<[u8]>,
    /// Bytes currently buffered, always starting at offset 0.
    len: usize,
    /// Total framed length of the packet whose header was peeked but whose
    /// body has not fully arrived. Survives across reads.
    pending_frame_len: Option<usize>,
    max_packet_size: usize,
}

impl Reassembler {
    /// Create a reassembler with the given buffer capacity and per-packet
    /// size cap.
    ///
    /// The capacity must be at least as large as the biggest framed packet
    /// the protocol can carry; a declared length that cannot fit is a fatal
    /// error, not a recoverable one.
    pub fn new(codec: Arc<dyn Codec>, capacity: usize, max_packet_size: usize) -> Self {
        Self {
            codec,
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            pending_frame_len: None,
            max_packet_size,
        }
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn buffered(&self) -> usize {
        self.len
    }

    /// Free space available for the next transport read.
    pub fn free_capacity(&self) -> usize {
        self.buf.len() - self.len
    }

    /// The writable tail of the buffer, for transports that read directly
    /// into it. Follow with [`commit`](Reassembler::commit).
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Record `n` bytes written into [`writable`](Reassembler::writable)
    /// and drain all complete packets.
    pub fn commit(&mut self, n: usize) -> Result<Vec<Packet>> {
        debug_assert!(n <= self.free_capacity());
        self.len += n;
        self.drain()
    }

    /// Append a chunk and drain all complete packets.
    ///
    /// Errors if the chunk does not fit the remaining capacity: the buffer
    /// is undersized for the protocol in use, which configuration must
    /// guarantee against.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Packet>> {
        if chunk.len() > self.free_capacity() {
            return Err(FramelinkError::Protocol(format!(
                "receive buffer overflow: {} buffered + {} incoming exceeds capacity {}",
                self.len,
                chunk.len(),
                self.buf.len()
            )));
        }
        self.buf[self.len..self.len + chunk.len()].copy_from_slice(chunk);
        self.len += chunk.len();
        self.drain()
    }

    /// Peel complete packets off the front of the buffer, then compact.
    fn drain(&mut self) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        let mut read_index = 0;

        loop {
            let remaining = self.len - read_index;
            let frame_len = match self.pending_frame_len {
                Some(len) => len,
                None => {
                    let header_size = self.codec.header_size();
                    if remaining < header_size {
                        break;
                    }
                    // Peek from the prefix; the codec works on a private
                    // copy, so the live bytes stay pristine for decode.
                    let peeked = self
                        .codec
                        .peek_frame_len(&self.buf[read_index..read_index + header_size])?;
                    let frame_len = peeked.ok_or_else(|| {
                        FramelinkError::Protocol("header peek failed".to_string())
                    })?;
                    self.check_frame_len(frame_len)?;
                    self.pending_frame_len = Some(frame_len);
                    frame_len
                }
            };

            if remaining < frame_len {
                // Wait for more data; the cached header carries the length
                // into the next read.
                break;
            }

            let frame = &mut self.buf[read_index..read_index + frame_len];
            let packet = self.codec.decode(frame)?;
            packets.push(packet);
            self.pending_frame_len = None;
            read_index += frame_len;
        }

        if read_index > 0 {
            // Compaction: move the unconsumed tail to offset 0 so the next
            // read appends at the right place.
            self.buf.copy_within(read_index..self.len, 0);
            self.len -= read_index;
        }

        Ok(packets)
    }

    fn check_frame_len(&self, frame_len: usize) -> Result<()> {
        if frame_len > self.buf.len() {
            return Err(FramelinkError::Protocol(format!(
                "declared packet length {} exceeds receive buffer capacity {}",
                frame_len,
                self.buf.len()
            )));
        }
        if frame_len > self.max_packet_size {
            return Err(FramelinkError::Protocol(format!(
                "declared packet length {} exceeds max packet size {}",
                frame_len, self.max_packet_size
            )));
        }
        Ok(())
    }
}
