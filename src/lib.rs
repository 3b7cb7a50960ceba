//! # framelink
//!
//! Client-side framed packet protocol layer for TCP and WebSocket
//! transports.
//!
//! The crate is built around three pieces:
//!
//! - **Framing**: packed little-endian headers carrying a 24-bit body
//!   length, flags, and (in one layout) the command id.
//! - **Codec**: turns `(command, body)` pairs into framed bytes and back,
//!   resolving structured bodies through a schema registry and running an
//!   optional reversible transform (XOR cipher or similar) over whole
//!   framed packets.
//! - **Reassembly**: a fixed-capacity buffer that converts arbitrarily
//!   chunked transport reads into an ordered sequence of decoded packets,
//!   never losing or duplicating a byte.
//!
//! Connections drive the transport asynchronously on a tokio runtime.
//! Applications send from any thread and poll decoded packets from a
//! thread-safe queue.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use framelink::codec::{DefaultCodec, SchemaRegistry};
//! use framelink::connection::{Connection, ConnectionConfig, TcpConnection};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug)]
//! struct Login { account: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = SchemaRegistry::new();
//!     registry.register_msgpack::<Login>(10);
//!
//!     let config = ConnectionConfig::new(Arc::new(DefaultCodec::new(registry)));
//!     let conn = TcpConnection::new(config, 1);
//!     conn.set_on_connected(Box::new(|success| {
//!         println!("connected: {success}");
//!     }));
//!     conn.connect("127.0.0.1:9000");
//!
//!     // ... once connected:
//!     conn.send(10, Box::new(Login { account: "player1".into() }));
//!     while let Some(packet) = conn.pop_packet() {
//!         println!("got command {}", packet.command());
//!     }
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod protocol;

mod writer;

pub use codec::{
    Codec, DefaultCodec, InlineCodec, MessageSchema, MsgPackSchema, SchemaRegistry, Transform,
    XorTransform,
};
pub use connection::{
    CloseCallback, ConnState, ConnectedCallback, Connection, ConnectionConfig, TcpConnection,
    WsConnection,
};
pub use error::{FramelinkError, Result};
pub use protocol::{Message, Packet, PacketBody, Reassembler};
