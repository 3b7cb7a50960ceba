//! TCP connection driver.
//!
//! Reads go straight into the reassembler's free space, so one allocation
//! serves the whole connection lifetime and a read can never outrun the
//! configured buffer.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::protocol::{Message, Packet, Reassembler};
use crate::writer::spawn_writer_task;

use super::{
    CloseCallback, ConnState, ConnectedCallback, Connection, ConnectionConfig, ConnectionCore,
};

/// Connection over a raw TCP stream.
pub struct TcpConnection {
    core: Arc<ConnectionCore>,
}

impl TcpConnection {
    /// Create a connection with the given configuration and caller-chosen
    /// id. No I/O happens until [`connect`](Connection::connect).
    pub fn new(config: ConnectionConfig, connection_id: u32) -> Self {
        Self {
            core: ConnectionCore::new(config, connection_id),
        }
    }
}

impl Connection for TcpConnection {
    fn connection_id(&self) -> u32 {
        self.core.id()
    }

    fn state(&self) -> ConnState {
        self.core.state()
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn host_address(&self) -> Option<String> {
        self.core.host_address()
    }

    fn connect(&self, address: &str) -> bool {
        if !address.contains(':') {
            tracing::error!(
                "connection {}: malformed address {:?}",
                self.core.id(),
                address
            );
            return false;
        }
        if !self.core.try_begin_connect() {
            tracing::warn!(
                "connection {}: connect refused, transport already active",
                self.core.id()
            );
            return false;
        }
        self.core.record_host_address(address);
        tracing::debug!("connection {}: connecting to {}", self.core.id(), address);

        let core = self.core.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            let connect =
                tokio::time::timeout(
                    core.config().connect_timeout,
                    TcpStream::connect(address.as_str()),
                )
                .await;
            let stream = match connect {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::error!("connection {}: connect failed: {}", core.id(), e);
                    core.notify_connected(false);
                    core.close();
                    return;
                }
                Err(_) => {
                    tracing::error!("connection {}: connect timed out", core.id());
                    core.notify_connected(false);
                    core.close();
                    return;
                }
            };
            // Closed while the connect was in flight: discard the socket.
            if core.is_closed() {
                return;
            }

            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!("connection {}: set_nodelay failed: {}", core.id(), e);
            }

            let (reader, writer) = stream.into_split();
            let (tx, rx) = mpsc::unbounded_channel();
            if !core.install_writer(tx) {
                return;
            }
            spawn_writer_task(writer, core.clone(), rx);

            core.set_state(ConnState::Connected);
            tracing::debug!("connection {}: connected", core.id());
            core.notify_connected(true);

            read_loop(reader, core).await;
        });
        true
    }

    fn send(&self, command: u16, message: Box<dyn Message>) -> bool {
        self.core.send_packet(Packet::from_boxed(command, message))
    }

    fn send_packet(&self, packet: Packet) -> bool {
        self.core.send_packet(packet)
    }

    fn pop_packet(&self) -> Option<Packet> {
        self.core.pop_packet()
    }

    fn close(&self) {
        self.core.close();
    }

    fn set_on_connected(&self, callback: ConnectedCallback) {
        self.core.set_on_connected(callback);
    }

    fn set_on_close(&self, callback: CloseCallback) {
        self.core.set_on_close(callback);
    }
}

/// Chained-read receive loop. Each completed read is folded into the
/// reassembler before the next read is issued, and decoded packets land in
/// the inbound FIFO in wire order.
async fn read_loop(mut reader: OwnedReadHalf, core: Arc<ConnectionCore>) {
    let config = core.config();
    let mut reassembler = Reassembler::new(
        config.codec.clone(),
        config.recv_buffer_size,
        config.max_packet_size,
    );

    loop {
        if core.is_closed() {
            break;
        }
        if reassembler.free_capacity() == 0 {
            // Full buffer with no complete frame: the buffer is undersized
            // for the protocol in use.
            tracing::error!(
                "connection {}: receive buffer full with no complete packet",
                core.id()
            );
            core.close();
            break;
        }

        let n = tokio::select! {
            _ = core.closed() => break,
            result = reader.read(reassembler.writable()) => match result {
                Ok(0) => {
                    tracing::error!("connection {}: transport closed by peer", core.id());
                    core.close();
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    if !core.is_closed() {
                        tracing::error!("connection {}: read error: {}", core.id(), e);
                    }
                    core.close();
                    break;
                }
            },
        };

        match reassembler.commit(n) {
            Ok(packets) => {
                for packet in packets {
                    tracing::trace!(
                        "connection {}: packet command={}",
                        core.id(),
                        packet.command()
                    );
                    core.push_packet(packet);
                }
            }
            Err(e) => {
                tracing::error!("connection {}: framing error: {}", core.id(), e);
                core.close();
                break;
            }
        }
    }
}
