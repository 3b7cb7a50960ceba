//! WebSocket connection driver.
//!
//! The transport is message-oriented: each received binary message is one
//! chunk pushed through the reassembler. Peers usually batch exactly one
//! framed packet per message, but the framing layer makes no such
//! assumption - a message may carry several packets or a partial one.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::protocol::{Message, Packet, Reassembler};

use super::{
    CloseCallback, ConnState, ConnectedCallback, Connection, ConnectionConfig, ConnectionCore,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection over a WebSocket transport.
pub struct WsConnection {
    core: Arc<ConnectionCore>,
}

impl WsConnection {
    /// Create a connection with the given configuration and caller-chosen
    /// id. No I/O happens until [`connect`](Connection::connect).
    pub fn new(config: ConnectionConfig, connection_id: u32) -> Self {
        Self {
            core: ConnectionCore::new(config, connection_id),
        }
    }
}

impl Connection for WsConnection {
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
            let connect = tokio::time::timeout(
                core.config().connect_timeout,
                connect_async(address.as_str()),
            )
            .await;
            let stream = match connect {
                Ok(Ok((stream, _response))) => stream,
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
            if core.is_closed() {
                return;
            }

            let (sink, stream) = stream.split();
            let (tx, rx) = mpsc::unbounded_channel();
            if !core.install_writer(tx) {
                return;
            }
            spawn_ws_writer(sink, core.clone(), rx);

            core.set_state(ConnState::Connected);
            tracing::debug!("connection {}: connected", core.id());
            core.notify_connected(true);

            receive_loop(stream, core).await;
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

/// Writer task for the sink half. On shutdown it attempts the close
/// handshake before dropping the sink.
fn spawn_ws_writer(
    mut sink: SplitSink<WsStream, WsMessage>,
    core: Arc<ConnectionCore>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let write_timeout = core.config().write_timeout;
    tokio::spawn(async move {
        loop {
            let bytes = match rx.recv().await {
                Some(bytes) => bytes,
                None => break,
            };
            match tokio::time::timeout(write_timeout, sink.send(WsMessage::binary(bytes))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("connection {}: write error: {}", core.id(), e);
                    core.close();
                    break;
                }
                Err(_) => {
                    tracing::error!("connection {}: write timed out", core.id());
                    core.close();
                    break;
                }
            }
        }
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    });
}

/// Receive loop: one reassembler push per binary message.
async fn receive_loop(mut stream: SplitStream<WsStream>, core: Arc<ConnectionCore>) {
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

        let message = tokio::select! {
            _ = core.closed() => break,
            message = stream.next() => message,
        };
        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                if !core.is_closed() {
                    tracing::error!("connection {}: receive error: {}", core.id(), e);
                }
                core.close();
                break;
            }
            None => {
                tracing::error!("connection {}: transport closed by peer", core.id());
                core.close();
                break;
            }
        };

        match message {
            WsMessage::Binary(data) => match reassembler.push(&data) {
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
            },
            WsMessage::Close(frame) => {
                tracing::debug!("connection {}: peer close {:?}", core.id(), frame);
                core.close();
                break;
            }
            // Ping/Pong are answered by the websocket layer itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Text(_) => {
                tracing::warn!("connection {}: ignoring text frame", core.id());
            }
            WsMessage::Frame(_) => {}
        }
    }
}
