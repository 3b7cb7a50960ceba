//! Connection module - transport-driven session state.
//!
//! A connection owns a transport handle, drives asynchronous reads and
//! writes, feeds received bytes through a [`Reassembler`](crate::protocol::Reassembler)
//! and exposes decoded packets through a thread-safe FIFO. Two drivers
//! exist: [`TcpConnection`] for byte streams and [`WsConnection`] for
//! message-oriented WebSocket transports.
//!
//! Lifecycle: `Disconnected → Connecting → Connected → Closed`; `Closed`
//! is terminal and idempotent to enter from any thread.

mod tcp;
mod ws;

pub use tcp::TcpConnection;
pub use ws::WsConnection;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use crate::codec::Codec;
use crate::protocol::{Message, Packet};

/// Default receive buffer capacity.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Default cap on a single framed packet.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 64 * 1024;

/// Default connect deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-write deadline.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked once when an asynchronous connect resolves.
pub type ConnectedCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Callback invoked exactly once when the connection closes.
pub type CloseCallback = Box<dyn Fn() + Send + Sync>;

/// Fixed configuration a connection is created with.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Codec framing this connection's traffic.
    pub codec: Arc<dyn Codec>,
    /// Receive buffer capacity. Must not be smaller than the biggest
    /// framed packet the protocol can carry.
    pub recv_buffer_size: usize,
    /// Cap on a single framed packet; a header declaring more is fatal.
    pub max_packet_size: usize,
    /// Deadline for the transport connect.
    pub connect_timeout: Duration,
    /// Deadline for each transport write.
    pub write_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a configuration with default sizes and timeouts.
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    /// Created, no transport handle yet.
    Disconnected = 0,
    /// Connect in flight.
    Connecting = 1,
    /// Transport established, traffic flowing.
    Connected = 2,
    /// Terminal.
    Closed = 3,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnState::Disconnected,
            1 => ConnState::Connecting,
            2 => ConnState::Connected,
            _ => ConnState::Closed,
        }
    }
}

/// Client-side connection API shared by all transport drivers.
pub trait Connection: Send + Sync {
    /// Caller-assigned id, for logging and application-side bookkeeping.
    fn connection_id(&self) -> u32;

    /// Current lifecycle state.
    fn state(&self) -> ConnState;

    /// Whether traffic can flow right now.
    fn is_connected(&self) -> bool;

    /// Address passed to the last `connect` call.
    fn host_address(&self) -> Option<String>;

    /// Begin an asynchronous connect. Returns `false` without side effect
    /// if the address is malformed or a transport handle already exists;
    /// otherwise the outcome arrives through the connected callback.
    ///
    /// Must be called from within a tokio runtime.
    fn connect(&self, address: &str) -> bool;

    /// Encode and submit a structured message. Returns `false` without
    /// side effect unless connected.
    fn send(&self, command: u16, message: Box<dyn Message>) -> bool;

    /// Encode and submit a packet. Returns `false` without side effect
    /// unless connected.
    fn send_packet(&self, packet: Packet) -> bool;

    /// Pop one decoded inbound packet, non-blocking.
    fn pop_packet(&self) -> Option<Packet>;

    /// Close the connection. Idempotent and safe under concurrent
    /// invocation; the close callback fires exactly once.
    fn close(&self);

    /// Install the connect-outcome callback. Set before `connect`.
    fn set_on_connected(&self, callback: ConnectedCallback);

    /// Install the close callback. Set before `connect`.
    fn set_on_close(&self, callback: CloseCallback);
}

/// State shared between the application handle and the driver tasks.
pub(crate) struct ConnectionCore {
    id: u32,
    config: ConnectionConfig,
    state: AtomicU8,
    /// Exactly-once guard for the close body.
    closed: AtomicBool,
    /// Decoded packets awaiting application consumption. Unbounded: an
    /// application that never drains it leaks at packet granularity.
    packets: Mutex<VecDeque<Packet>>,
    writer: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    close_notify: Notify,
    on_connected: Mutex<Option<ConnectedCallback>>,
    on_close: Mutex<Option<CloseCallback>>,
    host_address: Mutex<Option<String>>,
}

impl ConnectionCore {
    pub(crate) fn new(config: ConnectionConfig, id: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            config,
            state: AtomicU8::new(ConnState::Disconnected as u8),
            closed: AtomicBool::new(false),
            packets: Mutex::new(VecDeque::new()),
            writer: Mutex::new(None),
            close_notify: Notify::new(),
            on_connected: Mutex::new(None),
            on_close: Mutex::new(None),
            host_address: Mutex::new(None),
        })
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == ConnState::Connected
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Claim the one connect attempt. Fails if a transport handle already
    /// exists or the connection is past its lifetime.
    pub(crate) fn try_begin_connect(&self) -> bool {
        self.state
            .compare_exchange(
                ConnState::Disconnected as u8,
                ConnState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn record_host_address(&self, address: &str) {
        *self.host_address.lock().unwrap() = Some(address.to_string());
    }

    pub(crate) fn host_address(&self) -> Option<String> {
        self.host_address.lock().unwrap().clone()
    }

    pub(crate) fn set_on_connected(&self, callback: ConnectedCallback) {
        *self.on_connected.lock().unwrap() = Some(callback);
    }

    pub(crate) fn set_on_close(&self, callback: CloseCallback) {
        *self.on_close.lock().unwrap() = Some(callback);
    }

    /// Report the connect outcome. Consumes the callback so it fires once.
    pub(crate) fn notify_connected(&self, success: bool) {
        let callback = self.on_connected.lock().unwrap().take();
        if let Some(callback) = callback {
            callback(success);
        }
    }

    pub(crate) fn push_packet(&self, packet: Packet) {
        self.packets.lock().unwrap().push_back(packet);
    }

    pub(crate) fn pop_packet(&self) -> Option<Packet> {
        self.packets.lock().unwrap().pop_front()
    }

    fn clear_packets(&self) {
        self.packets.lock().unwrap().clear();
    }

    /// Register the writer channel. Refused once closed, so a connect
    /// completing after `close` leaves no live transport behind.
    pub(crate) fn install_writer(&self, tx: mpsc::UnboundedSender<Vec<u8>>) -> bool {
        let mut writer = self.writer.lock().unwrap();
        if self.is_closed() {
            return false;
        }
        *writer = Some(tx);
        true
    }

    fn submit_write(&self, bytes: Vec<u8>) -> bool {
        let writer = self.writer.lock().unwrap();
        match writer.as_ref() {
            Some(tx) => tx.send(bytes).is_ok(),
            None => false,
        }
    }

    /// Encode and submit a packet for asynchronous write.
    pub(crate) fn send_packet(&self, packet: Packet) -> bool {
        if !self.is_connected() {
            tracing::warn!("connection {}: send while not connected", self.id);
            return false;
        }
        let bytes = match self.config.codec.encode(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("connection {}: encode failed: {}", self.id, e);
                return false;
            }
        };
        if !self.submit_write(bytes) {
            self.close();
            return false;
        }
        true
    }

    /// Resolves when `close` runs, waking the driver read task.
    pub(crate) async fn closed(&self) {
        self.close_notify.notified().await;
    }

    /// Tear the connection down. The atomic swap guarantees the body (and
    /// the close callback) runs exactly once however many threads race in
    /// from the send, receive, and application paths.
    pub(crate) fn close(&self) {
        self.set_state(ConnState::Closed);
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("connection {}: closing", self.id);
            let writer = self.writer.lock().unwrap().take();
            drop(writer);
            self.close_notify.notify_one();
            let callback = self.on_close.lock().unwrap().take();
            if let Some(callback) = callback {
                callback();
            }
        }
        self.clear_packets();
    }
}
