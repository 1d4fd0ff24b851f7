//! Connection state and publisher status shared with the control side

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};

/// Publisher connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Live publisher status
///
/// Written by the publisher thread only; any thread may read it. The port is
/// the one exception: the control side sets it and the publisher follows.
pub struct PublisherStatus {
    state: AtomicU8,
    port: AtomicU16,
    last_error: Mutex<Option<String>>,
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
    heartbeats: AtomicU64,
}

impl PublisherStatus {
    pub fn new(port: u16) -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            port: AtomicU16::new(port),
            last_error: Mutex::new(None),
            connect_attempts: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Port the publisher should be dialling
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    /// Redirect the publisher; takes effect within one poll interval
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Release);
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub(crate) fn record_error(&self, error: impl ToString) {
        *self.last_error.lock() = Some(error.to_string());
    }

    pub(crate) fn record_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            state: self.state(),
            port: self.port(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the publisher counters
#[derive(Debug, Clone)]
pub struct PublisherStats {
    pub state: ConnectionState,
    pub port: u16,
    pub connect_attempts: u64,
    pub connections: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub heartbeats: u64,
}
