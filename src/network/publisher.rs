//! Network publisher thread
//!
//! Owns the connection. Disconnected → Connecting → Connected, back to
//! Disconnected on any failure, with a fixed delay before the next attempt.
//! Each doorbell from the mailbox sends at most the newest snapshot; nothing
//! is queued or retransmitted.

use crossbeam_channel::select;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::FrameEncoder;
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::mailbox::SnapshotMailbox;
use crate::network::state::{ConnectionState, PublisherStatus};
use crate::network::transport::Connection;
use crate::worker::{ShutdownSignal, Worker};

/// Upper bound on any single wait, so port changes and peer closes are
/// noticed promptly
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why a connected session ended
enum SessionEnd {
    Shutdown,
    PortChanged,
    Lost(NetworkError),
}

/// Connection loop state
pub struct Publisher {
    config: NetworkConfig,
    encoder: FrameEncoder,
    mailbox: Arc<SnapshotMailbox>,
    status: Arc<PublisherStatus>,
}

impl Publisher {
    pub fn new(
        config: NetworkConfig,
        band_count: usize,
        mailbox: Arc<SnapshotMailbox>,
        status: Arc<PublisherStatus>,
    ) -> Self {
        Self {
            config,
            encoder: FrameEncoder::new(band_count),
            mailbox,
            status,
        }
    }

    /// Run until shutdown
    pub fn run(&mut self, shutdown: &ShutdownSignal) {
        let mut skip_delay = true;
        let mut port = self.status.port();

        loop {
            if !skip_delay && self.wait_retry(shutdown, port) {
                break;
            }
            if shutdown.is_requested() {
                break;
            }

            port = self.status.port();
            self.status.set_state(ConnectionState::Connecting);
            self.status.record_attempt();
            tracing::debug!("Connecting to {}:{}", self.config.host, port);

            let connection = match Connection::open(&self.config, port) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::debug!("Connection to {}:{} failed: {}", self.config.host, port, e);
                    self.status.record_error(&e);
                    self.status.set_state(ConnectionState::Disconnected);
                    skip_delay = false;
                    continue;
                }
            };

            tracing::info!("Connected to {}", connection.peer());
            self.status.set_state(ConnectionState::Connected);
            self.status.record_connection();

            let end = self.serve(connection, port, shutdown);
            self.status.set_state(ConnectionState::Disconnected);

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::PortChanged => {
                    tracing::info!("Port changed to {}, reconnecting", self.status.port());
                    skip_delay = true;
                }
                SessionEnd::Lost(e) => {
                    tracing::warn!("Connection lost: {}", e);
                    self.status.record_error(&e);
                    skip_delay = false;
                }
            }
        }

        self.status.set_state(ConnectionState::Disconnected);
        let stats = self.encoder.stats();
        tracing::debug!(
            "Publisher stopped after {} frames ({} bytes)",
            stats.frames_encoded,
            stats.bytes_produced
        );
    }

    /// Sleep out the retry delay; returns `true` on shutdown. The wait ends
    /// early once the port differs from the one last dialled.
    fn wait_retry(&self, shutdown: &ShutdownSignal, dialled: u16) -> bool {
        let deadline = Instant::now() + self.config.retry_delay();

        loop {
            if self.status.port() != dialled {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if shutdown.wait(remaining.min(POLL_INTERVAL)) {
                return true;
            }
        }
    }

    fn serve(
        &mut self,
        mut connection: Connection,
        port: u16,
        shutdown: &ShutdownSignal,
    ) -> SessionEnd {
        let heartbeat = self.config.heartbeat_interval();
        let mut last_sent = Instant::now();

        loop {
            let until_heartbeat = (last_sent + heartbeat).saturating_duration_since(Instant::now());
            let timeout = until_heartbeat.min(POLL_INTERVAL);

            select! {
                recv(shutdown.receiver()) -> _ => {
                    connection.close();
                    return SessionEnd::Shutdown;
                }
                recv(self.mailbox.doorbell()) -> _ => {}
                default(timeout) => {}
            }

            if self.status.port() != port {
                connection.close();
                return SessionEnd::PortChanged;
            }

            if let Err(e) = connection.poll_incoming() {
                return SessionEnd::Lost(e);
            }

            if let Some(snapshot) = self.mailbox.try_take() {
                let frame = match self.encoder.encode(&snapshot) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("Dropping snapshot {}: {}", snapshot.sequence, e);
                        continue;
                    }
                };

                if let Err(e) = connection.send_frame(&frame) {
                    self.status.record_send_failure();
                    return SessionEnd::Lost(e);
                }
                self.status.record_frame(frame.len());
                last_sent = Instant::now();
            } else if last_sent.elapsed() >= heartbeat {
                if let Err(e) = connection.ping() {
                    self.status.record_send_failure();
                    return SessionEnd::Lost(e);
                }
                self.status.record_heartbeat();
                last_sent = Instant::now();
            }
        }
    }
}

/// Start the publisher thread
pub fn spawn_publisher(
    config: NetworkConfig,
    band_count: usize,
    mailbox: Arc<SnapshotMailbox>,
    status: Arc<PublisherStatus>,
) -> std::io::Result<Worker<()>> {
    let mut publisher = Publisher::new(config, band_count, mailbox, status);
    Worker::spawn("spectrum-publisher", move |shutdown: ShutdownSignal| {
        publisher.run(&shutdown);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisSnapshot;
    use crate::codec::{frame_len, FrameDecoder};
    use std::net::TcpListener;
    use tungstenite::Message;

    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn test_config(port: u16, retry_delay_ms: u64) -> NetworkConfig {
        NetworkConfig {
            port,
            retry_delay_ms,
            connect_timeout_ms: 500,
            ..NetworkConfig::default()
        }
    }

    fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Accept one WebSocket client and return the first binary message
    fn serve_one_frame(listener: TcpListener) -> std::thread::JoinHandle<Vec<u8>> {
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            loop {
                if let Message::Binary(data) = ws.read().unwrap() {
                    return data;
                }
            }
        })
    }

    /// Keep the mailbox fed until `done` returns true, continuing from
    /// `sequence`
    fn feed_until(mailbox: &SnapshotMailbox, sequence: &mut u64, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached while feeding");
            mailbox.write(AnalysisSnapshot::neutral(*sequence, *sequence * 50, 48_000, 2, 64));
            *sequence += 1;
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_retries_without_listener() {
        let port = free_port();
        let mailbox = Arc::new(SnapshotMailbox::new());
        let status = Arc::new(PublisherStatus::new(port));
        let mut worker =
            spawn_publisher(test_config(port, 20), 64, Arc::clone(&mailbox), Arc::clone(&status))
                .unwrap();

        for seq in 1..=5 {
            mailbox.write(AnalysisSnapshot::neutral(seq, 0, 48_000, 2, 64));
        }

        assert!(wait_for(Duration::from_secs(5), || status.stats().connect_attempts >= 3));
        assert_ne!(status.state(), ConnectionState::Connected);
        assert!(status.last_error().is_some());
        assert_eq!(status.stats().frames_sent, 0);

        let started = Instant::now();
        worker.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(status.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_listener_appearing_mid_run_receives_frame() {
        let port = free_port();
        let mailbox = Arc::new(SnapshotMailbox::new());
        let status = Arc::new(PublisherStatus::new(port));
        let mut worker =
            spawn_publisher(test_config(port, 20), 64, Arc::clone(&mailbox), Arc::clone(&status))
                .unwrap();

        assert!(wait_for(Duration::from_secs(5), || status.stats().connect_attempts >= 2));

        let server = serve_one_frame(TcpListener::bind(("127.0.0.1", port)).unwrap());
        let mut sequence = 1;
        feed_until(&mailbox, &mut sequence, || server.is_finished());

        let frame = server.join().unwrap();
        assert_eq!(frame.len(), frame_len(64));
        let snapshot = FrameDecoder::new(64).decode(&frame).unwrap();
        assert!(snapshot.sequence >= 1);
        assert!(status.stats().connections >= 1);

        worker.stop();
    }

    #[test]
    fn test_port_change_reconnects_immediately() {
        let first = TcpListener::bind("127.0.0.1:0").unwrap();
        let first_port = first.local_addr().unwrap().port();
        let mailbox = Arc::new(SnapshotMailbox::new());
        let status = Arc::new(PublisherStatus::new(first_port));

        // Long retry delay: only the port change can make the switch fast
        let mut worker = spawn_publisher(
            test_config(first_port, 10_000),
            64,
            Arc::clone(&mailbox),
            Arc::clone(&status),
        )
        .unwrap();

        let mut sequence = 1;
        let first_server = serve_one_frame(first);
        feed_until(&mailbox, &mut sequence, || first_server.is_finished());
        first_server.join().unwrap();

        let second = TcpListener::bind("127.0.0.1:0").unwrap();
        let second_port = second.local_addr().unwrap().port();
        let second_server = serve_one_frame(second);
        status.set_port(second_port);

        let started = Instant::now();
        feed_until(&mailbox, &mut sequence, || second_server.is_finished());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(second_server.join().unwrap().len(), frame_len(64));

        worker.stop();
    }

    #[test]
    fn test_reconnects_after_consumer_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mailbox = Arc::new(SnapshotMailbox::new());
        let status = Arc::new(PublisherStatus::new(port));
        let mut worker =
            spawn_publisher(test_config(port, 20), 64, Arc::clone(&mailbox), Arc::clone(&status))
                .unwrap();

        let mut sequence = 1;
        let first_server = serve_one_frame(listener);
        feed_until(&mailbox, &mut sequence, || first_server.is_finished());
        first_server.join().unwrap();

        // Consumer gone: the next sends hit a closed socket
        feed_until(&mailbox, &mut sequence, || status.state() != ConnectionState::Connected);
        std::thread::sleep(Duration::from_millis(100));
        assert!(status.stats().connect_attempts >= 2);

        let second_server = serve_one_frame(TcpListener::bind(("127.0.0.1", port)).unwrap());
        feed_until(&mailbox, &mut sequence, || second_server.is_finished());

        let frame = second_server.join().unwrap();
        assert_eq!(frame.len(), frame_len(64));
        assert!(FrameDecoder::new(64).decode(&frame).is_ok());
        assert!(status.stats().connections >= 2);

        worker.stop();
    }

    #[test]
    fn test_heartbeat_while_idle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            loop {
                if let Message::Ping(_) = ws.read().unwrap() {
                    return;
                }
            }
        });

        let mailbox = Arc::new(SnapshotMailbox::new());
        let status = Arc::new(PublisherStatus::new(port));
        let config = NetworkConfig {
            heartbeat_interval_ms: 30,
            ..test_config(port, 20)
        };
        let mut worker = spawn_publisher(config, 64, mailbox, Arc::clone(&status)).unwrap();

        server.join().unwrap();
        assert!(wait_for(Duration::from_secs(2), || status.stats().heartbeats >= 1));
        worker.stop();
    }
}
