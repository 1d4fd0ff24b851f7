//! WebSocket client connection over a tuned TCP socket
//!
//! The socket stays blocking with a write timeout, so a stalled consumer
//! costs at most one write timeout per send. Incoming traffic (pongs, close)
//! is drained by briefly switching to non-blocking mode.

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};

use crate::config::NetworkConfig;
use crate::error::NetworkError;

const KEEPALIVE_TIME: Duration = Duration::from_secs(5);

/// Open a TCP stream to `addr` with the connection options applied
pub fn connect_tcp(
    addr: SocketAddr,
    connect_timeout: Duration,
    write_timeout: Duration,
) -> Result<TcpStream, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

    // Frames are small and latency matters more than throughput
    socket
        .set_nodelay(true)
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
    socket
        .set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_TIME))
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

    socket.connect_timeout(&addr.into(), connect_timeout).map_err(|e| {
        if e.kind() == ErrorKind::TimedOut {
            NetworkError::Timeout
        } else {
            NetworkError::ConnectionFailed(format!("{}: {}", addr, e))
        }
    })?;

    socket
        .set_write_timeout(Some(write_timeout))
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
    // Bounds the handshake read; cleared once the handshake is done
    socket
        .set_read_timeout(Some(connect_timeout))
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

    Ok(socket.into())
}

/// An established WebSocket session
pub struct Connection {
    socket: WebSocket<TcpStream>,
    peer: SocketAddr,
}

impl Connection {
    /// Connect and perform the client handshake on path `/`
    pub fn open(config: &NetworkConfig, port: u16) -> Result<Self, NetworkError> {
        let peer = config.endpoint(port)?;
        let stream = connect_tcp(peer, config.connect_timeout(), config.write_timeout())?;

        let url = format!("ws://{}/", peer);
        let (socket, _response) = tungstenite::client(url.as_str(), stream).map_err(|e| match e {
            HandshakeError::Interrupted(_) => NetworkError::Timeout,
            HandshakeError::Failure(e) => NetworkError::HandshakeFailed(e.to_string()),
        })?;

        socket
            .get_ref()
            .set_read_timeout(None)
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send one frame as a binary message
    pub fn send_frame(&mut self, frame: &Bytes) -> Result<(), NetworkError> {
        self.socket
            .send(Message::Binary(frame.to_vec()))
            .map_err(send_error)
    }

    /// Send a heartbeat ping
    pub fn ping(&mut self) -> Result<(), NetworkError> {
        self.socket.send(Message::Ping(Vec::new())).map_err(send_error)
    }

    /// Drain whatever the peer has sent without blocking
    ///
    /// Returns the number of messages read. Pings are answered by the
    /// WebSocket layer; a close from the peer is reported as an error.
    pub fn poll_incoming(&mut self) -> Result<usize, NetworkError> {
        self.set_nonblocking(true)?;

        let mut count = 0;
        let result = loop {
            match self.socket.read() {
                Ok(Message::Close(_)) => break Err(NetworkError::Closed),
                Ok(_) => count += 1,
                Err(tungstenite::Error::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                    break Ok(count)
                }
                Err(e) => break Err(send_error(e)),
            }
        };

        self.set_nonblocking(false)?;
        result
    }

    /// Close the session; errors are irrelevant at this point
    pub fn close(mut self) {
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }

    fn set_nonblocking(&self, nonblocking: bool) -> Result<(), NetworkError> {
        self.socket
            .get_ref()
            .set_nonblocking(nonblocking)
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }
}

fn send_error(error: tungstenite::Error) -> NetworkError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            NetworkError::Closed
        }
        tungstenite::Error::Io(e)
            if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            NetworkError::Timeout
        }
        e => NetworkError::SendFailed(e.to_string()),
    }
}
