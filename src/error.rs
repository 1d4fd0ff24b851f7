//! Error types for the spectrum bridge
//!
//! None of these ever reach the audio thread: accumulator overruns and
//! degenerate analysis input are absorbed where they happen, decode failures
//! drop one frame, and connection failures only move the publisher back to
//! `Disconnected`.

use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio device errors (standalone host only)
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Wire frame encode/decode errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Bad frame magic")]
    BadMagic,

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("Band count mismatch: expected {expected}, got {actual}")]
    BandCount { expected: usize, actual: usize },

    #[error("Invalid channel count: {0}")]
    ChannelCount(u8),

    #[error("Invalid field: {0}")]
    InvalidField(&'static str),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Consumer host is not an IP address: {0}")]
    InvalidAddress(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Timeout")]
    Timeout,
}

/// Result type alias for the bridge
pub type Result<T> = std::result::Result<T, Error>;
