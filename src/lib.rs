//! # Spectrum Bridge
//!
//! Real-time-safe analysis bridge: taps the host's audio callback, passes the
//! audio through untouched, and streams spectrum/level/phase snapshots to a
//! desktop analyser over a WebSocket.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        HOST AUDIO THREAD (hard deadline)                  │
//! │  ┌──────────────┐      ┌──────────────────────────────┐                  │
//! │  │ Host callback│ ───▶ │ RealtimeBridge (bridge)      │ ──▶ output ==    │
//! │  └──────────────┘      │  pass-through + tap          │     input        │
//! │                        └──────────────┬───────────────┘                  │
//! └───────────────────────────────────────┼──────────────────────────────────┘
//!                                         │ force_push (lock-free, lossy)
//!                                         ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  Sample Accumulator (audio::accumulator) - ArrayQueue<[f32; 2]>           │
//! └───────────────────────────────────────┬──────────────────────────────────┘
//!                                         │ drain_snapshot every ~50 ms
//!                                         ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  ANALYZER THREAD (analysis)                                               │
//! │   Hann window ─▶ FFT ─▶ 64 log bands ─▶ peak / RMS / correlation          │
//! └───────────────────────────────────────┬──────────────────────────────────┘
//!                                         │ write (latest wins)
//!                                         ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  Snapshot Mailbox (mailbox) - single slot, ArcSwapOption                  │
//! └───────────────────────────────────────┬──────────────────────────────────┘
//!                                         │ try_take on doorbell
//!                                         ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  PUBLISHER THREAD (network)                                               │
//! │   FrameEncoder (codec) ─▶ WebSocket binary message ─▶ 127.0.0.1:9847      │
//! │   Disconnected ─▶ Connecting ─▶ Connected ─▶ (failure) ─▶ retry           │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is owned by one [`SpectrumBridge`] per plugin instance; dropping
//! it stops and joins the background threads.

pub mod analysis;
pub mod audio;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod network;
pub mod worker;

pub use analysis::AnalysisSnapshot;
pub use bridge::{AudioBlock, BridgeStatus, RealtimeBridge, SpectrumBridge};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use network::ConnectionState;

/// Application-wide constants
pub mod constants {
    /// Default FFT / analysis window length in samples
    pub const DEFAULT_TRANSFORM_SIZE: usize = 4096;

    /// Default number of logarithmic bands
    pub const DEFAULT_BAND_COUNT: usize = 64;

    /// Lower edge of the first band (Hz)
    pub const DEFAULT_MIN_FREQUENCY_HZ: f32 = 20.0;

    /// Upper edge of the last band (Hz)
    pub const DEFAULT_MAX_FREQUENCY_HZ: f32 = 20_000.0;

    /// Analyzer cadence in Hz
    pub const DEFAULT_UPDATE_RATE_HZ: f32 = 20.0;

    /// Sample rate assumed until the host reports one
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

    /// Default consumer host
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Default consumer port
    pub const DEFAULT_PORT: u16 = 9847;

    /// Fixed delay between connection attempts
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

    /// Bound on TCP connect and on the WebSocket handshake
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

    /// Bound on a single frame send
    pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 250;

    /// Idle interval after which a ping is sent
    pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;

    /// Channels carried by the analysis path (mono is duplicated)
    pub const MAX_ANALYSIS_CHANNELS: usize = 2;

    /// Floor of every dB value in a snapshot
    pub const DB_FLOOR: f32 = -100.0;

    /// Accumulator capacity as a multiple of the transform size
    pub const ACCUMULATOR_WINDOWS: usize = 2;
}
