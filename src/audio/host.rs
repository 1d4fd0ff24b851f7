//! Host-side stream state shared with the background threads
//!
//! Written by the real-time thread (sample rate, channel count) or by the
//! plugin wrapper (enabled, reset), read by the analyzer. Atomics only.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::constants::DEFAULT_SAMPLE_RATE;

/// Shared host stream descriptor
#[derive(Debug)]
pub struct HostState {
    enabled: AtomicBool,
    reset_requested: AtomicBool,
    sample_rate_bits: AtomicU32,
    channels: AtomicU8,
    blocks: AtomicU64,
}

impl HostState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            reset_requested: AtomicBool::new(false),
            sample_rate_bits: AtomicU32::new((DEFAULT_SAMPLE_RATE as f32).to_bits()),
            channels: AtomicU8::new(2),
            blocks: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Record the descriptor of the current block
    #[inline]
    pub fn observe_block(&self, sample_rate: f32, channels: usize) {
        let bits = sample_rate.to_bits();
        if sample_rate > 0.0 && self.sample_rate_bits.load(Ordering::Relaxed) != bits {
            self.sample_rate_bits.store(bits, Ordering::Relaxed);
        }
        let channels = channels.clamp(1, 2) as u8;
        if self.channels.load(Ordering::Relaxed) != channels {
            self.channels.store(channels, Ordering::Relaxed);
        }
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate_bits.load(Ordering::Relaxed))
    }

    /// Channels carried by the analysis path (1 or 2)
    pub fn channels(&self) -> u8 {
        self.channels.load(Ordering::Relaxed)
    }

    /// Audio blocks seen since creation
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Ask the analyzer to drop its rolling window
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    /// Consume a pending reset request
    pub fn take_reset(&self) -> bool {
        self.reset_requested.swap(false, Ordering::Acquire)
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new(true)
    }
}
