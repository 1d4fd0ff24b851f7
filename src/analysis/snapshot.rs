//! Analysis snapshot

use serde::{Deserialize, Serialize};

use crate::constants::{DB_FLOOR, MAX_ANALYSIS_CHANNELS};

/// Result of one analysis cycle
///
/// Built once by the analyzer and then only shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    /// Strictly increasing per bridge instance
    pub sequence: u64,

    /// Milliseconds since the bridge was created
    pub timestamp_ms: u64,

    /// Host sample rate the window was captured at
    pub sample_rate: u32,

    /// 1 (mono) or 2 (stereo)
    pub channels: u8,

    /// Band magnitudes in dBFS, `[DB_FLOOR, 0]`, lowest band first
    pub bands: Vec<f32>,

    /// Linear peak per channel; the second slot is 0 for mono
    pub peak: [f32; MAX_ANALYSIS_CHANNELS],

    /// Linear RMS per channel; the second slot is 0 for mono
    pub rms: [f32; MAX_ANALYSIS_CHANNELS],

    /// Stereo phase correlation in [-1, 1]
    pub correlation: f32,
}

impl AnalysisSnapshot {
    /// Snapshot equivalent to digital silence
    pub fn neutral(
        sequence: u64,
        timestamp_ms: u64,
        sample_rate: u32,
        channels: u8,
        band_count: usize,
    ) -> Self {
        Self {
            sequence,
            timestamp_ms,
            sample_rate,
            channels,
            bands: vec![DB_FLOOR; band_count],
            peak: [0.0; MAX_ANALYSIS_CHANNELS],
            rms: [0.0; MAX_ANALYSIS_CHANNELS],
            correlation: 0.0,
        }
    }

    /// Index of the loudest band (first one on ties)
    pub fn dominant_band(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &value) in self.bands.iter().enumerate() {
            if best.map_or(true, |(_, top)| value > top) {
                best = Some((i, value));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Whether every level is at silence
    pub fn is_silent(&self) -> bool {
        self.peak.iter().all(|&p| p == 0.0) && self.bands.iter().all(|&b| b <= DB_FLOOR)
    }
}
