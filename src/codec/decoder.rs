//! Wire frame to snapshot
//!
//! A rejected frame is counted and reported; callers drop it and keep the
//! connection.

use bytes::Buf;

use crate::analysis::AnalysisSnapshot;
use crate::codec::{frame_len, FORMAT_VERSION, MAGIC};
use crate::error::FormatError;

/// Frame decoder for a fixed band count
pub struct FrameDecoder {
    band_count: usize,
    frames_decoded: u64,
    frames_rejected: u64,
}

impl FrameDecoder {
    pub fn new(band_count: usize) -> Self {
        Self {
            band_count,
            frames_decoded: 0,
            frames_rejected: 0,
        }
    }

    /// Decode one frame
    pub fn decode(&mut self, data: &[u8]) -> Result<AnalysisSnapshot, FormatError> {
        match self.parse(data) {
            Ok(snapshot) => {
                self.frames_decoded += 1;
                Ok(snapshot)
            }
            Err(e) => {
                self.frames_rejected += 1;
                Err(e)
            }
        }
    }

    fn parse(&self, data: &[u8]) -> Result<AnalysisSnapshot, FormatError> {
        let expected = frame_len(self.band_count);
        if data.len() != expected {
            return Err(FormatError::Length {
                expected,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(FormatError::BadMagic);
        }

        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let channels = buf.get_u8();
        if !(1..=2).contains(&channels) {
            return Err(FormatError::ChannelCount(channels));
        }

        let band_count = buf.get_u16_le() as usize;
        if band_count != self.band_count {
            return Err(FormatError::BandCount {
                expected: self.band_count,
                actual: band_count,
            });
        }

        let sequence = buf.get_u64_le();
        let timestamp_ms = buf.get_u64_le();
        let sample_rate = buf.get_u32_le();
        let bands: Vec<f32> = (0..band_count).map(|_| buf.get_f32_le()).collect();
        let peak = [buf.get_f32_le(), buf.get_f32_le()];
        let rms = [buf.get_f32_le(), buf.get_f32_le()];
        let correlation = buf.get_f32_le();

        if !(-1.0..=1.0).contains(&correlation) {
            return Err(FormatError::InvalidField("correlation"));
        }

        Ok(AnalysisSnapshot {
            sequence,
            timestamp_ms,
            sample_rate,
            channels,
            bands,
            peak,
            rms,
            correlation,
        })
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_rejected: self.frames_rejected,
            reject_rate: if self.frames_decoded + self.frames_rejected > 0 {
                self.frames_rejected as f32 / (self.frames_decoded + self.frames_rejected) as f32
            } else {
                0.0
            },
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub reject_rate: f32,
}
