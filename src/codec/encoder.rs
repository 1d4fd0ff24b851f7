//! Snapshot to wire frame

use bytes::{BufMut, Bytes, BytesMut};

use crate::analysis::AnalysisSnapshot;
use crate::codec::{frame_len, FORMAT_VERSION, MAGIC};
use crate::error::FormatError;

/// Frame encoder for a fixed band count
pub struct FrameEncoder {
    band_count: usize,
    /// Encoding buffer (reused across frames)
    buffer: BytesMut,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl FrameEncoder {
    pub fn new(band_count: usize) -> Self {
        Self {
            band_count,
            buffer: BytesMut::with_capacity(frame_len(band_count)),
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode one snapshot
    ///
    /// Fails only if the snapshot does not fit this encoder's layout.
    pub fn encode(&mut self, snapshot: &AnalysisSnapshot) -> Result<Bytes, FormatError> {
        if snapshot.bands.len() != self.band_count {
            return Err(FormatError::BandCount {
                expected: self.band_count,
                actual: snapshot.bands.len(),
            });
        }
        if !(1..=2).contains(&snapshot.channels) {
            return Err(FormatError::ChannelCount(snapshot.channels));
        }

        let len = frame_len(self.band_count);
        self.buffer.reserve(len);

        self.buffer.put_slice(&MAGIC);
        self.buffer.put_u8(FORMAT_VERSION);
        self.buffer.put_u8(snapshot.channels);
        self.buffer.put_u16_le(self.band_count as u16);
        self.buffer.put_u64_le(snapshot.sequence);
        self.buffer.put_u64_le(snapshot.timestamp_ms);
        self.buffer.put_u32_le(snapshot.sample_rate);
        for &band in &snapshot.bands {
            self.buffer.put_f32_le(band);
        }
        for &peak in &snapshot.peak {
            self.buffer.put_f32_le(peak);
        }
        for &rms in &snapshot.rms {
            self.buffer.put_f32_le(rms);
        }
        self.buffer.put_f32_le(snapshot.correlation);

        debug_assert_eq!(self.buffer.len(), len);
        self.frames_encoded += 1;
        self.bytes_produced += len as u64;

        Ok(self.buffer.split().freeze())
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Size of every frame this encoder produces
    pub fn frame_len(&self) -> usize {
        frame_len(self.band_count)
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}
