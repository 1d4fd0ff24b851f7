//! Wire frame codec
//!
//! One snapshot per frame, fixed size for a given band count, all fields
//! little-endian:
//!
//! ```text
//! offset      size  field
//! 0           4     magic "SPBR"
//! 4           1     format version (1)
//! 5           1     channel count (1 or 2)
//! 6           2     band count (u16)
//! 8           8     sequence (u64)
//! 16          8     timestamp, ms since bridge start (u64)
//! 24          4     sample rate (u32)
//! 28          4*N   band magnitudes, dBFS (f32)
//! 28+4N       8     peak L, peak R (f32, linear)
//! 36+4N       8     RMS L, RMS R (f32, linear)
//! 44+4N       4     phase correlation (f32)
//! ```
//!
//! 304 bytes with the default 64 bands.

pub mod decoder;
pub mod encoder;

pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;

/// Frame magic
pub const MAGIC: [u8; 4] = *b"SPBR";

/// Current format version
pub const FORMAT_VERSION: u8 = 1;

/// Bytes before the band values
pub const HEADER_LEN: usize = 28;

/// Bytes after the band values (2 peaks, 2 RMS, correlation)
pub const TRAILER_LEN: usize = 20;

/// Total frame size for `band_count` bands
pub const fn frame_len(band_count: usize) -> usize {
    HEADER_LEN + 4 * band_count + TRAILER_LEN
}
