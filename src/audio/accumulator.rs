//! Lock-free sample accumulator
//!
//! The real-time thread pushes stereo frames into a bounded queue sized to
//! twice the transform length; the analyzer drains it into a rolling window.
//! When the queue is full the oldest unread frame is evicted, so the writer
//! never waits on the reader.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::constants::ACCUMULATOR_WINDOWS;

/// One left/right sample pair. Mono input fills both slots.
pub type StereoFrame = [f32; 2];

struct Shared {
    queue: ArrayQueue<StereoFrame>,
    pushed: AtomicU64,
    overwritten: AtomicU64,
}

/// Create a matched writer/reader pair for the given transform size
pub fn sample_accumulator(transform_size: usize) -> (AccumulatorWriter, AccumulatorReader) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(transform_size * ACCUMULATOR_WINDOWS),
        pushed: AtomicU64::new(0),
        overwritten: AtomicU64::new(0),
    });

    let writer = AccumulatorWriter {
        shared: Arc::clone(&shared),
    };
    let reader = AccumulatorReader {
        shared,
        ring: vec![[0.0; 2]; transform_size],
        write_pos: 0,
        filled: 0,
        window: SampleWindow::new(transform_size),
    };

    (writer, reader)
}

/// Writer half, owned by the real-time bridge
///
/// Every method is wait-free with respect to the reader and performs no
/// allocation.
pub struct AccumulatorWriter {
    shared: Arc<Shared>,
}

impl AccumulatorWriter {
    /// Push one frame, evicting the oldest unread frame if full
    #[inline]
    pub fn push_frame(&self, frame: StereoFrame) {
        if self.shared.queue.force_push(frame).is_some() {
            self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Push interleaved samples. Channels beyond the first two are ignored;
    /// a trailing partial frame is dropped.
    pub fn push_interleaved(&self, samples: &[f32], channels: usize) {
        let frames = match channels {
            0 => return,
            1 => {
                for &s in samples {
                    self.push_frame([s, s]);
                }
                samples.len()
            }
            _ => {
                let mut frames = 0;
                for frame in samples.chunks_exact(channels) {
                    self.push_frame([frame[0], frame[1]]);
                    frames += 1;
                }
                frames
            }
        };
        self.shared.pushed.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Push per-channel sample slices. Uneven slices are truncated to the
    /// shortest of the first two channels.
    pub fn push_planar<S: AsRef<[f32]>>(&self, channels: &[S]) {
        let frames = match channels {
            [] => return,
            [mono] => {
                let mono: &[f32] = mono.as_ref();
                for &s in mono {
                    self.push_frame([s, s]);
                }
                mono.len()
            }
            [left, right, ..] => {
                let (left, right): (&[f32], &[f32]) = (left.as_ref(), right.as_ref());
                for (&l, &r) in left.iter().zip(right) {
                    self.push_frame([l, r]);
                }
                left.len().min(right.len())
            }
        };
        self.shared.pushed.fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AccumulatorStats {
        self.shared.stats()
    }
}

/// Reader half, owned by the analyzer thread
pub struct AccumulatorReader {
    shared: Arc<Shared>,
    ring: Vec<StereoFrame>,
    write_pos: usize,
    filled: usize,
    window: SampleWindow,
}

impl AccumulatorReader {
    /// Drain every queued frame into the rolling window and return the
    /// most recent `transform_size` frames, oldest first.
    ///
    /// Before warm-up the front of the window is zero (silence).
    pub fn drain_snapshot(&mut self) -> &SampleWindow {
        let fresh = self.drain();
        self.linearize();
        self.window.fresh = fresh;
        &self.window
    }

    /// Discard queued frames and the rolling window
    pub fn clear(&mut self) {
        while self.shared.queue.pop().is_some() {}
        self.ring.fill([0.0; 2]);
        self.write_pos = 0;
        self.filled = 0;
        self.window.clear();
    }

    pub fn transform_size(&self) -> usize {
        self.ring.len()
    }

    pub fn stats(&self) -> AccumulatorStats {
        self.shared.stats()
    }

    fn drain(&mut self) -> usize {
        let size = self.ring.len();
        let mut count = 0;

        // Bounded so a writer that keeps pushing cannot pin this loop
        for _ in 0..self.shared.queue.capacity() {
            let Some(frame) = self.shared.queue.pop() else {
                break;
            };
            self.ring[self.write_pos] = frame;
            self.write_pos = (self.write_pos + 1) % size;
            self.filled = (self.filled + 1).min(size);
            count += 1;
        }

        count
    }

    fn linearize(&mut self) {
        let size = self.ring.len();
        let pad = size - self.filled;
        let oldest = (self.write_pos + size - self.filled) % size;

        self.window.left[..pad].fill(0.0);
        self.window.right[..pad].fill(0.0);

        for j in 0..self.filled {
            let [l, r] = self.ring[(oldest + j) % size];
            self.window.left[pad + j] = l;
            self.window.right[pad + j] = r;
        }
        self.window.filled = self.filled;
    }
}

impl Shared {
    fn stats(&self) -> AccumulatorStats {
        AccumulatorStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            queued: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}

/// Ordered copy of the most recent frames, one slice per channel
#[derive(Debug, Clone)]
pub struct SampleWindow {
    left: Vec<f32>,
    right: Vec<f32>,
    filled: usize,
    fresh: usize,
}

impl SampleWindow {
    pub fn new(size: usize) -> Self {
        Self {
            left: vec![0.0; size],
            right: vec![0.0; size],
            filled: 0,
            fresh: 0,
        }
    }

    /// Build a window from explicit channel data (zero-padded at the front
    /// when shorter than `size`, truncated to the newest `size` otherwise)
    pub fn from_channels(size: usize, left: &[f32], right: &[f32]) -> Self {
        let mut window = Self::new(size);
        let n = left.len().min(right.len()).min(size);
        window.left[size - n..].copy_from_slice(&left[left.len() - n..]);
        window.right[size - n..].copy_from_slice(&right[right.len() - n..]);
        window.filled = n;
        window.fresh = n;
        window
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Window length (the transform size)
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Number of positions holding real samples
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Frames that arrived since the previous drain
    pub fn fresh(&self) -> usize {
        self.fresh
    }

    /// Whether a full window of real samples has been seen
    pub fn is_warm(&self) -> bool {
        self.filled == self.left.len()
    }

    fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.filled = 0;
        self.fresh = 0;
    }
}

/// Accumulator statistics
#[derive(Debug, Clone)]
pub struct AccumulatorStats {
    /// Frames pushed by the real-time thread
    pub pushed: u64,
    /// Frames evicted before the analyzer read them
    pub overwritten: u64,
    pub queued: usize,
    pub capacity: usize,
}

impl AccumulatorStats {
    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.queued as f32 / self.capacity as f32
    }
}
