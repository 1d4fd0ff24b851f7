//! Logarithmic band layout
//!
//! Band `i` of `n` covers `[min * (max/min)^(i/n), min * (max/min)^((i+1)/n))`
//! Hz; the last band is closed at `max`. A band takes the largest magnitude of
//! the FFT bins whose centre frequency falls inside it. Bands narrower than a
//! bin (low frequencies, small transforms) hold no bins and instead read the
//! spectrum linearly interpolated at their geometric centre.
//!
//! Bin centres alone cannot tell which side of a band edge a tone sits on,
//! so every spectral peak is also credited to the band holding its
//! interpolated frequency (see [`BandLayout::credit_peaks`]).

use std::f32::consts::PI;
use std::ops::Range;

/// Which FFT bins feed one band
#[derive(Debug, Clone, PartialEq)]
pub enum BandBins {
    /// Bins whose centre frequency lies inside the band
    Range(Range<usize>),
    /// No bin inside the band; the band centre sits `frac` of the way from
    /// `bin` to `bin + 1`
    Between { bin: usize, frac: f32 },
}

/// Precomputed bin-to-band mapping for one sample rate and transform size
#[derive(Debug, Clone)]
pub struct BandLayout {
    edges: Vec<f32>,
    bins: Vec<BandBins>,
    sample_rate: f32,
    bin_width: f32,
}

impl BandLayout {
    pub fn new(
        band_count: usize,
        min_hz: f32,
        max_hz: f32,
        sample_rate: f32,
        transform_size: usize,
    ) -> Self {
        let ratio = (max_hz / min_hz) as f64;
        let edges: Vec<f32> = (0..=band_count)
            .map(|i| (min_hz as f64 * ratio.powf(i as f64 / band_count as f64)) as f32)
            .collect();

        let bin_width = sample_rate / transform_size as f32;
        let last_bin = transform_size / 2;

        let bins = edges
            .windows(2)
            .enumerate()
            .map(|(i, edge)| {
                let (low, high) = (edge[0], edge[1]);
                let is_last = i + 1 == band_count;

                // First bin with centre >= low, first bin with centre >= high
                // (or > high for the closed last band)
                let start = (low / bin_width).ceil() as usize;
                let mut end = (high / bin_width).ceil() as usize;
                if is_last && end as f32 * bin_width <= high {
                    end += 1;
                }
                let start = start.clamp(1, last_bin + 1);
                let end = end.clamp(start, last_bin + 1);

                if start < end {
                    BandBins::Range(start..end)
                } else {
                    let position = (low * high).sqrt() / bin_width;
                    let bin = (position.floor() as usize).min(last_bin - 1);
                    BandBins::Between {
                        bin,
                        frac: (position - bin as f32).clamp(0.0, 1.0),
                    }
                }
            })
            .collect();

        Self {
            edges,
            bins,
            sample_rate,
            bin_width,
        }
    }

    pub fn band_count(&self) -> usize {
        self.bins.len()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Lower and upper edge of band `index` in Hz
    pub fn band_range(&self, index: usize) -> Option<(f32, f32)> {
        let low = *self.edges.get(index)?;
        let high = *self.edges.get(index + 1)?;
        Some((low, high))
    }

    /// Band whose range contains `freq`
    pub fn band_for_frequency(&self, freq: f32) -> Option<usize> {
        let count = self.band_count();
        if count == 0 || freq < self.edges[0] || freq > self.edges[count] {
            return None;
        }
        let index = self.edges[1..].partition_point(|&high| high <= freq);
        Some(index.min(count - 1))
    }

    pub fn bins(&self, index: usize) -> Option<&BandBins> {
        self.bins.get(index)
    }

    /// Aggregate bin magnitudes (`transform_size / 2 + 1` entries) into one
    /// value per band
    pub fn aggregate(&self, magnitudes: &[f32], out: &mut [f32]) {
        for (slot, bins) in out.iter_mut().zip(&self.bins) {
            *slot = match bins {
                BandBins::Range(range) => magnitudes
                    .get(range.clone())
                    .map(|m| m.iter().copied().fold(0.0, f32::max))
                    .unwrap_or(0.0),
                BandBins::Between { bin, frac } => match magnitudes.get(*bin..*bin + 2) {
                    Some(pair) => pair[0] * (1.0 - *frac) + pair[1] * *frac,
                    None => 0.0,
                },
            };
        }
    }

    /// Credit each local maximum of a Hann-windowed magnitude spectrum to the
    /// band holding its interpolated frequency
    ///
    /// The peak's offset from bin `k` follows from the ratio `a` of the larger
    /// neighbour to bin `k`: `(2a - 1) / (a + 1)` bins towards that
    /// neighbour. Its amplitude is bin `k` divided by the window response at
    /// that offset. A band only ever grows.
    pub fn credit_peaks(&self, magnitudes: &[f32], out: &mut [f32]) {
        for k in 1..magnitudes.len().saturating_sub(1) {
            let (prev, peak, next) = (magnitudes[k - 1], magnitudes[k], magnitudes[k + 1]);
            if peak <= 0.0 || peak < prev || peak <= next {
                continue;
            }

            let (neighbour, direction) = if next >= prev { (next, 1.0) } else { (prev, -1.0) };
            let ratio = neighbour / peak;
            let offset = direction * ((2.0 * ratio - 1.0) / (ratio + 1.0)).max(0.0);

            let Some(band) = self.band_for_frequency((k as f32 + offset) * self.bin_width) else {
                continue;
            };
            let amplitude = peak / hann_response(offset);
            if let Some(slot) = out.get_mut(band) {
                *slot = slot.max(amplitude);
            }
        }
    }
}

/// Hann window magnitude response `offset` bins from its centre, 1 at 0
fn hann_response(offset: f32) -> f32 {
    if offset.abs() < 1e-6 {
        return 1.0;
    }
    let x = PI * offset;
    (x.sin() / x / (1.0 - offset * offset)).abs()
}
