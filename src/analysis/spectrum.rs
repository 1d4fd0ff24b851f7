//! FFT band spectrum for one channel
//!
//! Hann window, forward FFT of the full window, per-bin magnitude normalised
//! by the window's coherent gain (a full-scale sine on a bin centre reads
//! 0 dBFS), then aggregated into the band layout with interpolated peaks
//! credited to their own band.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::analysis::bands::BandLayout;
use crate::analysis::levels::amplitude_to_db;
use crate::config::AnalysisConfig;

/// Reusable FFT state; allocates only on construction and on sample-rate
/// changes
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    window: Vec<f32>,
    window_sum: f32,
    magnitudes: Vec<f32>,
    band_values: Vec<f32>,
    layout: BandLayout,
    min_frequency_hz: f32,
    max_frequency_hz: f32,
}

impl SpectrumAnalyzer {
    pub fn new(config: &AnalysisConfig, sample_rate: f32) -> Self {
        let size = config.transform_size;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        // Periodic Hann window
        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect();
        let window_sum: f32 = window.iter().sum();

        Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch,
            window,
            window_sum,
            magnitudes: vec![0.0; size / 2 + 1],
            band_values: vec![0.0; config.band_count],
            layout: BandLayout::new(
                config.band_count,
                config.min_frequency_hz,
                config.max_frequency_hz,
                sample_rate,
                size,
            ),
            min_frequency_hz: config.min_frequency_hz,
            max_frequency_hz: config.max_frequency_hz,
        }
    }

    pub fn transform_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn band_count(&self) -> usize {
        self.band_values.len()
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    /// Rebuild the band layout when the host sample rate changes
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate > 0.0 && sample_rate != self.layout.sample_rate() {
            tracing::debug!("Rebuilding band layout for {} Hz", sample_rate);
            self.layout = BandLayout::new(
                self.band_count(),
                self.min_frequency_hz,
                self.max_frequency_hz,
                sample_rate,
                self.transform_size(),
            );
        }
    }

    /// Compute band magnitudes in dBFS into `out`
    ///
    /// `samples` must hold exactly one window. Returns `false` if the
    /// transform produced non-finite values; `out` is then unspecified.
    pub fn process(&mut self, samples: &[f32], out: &mut [f32]) -> bool {
        debug_assert_eq!(samples.len(), self.buffer.len());
        debug_assert_eq!(out.len(), self.band_values.len());

        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(samples).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 2.0 / self.window_sum;
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *magnitude = bin.norm() * scale;
        }
        if !self.magnitudes.iter().all(|m| m.is_finite()) {
            return false;
        }

        self.layout.aggregate(&self.magnitudes, &mut self.band_values);
        self.layout.credit_peaks(&self.magnitudes, &mut self.band_values);
        for (db, &amplitude) in out.iter_mut().zip(&self.band_values) {
            *db = amplitude_to_db(amplitude);
        }

        true
    }
}
