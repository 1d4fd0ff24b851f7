//! Time-domain level measurements

use crate::constants::DB_FLOOR;

/// Energy below which a channel counts as silent for correlation
const SILENCE_ENERGY: f64 = 1e-20;

/// Peak and RMS of one channel (linear)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelLevels {
    pub peak: f32,
    pub rms: f32,
}

impl ChannelLevels {
    pub fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut peak = 0.0_f32;
        let mut sum_squares = 0.0_f64;

        for &sample in samples {
            peak = peak.max(sample.abs());
            sum_squares += (sample as f64) * (sample as f64);
        }

        Self {
            peak,
            rms: (sum_squares / samples.len() as f64).sqrt() as f32,
        }
    }
}

/// Stereo phase correlation `Σ(L·R) / sqrt(ΣL²·ΣR²)` in [-1, 1]
///
/// +1 for identical channels, -1 for inverted ones, 0 when either channel is
/// silent.
pub fn phase_correlation(left: &[f32], right: &[f32]) -> f32 {
    let mut cross = 0.0_f64;
    let mut left_energy = 0.0_f64;
    let mut right_energy = 0.0_f64;

    for (&l, &r) in left.iter().zip(right) {
        let (l, r) = (l as f64, r as f64);
        cross += l * r;
        left_energy += l * l;
        right_energy += r * r;
    }

    if left_energy < SILENCE_ENERGY || right_energy < SILENCE_ENERGY {
        return 0.0;
    }

    let correlation = cross / (left_energy * right_energy).sqrt();
    if correlation.is_finite() {
        correlation.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Linear amplitude to dBFS, clamped to `[DB_FLOOR, 0]`
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 && amplitude.is_finite() {
        (20.0 * amplitude.log10()).clamp(DB_FLOOR, 0.0)
    } else {
        DB_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(len: usize, cycles: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * cycles * i as f32 / len as f32).sin())
            .collect()
    }

    #[test]
    fn test_calculate_levels() {
        let levels = ChannelLevels::measure(&[0.5, -0.5, 0.5, -0.5]);
        assert!((levels.peak - 0.5).abs() < 1e-6);
        assert!((levels.rms - 0.5).abs() < 1e-6);

        let levels = ChannelLevels::measure(&[0.0, -0.8, 0.2]);
        assert!((levels.peak - 0.8).abs() < 1e-6);

        assert_eq!(ChannelLevels::measure(&[]), ChannelLevels::default());
    }

    #[test]
    fn test_sine_rms() {
        let levels = ChannelLevels::measure(&sine(4096, 16.0));
        assert!((levels.rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        assert!(levels.peak > 0.99);
    }

    #[test]
    fn test_correlation_identical() {
        let left = sine(4096, 10.0);
        assert!((phase_correlation(&left, &left) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_correlation_inverted() {
        let left = sine(4096, 10.0);
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        assert!((phase_correlation(&left, &right) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_correlation_silence() {
        let silence = vec![0.0; 4096];
        let left = sine(4096, 10.0);
        assert_eq!(phase_correlation(&silence, &silence), 0.0);
        assert_eq!(phase_correlation(&left, &silence), 0.0);
    }

    #[test]
    fn test_correlation_quadrature_near_zero() {
        let left = sine(4096, 8.0);
        let right: Vec<f32> = (0..4096)
            .map(|i| (2.0 * PI * 8.0 * i as f32 / 4096.0).cos())
            .collect();
        assert!(phase_correlation(&left, &right).abs() < 1e-3);
    }

    #[test]
    fn test_amplitude_to_db() {
        assert!((amplitude_to_db(0.5) + 6.02).abs() < 0.01);
        assert_eq!(amplitude_to_db(1.0), 0.0);
        assert_eq!(amplitude_to_db(2.0), 0.0);
        assert_eq!(amplitude_to_db(0.0), DB_FLOOR);
        assert_eq!(amplitude_to_db(f32::NAN), DB_FLOOR);
        assert_eq!(amplitude_to_db(1e-9), DB_FLOOR);
    }
}
