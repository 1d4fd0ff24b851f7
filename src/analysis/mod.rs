//! Spectrum, level and phase analysis

pub mod analyzer;
pub mod bands;
pub mod levels;
pub mod snapshot;
pub mod spectrum;

pub use analyzer::{spawn_analyzer, AnalysisState, Analyzer};
pub use bands::{BandBins, BandLayout};
pub use levels::{amplitude_to_db, phase_correlation, ChannelLevels};
pub use snapshot::AnalysisSnapshot;
pub use spectrum::SpectrumAnalyzer;
