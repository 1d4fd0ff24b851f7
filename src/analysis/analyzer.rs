//! Analyzer: one snapshot per wake-up, on its own thread
//!
//! The thread wakes at a fixed cadence rather than per audio callback (a
//! 4096-sample window spans several callbacks), drains the accumulator,
//! analyses the window and overwrites the mailbox. Nothing in here returns
//! an error; degenerate input becomes a neutral snapshot and the cadence
//! carries on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analysis::levels::{phase_correlation, ChannelLevels};
use crate::analysis::snapshot::AnalysisSnapshot;
use crate::analysis::spectrum::SpectrumAnalyzer;
use crate::audio::accumulator::{AccumulatorReader, SampleWindow};
use crate::audio::host::HostState;
use crate::config::AnalysisConfig;
use crate::mailbox::SnapshotMailbox;
use crate::worker::{ShutdownSignal, Worker};

/// Turns sample windows into snapshots
pub struct Analyzer {
    spectrum: SpectrumAnalyzer,
    left_bands: Vec<f32>,
    right_bands: Vec<f32>,
    next_sequence: u64,
}

impl Analyzer {
    pub fn new(config: &AnalysisConfig, sample_rate: f32) -> Self {
        Self {
            spectrum: SpectrumAnalyzer::new(config, sample_rate),
            left_bands: vec![0.0; config.band_count],
            right_bands: vec![0.0; config.band_count],
            next_sequence: 1,
        }
    }

    pub fn spectrum(&self) -> &SpectrumAnalyzer {
        &self.spectrum
    }

    /// Sequence number the next snapshot will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Analyse one window
    ///
    /// `channels` is 1 or 2; for mono the window holds the same samples in
    /// both channels and only the first level slot is filled.
    pub fn analyze(
        &mut self,
        window: &SampleWindow,
        channels: u8,
        sample_rate: f32,
        timestamp_ms: u64,
    ) -> AnalysisSnapshot {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let channels = channels.clamp(1, 2);
        let band_count = self.left_bands.len();
        let neutral = || {
            AnalysisSnapshot::neutral(sequence, timestamp_ms, sample_rate as u32, channels, band_count)
        };

        let (left, right) = (window.left(), window.right());
        if !left.iter().chain(right).all(|s| s.is_finite()) {
            tracing::trace!("Non-finite samples in window {}", sequence);
            return neutral();
        }

        self.spectrum.set_sample_rate(sample_rate);
        if !self.spectrum.process(left, &mut self.left_bands) {
            return neutral();
        }
        if channels == 2 {
            if !self.spectrum.process(right, &mut self.right_bands) {
                return neutral();
            }
            for (l, &r) in self.left_bands.iter_mut().zip(&self.right_bands) {
                *l = l.max(r);
            }
        }

        let left_levels = ChannelLevels::measure(left);
        let right_levels = if channels == 2 {
            ChannelLevels::measure(right)
        } else {
            ChannelLevels::default()
        };

        AnalysisSnapshot {
            sequence,
            timestamp_ms,
            sample_rate: sample_rate as u32,
            channels,
            bands: self.left_bands.clone(),
            peak: [left_levels.peak, right_levels.peak],
            rms: [left_levels.rms, right_levels.rms],
            correlation: phase_correlation(left, right),
        }
    }
}

/// Analyzer and accumulator reader, parked while the thread is stopped
///
/// Both survive a stop/start cycle, so sequence numbers keep increasing
/// for the lifetime of the bridge.
pub struct AnalysisState {
    pub analyzer: Analyzer,
    pub reader: AccumulatorReader,
}

/// Start the analyzer thread
///
/// The thread hands its state back when stopped so the bridge can be
/// restarted.
pub fn spawn_analyzer(
    interval: Duration,
    state: AnalysisState,
    host: Arc<HostState>,
    mailbox: Arc<SnapshotMailbox>,
    epoch: Instant,
) -> std::io::Result<Worker<AnalysisState>> {
    let AnalysisState {
        mut analyzer,
        mut reader,
    } = state;

    Worker::spawn("spectrum-analyzer", move |shutdown: ShutdownSignal| {
        tracing::debug!(
            "Analyzer running every {:?} from sequence {}",
            interval,
            analyzer.next_sequence()
        );
        run_cadence(interval, &shutdown, || {
            if host.take_reset() {
                reader.clear();
            }

            let window = reader.drain_snapshot();
            // Host stopped calling us; nothing new to report
            if window.fresh() == 0 {
                return;
            }

            let timestamp_ms = epoch.elapsed().as_millis() as u64;
            let snapshot = analyzer.analyze(window, host.channels(), host.sample_rate(), timestamp_ms);

            if snapshot.sequence % 200 == 0 {
                let stats = reader.stats();
                tracing::debug!(
                    "Analyzer: snapshot {}, {} frames pushed, {} overwritten",
                    snapshot.sequence,
                    stats.pushed,
                    stats.overwritten
                );
            }

            mailbox.write(snapshot);
        });
        AnalysisState { analyzer, reader }
    })
}

/// Call `tick` every `interval` until shutdown, without drift and without
/// bursting to catch up after a stall
fn run_cadence(interval: Duration, shutdown: &ShutdownSignal, mut tick: impl FnMut()) {
    let mut deadline = Instant::now() + interval;
    loop {
        let timeout = deadline.saturating_duration_since(Instant::now());
        if shutdown.wait(timeout) {
            return;
        }

        tick();

        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            deadline = now + interval;
        }
    }
}
