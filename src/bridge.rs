//! Bridge context and the real-time entry points
//!
//! [`SpectrumBridge`] owns everything one plugin instance needs: the shared
//! host state, the accumulator, the mailbox and both background workers.
//! [`RealtimeBridge`] is the part the audio callback touches. Its methods
//! copy input to output, then tap the input into the accumulator; they take
//! no locks, allocate nothing and do no I/O.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use crate::analysis::{spawn_analyzer, AnalysisState, Analyzer};
use crate::audio::accumulator::{sample_accumulator, AccumulatorStats, AccumulatorWriter};
use crate::audio::host::HostState;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::mailbox::{MailboxStats, SnapshotMailbox};
use crate::network::{spawn_publisher, ConnectionState, PublisherStats, PublisherStatus};
use crate::worker::Worker;

/// One host audio block
#[derive(Debug, Clone, Copy)]
pub enum AudioBlock<'a> {
    /// Frames of `channels` interleaved samples
    Interleaved { samples: &'a [f32], channels: usize },
    /// One slice per channel
    Planar(&'a [&'a [f32]]),
}

impl AudioBlock<'_> {
    pub fn channels(&self) -> usize {
        match self {
            AudioBlock::Interleaved { channels, .. } => *channels,
            AudioBlock::Planar(channels) => channels.len(),
        }
    }
}

/// Audio-thread handle: pass-through plus analysis tap
pub struct RealtimeBridge {
    writer: AccumulatorWriter,
    host: Arc<HostState>,
}

impl RealtimeBridge {
    pub(crate) fn new(writer: AccumulatorWriter, host: Arc<HostState>) -> Self {
        Self { writer, host }
    }

    /// Tap a block the host passes through in place
    #[inline]
    pub fn on_audio_block(&self, block: AudioBlock<'_>, sample_rate: f32) {
        let channels = block.channels();
        if channels == 0 {
            return;
        }
        self.host.observe_block(sample_rate, channels);
        if !self.host.is_enabled() {
            return;
        }

        match block {
            AudioBlock::Interleaved { samples, channels } => {
                self.writer.push_interleaved(samples, channels)
            }
            AudioBlock::Planar(inputs) => self.writer.push_planar(inputs),
        }
    }

    /// Copy interleaved `input` to `output` unchanged, then tap it
    ///
    /// Output samples beyond the input length are zeroed.
    pub fn process_interleaved(
        &self,
        input: &[f32],
        output: &mut [f32],
        channels: usize,
        sample_rate: f32,
    ) {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        output[n..].fill(0.0);

        self.on_audio_block(AudioBlock::Interleaved { samples: input, channels }, sample_rate);
    }

    /// Copy each input channel to the matching output channel, then tap
    ///
    /// Output channels without an input, and output samples beyond the
    /// input length, are zeroed.
    pub fn process_planar(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], sample_rate: f32) {
        for (i, output) in outputs.iter_mut().enumerate() {
            match inputs.get(i) {
                Some(input) => {
                    let n = input.len().min(output.len());
                    output[..n].copy_from_slice(&input[..n]);
                    output[n..].fill(0.0);
                }
                None => output.fill(0.0),
            }
        }

        self.on_audio_block(AudioBlock::Planar(inputs), sample_rate);
    }

    pub fn is_enabled(&self) -> bool {
        self.host.is_enabled()
    }

    pub fn accumulator_stats(&self) -> AccumulatorStats {
        self.writer.stats()
    }
}

struct Running {
    analyzer: Worker<AnalysisState>,
    publisher: Worker<()>,
}

struct Workers {
    /// Parked here while the analyzer is not running
    analysis: Option<AnalysisState>,
    running: Option<Running>,
}

/// Per-instance bridge context
///
/// All methods take `&self`, so the bridge can sit in an `Arc` shared between
/// the host wrapper and the audio callback. The worker lock is never taken on
/// the audio path.
pub struct SpectrumBridge {
    config: BridgeConfig,
    realtime: RealtimeBridge,
    host: Arc<HostState>,
    mailbox: Arc<SnapshotMailbox>,
    status: Arc<PublisherStatus>,
    workers: Mutex<Workers>,
    epoch: Instant,
}

impl SpectrumBridge {
    /// Create a stopped bridge
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let (writer, reader) = sample_accumulator(config.analysis.transform_size);
        let host = Arc::new(HostState::new(config.enabled));
        let status = Arc::new(PublisherStatus::new(config.network.port));
        let analyzer = Analyzer::new(&config.analysis, host.sample_rate());

        Ok(Self {
            realtime: RealtimeBridge::new(writer, Arc::clone(&host)),
            host,
            mailbox: Arc::new(SnapshotMailbox::new()),
            status,
            workers: Mutex::new(Workers {
                analysis: Some(AnalysisState { analyzer, reader }),
                running: None,
            }),
            epoch: Instant::now(),
            config,
        })
    }

    /// Start the analyzer and publisher threads; no-op if already running
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.running.is_some() {
            return Ok(());
        }

        let analysis = workers
            .analysis
            .take()
            .ok_or_else(|| Error::Worker("analyzer state lost after a panic".into()))?;

        let mut analyzer = spawn_analyzer(
            self.config.analysis.update_interval(),
            analysis,
            Arc::clone(&self.host),
            Arc::clone(&self.mailbox),
            self.epoch,
        )?;

        let publisher = match spawn_publisher(
            self.config.network.clone(),
            self.config.analysis.band_count,
            Arc::clone(&self.mailbox),
            Arc::clone(&self.status),
        ) {
            Ok(publisher) => publisher,
            Err(e) => {
                workers.analysis = analyzer.stop();
                return Err(e.into());
            }
        };

        tracing::info!(
            "Spectrum bridge started: {} bands, {} Hz updates, consumer {}:{}",
            self.config.analysis.band_count,
            self.config.analysis.update_rate_hz,
            self.config.network.host,
            self.status.port()
        );

        workers.running = Some(Running { analyzer, publisher });
        Ok(())
    }

    /// Stop and join both threads; returns once they have exited
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock();
        let Some(mut running) = workers.running.take() else {
            return;
        };

        running.publisher.stop();
        workers.analysis = running.analyzer.stop();
        tracing::info!("Spectrum bridge stopped");
    }

    /// Whether both threads are up (false after a worker panicked)
    pub fn is_running(&self) -> bool {
        self.workers
            .lock()
            .running
            .as_ref()
            .is_some_and(|r| !r.analyzer.is_finished() && !r.publisher.is_finished())
    }

    /// Handle for the audio callback
    pub fn realtime(&self) -> &RealtimeBridge {
        &self.realtime
    }

    /// Enable or bypass the analysis tap; audio always passes through
    pub fn set_enabled(&self, enabled: bool) {
        self.host.set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.host.is_enabled()
    }

    /// Redirect the publisher to another consumer port
    pub fn set_port(&self, port: u16) {
        if port != self.status.port() {
            tracing::info!("Consumer port set to {}", port);
            self.status.set_port(port);
        }
    }

    /// Drop accumulated audio, e.g. when the host transport jumps
    pub fn reset(&self) {
        self.host.request_reset();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status.state()
    }

    pub fn mailbox(&self) -> &Arc<SnapshotMailbox> {
        &self.mailbox
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            running: self.is_running(),
            enabled: self.host.is_enabled(),
            sample_rate: self.host.sample_rate(),
            channels: self.host.channels(),
            blocks: self.host.blocks(),
            accumulator: self.realtime.accumulator_stats(),
            mailbox: self.mailbox.stats(),
            publisher: self.status.stats(),
            last_error: self.status.last_error(),
        }
    }
}

impl Drop for SpectrumBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Point-in-time view of the whole bridge
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    pub running: bool,
    pub enabled: bool,
    pub sample_rate: f32,
    pub channels: u8,
    pub blocks: u64,
    pub accumulator: AccumulatorStats,
    pub mailbox: MailboxStats,
    pub publisher: PublisherStats,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisSnapshot;
    use crate::codec::{frame_len, FrameDecoder};
    use proptest::prelude::*;
    use std::net::TcpListener;
    use std::time::Duration;
    use tungstenite::Message;

    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn test_config(port: u16) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.network.port = port;
        config.network.retry_delay_ms = 10;
        config.network.connect_timeout_ms = 200;
        config
    }

    fn standalone_realtime() -> RealtimeBridge {
        let (writer, _reader) = sample_accumulator(1024);
        RealtimeBridge::new(writer, Arc::new(HostState::default()))
    }

    fn tone(freq: f32, frames: usize, offset: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = (offset + i) as f32 / 48_000.0;
                let s = 0.5 * (2.0 * std::f32::consts::PI * freq * t).sin();
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_interleaved_surplus_output_zeroed() {
        let realtime = standalone_realtime();
        let input = [0.25f32, -0.5, 1.0, 0.0];
        let mut output = [9.0f32; 6];

        realtime.process_interleaved(&input, &mut output, 2, 48_000.0);
        assert_eq!(output, [0.25, -0.5, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(realtime.accumulator_stats().pushed, 2);
    }

    #[test]
    fn test_planar_extra_output_channel_zeroed() {
        let realtime = standalone_realtime();
        let left = [0.1f32, 0.2, 0.3];
        let inputs: [&[f32]; 1] = [&left];
        let mut out_l = [9.0f32; 3];
        let mut out_r = [9.0f32; 3];
        {
            let mut outputs: [&mut [f32]; 2] = [&mut out_l, &mut out_r];
            realtime.process_planar(&inputs, &mut outputs, 44_100.0);
        }

        assert_eq!(out_l, left);
        assert_eq!(out_r, [0.0; 3]);
        assert_eq!(realtime.accumulator_stats().pushed, 3);
    }

    #[test]
    fn test_disabled_tap_still_passes_audio() {
        let host = Arc::new(HostState::new(false));
        let (writer, _reader) = sample_accumulator(1024);
        let realtime = RealtimeBridge::new(writer, Arc::clone(&host));

        let input = tone(440.0, 256, 0);
        let mut output = vec![0.0; input.len()];
        realtime.process_interleaved(&input, &mut output, 2, 96_000.0);

        assert_eq!(output, input);
        assert_eq!(realtime.accumulator_stats().pushed, 0);
        assert_eq!(host.sample_rate(), 96_000.0);
    }

    #[test]
    fn test_zero_channel_block_ignored() {
        let realtime = standalone_realtime();
        let block = AudioBlock::Interleaved { samples: &[1.0; 8], channels: 0 };
        realtime.on_audio_block(block, 48_000.0);
        realtime.on_audio_block(AudioBlock::Planar(&[]), 48_000.0);
        assert_eq!(realtime.accumulator_stats().pushed, 0);
    }

    #[test]
    fn test_start_is_idempotent_and_restartable() {
        let bridge = SpectrumBridge::new(test_config(free_port())).unwrap();
        assert!(!bridge.is_running());

        bridge.start().unwrap();
        bridge.start().unwrap();
        assert!(bridge.is_running());

        bridge.shutdown();
        assert!(!bridge.is_running());
        assert_eq!(bridge.connection_state(), ConnectionState::Disconnected);

        bridge.start().unwrap();
        assert!(bridge.is_running());
    }

    fn feed_until_taken(bridge: &SpectrumBridge, offset: &mut usize) -> Arc<AnalysisSnapshot> {
        let mut output = vec![0.0; 1024];
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let input = tone(440.0, 512, *offset);
            bridge.realtime().process_interleaved(&input, &mut output, 2, 48_000.0);
            *offset += 512;

            if let Some(snapshot) = bridge.mailbox().try_take() {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "no snapshot taken");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_restart_keeps_sequence_increasing() {
        let mut config = test_config(free_port());
        config.analysis.update_rate_hz = 200.0;
        let bridge = SpectrumBridge::new(config).unwrap();
        let mut offset = 0;

        bridge.start().unwrap();
        let mut last = 0;
        for _ in 0..5 {
            last = feed_until_taken(&bridge, &mut offset).sequence;
        }
        bridge.shutdown();
        if let Some(pending) = bridge.mailbox().try_take() {
            last = pending.sequence;
        }

        bridge.start().unwrap();
        let after = feed_until_taken(&bridge, &mut offset);
        assert!(
            after.sequence > last,
            "sequence {} after restart, {} before",
            after.sequence,
            last
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = BridgeConfig::default();
        config.analysis.band_count = 0;
        assert!(matches!(SpectrumBridge::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_processing_stays_fast_without_consumer() {
        let bridge = SpectrumBridge::new(test_config(free_port())).unwrap();
        bridge.start().unwrap();

        let mut output = vec![0.0; 1024];
        let mut slowest = Duration::ZERO;
        for block in 0..500 {
            let input = tone(1000.0, 512, block * 512);
            let started = Instant::now();
            bridge.realtime().process_interleaved(&input, &mut output, 2, 48_000.0);
            slowest = slowest.max(started.elapsed());
            assert_eq!(output, input);
        }

        // A block of 512 frames at 48 kHz lasts 10.6 ms
        assert!(slowest < Duration::from_millis(5), "slowest block took {:?}", slowest);
        assert_ne!(bridge.connection_state(), ConnectionState::Connected);

        let status = bridge.status();
        assert_eq!(status.blocks, 500);
        assert!(status.publisher.connect_attempts >= 1);
        assert_eq!(status.publisher.frames_sent, 0);
    }

    #[test]
    fn test_reset_and_port_override() {
        let bridge = SpectrumBridge::new(test_config(free_port())).unwrap();
        bridge.reset();
        bridge.set_port(9999);
        assert_eq!(bridge.status().publisher.port, 9999);

        bridge.set_enabled(false);
        assert!(!bridge.status().enabled);
    }

    #[test]
    fn test_end_to_end_frame_delivery() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            loop {
                if let Message::Binary(data) = ws.read().unwrap() {
                    return data;
                }
            }
        });

        let bridge = SpectrumBridge::new(test_config(port)).unwrap();
        bridge.start().unwrap();

        let mut output = vec![0.0; 1024];
        let mut offset = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while !server.is_finished() {
            assert!(Instant::now() < deadline, "no frame delivered");
            let input = tone(1000.0, 512, offset);
            bridge.realtime().process_interleaved(&input, &mut output, 2, 48_000.0);
            offset += 512;
            std::thread::sleep(Duration::from_millis(10));
        }

        let frame = server.join().unwrap();
        assert_eq!(frame.len(), frame_len(64));
        let snapshot = FrameDecoder::new(64).decode(&frame).unwrap();
        assert_eq!(snapshot.channels, 2);
        assert_eq!(snapshot.sample_rate, 48_000);
        assert!(snapshot.peak[0] > 0.1);
        assert!(snapshot.correlation > 0.99);
    }

    proptest! {
        #[test]
        fn prop_interleaved_pass_through_is_bit_identical(
            input in proptest::collection::vec(any::<f32>(), 0..2048),
            channels in 1usize..8,
        ) {
            let realtime = standalone_realtime();
            let mut output = vec![0.0f32; input.len()];
            realtime.process_interleaved(&input, &mut output, channels, 48_000.0);

            for (out, inp) in output.iter().zip(&input) {
                prop_assert_eq!(out.to_bits(), inp.to_bits());
            }
        }

        #[test]
        fn prop_planar_pass_through_is_bit_identical(
            left in proptest::collection::vec(any::<f32>(), 0..512),
            right in proptest::collection::vec(any::<f32>(), 0..512),
        ) {
            let realtime = standalone_realtime();
            let mut out_l = vec![0.0f32; left.len()];
            let mut out_r = vec![0.0f32; right.len()];
            {
                let inputs: [&[f32]; 2] = [&left, &right];
                let mut outputs: [&mut [f32]; 2] = [&mut out_l, &mut out_r];
                realtime.process_planar(&inputs, &mut outputs, 48_000.0);
            }

            prop_assert!(out_l.iter().zip(&left).all(|(o, i)| o.to_bits() == i.to_bits()));
            prop_assert!(out_r.iter().zip(&right).all(|(o, i)| o.to_bits() == i.to_bits()));
        }
    }
}
