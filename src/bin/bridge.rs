//! Spectrum Bridge standalone host
//!
//! Runs one bridge outside a plugin host. Audio comes from a synthetic
//! swept tone delivered at buffer cadence, or from an input device when
//! built with the `capture` feature and started with `--device`.
//!
//! Usage: spectrum-bridge [--device <name|default>] [--list-devices] [config.toml]

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spectrum_bridge::{constants::DEFAULT_SAMPLE_RATE, BridgeConfig, SpectrumBridge};

/// Frames per synthetic audio block
const BLOCK_FRAMES: usize = 512;

/// Seconds for one 50 Hz to 10 kHz sweep
const SWEEP_SECONDS: f32 = 8.0;

struct Args {
    config: Option<PathBuf>,
    device: Option<String>,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        device: None,
        list_devices: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--device" => {
                args.device = Some(
                    iter.next()
                        .ok_or_else(|| anyhow::anyhow!("--device needs a device name"))?,
                );
            }
            "--list-devices" => args.list_devices = true,
            path => args.config = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

/// Stereo sine sweep, slightly detuned between channels
struct ToneGenerator {
    sample_rate: f32,
    phase: [f32; 2],
    elapsed: f32,
}

impl ToneGenerator {
    fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            phase: [0.0; 2],
            elapsed: 0.0,
        }
    }

    fn fill(&mut self, block: &mut [f32]) {
        let dt = 1.0 / self.sample_rate;
        for frame in block.chunks_exact_mut(2) {
            let position = self.elapsed / SWEEP_SECONDS;
            let freq = 50.0 * (10_000.0f32 / 50.0).powf(position);

            for (ch, sample) in frame.iter_mut().enumerate() {
                let detune = if ch == 0 { 1.0 } else { 1.003 };
                self.phase[ch] = (self.phase[ch] + freq * detune * dt).fract();
                *sample = 0.5 * (2.0 * std::f32::consts::PI * self.phase[ch]).sin();
            }
            self.elapsed = (self.elapsed + dt) % SWEEP_SECONDS;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    tracing::info!("Starting Spectrum Bridge");

    let config = BridgeConfig::load_or_default(args.config.as_deref())?;
    let bridge = Arc::new(SpectrumBridge::new(config)?);
    bridge.start()?;

    match args.device {
        Some(device) => run_capture(Arc::clone(&bridge), &device).await?,
        None => run_tone(&bridge).await,
    }

    bridge.shutdown();
    log_stats(&bridge);
    Ok(())
}

/// Feed the bridge from the tone generator until Ctrl+C
async fn run_tone(bridge: &SpectrumBridge) {
    let sample_rate = DEFAULT_SAMPLE_RATE as f32;
    let block_period = Duration::from_secs_f64(BLOCK_FRAMES as f64 / DEFAULT_SAMPLE_RATE as f64);

    let mut generator = ToneGenerator::new(sample_rate);
    let mut input = vec![0.0f32; BLOCK_FRAMES * 2];
    let mut output = vec![0.0f32; BLOCK_FRAMES * 2];

    let mut blocks = tokio::time::interval(block_period);
    blocks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut stats = tokio::time::interval(Duration::from_secs(5));

    tracing::info!(
        "Generating a {}-frame test sweep every {:?} - press Ctrl+C to stop",
        BLOCK_FRAMES,
        block_period
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down");
                break;
            }
            _ = blocks.tick() => {
                generator.fill(&mut input);
                bridge.realtime().process_interleaved(&input, &mut output, 2, sample_rate);
            }
            _ = stats.tick() => log_stats(bridge),
        }
    }
}

#[cfg(feature = "capture")]
async fn run_capture(bridge: Arc<SpectrumBridge>, device: &str) -> Result<()> {
    use spectrum_bridge::audio::InputCapture;

    let device = (device != "default").then_some(device);
    let capture = InputCapture::start(Arc::clone(&bridge), device)?;
    tracing::info!("Press Ctrl+C to stop");

    let mut stats = tokio::time::interval(Duration::from_secs(5));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down");
                break;
            }
            _ = stats.tick() => {
                if let Some(e) = capture.check_errors() {
                    tracing::warn!("Stream error on {}: {}", capture.device_name(), e);
                }
                log_stats(&bridge);
            }
        }
    }

    capture.stop();
    Ok(())
}

#[cfg(not(feature = "capture"))]
async fn run_capture(_bridge: Arc<SpectrumBridge>, _device: &str) -> Result<()> {
    anyhow::bail!("device capture needs the `capture` feature")
}

#[cfg(feature = "capture")]
fn list_devices() {
    println!("\n=== Available Input Devices ===");
    for device in spectrum_bridge::audio::list_input_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

#[cfg(not(feature = "capture"))]
fn list_devices() {
    println!("Device listing needs the `capture` feature");
}

fn log_stats(bridge: &SpectrumBridge) {
    let status = bridge.status();
    tracing::info!(
        "Stats: {} ({}), {} blocks, {:.0}% queued, {} overwritten, {} snapshots, {} frames sent, {:.1} KB sent",
        status.publisher.state,
        status.publisher.port,
        status.blocks,
        status.accumulator.fill_level() * 100.0,
        status.accumulator.overwritten,
        status.mailbox.written,
        status.publisher.frames_sent,
        status.publisher.bytes_sent as f64 / 1024.0
    );
    if let Some(error) = status.last_error {
        tracing::debug!("Last connection error: {}", error);
    }
}
