//! Drive a bridge from a live input device (standalone host only)
//!
//! The cpal stream lives on its own thread, since streams are not `Send` on
//! every platform. The input callback plays the role of a plugin's process
//! call: it hands each block to [`RealtimeBridge::on_audio_block`].
//!
//! [`RealtimeBridge::on_audio_block`]: crate::bridge::RealtimeBridge::on_audio_block

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::device::find_input_device;
use crate::bridge::{AudioBlock, SpectrumBridge};
use crate::error::AudioError;
use crate::worker::{ShutdownSignal, Worker};

/// A running input stream feeding one bridge
pub struct InputCapture {
    device_name: String,
    config: StreamConfig,
    worker: Worker<()>,
    error_rx: Receiver<AudioError>,
}

impl InputCapture {
    /// Open `device` (or the default input) and start feeding `bridge`
    pub fn start(bridge: Arc<SpectrumBridge>, device: Option<&str>) -> Result<Self, AudioError> {
        let device = find_input_device(device)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} delivers {:?}, need f32",
                device_name,
                supported.sample_format()
            )));
        }

        let config: StreamConfig = supported.config();
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let stream_config = config.clone();
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0 as f32;

        let worker = Worker::spawn("spectrum-capture", move |shutdown: ShutdownSignal| {
            let stream = device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block = AudioBlock::Interleaved { samples: data, channels };
                    bridge.realtime().on_audio_block(block, sample_rate);
                },
                move |err| {
                    let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                },
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Stream is dropped on shutdown, stopping capture
            while !shutdown.wait(Duration::from_secs(1)) {}
        })
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::StreamError("capture thread exited".to_string()))??;

        tracing::info!(
            "Capturing from {} ({} ch @ {} Hz)",
            device_name,
            config.channels,
            config.sample_rate.0
        );

        Ok(Self {
            device_name,
            config,
            worker,
            error_rx,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Next stream error reported by the device, if any
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }

    /// Stop the stream and join its thread
    pub fn stop(mut self) {
        self.worker.stop();
    }
}
