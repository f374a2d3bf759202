//! cpal output backend
//!
//! ```text
//! ┌──────────────────┐  open()   ┌─────────────────────────┐
//! │  Control thread  │──────────►│  cadence-device thread  │
//! │                  │◄──ready───│  owns the cpal Stream   │
//! └──────────────────┘           │  parks until shutdown   │
//!          │ Drop                └───────────┬─────────────┘
//!          └──────shutdown──────────────────►│
//!                                            │ callback
//!                                  SoftwareMixer::render
//! ```
//!
//! The stream is created and dropped on its own thread because cpal streams
//! are not `Send` on every platform.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam::channel::{bounded, Sender};

use super::enumerate::find_output_device;
use crate::config::DeviceConfig;
use crate::error::{AudioError, AudioResult};
use crate::hardware::{Capabilities, SoftwareMixer};
use crate::types::DEFAULT_SAMPLE_RATE;

/// Negotiated stream parameters
pub(super) struct OutputStream {
    pub mixer: Arc<SoftwareMixer>,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub device_name: String,
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl OutputStream {
    /// Open the output device and start rendering
    ///
    /// Blocks until the device thread reports the stream running or failed.
    pub fn start(config: &DeviceConfig, caps: Capabilities) -> AudioResult<Self> {
        let config = config.clone();
        let (ready_tx, ready_rx) = bounded::<AudioResult<(Arc<SoftwareMixer>, u32, u32, String)>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("cadence-device".to_string())
            .spawn(move || {
                let stream = match open_stream(&config, caps) {
                    Ok((stream, info)) => {
                        let _ = ready_tx.send(Ok(info));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the device is closed (or its owner vanished)
                let _ = shutdown_rx.recv();
                drop(stream);
                log::debug!("Output stream closed");
            })
            .map_err(|e| AudioError::ContextError(format!("failed to spawn device thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| AudioError::ContextError("device thread exited during start-up".into()))
            .and_then(|result| result);

        match ready {
            Ok((mixer, sample_rate, buffer_size, device_name)) => Ok(Self {
                mixer,
                sample_rate,
                buffer_size,
                device_name,
                shutdown: shutdown_tx,
                thread: Some(thread),
            }),
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Device thread panicked");
            }
        }
    }
}

/// Build and start the stream (runs on the device thread)
fn open_stream(
    config: &DeviceConfig,
    caps: Capabilities,
) -> AudioResult<(Stream, (Arc<SoftwareMixer>, u32, u32, String))> {
    let device = find_output_device(config.output_device.as_ref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = select_output_config(&device, config)?;
    let sample_rate = supported.sample_rate().0;
    let buffer_size = config.buffer_size.frames();
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    };
    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        config.buffer_size.latency_ms(sample_rate)
    );

    let mixer = Arc::new(SoftwareMixer::new(sample_rate, caps));
    let render_mixer = Arc::clone(&mixer);
    let channels = stream_config.channels as usize;

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                render_mixer.render(data, channels);
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::DeviceError(format!("failed to build stream: {}", e)))?;
    stream
        .play()
        .map_err(|e| AudioError::DeviceError(format!("failed to start stream: {}", e)))?;

    log::info!("Output stream started");
    Ok((stream, (mixer, sample_rate, buffer_size, device_name)))
}

/// Pick an f32 stereo configuration at the requested rate
///
/// Falls back to any stereo f32 configuration, then to the first f32 one,
/// and uses the closest supported rate when the requested one is out of range.
fn select_output_config(
    device: &cpal::Device,
    config: &DeviceConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let target = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target)
    };

    let best = supported
        .iter()
        .filter(|c| c.channels() >= 2)
        .find(in_range)
        .or_else(|| supported.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported.first())
        .ok_or_else(|| AudioError::DeviceError("no f32 output configuration".into()))?;

    let rate = target.clamp(best.min_sample_rate().0, best.max_sample_rate().0);
    if rate != target {
        log::warn!(
            "Audio device doesn't support {}Hz, using {}Hz (sounds will be resampled)",
            target,
            rate
        );
    }
    Ok(best.clone().with_sample_rate(cpal::SampleRate(rate)))
}
