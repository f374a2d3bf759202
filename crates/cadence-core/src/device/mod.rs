//! Process-wide audio device and context
//!
//! [`AudioDevice`] owns the [`SoftwareMixer`] and whatever drives its render
//! loop: a cpal output stream, or a headless real-time clock. Only one output
//! context may exist per process; headless devices are unrestricted.

mod cpal_backend;
mod enumerate;
mod headless;

pub use enumerate::{get_output_devices, OutputDevice};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{BackendKind, DeviceConfig, EffectsConfig};
use crate::error::{AudioError, AudioResult};
use crate::hardware::{AudioHardware, Capabilities, SoftwareMixer};
use crate::types::DEFAULT_SAMPLE_RATE;

use cpal_backend::OutputStream;
use headless::ClockThread;

static OUTPUT_CONTEXT_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Claim on the process-wide output context, released on drop
struct ContextClaim;

impl ContextClaim {
    fn acquire() -> AudioResult<Self> {
        OUTPUT_CONTEXT_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ContextClaim)
            .map_err(|_| AudioError::ContextError("an output context is already open".into()))
    }
}

impl Drop for ContextClaim {
    fn drop(&mut self) {
        OUTPUT_CONTEXT_ACTIVE.store(false, Ordering::Release);
    }
}

enum Driver {
    // The stream stops before the claim is released
    Output {
        _stream: OutputStream,
        _claim: ContextClaim,
    },
    Headless(ClockThread),
}

/// An open audio device
pub struct AudioDevice {
    mixer: Arc<SoftwareMixer>,
    sample_rate: u32,
    buffer_size: u32,
    name: String,
    driver: Driver,
}

impl AudioDevice {
    /// Open the configured backend
    ///
    /// Fails with `ContextError` when another output context is open and with
    /// `DeviceError` when no usable output device exists.
    pub fn open(config: &DeviceConfig, effects: &EffectsConfig) -> AudioResult<Self> {
        let caps = Capabilities::from(effects);

        let device = match config.backend {
            BackendKind::Output => {
                let claim = ContextClaim::acquire()?;
                let stream = OutputStream::start(config, caps)?;
                Self {
                    mixer: Arc::clone(&stream.mixer),
                    sample_rate: stream.sample_rate,
                    buffer_size: stream.buffer_size,
                    name: stream.device_name.clone(),
                    driver: Driver::Output {
                        _stream: stream,
                        _claim: claim,
                    },
                }
            }
            BackendKind::Headless => {
                let sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE).max(1);
                let buffer_size = config.buffer_size.frames();
                let mixer = Arc::new(SoftwareMixer::new(sample_rate, caps));
                let clock = ClockThread::start(Arc::clone(&mixer), sample_rate, buffer_size)?;
                Self {
                    mixer,
                    sample_rate,
                    buffer_size,
                    name: "headless".to_string(),
                    driver: Driver::Headless(clock),
                }
            }
        };

        log::info!(
            "Audio device open: {} ({}Hz, {} frames, effects: {})",
            device.name,
            device.sample_rate,
            device.buffer_size,
            caps.effects
        );
        Ok(device)
    }

    /// The hardware interface channels drive
    pub fn hardware(&self) -> Arc<dyn AudioHardware> {
        self.mixer.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device period in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_headless(&self) -> bool {
        matches!(self.driver, Driver::Headless(_))
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        log::info!("Closing audio device: {}", self.name);
    }
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}
