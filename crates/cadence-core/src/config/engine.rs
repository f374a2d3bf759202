//! Engine configuration
//!
//! Device selection, streaming ring geometry and effect capabilities.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_BUFFER_COUNT, DEFAULT_POLL_INTERVAL_MS,
};

/// Maximum device period to pre-allocate for (frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default device period when no preference is specified (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Which backend drives the software mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Real output device through cpal
    #[default]
    Output,
    /// Real-time clock thread without an audio device (CI, servers, tests)
    Headless,
}

/// Preferred device period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the engine choose
    #[default]
    Default,
    /// Request a specific period in frames (clamped to 64..=MAX_BUFFER_SIZE)
    Fixed(u32),
    /// Smallest period known to be stable on most systems
    LowLatency,
}

impl BufferSize {
    /// Resolve to a concrete period in frames
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BUFFER_SIZE as u32),
            BufferSize::LowLatency => 256,
        }
    }

    /// Latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, JACK, WASAPI…).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier; None = search every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Device/context configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: BackendKind,
    /// Output device (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<DeviceId>,
    /// Preferred output sample rate (None = DEFAULT_SAMPLE_RATE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    pub buffer_size: BufferSize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            output_device: None,
            sample_rate: None,
            buffer_size: BufferSize::default(),
        }
    }
}

/// Streaming ring geometry for every channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Hardware buffers per channel
    pub buffer_count: usize,
    /// Bytes per hardware buffer; frames per buffer = capacity / frame size
    pub buffer_capacity: usize,
    /// Fill-loop wake interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl StreamingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Frames that fit in one hardware buffer for a given frame size in bytes
    pub fn frames_per_buffer(&self, frame_bytes: usize) -> usize {
        (self.buffer_capacity / frame_bytes.max(1)).max(1)
    }
}

/// Auxiliary effect capabilities of the hardware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// False behaves like hardware without the effects extension
    pub enabled: bool,
    /// Auxiliary sends available on each voice
    pub max_aux_sends: usize,
    /// False behaves like hardware with only the basic reverb variant
    pub advanced_reverb: bool,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_aux_sends: 4,
            advanced_reverb: true,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub device: DeviceConfig,
    pub streaming: StreamingConfig,
    pub effects: EffectsConfig,
}

impl EngineConfig {
    /// Configuration for running without an audio device
    pub fn headless() -> Self {
        Self {
            device: DeviceConfig {
                backend: BackendKind::Headless,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Set the fill-loop wake interval
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.streaming.poll_interval_ms = ms;
        self
    }

    /// Set the hardware buffer size in bytes
    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.streaming.buffer_capacity = bytes;
        self
    }

    /// Set the output device
    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.device.output_device = Some(device);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.device.sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(16).frames(), 64);
        assert_eq!(BufferSize::Fixed(1_000_000).frames(), MAX_BUFFER_SIZE as u32);
        assert_eq!(BufferSize::LowLatency.frames(), 256);
    }

    #[test]
    fn test_frames_per_buffer() {
        let streaming = StreamingConfig::default();
        // Stereo f32 frame = 8 bytes
        assert_eq!(streaming.frames_per_buffer(8), DEFAULT_BUFFER_CAPACITY / 8);
        assert_eq!(streaming.frames_per_buffer(0), DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn test_headless_builder() {
        let config = EngineConfig::headless().with_poll_interval_ms(5).with_sample_rate(44100);
        assert_eq!(config.device.backend, BackendKind::Headless);
        assert_eq!(config.streaming.poll_interval(), Duration::from_millis(5));
        assert_eq!(config.device.sample_rate, Some(44100));
    }

    #[test]
    fn test_device_id_label() {
        assert_eq!(DeviceId::with_host("hw:0,0", "ALSA").display_label(), "[ALSA] hw:0,0");
        assert_eq!(DeviceId::new("Speakers").display_label(), "Speakers");
    }
}
