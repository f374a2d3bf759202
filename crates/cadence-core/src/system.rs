//! Top-level engine handle
//!
//! [`AudioSystem`] opens the device, then builds the channel pool on top of
//! its hardware. Dropping it frees every channel before the device closes.

use crate::config::EngineConfig;
use crate::device::AudioDevice;
use crate::error::AudioResult;
use crate::events::{ChannelEvent, EventBus};
use crate::pool::ChannelPool;

use crossbeam::channel::Receiver;

pub struct AudioSystem {
    // Field order is drop order: channels release their voices while the
    // device is still running
    pool: ChannelPool,
    events: EventBus,
    device: AudioDevice,
    config: EngineConfig,
}

impl AudioSystem {
    pub fn new(config: EngineConfig) -> AudioResult<Self> {
        let device = AudioDevice::open(&config.device, &config.effects)?;
        let events = EventBus::default();
        let pool = ChannelPool::new(device.hardware(), config.streaming.clone(), events.publisher());

        log::info!(
            "Audio system ready: {} channels, {} x {} byte buffers, poll {} ms",
            pool.capacity(),
            config.streaming.buffer_count,
            config.streaming.buffer_capacity,
            config.streaming.poll_interval_ms
        );

        Ok(Self {
            pool,
            events,
            device,
            config,
        })
    }

    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    pub fn device(&self) -> &AudioDevice {
        &self.device
    }

    /// Subscribe to channel notifications
    pub fn events(&self) -> Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        log::info!("Shutting down audio system");
    }
}
