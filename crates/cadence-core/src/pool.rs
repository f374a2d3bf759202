//! Channel pool - the caller-facing surface of the engine
//!
//! A fixed table of [`MAX_CHANNELS`] slots indexed by `i32`. Slots are filled
//! lazily the first time a channel is played or given an effect, and every
//! slot has its own lock around create and destroy. Operations on a filled
//! slot run on a shared handle outside that lock, so a long `stop` on one
//! channel never blocks another.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::channel::Channel;
use crate::config::StreamingConfig;
use crate::effect::{Effect, EffectParam, EffectType, ParamValue, ReverbPreset, ReverbProperties};
use crate::error::{AudioError, AudioResult};
use crate::events::EventPublisher;
use crate::hardware::AudioHardware;
use crate::sound::{SampleEncoding, Sound, SoundFormat};
use crate::types::{ChannelState, PlaybackState, MAX_CHANNELS};

type Slot = Mutex<Option<Arc<Channel>>>;

/// Fixed registry of playback channels
pub struct ChannelPool {
    hw: Arc<dyn AudioHardware>,
    streaming: StreamingConfig,
    events: EventPublisher,
    slots: Vec<Slot>,
}

impl ChannelPool {
    pub fn new(hw: Arc<dyn AudioHardware>, streaming: StreamingConfig, events: EventPublisher) -> Self {
        let slots = (0..MAX_CHANNELS).map(|_| Mutex::new(None)).collect();
        Self {
            hw,
            streaming,
            events,
            slots,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Channel at `index`, created on first use
    pub fn resolve(&self, index: i32) -> AudioResult<Arc<Channel>> {
        let mut slot = self.slot(index)?;
        if let Some(channel) = slot.as_ref() {
            return Ok(Arc::clone(channel));
        }

        let channel = Arc::new(Channel::new(
            index,
            Arc::clone(&self.hw),
            &self.streaming,
            self.events.clone(),
        )?);
        *slot = Some(Arc::clone(&channel));
        Ok(channel)
    }

    /// Channel at `index` if the slot is filled
    pub fn channel(&self, index: i32) -> AudioResult<Option<Arc<Channel>>> {
        Ok(self.slot(index)?.clone())
    }

    /// Stop the channel, release its hardware resources and empty the slot
    ///
    /// Blocks until the channel's worker has exited. Freeing an empty slot is
    /// a no-op.
    pub fn free(&self, index: i32) -> AudioResult<()> {
        let channel = self.slot(index)?.take();
        if let Some(channel) = channel {
            channel.stop()?;
            log::debug!("Freeing channel {}", index);
        }
        Ok(())
    }

    pub fn free_all(&self) {
        for index in 0..self.slots.len() as i32 {
            if let Err(e) = self.free(index) {
                log::warn!("Failed to free channel {}: {}", index, e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    /// Play a file on a channel
    ///
    /// The path is checked before the slot is touched, so a missing file
    /// never allocates a channel.
    pub fn play(
        &self,
        index: i32,
        path: impl AsRef<Path>,
        gain: f32,
        pitch: f32,
        loop_count: i32,
    ) -> AudioResult<()> {
        check_index(index)?;
        let path = Sound::normalize_path(path.as_ref())?;
        self.resolve(index)?.play(&path, gain, pitch, loop_count)
    }

    pub fn stop(&self, index: i32) -> AudioResult<()> {
        match self.channel(index)? {
            Some(channel) => channel.stop(),
            None => Ok(()),
        }
    }

    pub fn pause(&self, index: i32) -> AudioResult<()> {
        self.bound(index)?.pause()
    }

    pub fn resume(&self, index: i32) -> AudioResult<()> {
        self.bound(index)?.resume()
    }

    pub fn seek(&self, index: i32, ms: u64) -> AudioResult<()> {
        self.bound(index)?.seek(ms)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn position(&self, index: i32) -> AudioResult<u64> {
        self.bound(index)?.position()
    }

    pub fn duration(&self, index: i32) -> AudioResult<u64> {
        self.bound(index)?.duration()
    }

    pub fn loop_count(&self, index: i32) -> AudioResult<i32> {
        self.bound(index)?.loop_count()
    }

    pub fn set_loop_count(&self, index: i32, count: i32) -> AudioResult<()> {
        self.bound(index)?.set_loop_count(count)
    }

    pub fn volume(&self, index: i32) -> AudioResult<f32> {
        self.bound(index)?.volume()
    }

    pub fn set_volume(&self, index: i32, volume: f32) -> AudioResult<()> {
        self.bound(index)?.set_volume(volume)
    }

    pub fn pitch(&self, index: i32) -> AudioResult<f32> {
        self.bound(index)?.pitch()
    }

    pub fn set_pitch(&self, index: i32, pitch: f32) -> AudioResult<()> {
        self.bound(index)?.set_pitch(pitch)
    }

    pub fn playback_state(&self, index: i32) -> AudioResult<PlaybackState> {
        self.bound(index)?.playback_state()
    }

    /// Streaming state of the channel (`Idle` for an empty slot)
    pub fn channel_state(&self, index: i32) -> AudioResult<ChannelState> {
        Ok(self
            .channel(index)?
            .map(|channel| channel.state())
            .unwrap_or_default())
    }

    pub fn sample_rate(&self, index: i32) -> AudioResult<u32> {
        self.bound(index)?.sample_rate()
    }

    pub fn channel_count(&self, index: i32) -> AudioResult<u16> {
        self.bound(index)?.channel_count()
    }

    pub fn frame_count(&self, index: i32) -> AudioResult<u64> {
        self.bound(index)?.frame_count()
    }

    pub fn section_count(&self, index: i32) -> AudioResult<u32> {
        self.bound(index)?.section_count()
    }

    pub fn format(&self, index: i32) -> AudioResult<SoundFormat> {
        self.bound(index)?.format()
    }

    pub fn encoding(&self, index: i32) -> AudioResult<SampleEncoding> {
        self.bound(index)?.encoding()
    }

    pub fn info(&self, index: i32, key: &str) -> AudioResult<String> {
        self.bound(index)?.info(key)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Effects
    // ─────────────────────────────────────────────────────────────────────

    pub fn create_effect(&self, kind: EffectType) -> AudioResult<Effect> {
        let id = self.hw.create_effect(kind)?;
        log::debug!("Created {} effect {}", kind.name(), id.raw());
        Ok(Effect::new(id, kind))
    }

    /// Route a channel into an effect (no-op if already attached)
    pub fn attach(&self, index: i32, effect: Effect) -> AudioResult<()> {
        self.resolve(index)?.attach(effect)
    }

    pub fn detach(&self, index: i32, effect: Effect) -> AudioResult<()> {
        match self.channel(index)? {
            Some(channel) => channel.detach(effect),
            None => Ok(()),
        }
    }

    /// Whether the channel sends into `effect`; false for invalid indexes
    pub fn is_attached(&self, index: i32, effect: Effect) -> bool {
        matches!(self.channel(index), Ok(Some(channel)) if channel.is_attached(effect))
    }

    /// Detach the effect from every channel, then delete it
    pub fn release_effect(&self, effect: Effect) -> AudioResult<()> {
        for channel in self.filled() {
            channel.detach(effect)?;
        }
        self.hw.delete_effect(effect.id)?;
        log::debug!("Released {} effect {}", effect.kind().name(), effect.id.raw());
        Ok(())
    }

    /// Push the effect's current parameters to every send that uses it
    ///
    /// Parameter edits are not heard until this is called. Returns the
    /// number of sends refreshed.
    pub fn update_effect(&self, effect: Effect) -> AudioResult<usize> {
        let mut refreshed = 0;
        for channel in self.filled() {
            refreshed += channel.rebind(effect)?;
        }
        Ok(refreshed)
    }

    pub fn set_effect_param(&self, effect: Effect, param: EffectParam, value: ParamValue) -> AudioResult<()> {
        self.hw.set_effect_param(effect.id, param, value)
    }

    pub fn effect_param(&self, effect: Effect, param: EffectParam) -> AudioResult<ParamValue> {
        self.hw.effect_param(effect.id, param)
    }

    /// Create a reverb loaded with a preset
    ///
    /// Uses the advanced reverb when the hardware has it.
    pub fn create_reverb(&self, preset: ReverbPreset) -> AudioResult<Effect> {
        let kind = if self.hw.capabilities().advanced_reverb {
            EffectType::AdvancedReverb
        } else {
            EffectType::Reverb
        };
        let effect = self.create_effect(kind)?;
        if let Err(e) = self.apply_reverb_preset(effect, preset) {
            let _ = self.hw.delete_effect(effect.id);
            return Err(e);
        }
        Ok(effect)
    }

    /// Load a preset into a reverb effect and refresh its sends
    pub fn apply_reverb_preset(&self, effect: Effect, preset: ReverbPreset) -> AudioResult<()> {
        self.apply_reverb_properties(effect, &preset.properties())?;
        log::debug!("Applied reverb preset '{}' to effect {}", preset, effect.id.raw());
        Ok(())
    }

    /// Write reverb properties into a reverb effect
    ///
    /// The basic reverb takes the subset of fields it understands.
    pub fn apply_reverb_properties(&self, effect: Effect, props: &ReverbProperties) -> AudioResult<()> {
        if !effect.kind().is_reverb() {
            return Err(AudioError::InvalidPointer(format!(
                "{} effect is not a reverb",
                effect.kind().name()
            )));
        }
        for (param, value) in props.param_values(effect.kind()) {
            self.hw.set_effect_param(effect.id, param, value)?;
        }
        self.update_effect(effect)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────

    fn slot(&self, index: i32) -> AudioResult<MutexGuard<'_, Option<Arc<Channel>>>> {
        let slot = &self.slots[check_index(index)?];
        Ok(slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn bound(&self, index: i32) -> AudioResult<Arc<Channel>> {
        self.channel(index)?.ok_or(AudioError::NoSound)
    }

    fn filled(&self) -> Vec<Arc<Channel>> {
        self.slots
            .iter()
            .filter_map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }
}

impl Drop for ChannelPool {
    fn drop(&mut self) {
        self.free_all();
    }
}

fn check_index(index: i32) -> AudioResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < MAX_CHANNELS)
        .ok_or_else(|| AudioError::OutOfRange(format!("channel index {} not in 0..{}", index, MAX_CHANNELS)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectsConfig;
    use crate::events::EventBus;
    use crate::hardware::{Capabilities, SoftwareMixer};

    fn pool_with(effects: EffectsConfig) -> ChannelPool {
        let mixer = Arc::new(SoftwareMixer::new(48000, Capabilities::from(&effects)));
        ChannelPool::new(mixer, StreamingConfig::default(), EventBus::default().publisher())
    }

    fn pool() -> ChannelPool {
        pool_with(EffectsConfig::default())
    }

    #[test]
    fn test_invalid_index() {
        let pool = pool();
        assert!(matches!(pool.volume(-1), Err(AudioError::OutOfRange(_))));
        assert_eq!(pool.volume(-1).unwrap_or_default(), 0.0);
        assert!(matches!(pool.resolve(MAX_CHANNELS as i32), Err(AudioError::OutOfRange(_))));
        assert!(matches!(pool.play(-3, "x.wav", 1.0, 1.0, 0), Err(AudioError::OutOfRange(_))));
        assert!(matches!(pool.free(40), Err(AudioError::OutOfRange(_))));
    }

    #[test]
    fn test_empty_slot() {
        let pool = pool();
        assert_eq!(pool.volume(0), Err(AudioError::NoSound));
        assert_eq!(pool.playback_state(0).unwrap_or_default(), PlaybackState::Stopped);
        assert_eq!(pool.channel_state(0).unwrap(), ChannelState::Idle);
        assert!(pool.stop(0).is_ok());
        assert!(pool.free(0).is_ok());
        assert!(pool.channel(0).unwrap().is_none());
    }

    #[test]
    fn test_missing_file_allocates_nothing() {
        let pool = pool();
        let err = pool.play(5, "/no/such/file.wav", 1.0, 1.0, 0).unwrap_err();
        assert!(matches!(err, AudioError::FileNotFound(_)));
        assert!(pool.channel(5).unwrap().is_none());
    }

    #[test]
    fn test_resolve_is_lazy_and_stable() {
        let pool = pool();
        let a = pool.resolve(3).unwrap();
        let b = pool.resolve(3).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.index(), 3);

        drop((a, b));
        pool.free(3).unwrap();
        assert!(pool.channel(3).unwrap().is_none());
        pool.free(3).unwrap();
    }

    #[test]
    fn test_attach_idempotent_through_pool() {
        let pool = pool();
        let echo = pool.create_effect(EffectType::Echo).unwrap();
        pool.attach(0, echo).unwrap();
        pool.attach(0, echo).unwrap();
        assert!(pool.is_attached(0, echo));
        assert_eq!(pool.resolve(0).unwrap().sends().len(), 1);
        assert!(!pool.is_attached(1, echo));
        assert!(!pool.is_attached(-1, echo));
    }

    #[test]
    fn test_release_effect_detaches_everywhere() {
        let pool = pool();
        let echo = pool.create_effect(EffectType::Echo).unwrap();
        let ring = pool.create_effect(EffectType::RingModulator).unwrap();
        for index in [0, 4, 9] {
            pool.attach(index, echo).unwrap();
            pool.attach(index, ring).unwrap();
        }
        assert_eq!(pool.update_effect(echo).unwrap(), 3);

        pool.release_effect(echo).unwrap();
        for index in [0, 4, 9] {
            assert!(!pool.is_attached(index, echo));
            let sends = pool.resolve(index).unwrap().sends();
            assert_eq!(sends.len(), 1);
            assert_eq!(sends[0].effect, ring);
        }
        assert!(matches!(
            pool.effect_param(echo, EffectParam::EchoDelay),
            Err(AudioError::InvalidPointer(_))
        ));

        // Releasing an effect attached nowhere
        let idle = pool.create_effect(EffectType::Distortion).unwrap();
        pool.release_effect(idle).unwrap();
    }

    #[test]
    fn test_create_reverb_picks_variant() {
        let pool = pool();
        let reverb = pool.create_reverb(ReverbPreset::Cave).unwrap();
        assert_eq!(reverb.kind(), EffectType::AdvancedReverb);
        let decay = pool.effect_param(reverb, EffectParam::DecayTime).unwrap();
        assert_eq!(decay, ParamValue::Float(ReverbPreset::Cave.properties().decay_time));

        let basic = pool_with(EffectsConfig {
            advanced_reverb: false,
            ..Default::default()
        });
        let reverb = basic.create_reverb(ReverbPreset::Hangar).unwrap();
        assert_eq!(reverb.kind(), EffectType::Reverb);
    }

    #[test]
    fn test_preset_on_non_reverb_is_rejected() {
        let pool = pool();
        let echo = pool.create_effect(EffectType::Echo).unwrap();
        assert!(matches!(
            pool.apply_reverb_preset(echo, ReverbPreset::Arena),
            Err(AudioError::InvalidPointer(_))
        ));
    }

    #[test]
    fn test_effects_disabled() {
        let pool = pool_with(EffectsConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(matches!(
            pool.create_effect(EffectType::Echo),
            Err(AudioError::ExtensionMissing(_))
        ));
    }
}
