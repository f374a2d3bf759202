//! Hardware audio API boundary
//!
//! [`AudioHardware`] is the voice/buffer/effect-slot interface the channel
//! engine drives. It follows the familiar queued-source model:
//!
//! - a voice plays a FIFO queue of PCM buffers
//! - a buffer becomes *processed* once fully played and can then be unqueued
//! - a playing voice whose queue runs dry stops on its own (starvation)
//! - `stop` marks every queued buffer processed
//! - aux sends route a voice into effect slots, each running a snapshot of
//!   one effect object's parameters
//!
//! [`SoftwareMixer`] implements it in software; the `device` module drives
//! its [`render`](SoftwareMixer::render) from an output stream or a clock.

pub mod dsp;
mod mixer;

pub use mixer::SoftwareMixer;

use crate::config::EffectsConfig;
use crate::effect::{EffectParam, EffectType, ParamValue};
use crate::error::AudioResult;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(&self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// A playback voice
    VoiceId
);
handle!(
    /// A PCM buffer
    BufferId
);
handle!(
    /// An auxiliary effect slot
    SlotId
);
handle!(
    /// An effect object
    EffectId
);

/// Channel layout of buffer data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcmFormat {
    Mono,
    #[default]
    Stereo,
}

impl PcmFormat {
    pub fn channels(&self) -> usize {
        match self {
            PcmFormat::Mono => 1,
            PcmFormat::Stereo => 2,
        }
    }

    /// Size of one f32 frame in bytes
    pub fn frame_bytes(&self) -> usize {
        self.channels() * std::mem::size_of::<f32>()
    }
}

/// Voice playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    /// Never played
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// What the hardware can do beyond plain playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub effects: bool,
    pub advanced_reverb: bool,
    pub max_aux_sends: usize,
}

impl From<&EffectsConfig> for Capabilities {
    fn from(config: &EffectsConfig) -> Self {
        Self {
            effects: config.enabled,
            advanced_reverb: config.enabled && config.advanced_reverb,
            max_aux_sends: if config.enabled { config.max_aux_sends } else { 0 },
        }
    }
}

/// Voice, buffer and effect-slot interface of the audio hardware
///
/// Unknown or deleted handles fail with `InvalidPointer`; effect calls on
/// hardware without effect support fail with `ExtensionMissing`.
pub trait AudioHardware: Send + Sync {
    /// Output sample rate of the device
    fn output_rate(&self) -> u32;

    fn capabilities(&self) -> Capabilities;

    // Voices

    fn create_voice(&self) -> AudioResult<VoiceId>;
    fn delete_voice(&self, voice: VoiceId) -> AudioResult<()>;
    fn is_voice(&self, voice: VoiceId) -> bool;

    fn play(&self, voice: VoiceId) -> AudioResult<()>;
    fn pause(&self, voice: VoiceId) -> AudioResult<()>;
    fn stop(&self, voice: VoiceId) -> AudioResult<()>;
    fn voice_state(&self, voice: VoiceId) -> AudioResult<VoiceState>;

    fn set_gain(&self, voice: VoiceId, gain: f32) -> AudioResult<()>;
    fn gain(&self, voice: VoiceId) -> AudioResult<f32>;
    fn set_pitch(&self, voice: VoiceId, pitch: f32) -> AudioResult<()>;
    fn pitch(&self, voice: VoiceId) -> AudioResult<f32>;

    // Buffers

    fn create_buffers(&self, count: usize) -> AudioResult<Vec<BufferId>>;
    fn delete_buffers(&self, buffers: &[BufferId]) -> AudioResult<()>;

    /// Upload interleaved PCM into an unqueued buffer
    fn buffer_data(
        &self,
        buffer: BufferId,
        format: PcmFormat,
        sample_rate: u32,
        samples: &[f32],
    ) -> AudioResult<()>;

    /// Append buffers to a voice's queue
    fn queue_buffers(&self, voice: VoiceId, buffers: &[BufferId]) -> AudioResult<()>;

    /// Remove up to `max` processed buffers from the front of the queue
    fn unqueue_processed(&self, voice: VoiceId, max: usize) -> AudioResult<Vec<BufferId>>;

    fn processed_count(&self, voice: VoiceId) -> AudioResult<usize>;
    fn queued_count(&self, voice: VoiceId) -> AudioResult<usize>;

    /// The buffer currently playing and the frame offset inside it
    fn voice_offset(&self, voice: VoiceId) -> AudioResult<Option<(BufferId, u64)>>;

    // Effects

    fn create_effect(&self, kind: EffectType) -> AudioResult<EffectId>;
    fn delete_effect(&self, effect: EffectId) -> AudioResult<()>;
    fn effect_type(&self, effect: EffectId) -> AudioResult<EffectType>;
    fn set_effect_param(
        &self,
        effect: EffectId,
        param: EffectParam,
        value: ParamValue,
    ) -> AudioResult<()>;
    fn effect_param(&self, effect: EffectId, param: EffectParam) -> AudioResult<ParamValue>;

    fn create_slot(&self) -> AudioResult<SlotId>;
    fn delete_slot(&self, slot: SlotId) -> AudioResult<()>;

    /// Load an effect's current parameters into a slot (None unloads it)
    fn bind_slot_effect(&self, slot: SlotId, effect: Option<EffectId>) -> AudioResult<()>;

    /// Route aux send `index` of a voice into a slot (None disconnects it)
    fn set_voice_send(&self, voice: VoiceId, index: usize, slot: Option<SlotId>)
        -> AudioResult<()>;
}
