//! Software implementation of the hardware boundary
//!
//! All objects live behind one mutex. Control calls hold it for a few map
//! operations; [`SoftwareMixer::render`] holds it for one device period.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::dsp::{build_dsp, EffectDsp};
use super::{
    AudioHardware, BufferId, Capabilities, EffectId, PcmFormat, SlotId, VoiceId, VoiceState,
};
use crate::effect::{EffectParam, EffectType, ParamSet, ParamValue};
use crate::error::{AudioError, AudioResult};
use crate::types::{StereoBuffer, StereoSample};

/// Upper bound on live voices
pub const MAX_VOICES: usize = 256;

/// Upper bound on live buffers
pub const MAX_BUFFERS: usize = 4096;

struct BufferData {
    format: PcmFormat,
    rate: u32,
    samples: Vec<f32>,
    queued_on: Option<VoiceId>,
}

impl BufferData {
    fn frames(&self) -> usize {
        self.samples.len() / self.format.channels()
    }

    #[inline]
    fn frame(&self, index: usize) -> StereoSample {
        match self.format {
            PcmFormat::Mono => StereoSample::mono(self.samples[index]),
            PcmFormat::Stereo => {
                StereoSample::new(self.samples[index * 2], self.samples[index * 2 + 1])
            }
        }
    }
}

struct Voice {
    state: VoiceState,
    queue: VecDeque<BufferId>,
    /// Index of the first unprocessed buffer in `queue`
    current: usize,
    /// Fractional read position inside the current buffer (frames)
    cursor: f64,
    gain: f32,
    pitch: f32,
    sends: Vec<Option<SlotId>>,
}

impl Voice {
    fn new(aux_sends: usize) -> Self {
        Self {
            state: VoiceState::Initial,
            queue: VecDeque::new(),
            current: 0,
            cursor: 0.0,
            gain: 1.0,
            pitch: 1.0,
            sends: vec![None; aux_sends],
        }
    }

    /// Produce the next output frame, advancing through the queue
    ///
    /// Returns `None` once every queued buffer is processed.
    #[inline]
    fn next_frame(
        &mut self,
        buffers: &HashMap<BufferId, BufferData>,
        output_rate: u32,
    ) -> Option<StereoSample> {
        loop {
            let id = *self.queue.get(self.current)?;
            let Some(buffer) = buffers.get(&id) else {
                self.current += 1;
                self.cursor = 0.0;
                continue;
            };

            let frames = buffer.frames();
            let index = self.cursor as usize;
            if index >= frames {
                self.cursor = (self.cursor - frames as f64).max(0.0);
                self.current += 1;
                continue;
            }

            let frac = (self.cursor - index as f64) as f32;
            let a = buffer.frame(index);
            let b = buffer.frame((index + 1).min(frames - 1));
            self.cursor += buffer.rate as f64 / output_rate as f64 * self.pitch as f64;
            return Some(a * (1.0 - frac) + b * frac);
        }
    }

    fn has_pending(&self) -> bool {
        self.current < self.queue.len()
    }
}

struct AuxSlot {
    effect: Option<EffectId>,
    dsp: Option<Box<dyn EffectDsp>>,
    bus: StereoBuffer,
}

struct MixerState {
    next_id: u32,
    voices: HashMap<VoiceId, Voice>,
    buffers: HashMap<BufferId, BufferData>,
    effects: HashMap<EffectId, ParamSet>,
    slots: HashMap<SlotId, AuxSlot>,
    dry: StereoBuffer,
}

impl MixerState {
    fn allocate_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    fn voice(&mut self, voice: VoiceId) -> AudioResult<&mut Voice> {
        self.voices
            .get_mut(&voice)
            .ok_or_else(|| AudioError::InvalidPointer(format!("voice {}", voice.0)))
    }

    fn buffer(&mut self, buffer: BufferId) -> AudioResult<&mut BufferData> {
        self.buffers
            .get_mut(&buffer)
            .ok_or_else(|| AudioError::InvalidPointer(format!("buffer {}", buffer.0)))
    }

    fn effect(&mut self, effect: EffectId) -> AudioResult<&mut ParamSet> {
        self.effects
            .get_mut(&effect)
            .ok_or_else(|| AudioError::InvalidPointer(format!("effect {}", effect.0)))
    }

    fn slot(&mut self, slot: SlotId) -> AudioResult<&mut AuxSlot> {
        self.slots
            .get_mut(&slot)
            .ok_or_else(|| AudioError::InvalidPointer(format!("aux slot {}", slot.0)))
    }
}

/// Mixes every playing voice and its aux sends into an output buffer
pub struct SoftwareMixer {
    output_rate: u32,
    caps: Capabilities,
    state: Mutex<MixerState>,
}

impl SoftwareMixer {
    pub fn new(output_rate: u32, caps: Capabilities) -> Self {
        log::debug!(
            "SoftwareMixer: {} Hz, effects={}, advanced_reverb={}, aux sends={}",
            output_rate,
            caps.effects,
            caps.advanced_reverb,
            caps.max_aux_sends
        );
        Self {
            output_rate: output_rate.max(1),
            caps,
            state: Mutex::new(MixerState {
                next_id: 0,
                voices: HashMap::new(),
                buffers: HashMap::new(),
                effects: HashMap::new(),
                slots: HashMap::new(),
                dry: StereoBuffer::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MixerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_effects(&self) -> AudioResult<()> {
        if self.caps.effects {
            Ok(())
        } else {
            Err(AudioError::ExtensionMissing("auxiliary effects"))
        }
    }

    /// Render one period of interleaved output
    ///
    /// Mono output averages both sides; channels past the second are silent.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let output_rate = self.output_rate;

        let mut guard = self.lock();
        let MixerState {
            voices,
            buffers,
            slots,
            dry,
            ..
        } = &mut *guard;

        dry.set_len_from_capacity(frames);
        dry.fill_silence();
        for slot in slots.values_mut() {
            slot.bus.set_len_from_capacity(frames);
            slot.bus.fill_silence();
        }

        for voice in voices.values_mut() {
            if voice.state != VoiceState::Playing {
                continue;
            }
            for f in 0..frames {
                let Some(sample) = voice.next_frame(buffers, output_rate) else {
                    // Starved: every queued buffer has been played
                    voice.state = VoiceState::Stopped;
                    voice.cursor = 0.0;
                    break;
                };
                let sample = sample * voice.gain;
                dry[f] += sample;
                for slot_id in voice.sends.iter().flatten() {
                    if let Some(slot) = slots.get_mut(slot_id) {
                        slot.bus[f] += sample;
                    }
                }
            }
        }

        for slot in slots.values_mut() {
            if let Some(dsp) = slot.dsp.as_mut() {
                dsp.process(&mut slot.bus);
                dry.add_buffer(&slot.bus);
            }
        }

        match channels {
            1 => {
                for (frame, sample) in out.iter_mut().zip(dry.iter()) {
                    *frame = (sample.left + sample.right) * 0.5;
                }
            }
            2 => out[..frames * 2].copy_from_slice(dry.as_interleaved()),
            _ => {
                for (frame, sample) in out.chunks_exact_mut(channels).zip(dry.iter()) {
                    frame[0] = sample.left;
                    frame[1] = sample.right;
                    frame[2..].fill(0.0);
                }
            }
        }
    }
}

impl AudioHardware for SoftwareMixer {
    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn create_voice(&self) -> AudioResult<VoiceId> {
        let mut state = self.lock();
        if state.voices.len() >= MAX_VOICES {
            return Err(AudioError::OutOfMemory(format!("voice limit ({}) reached", MAX_VOICES)));
        }
        let id = VoiceId(state.allocate_id());
        state.voices.insert(id, Voice::new(self.caps.max_aux_sends));
        Ok(id)
    }

    fn delete_voice(&self, voice: VoiceId) -> AudioResult<()> {
        let mut state = self.lock();
        let removed = state
            .voices
            .remove(&voice)
            .ok_or_else(|| AudioError::InvalidPointer(format!("voice {}", voice.0)))?;
        for id in removed.queue {
            if let Some(buffer) = state.buffers.get_mut(&id) {
                buffer.queued_on = None;
            }
        }
        Ok(())
    }

    fn is_voice(&self, voice: VoiceId) -> bool {
        self.lock().voices.contains_key(&voice)
    }

    fn play(&self, voice: VoiceId) -> AudioResult<()> {
        let mut state = self.lock();
        let v = state.voice(voice)?;
        match v.state {
            VoiceState::Playing => {}
            VoiceState::Paused => {
                v.state = if v.has_pending() {
                    VoiceState::Playing
                } else {
                    VoiceState::Stopped
                };
            }
            VoiceState::Initial | VoiceState::Stopped => {
                v.cursor = 0.0;
                v.state = if v.has_pending() {
                    VoiceState::Playing
                } else {
                    VoiceState::Stopped
                };
            }
        }
        Ok(())
    }

    fn pause(&self, voice: VoiceId) -> AudioResult<()> {
        let mut state = self.lock();
        let v = state.voice(voice)?;
        v.state = VoiceState::Paused;
        Ok(())
    }

    fn stop(&self, voice: VoiceId) -> AudioResult<()> {
        let mut state = self.lock();
        let v = state.voice(voice)?;
        v.state = VoiceState::Stopped;
        v.current = v.queue.len();
        v.cursor = 0.0;
        Ok(())
    }

    fn voice_state(&self, voice: VoiceId) -> AudioResult<VoiceState> {
        Ok(self.lock().voice(voice)?.state)
    }

    fn set_gain(&self, voice: VoiceId, gain: f32) -> AudioResult<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(AudioError::OutOfRange(format!("gain {}", gain)));
        }
        self.lock().voice(voice)?.gain = gain;
        Ok(())
    }

    fn gain(&self, voice: VoiceId) -> AudioResult<f32> {
        Ok(self.lock().voice(voice)?.gain)
    }

    fn set_pitch(&self, voice: VoiceId, pitch: f32) -> AudioResult<()> {
        if !pitch.is_finite() || pitch < 0.0 {
            return Err(AudioError::OutOfRange(format!("pitch {}", pitch)));
        }
        self.lock().voice(voice)?.pitch = pitch;
        Ok(())
    }

    fn pitch(&self, voice: VoiceId) -> AudioResult<f32> {
        Ok(self.lock().voice(voice)?.pitch)
    }

    fn create_buffers(&self, count: usize) -> AudioResult<Vec<BufferId>> {
        let mut state = self.lock();
        if state.buffers.len() + count > MAX_BUFFERS {
            return Err(AudioError::OutOfMemory(format!(
                "buffer limit ({}) reached",
                MAX_BUFFERS
            )));
        }
        let ids: Vec<BufferId> = (0..count).map(|_| BufferId(state.allocate_id())).collect();
        for &id in &ids {
            state.buffers.insert(
                id,
                BufferData {
                    format: PcmFormat::Stereo,
                    rate: self.output_rate,
                    samples: Vec::new(),
                    queued_on: None,
                },
            );
        }
        Ok(ids)
    }

    fn delete_buffers(&self, buffers: &[BufferId]) -> AudioResult<()> {
        let mut state = self.lock();
        for &id in buffers {
            let buffer = state.buffer(id)?;
            if let Some(voice) = buffer.queued_on {
                return Err(AudioError::InvalidPointer(format!(
                    "buffer {} is queued on voice {}",
                    id.0, voice.0
                )));
            }
        }
        for id in buffers {
            state.buffers.remove(id);
        }
        Ok(())
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        format: PcmFormat,
        sample_rate: u32,
        samples: &[f32],
    ) -> AudioResult<()> {
        if sample_rate == 0 {
            return Err(AudioError::OutOfRange("sample rate 0".into()));
        }
        if samples.len() % format.channels() != 0 {
            return Err(AudioError::OutOfRange(format!(
                "{} samples is not a whole number of {:?} frames",
                samples.len(),
                format
            )));
        }

        let mut state = self.lock();
        let data = state.buffer(buffer)?;
        if data.queued_on.is_some() {
            return Err(AudioError::InvalidPointer(format!("buffer {} is queued", buffer.0)));
        }
        data.format = format;
        data.rate = sample_rate;
        data.samples.clear();
        data.samples.extend_from_slice(samples);
        Ok(())
    }

    fn queue_buffers(&self, voice: VoiceId, buffers: &[BufferId]) -> AudioResult<()> {
        let mut state = self.lock();
        state.voice(voice)?;
        for &id in buffers {
            if state.buffer(id)?.queued_on.is_some() {
                return Err(AudioError::InvalidPointer(format!("buffer {} already queued", id.0)));
            }
        }
        for &id in buffers {
            state.buffer(id)?.queued_on = Some(voice);
        }
        state.voice(voice)?.queue.extend(buffers.iter().copied());
        Ok(())
    }

    fn unqueue_processed(&self, voice: VoiceId, max: usize) -> AudioResult<Vec<BufferId>> {
        let mut state = self.lock();
        let v = state.voice(voice)?;
        let count = max.min(v.current);
        let removed: Vec<BufferId> = v.queue.drain(..count).collect();
        v.current -= count;
        for id in &removed {
            if let Some(buffer) = state.buffers.get_mut(id) {
                buffer.queued_on = None;
            }
        }
        Ok(removed)
    }

    fn processed_count(&self, voice: VoiceId) -> AudioResult<usize> {
        Ok(self.lock().voice(voice)?.current)
    }

    fn queued_count(&self, voice: VoiceId) -> AudioResult<usize> {
        Ok(self.lock().voice(voice)?.queue.len())
    }

    fn voice_offset(&self, voice: VoiceId) -> AudioResult<Option<(BufferId, u64)>> {
        let mut state = self.lock();
        let v = state.voice(voice)?;
        Ok(v.queue.get(v.current).map(|&id| (id, v.cursor as u64)))
    }

    fn create_effect(&self, kind: EffectType) -> AudioResult<EffectId> {
        self.require_effects()?;
        if kind == EffectType::AdvancedReverb && !self.caps.advanced_reverb {
            return Err(AudioError::ExtensionMissing("advanced reverb"));
        }
        let mut state = self.lock();
        let id = EffectId(state.allocate_id());
        state.effects.insert(id, ParamSet::defaults(kind));
        Ok(id)
    }

    fn delete_effect(&self, effect: EffectId) -> AudioResult<()> {
        let mut state = self.lock();
        state
            .effects
            .remove(&effect)
            .ok_or_else(|| AudioError::InvalidPointer(format!("effect {}", effect.0)))?;
        // Slots keep running the snapshot they were loaded with
        for slot in state.slots.values_mut() {
            if slot.effect == Some(effect) {
                slot.effect = None;
            }
        }
        Ok(())
    }

    fn effect_type(&self, effect: EffectId) -> AudioResult<EffectType> {
        Ok(self.lock().effect(effect)?.kind())
    }

    fn set_effect_param(
        &self,
        effect: EffectId,
        param: EffectParam,
        value: ParamValue,
    ) -> AudioResult<()> {
        self.lock().effect(effect)?.set(param, value)
    }

    fn effect_param(&self, effect: EffectId, param: EffectParam) -> AudioResult<ParamValue> {
        self.lock().effect(effect)?.get(param)
    }

    fn create_slot(&self) -> AudioResult<SlotId> {
        self.require_effects()?;
        let mut state = self.lock();
        let id = SlotId(state.allocate_id());
        state.slots.insert(
            id,
            AuxSlot {
                effect: None,
                dsp: None,
                bus: StereoBuffer::default(),
            },
        );
        Ok(id)
    }

    fn delete_slot(&self, slot: SlotId) -> AudioResult<()> {
        let mut state = self.lock();
        state
            .slots
            .remove(&slot)
            .ok_or_else(|| AudioError::InvalidPointer(format!("aux slot {}", slot.0)))?;
        for voice in state.voices.values_mut() {
            for send in voice.sends.iter_mut() {
                if *send == Some(slot) {
                    *send = None;
                }
            }
        }
        Ok(())
    }

    fn bind_slot_effect(&self, slot: SlotId, effect: Option<EffectId>) -> AudioResult<()> {
        let mut state = self.lock();
        let dsp = match effect {
            Some(id) => Some(build_dsp(state.effect(id)?, self.output_rate)),
            None => None,
        };
        let target = state.slot(slot)?;
        target.effect = effect;
        target.dsp = dsp;
        Ok(())
    }

    fn set_voice_send(
        &self,
        voice: VoiceId,
        index: usize,
        slot: Option<SlotId>,
    ) -> AudioResult<()> {
        if index >= self.caps.max_aux_sends {
            return Err(AudioError::OutOfRange(format!(
                "aux send {} (voice has {})",
                index, self.caps.max_aux_sends
            )));
        }
        let mut state = self.lock();
        if let Some(id) = slot {
            state.slot(id)?;
        }
        state.voice(voice)?.sends[index] = slot;
        Ok(())
    }
}
