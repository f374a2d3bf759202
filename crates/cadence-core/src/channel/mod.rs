//! Playback channels
//!
//! A [`Channel`] binds one [`Sound`] to one hardware voice and a small ring
//! of hardware buffers. While streaming, a dedicated worker thread (see
//! [`stream`]) keeps the ring full.
//!
//! # Locking
//!
//! Control operations serialize on the channel's own mutex, which guards the
//! bound sound, the worker handle and the aux-send chain. The worker never
//! takes that mutex: it talks to the control side only through
//! [`ChannelAtomics`] and its wake channel, so joining it while holding the
//! lock cannot deadlock.

mod stream;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Sender};

use crate::config::StreamingConfig;
use crate::effect::{AuxSend, Effect};
use crate::error::{AudioError, AudioResult};
use crate::events::EventPublisher;
use crate::hardware::{AudioHardware, BufferId, VoiceId, VoiceState};
use crate::sound::{SampleEncoding, Sound, SoundFormat, METADATA_KEYS};
use crate::types::{ChannelAtomics, ChannelState, PlaybackState};

use stream::StreamWorker;

struct WorkerHandle {
    thread: JoinHandle<()>,
    wake: Sender<()>,
}

#[derive(Default)]
struct ChannelInner {
    sound: Option<Arc<Sound>>,
    worker: Option<WorkerHandle>,
    /// Attached effects in send-index order
    sends: Vec<AuxSend>,
}

/// One playback slot of the pool
pub struct Channel {
    index: i32,
    hw: Arc<dyn AudioHardware>,
    voice: VoiceId,
    buffers: Vec<BufferId>,
    starts: Arc<[AtomicU64]>,
    streaming: StreamingConfig,
    events: EventPublisher,
    atomics: Arc<ChannelAtomics>,
    inner: Mutex<ChannelInner>,
}

impl Channel {
    /// Allocate the voice and buffer ring
    pub fn new(
        index: i32,
        hw: Arc<dyn AudioHardware>,
        streaming: &StreamingConfig,
        events: EventPublisher,
    ) -> AudioResult<Self> {
        let voice = hw.create_voice()?;
        let buffers = match hw.create_buffers(streaming.buffer_count.max(1)) {
            Ok(buffers) => buffers,
            Err(e) => {
                let _ = hw.delete_voice(voice);
                return Err(e);
            }
        };
        let starts: Vec<AtomicU64> = buffers.iter().map(|_| AtomicU64::new(0)).collect();

        log::debug!(
            "Channel {}: created (voice {}, {} buffers)",
            index,
            voice.raw(),
            buffers.len()
        );

        Ok(Self {
            index,
            hw,
            voice,
            buffers,
            starts: starts.into(),
            streaming: streaming.clone(),
            events,
            atomics: Arc::new(ChannelAtomics::new()),
            inner: Mutex::new(ChannelInner::default()),
        })
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    /// Streaming state machine position
    pub fn state(&self) -> ChannelState {
        self.atomics.state()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    /// Play a sound file
    ///
    /// Replaying the bound file is a no-op while playing, resumes when paused
    /// and restarts from the top once finished. A different file is opened
    /// before the current stream is touched, so a bad path leaves the channel
    /// as it was.
    pub fn play(&self, path: &Path, gain: f32, pitch: f32, loop_count: i32) -> AudioResult<()> {
        let normalized = Sound::normalize_path(path)?;
        let mut inner = self.lock();
        self.reap_worker(&mut inner);

        if let Some(sound) = inner.sound.clone() {
            if sound.path() == normalized {
                if inner.worker.is_some() {
                    self.atomics.set_paused(false);
                    if self.hw.voice_state(self.voice)? == VoiceState::Paused {
                        self.hw.play(self.voice)?;
                        log::debug!("Channel {}: resumed {}", self.index, normalized.display());
                    }
                    return Ok(());
                }

                if self.atomics.take_completed() {
                    match sound.seek(0) {
                        Ok(()) => {}
                        Err(AudioError::CannotSeek) => {
                            inner.sound = Some(Arc::new(Sound::open(&normalized)?));
                        }
                        Err(e) => return Err(e),
                    }
                }
                self.flush();
                self.configure(gain, pitch, loop_count)?;
                return self.spawn_worker(&mut inner, false);
            }
        }

        let sound = Arc::new(Sound::open(&normalized)?);
        self.bind(&mut inner, sound, gain, pitch, loop_count)
    }

    /// Stop playback, join the worker and release the sound
    ///
    /// Blocks until the worker has exited. Stopping an idle channel is a no-op.
    pub fn stop(&self) -> AudioResult<()> {
        let mut inner = self.lock();
        self.halt_worker(&mut inner);
        if let Some(sound) = inner.sound.take() {
            log::debug!("Channel {}: stopped {}", self.index, sound.path().display());
        }
        Ok(())
    }

    /// Pause a running stream
    ///
    /// Holds even while the worker is still pre-filling: the worker checks the
    /// pause flag before and after starting the voice.
    pub fn pause(&self) -> AudioResult<()> {
        let mut inner = self.lock();
        self.reap_worker(&mut inner);
        self.bound(&inner)?;
        if inner.worker.is_some() {
            self.atomics.set_paused(true);
            self.hw.pause(self.voice)?;
        }
        Ok(())
    }

    pub fn resume(&self) -> AudioResult<()> {
        let mut inner = self.lock();
        self.reap_worker(&mut inner);
        self.bound(&inner)?;
        if inner.worker.is_some() {
            self.atomics.set_paused(false);
            if self.hw.voice_state(self.voice)? == VoiceState::Paused {
                self.hw.play(self.voice)?;
            }
        }
        Ok(())
    }

    /// Move playback to `ms` milliseconds
    ///
    /// The target is range-checked before anything changes. A running stream
    /// is halted, flushed and restarted at the new position, paused if it was
    /// paused. If the decoder rejects the target, the stream restarts where it
    /// was audible.
    pub fn seek(&self, ms: u64) -> AudioResult<()> {
        let mut inner = self.lock();
        self.reap_worker(&mut inner);
        let sound = self.bound(&inner)?;

        if !sound.info().seekable {
            return Err(AudioError::CannotSeek);
        }
        let frame = sound.ms_to_frame(ms)?;
        if sound.frames() > 0 && frame > sound.frames() {
            return Err(AudioError::OutOfRange(format!(
                "{} ms past end ({} ms)",
                ms,
                sound.duration_ms()
            )));
        }

        if inner.worker.is_none() {
            sound.seek(frame)?;
            self.atomics.take_completed();
            return Ok(());
        }

        let was_paused =
            self.atomics.paused() || self.hw.voice_state(self.voice)? == VoiceState::Paused;
        let audible = self.audible_frame(&inner, &sound)?;
        self.halt_worker(&mut inner);
        let result = sound.seek(frame);
        if let Err(e) = &result {
            log::debug!("Channel {}: seek to frame {} failed: {}", self.index, frame, e);
            if let Err(e) = sound.seek(audible) {
                log::warn!("Channel {}: cannot return to frame {}: {}", self.index, audible, e);
            }
        }
        self.atomics.take_completed();
        self.spawn_worker(&mut inner, was_paused)?;
        result
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Playback position in milliseconds
    ///
    /// While streaming this is the start frame of the buffer the voice is
    /// playing plus the voice's offset into it.
    pub fn position(&self) -> AudioResult<u64> {
        let inner = self.lock();
        let sound = self.bound(&inner)?;
        Ok(sound.frame_to_ms(self.audible_frame(&inner, &sound)?))
    }

    pub fn duration(&self) -> AudioResult<u64> {
        Ok(self.bound(&self.lock())?.duration_ms())
    }

    /// Remaining loop budget (-1 = infinite)
    pub fn loop_count(&self) -> AudioResult<i32> {
        self.bound(&self.lock())?;
        Ok(self.atomics.loop_count())
    }

    pub fn set_loop_count(&self, count: i32) -> AudioResult<()> {
        self.bound(&self.lock())?;
        self.atomics.set_loop_count(count);
        Ok(())
    }

    pub fn volume(&self) -> AudioResult<f32> {
        self.bound(&self.lock())?;
        self.hw.gain(self.voice)
    }

    /// Set the voice gain, clamped to [0, 1]
    pub fn set_volume(&self, volume: f32) -> AudioResult<()> {
        self.bound(&self.lock())?;
        self.hw.set_gain(self.voice, clamp_gain(volume))
    }

    pub fn pitch(&self) -> AudioResult<f32> {
        self.bound(&self.lock())?;
        self.hw.pitch(self.voice)
    }

    /// Set the voice pitch, clamped to [0, ∞)
    pub fn set_pitch(&self, pitch: f32) -> AudioResult<()> {
        self.bound(&self.lock())?;
        self.hw.set_pitch(self.voice, clamp_pitch(pitch))
    }

    pub fn playback_state(&self) -> AudioResult<PlaybackState> {
        let mut inner = self.lock();
        self.reap_worker(&mut inner);
        self.bound(&inner)?;

        let Ok(voice_state) = self.hw.voice_state(self.voice) else {
            return Ok(PlaybackState::Unknown);
        };
        // A running worker briefly reports a stopped voice while loading or
        // after a starvation; it will restart it
        Ok(match (inner.worker.is_some(), voice_state) {
            (true, _) if self.atomics.paused() => PlaybackState::Paused,
            (_, VoiceState::Paused) => PlaybackState::Paused,
            (true, _) => PlaybackState::Playing,
            (false, _) => PlaybackState::Stopped,
        })
    }

    pub fn sample_rate(&self) -> AudioResult<u32> {
        Ok(self.bound(&self.lock())?.sample_rate())
    }

    pub fn channel_count(&self) -> AudioResult<u16> {
        Ok(self.bound(&self.lock())?.channels())
    }

    pub fn frame_count(&self) -> AudioResult<u64> {
        Ok(self.bound(&self.lock())?.frames())
    }

    pub fn section_count(&self) -> AudioResult<u32> {
        Ok(self.bound(&self.lock())?.info().sections)
    }

    pub fn format(&self) -> AudioResult<SoundFormat> {
        Ok(self.bound(&self.lock())?.info().format)
    }

    pub fn encoding(&self) -> AudioResult<SampleEncoding> {
        Ok(self.bound(&self.lock())?.info().encoding)
    }

    /// String metadata of the bound sound; empty when the file has none
    pub fn info(&self, key: &str) -> AudioResult<String> {
        let sound = self.bound(&self.lock())?;
        let key = key.to_ascii_lowercase();
        if !METADATA_KEYS.contains(&key.as_str()) {
            return Err(AudioError::OutOfRange(format!("unknown metadata key '{}'", key)));
        }
        Ok(sound.metadata(&key).unwrap_or_default())
    }

    /// Normalized path of the bound sound
    pub fn sound_path(&self) -> AudioResult<PathBuf> {
        Ok(self.bound(&self.lock())?.path().to_path_buf())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Auxiliary sends
    // ─────────────────────────────────────────────────────────────────────

    /// Route this channel into an effect
    ///
    /// Attaching an already attached effect does nothing. The new send takes
    /// the next free aux-send index of the voice.
    pub fn attach(&self, effect: Effect) -> AudioResult<()> {
        let mut inner = self.lock();
        if inner.sends.iter().any(|s| s.effect == effect) {
            return Ok(());
        }

        let index = inner.sends.len();
        let limit = self.hw.capabilities().max_aux_sends;
        if index >= limit && self.hw.capabilities().effects {
            return Err(AudioError::OutOfRange(format!(
                "channel {} already uses all {} aux sends",
                self.index, limit
            )));
        }

        let slot = self.hw.create_slot()?;
        let wired = self
            .hw
            .bind_slot_effect(slot, Some(effect.id))
            .and_then(|_| self.hw.set_voice_send(self.voice, index, Some(slot)));
        if let Err(e) = wired {
            let _ = self.hw.delete_slot(slot);
            return Err(e);
        }

        inner.sends.push(AuxSend { slot, effect });
        log::debug!(
            "Channel {}: attached {} effect on send {}",
            self.index,
            effect.kind().name(),
            index
        );
        Ok(())
    }

    /// Remove an effect from the send chain
    ///
    /// Later sends shift down one index, keeping their order. Detaching an
    /// effect that is not attached does nothing.
    pub fn detach(&self, effect: Effect) -> AudioResult<()> {
        let mut inner = self.lock();
        let Some(pos) = inner.sends.iter().position(|s| s.effect == effect) else {
            return Ok(());
        };

        let removed = inner.sends.remove(pos);
        if let Err(e) = self.hw.set_voice_send(self.voice, pos, None) {
            log::debug!("Channel {}: unwiring send {}: {}", self.index, pos, e);
        }
        if let Err(e) = self.hw.delete_slot(removed.slot) {
            log::debug!("Channel {}: deleting slot: {}", self.index, e);
        }

        for (index, send) in inner.sends.iter().enumerate().skip(pos) {
            self.hw.set_voice_send(self.voice, index, Some(send.slot))?;
        }
        if pos < inner.sends.len() {
            self.hw.set_voice_send(self.voice, inner.sends.len(), None)?;
        }

        log::debug!("Channel {}: detached {} effect", self.index, effect.kind().name());
        Ok(())
    }

    pub fn is_attached(&self, effect: Effect) -> bool {
        self.lock().sends.iter().any(|s| s.effect == effect)
    }

    /// Reload the effect's current parameters into every send targeting it
    ///
    /// Returns the number of sends refreshed.
    pub fn rebind(&self, effect: Effect) -> AudioResult<usize> {
        let inner = self.lock();
        let mut count = 0;
        for send in inner.sends.iter().filter(|s| s.effect == effect) {
            self.hw.bind_slot_effect(send.slot, Some(effect.id))?;
            count += 1;
        }
        Ok(count)
    }

    /// Current send chain in send-index order
    pub fn sends(&self) -> Vec<AuxSend> {
        self.lock().sends.clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Worker management
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the bound sound and start streaming it
    fn bind(
        &self,
        inner: &mut ChannelInner,
        sound: Arc<Sound>,
        gain: f32,
        pitch: f32,
        loop_count: i32,
    ) -> AudioResult<()> {
        self.halt_worker(inner);
        if let Some(old) = inner.sound.take() {
            log::debug!("Channel {}: released {}", self.index, old.path().display());
        }
        self.configure(gain, pitch, loop_count)?;
        inner.sound = Some(sound);
        self.spawn_worker(inner, false)
    }

    fn configure(&self, gain: f32, pitch: f32, loop_count: i32) -> AudioResult<()> {
        self.hw.set_gain(self.voice, clamp_gain(gain))?;
        self.hw.set_pitch(self.voice, clamp_pitch(pitch))?;
        self.atomics.set_loop_count(loop_count);
        Ok(())
    }

    fn spawn_worker(&self, inner: &mut ChannelInner, start_paused: bool) -> AudioResult<()> {
        let sound = inner.sound.clone().ok_or(AudioError::NoSound)?;
        let frames_per_buffer = self
            .streaming
            .frames_per_buffer(sound.pcm_format().frame_bytes());
        let (wake_tx, wake_rx) = bounded(1);

        self.atomics.set_halt(false);
        self.atomics.mark_completed(false);
        self.atomics.set_paused(start_paused);
        self.atomics.set_state(ChannelState::Loading);

        let worker = StreamWorker {
            index: self.index,
            hw: Arc::clone(&self.hw),
            voice: self.voice,
            buffers: self.buffers.clone(),
            starts: Arc::clone(&self.starts),
            sound,
            atomics: Arc::clone(&self.atomics),
            events: self.events.clone(),
            poll: self.streaming.poll_interval(),
            frames_per_buffer,
            wake: wake_rx,
        };

        match thread::Builder::new()
            .name(format!("cadence-channel-{}", self.index))
            .spawn(move || worker.run())
        {
            Ok(thread) => {
                inner.worker = Some(WorkerHandle {
                    thread,
                    wake: wake_tx,
                });
                Ok(())
            }
            Err(e) => {
                log::error!("Channel {}: failed to spawn worker: {}", self.index, e);
                self.atomics.set_state(ChannelState::Idle);
                inner.sound = None;
                Err(AudioError::ThreadFailure(e.to_string()))
            }
        }
    }

    /// Stop the voice, join the worker and return every buffer to the ring
    fn halt_worker(&self, inner: &mut ChannelInner) {
        if let Some(worker) = inner.worker.take() {
            self.atomics.set_halt(true);
            let _ = worker.wake.try_send(());
            if let Err(e) = self.hw.stop(self.voice) {
                log::debug!("Channel {}: stopping voice: {}", self.index, e);
            }
            if worker.thread.join().is_err() {
                log::error!("Channel {}: worker panicked", self.index);
            }
        }
        self.flush();
        self.atomics.set_halt(false);
        self.atomics.set_state(ChannelState::Idle);
    }

    /// Join a worker that has already exited on its own
    fn reap_worker(&self, inner: &mut ChannelInner) {
        if inner.worker.as_ref().is_some_and(|w| w.thread.is_finished()) {
            if let Some(worker) = inner.worker.take() {
                if worker.thread.join().is_err() {
                    log::error!("Channel {}: worker panicked", self.index);
                }
            }
        }
    }

    fn flush(&self) {
        if let Err(e) = self.hw.stop(self.voice) {
            log::debug!("Channel {}: stopping voice: {}", self.index, e);
        }
        if let Err(e) = self.hw.unqueue_processed(self.voice, usize::MAX) {
            log::debug!("Channel {}: flushing buffers: {}", self.index, e);
        }
    }

    /// Stream frame being heard: start of the head buffer plus the voice
    /// offset into it, or the decode position when nothing is queued
    fn audible_frame(&self, inner: &ChannelInner, sound: &Sound) -> AudioResult<u64> {
        if inner.worker.is_some() {
            if let Some((buffer, offset)) = self.hw.voice_offset(self.voice)? {
                if let Some(slot) = self.buffers.iter().position(|&b| b == buffer) {
                    return Ok(self.starts[slot].load(Ordering::Acquire) + offset);
                }
            }
        }
        Ok(sound.position())
    }

    fn bound(&self, inner: &ChannelInner) -> AudioResult<Arc<Sound>> {
        inner.sound.clone().ok_or(AudioError::NoSound)
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let mut inner = self.lock();
        self.halt_worker(&mut inner);
        inner.sound = None;
        for send in inner.sends.drain(..) {
            if let Err(e) = self.hw.delete_slot(send.slot) {
                log::debug!("Channel {}: deleting slot: {}", self.index, e);
            }
        }
        drop(inner);

        if let Err(e) = self.hw.delete_voice(self.voice) {
            log::warn!("Channel {}: deleting voice: {}", self.index, e);
        }
        if let Err(e) = self.hw.delete_buffers(&self.buffers) {
            log::warn!("Channel {}: deleting buffers: {}", self.index, e);
        }
        log::debug!("Channel {}: freed", self.index);
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("index", &self.index)
            .field("state", &self.state())
            .finish()
    }
}

fn clamp_gain(gain: f32) -> f32 {
    // f32::max maps NaN to the other operand
    gain.max(0.0).min(1.0)
}

fn clamp_pitch(pitch: f32) -> f32 {
    if pitch.is_finite() {
        pitch.max(0.0)
    } else if pitch > 0.0 {
        f32::MAX
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectsConfig;
    use crate::effect::EffectType;
    use crate::events::EventBus;
    use crate::hardware::{Capabilities, SoftwareMixer};
    use crate::sound::test_util::write_sine_wav;
    use crate::sound::{Decoder, StreamInfo};
    use std::time::{Duration, Instant};

    fn channel() -> (Channel, Arc<SoftwareMixer>) {
        let mixer = Arc::new(SoftwareMixer::new(
            48000,
            Capabilities::from(&EffectsConfig::default()),
        ));
        let bus = EventBus::default();
        let channel = Channel::new(
            0,
            mixer.clone(),
            &StreamingConfig::default(),
            bus.publisher(),
        )
        .unwrap();
        (channel, mixer)
    }

    /// 8 kHz mixer with 400-frame mono buffers, rendered only by hand
    fn streaming_channel() -> (Channel, Arc<SoftwareMixer>) {
        let mixer = Arc::new(SoftwareMixer::new(
            8000,
            Capabilities::from(&EffectsConfig::default()),
        ));
        let streaming = StreamingConfig {
            buffer_count: 3,
            buffer_capacity: 1600,
            poll_interval_ms: 5,
        };
        let bus = EventBus::default();
        let channel = Channel::new(0, mixer.clone(), &streaming, bus.publisher()).unwrap();
        (channel, mixer)
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    /// Endless mono source of unknown length that can only seek inside its
    /// first second
    struct Endless {
        info: StreamInfo,
        position: u64,
    }

    impl Endless {
        fn sound() -> Arc<Sound> {
            let decoder = Endless {
                info: StreamInfo {
                    sample_rate: 8000,
                    channels: 1,
                    frames: 0,
                    sections: 1,
                    seekable: true,
                    format: SoundFormat::Other,
                    encoding: SampleEncoding::Compressed,
                },
                position: 0,
            };
            Arc::new(Sound::from_decoder(PathBuf::from("/virtual/endless"), Box::new(decoder)))
        }
    }

    impl Decoder for Endless {
        fn info(&self) -> &StreamInfo {
            &self.info
        }

        fn read_frames(&mut self, out: &mut [f32], frames: usize) -> AudioResult<usize> {
            out[..frames].fill(0.1);
            self.position += frames as u64;
            Ok(frames)
        }

        fn seek(&mut self, frame: u64) -> AudioResult<()> {
            if frame >= 8000 {
                return Err(AudioError::OutOfRange(format!("frame {}", frame)));
            }
            self.position = frame;
            Ok(())
        }

        fn metadata(&self, _key: &str) -> Option<String> {
            None
        }
    }

    fn effect(hw: &SoftwareMixer, kind: EffectType) -> Effect {
        Effect::new(hw.create_effect(kind).unwrap(), kind)
    }

    #[test]
    fn test_unbound_accessors_report_no_sound() {
        let (channel, _) = channel();
        assert_eq!(channel.volume(), Err(AudioError::NoSound));
        assert_eq!(channel.volume().unwrap_or_default(), 0.0);
        assert_eq!(channel.position(), Err(AudioError::NoSound));
        assert_eq!(channel.playback_state(), Err(AudioError::NoSound));
        assert_eq!(channel.seek(0), Err(AudioError::NoSound));
        assert_eq!(channel.info("title"), Err(AudioError::NoSound));
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(channel.stop().is_ok());
    }

    #[test]
    fn test_play_missing_file_binds_nothing() {
        let (channel, _) = channel();
        let err = channel
            .play(Path::new("/definitely/missing.wav"), 1.0, 1.0, 0)
            .unwrap_err();
        assert!(matches!(err, AudioError::FileNotFound(_)));
        assert_eq!(channel.sound_path(), Err(AudioError::NoSound));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn test_attach_twice_keeps_one_send() {
        let (channel, mixer) = channel();
        let reverb = effect(&mixer, EffectType::Reverb);

        channel.attach(reverb).unwrap();
        channel.attach(reverb).unwrap();
        assert!(channel.is_attached(reverb));
        assert_eq!(channel.sends().len(), 1);
    }

    #[test]
    fn test_detach_preserves_order() {
        let (channel, mixer) = channel();
        let a = effect(&mixer, EffectType::Reverb);
        let b = effect(&mixer, EffectType::Echo);
        let c = effect(&mixer, EffectType::Distortion);
        let d = effect(&mixer, EffectType::RingModulator);

        for e in [a, b, c] {
            channel.attach(e).unwrap();
        }
        channel.detach(a).unwrap();
        channel.attach(d).unwrap();

        let order: Vec<Effect> = channel.sends().iter().map(|s| s.effect).collect();
        assert_eq!(order, vec![b, c, d]);
        assert!(!channel.is_attached(a));

        // Detaching something not attached is a no-op
        channel.detach(a).unwrap();
        assert_eq!(channel.sends().len(), 3);
    }

    #[test]
    fn test_send_limit() {
        let (channel, mixer) = channel();
        for _ in 0..4 {
            channel.attach(effect(&mixer, EffectType::Echo)).unwrap();
        }
        let extra = effect(&mixer, EffectType::Echo);
        assert!(matches!(channel.attach(extra), Err(AudioError::OutOfRange(_))));
        assert_eq!(channel.sends().len(), 4);
    }

    #[test]
    fn test_rebind_counts_matching_sends() {
        let (channel, mixer) = channel();
        let echo = effect(&mixer, EffectType::Echo);
        let other = effect(&mixer, EffectType::Reverb);
        channel.attach(echo).unwrap();
        assert_eq!(channel.rebind(echo).unwrap(), 1);
        assert_eq!(channel.rebind(other).unwrap(), 0);
    }

    #[test]
    fn test_seek_is_range_checked_before_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1, 8000, 16, 8000);

        let (channel, _) = channel();
        channel.play(&path, 1.0, 1.0, 0).unwrap();
        channel.pause().unwrap();
        assert_eq!(channel.duration().unwrap(), 1000);

        assert!(matches!(channel.seek(5000), Err(AudioError::OutOfRange(_))));
        assert_eq!(channel.sound_path().unwrap(), Sound::normalize_path(&path).unwrap());
        channel.seek(500).unwrap();
        channel.stop().unwrap();
        assert_eq!(channel.duration(), Err(AudioError::NoSound));
    }

    #[test]
    fn test_seek_to_unaddressable_time_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1, 8000, 16, 8000);

        let (channel, _) = channel();
        channel.play(&path, 1.0, 1.0, 0).unwrap();
        assert!(matches!(channel.seek(u64::MAX), Err(AudioError::OutOfRange(_))));
        assert!(matches!(channel.seek(u64::MAX / 1000), Err(AudioError::OutOfRange(_))));
        assert_eq!(channel.duration().unwrap(), 1000);
        assert_eq!(channel.playback_state().unwrap(), PlaybackState::Playing);
    }

    #[test]
    fn test_pause_right_after_play_sticks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_sine_wav(&path, 1, 8000, 16, 60_000);

        let (channel, mixer) = channel();
        for _ in 0..10 {
            channel.play(&path, 1.0, 1.0, 0).unwrap();
            channel.pause().unwrap();
            assert!(wait_until(|| channel.state() == ChannelState::Streaming));

            assert_eq!(mixer.voice_state(channel.voice).unwrap(), VoiceState::Paused);
            assert_eq!(channel.playback_state().unwrap(), PlaybackState::Paused);
            channel.stop().unwrap();
        }
    }

    #[test]
    fn test_resume_during_prefill_plays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_sine_wav(&path, 1, 8000, 16, 60_000);

        let (channel, mixer) = channel();
        channel.play(&path, 1.0, 1.0, 0).unwrap();
        channel.pause().unwrap();
        channel.resume().unwrap();
        assert!(wait_until(|| channel.state() == ChannelState::Streaming));
        assert!(wait_until(|| mixer.voice_state(channel.voice) == Ok(VoiceState::Playing)));
        assert_eq!(channel.playback_state().unwrap(), PlaybackState::Playing);
    }

    #[test]
    fn test_failed_decoder_seek_keeps_audible_position() {
        let (channel, mixer) = streaming_channel();
        let mut inner = channel.lock();
        channel.bind(&mut inner, Endless::sound(), 1.0, 1.0, 0).unwrap();
        drop(inner);
        assert!(wait_until(|| mixer.voice_state(channel.voice) == Ok(VoiceState::Playing)));

        // Hear 100 frames while the ring holds 1200
        let mut out = vec![0.0; 2 * 100];
        mixer.render(&mut out, 2);
        assert_eq!(channel.position().unwrap(), 12);

        assert!(matches!(channel.seek(5000), Err(AudioError::OutOfRange(_))));
        assert!(wait_until(|| channel.state() == ChannelState::Streaming));
        assert_eq!(channel.position().unwrap(), 12);
        assert_eq!(channel.playback_state().unwrap(), PlaybackState::Playing);

        // A reachable target still works
        channel.seek(500).unwrap();
        assert!(wait_until(|| channel.state() == ChannelState::Streaming));
        assert_eq!(channel.position().unwrap(), 500);
    }

    #[test]
    fn test_volume_and_pitch_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 2, 8000, 16, 800);

        let (channel, _) = channel();
        channel.play(&path, 3.0, -1.0, 0).unwrap();
        assert_eq!(channel.volume().unwrap(), 1.0);
        assert_eq!(channel.pitch().unwrap(), 0.0);

        channel.set_volume(-0.5).unwrap();
        assert_eq!(channel.volume().unwrap(), 0.0);
        channel.set_pitch(1.5).unwrap();
        assert_eq!(channel.pitch().unwrap(), 1.5);
        channel.set_loop_count(-7).unwrap();
        assert_eq!(channel.loop_count().unwrap(), -1);
        assert_eq!(channel.sample_rate().unwrap(), 8000);
        assert_eq!(channel.channel_count().unwrap(), 2);
        assert_eq!(channel.frame_count().unwrap(), 800);
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_gain(f32::NAN), 0.0);
        assert_eq!(clamp_gain(0.25), 0.25);
        assert_eq!(clamp_pitch(f32::INFINITY), f32::MAX);
        assert_eq!(clamp_pitch(f32::NAN), 0.0);
    }
}
