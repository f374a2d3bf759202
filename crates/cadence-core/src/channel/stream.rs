//! Fill-loop run by a channel's worker thread
//!
//! ```text
//!  free ring ──refill──► queued on voice ──played──► processed ──unqueue──┐
//!      ▲                                                                   │
//!      └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The worker pre-fills the whole ring, starts the voice, then wakes every
//! poll interval to recycle processed buffers. At end of stream the loop
//! budget decides between wrapping to frame 0 and draining. A stop request
//! wakes the worker immediately through its wake channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::error::{AudioError, AudioResult};
use crate::events::{ChannelEvent, EventPublisher};
use crate::hardware::{AudioHardware, BufferId, PcmFormat, VoiceId, VoiceState};
use crate::sound::Sound;
use crate::types::{ChannelAtomics, ChannelState};

/// Outcome of refilling one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    /// Buffer holds fresh frames
    Filled,
    /// End of stream with loop budget left: the sound is back at frame 0
    Wrapped,
    /// End of stream with the loop budget spent
    Exhausted,
}

/// How the worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Completed,
    Halted,
    VoiceLost,
}

/// Everything a worker needs, moved onto its thread
pub(super) struct StreamWorker {
    pub index: i32,
    pub hw: Arc<dyn AudioHardware>,
    pub voice: VoiceId,
    pub buffers: Vec<BufferId>,
    /// Stream frame each ring buffer's data starts at
    pub starts: Arc<[AtomicU64]>,
    pub sound: Arc<Sound>,
    pub atomics: Arc<ChannelAtomics>,
    pub events: EventPublisher,
    pub poll: Duration,
    pub frames_per_buffer: usize,
    pub wake: Receiver<()>,
}

impl StreamWorker {
    pub fn run(self) {
        log::debug!(
            "Channel {}: worker started ({} x {} frames)",
            self.index,
            self.buffers.len(),
            self.frames_per_buffer
        );

        let exit = match self.stream() {
            Ok(exit) => exit,
            Err(e) => {
                log::error!("Channel {}: streaming failed: {}", self.index, e);
                Exit::Halted
            }
        };

        self.atomics.set_state(ChannelState::Idle);
        match exit {
            Exit::Completed => {
                self.atomics.mark_completed(true);
                self.events.publish(ChannelEvent::Completed { channel: self.index });
                log::debug!("Channel {}: playback complete", self.index);
            }
            Exit::Halted => log::debug!("Channel {}: worker halted", self.index),
            Exit::VoiceLost => log::warn!("Channel {}: voice vanished, worker exiting", self.index),
        }
    }

    fn stream(&self) -> AudioResult<Exit> {
        let format = self.sound.pcm_format();
        let mut pcm = vec![0.0f32; self.frames_per_buffer * format.channels()];
        let mut free: VecDeque<BufferId> = self.buffers.iter().copied().collect();
        let mut exhausted = false;

        self.atomics.set_state(ChannelState::Loading);
        let filled = self.refill(&mut free, &mut pcm, format, &mut exhausted)?;
        if self.halted() {
            return Ok(Exit::Halted);
        }
        if filled.is_empty() && exhausted {
            // Nothing to play at all
            return Ok(Exit::Completed);
        }

        self.hw.queue_buffers(self.voice, &filled)?;
        self.atomics.set_state(if exhausted {
            ChannelState::Draining
        } else {
            ChannelState::Streaming
        });
        self.events.publish(ChannelEvent::Started { channel: self.index });
        self.start_voice()?;

        loop {
            match self.wake.recv_timeout(self.poll) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(Exit::Halted),
            }
            if self.halted() {
                return Ok(Exit::Halted);
            }
            if !self.hw.is_voice(self.voice) {
                return Ok(Exit::VoiceLost);
            }

            let processed = self.hw.unqueue_processed(self.voice, self.buffers.len())?;
            free.extend(processed);

            if !exhausted {
                let filled = self.refill(&mut free, &mut pcm, format, &mut exhausted)?;
                if !filled.is_empty() {
                    self.hw.queue_buffers(self.voice, &filled)?;
                }
                if exhausted {
                    self.atomics.set_state(ChannelState::Draining);
                }
            }

            let queued = self.hw.queued_count(self.voice)?;
            if exhausted && queued == 0 {
                return Ok(Exit::Completed);
            }

            if self.hw.voice_state(self.voice)? == VoiceState::Stopped
                && queued > self.hw.processed_count(self.voice)?
                && !self.halted()
            {
                log::debug!("Channel {}: voice starved, restarting", self.index);
                self.start_voice()?;
            }
        }
    }

    /// Refill free buffers in ring order, returning the ones ready to queue
    ///
    /// A wrapped buffer stays at the front of the free ring. A wrap that yields
    /// no frames before the next one means the stream is empty, which ends it.
    fn refill(
        &self,
        free: &mut VecDeque<BufferId>,
        pcm: &mut [f32],
        format: PcmFormat,
        exhausted: &mut bool,
    ) -> AudioResult<Vec<BufferId>> {
        let mut filled = Vec::with_capacity(free.len());
        let mut last_wrapped = false;

        while let Some(&buffer) = free.front() {
            if self.halted() {
                break;
            }
            match self.fill(buffer, pcm, format)? {
                Fill::Filled => {
                    free.pop_front();
                    filled.push(buffer);
                    last_wrapped = false;
                }
                Fill::Wrapped if !last_wrapped => last_wrapped = true,
                Fill::Wrapped => {
                    log::warn!("Channel {}: stream has no frames, not looping", self.index);
                    *exhausted = true;
                    break;
                }
                Fill::Exhausted => {
                    *exhausted = true;
                    break;
                }
            }
        }
        Ok(filled)
    }

    fn fill(&self, buffer: BufferId, pcm: &mut [f32], format: PcmFormat) -> AudioResult<Fill> {
        let chunk = match self.sound.read_chunk(pcm, self.frames_per_buffer) {
            Ok(chunk) => chunk,
            Err(e @ AudioError::Malformed(_)) => {
                // Corrupt tail: treat as end of stream
                log::warn!("Channel {}: decode error, ending stream: {}", self.index, e);
                return Ok(Fill::Exhausted);
            }
            Err(e) => return Err(e),
        };

        if chunk.frames > 0 {
            let samples = chunk.frames * format.channels();
            self.hw
                .buffer_data(buffer, format, self.sound.sample_rate(), &pcm[..samples])?;
            if let Some(slot) = self.buffers.iter().position(|&b| b == buffer) {
                self.starts[slot].store(chunk.start, Ordering::Release);
            }
            return Ok(Fill::Filled);
        }

        if self.atomics.consume_loop() {
            match self.sound.seek(0) {
                Ok(()) => {}
                Err(AudioError::CannotSeek) => {
                    log::warn!("Channel {}: stream cannot rewind, not looping", self.index);
                    return Ok(Fill::Exhausted);
                }
                Err(e) => return Err(e),
            }
            log::debug!(
                "Channel {}: looped (remaining: {})",
                self.index,
                self.atomics.loop_count()
            );
            Ok(Fill::Wrapped)
        } else {
            Ok(Fill::Exhausted)
        }
    }

    /// Start the voice unless a pause is pending
    ///
    /// The flag is read again afterwards so a pause that lands between the
    /// check and the start still wins.
    fn start_voice(&self) -> AudioResult<()> {
        if !self.atomics.paused() {
            self.hw.play(self.voice)?;
        }
        if self.atomics.paused() {
            self.hw.pause(self.voice)?;
        }
        Ok(())
    }

    #[inline]
    fn halted(&self) -> bool {
        self.atomics.halt_requested()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::super::Channel;
    use super::*;
    use crate::config::{EffectsConfig, StreamingConfig};
    use crate::events::EventBus;
    use crate::hardware::{Capabilities, SoftwareMixer};
    use crate::sound::test_util::write_sine_wav;
    use crate::types::PlaybackState;

    const RATE: u32 = 8000;

    /// Channel on a hand-rendered mixer: 3 x 400-frame mono buffers, 5 ms poll
    fn harness() -> (Channel, Arc<SoftwareMixer>, EventBus) {
        let mixer = Arc::new(SoftwareMixer::new(
            RATE,
            Capabilities::from(&EffectsConfig::default()),
        ));
        let bus = EventBus::default();
        let streaming = StreamingConfig {
            buffer_count: 3,
            buffer_capacity: 1600,
            poll_interval_ms: 5,
        };
        let channel = Channel::new(0, mixer.clone(), &streaming, bus.publisher()).unwrap();
        (channel, mixer, bus)
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

    #[test]
    fn test_worker_exits_when_voice_vanishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1, RATE, 16, 8000);

        let (channel, mixer, bus) = harness();
        let events = bus.subscribe();
        channel.play(&path, 1.0, 1.0, -1).unwrap();
        assert!(wait_until(|| mixer.voice_state(channel.voice) == Ok(VoiceState::Playing)));

        mixer.delete_voice(channel.voice).unwrap();
        assert!(wait_until(|| channel.state() == ChannelState::Idle));

        let received: Vec<ChannelEvent> = events.try_iter().collect();
        assert_eq!(received, vec![ChannelEvent::Started { channel: 0 }]);
        assert!(!mixer.is_voice(channel.voice));
        assert_eq!(channel.playback_state().unwrap(), PlaybackState::Unknown);
    }

    #[test]
    fn test_starved_voice_restarts_after_loop_wrap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blip.wav");
        // 100 frames looped forever: every buffer ends in a wrap
        write_sine_wav(&path, 1, RATE, 16, 100);

        let (channel, mixer, _bus) = harness();
        channel.play(&path, 1.0, 1.0, -1).unwrap();
        assert!(wait_until(|| mixer.voice_state(channel.voice) == Ok(VoiceState::Playing)));

        // One second in a single period runs far past the queued frames
        let mut out = vec![0.0; 2 * RATE as usize];
        mixer.render(&mut out, 2);
        assert!(out[2 * 400..].iter().all(|&s| s == 0.0));

        assert!(wait_until(|| {
            mixer.voice_state(channel.voice) == Ok(VoiceState::Playing)
                && mixer.processed_count(channel.voice) == Ok(0)
        }));
        let mut out = vec![0.0; 2 * 50];
        mixer.render(&mut out, 2);
        assert!(out.iter().any(|&s| s != 0.0));
        assert_eq!(channel.state(), ChannelState::Streaming);
        assert_eq!(channel.loop_count().unwrap(), -1);
    }

    #[test]
    fn test_empty_looping_sound_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_sine_wav(&path, 1, RATE, 16, 0);

        let (channel, _mixer, bus) = harness();
        let events = bus.subscribe();
        channel.play(&path, 1.0, 1.0, -1).unwrap();

        assert!(wait_until(|| {
            channel.state() == ChannelState::Idle
                && channel.playback_state() == Ok(PlaybackState::Stopped)
        }));
        let received: Vec<ChannelEvent> = events.try_iter().collect();
        assert_eq!(received, vec![ChannelEvent::Completed { channel: 0 }]);
    }
}
