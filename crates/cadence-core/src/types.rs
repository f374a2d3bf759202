//! Common types for Cadence
//!
//! This module contains the fundamental audio types used throughout the engine,
//! including the stereo buffer used by the mixer and effect DSP, and the
//! state enums shared between the control thread and channel workers.

use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

/// Number of channel slots in the pool
pub const MAX_CHANNELS: usize = 32;

/// Number of hardware buffers in a channel's streaming ring
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Size of one hardware buffer in bytes (frames = capacity / frame size)
pub const DEFAULT_BUFFER_CAPACITY: usize = 65536;

/// Fill-loop wake interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default output sample rate when the device does not dictate one
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Loop count meaning "repeat forever"
pub const LOOP_INFINITE: i32 = -1;

/// Audio sample type (32-bit float everywhere past the decoder)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` so `&[StereoSample]` can be viewed as interleaved `&[f32]`
/// through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// A buffer of stereo samples
///
/// Used by the software mixer for the dry mix and for each auxiliary slot's
/// send bus. Buffers are pre-allocated and resized with
/// [`set_len_from_capacity`](Self::set_len_from_capacity) inside the render path.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a buffer, filling new frames with silence
    ///
    /// Does not allocate while `new_len` stays within the existing capacity.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Add another buffer to this one (summing samples)
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Caller-visible playback state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
    /// The voice reported a state the engine does not recognise
    Unknown,
}

/// Streaming state machine of a channel
///
/// `Idle` → `Loading` (worker spawned, pre-filling) → `Streaming` →
/// `Draining` (decoder exhausted, queued buffers still playing) → `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChannelState {
    #[default]
    Idle = 0,
    Loading = 1,
    Streaming = 2,
    Draining = 3,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ChannelState::Loading,
            2 => ChannelState::Streaming,
            3 => ChannelState::Draining,
            _ => ChannelState::Idle,
        }
    }
}

/// Lock-free channel state shared between the control thread and the worker
///
/// The worker writes the state and consumes the loop budget; the control thread
/// reads both and raises `halt` before stopping the voice.
#[derive(Debug)]
pub struct ChannelAtomics {
    state: AtomicU8,
    /// Remaining loop budget (-1 = infinite)
    loop_count: AtomicI32,
    /// Set by the control thread to make the worker exit on its next wake
    halt: AtomicBool,
    /// Set by the worker when the stream ran to its natural end
    completed: AtomicBool,
    /// Pause requested by the control thread; the worker honors it once the
    /// voice starts
    paused: AtomicBool,
}

impl ChannelAtomics {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ChannelState::Idle as u8),
            loop_count: AtomicI32::new(0),
            halt: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, state: ChannelState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn loop_count(&self) -> i32 {
        self.loop_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_loop_count(&self, count: i32) {
        // Every negative value means "forever"
        self.loop_count.store(count.max(LOOP_INFINITE), Ordering::Release);
    }

    /// Consume one repeat from the loop budget
    ///
    /// Returns `true` when the stream should wrap back to the start.
    pub fn consume_loop(&self) -> bool {
        match self
            .loop_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| (c > 0).then(|| c - 1))
        {
            Ok(_) => true,
            Err(remaining) => remaining < 0,
        }
    }

    #[inline]
    pub fn halt_requested(&self) -> bool {
        self.halt.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_halt(&self, halt: bool) {
        self.halt.store(halt, Ordering::Release);
    }

    #[inline]
    pub fn mark_completed(&self, completed: bool) {
        self.completed.store(completed, Ordering::Release);
    }

    /// Read and clear the completion flag
    #[inline]
    pub fn take_completed(&self) -> bool {
        self.completed.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }
}

impl Default for ChannelAtomics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
    }

    #[test]
    fn test_stereo_buffer_interleaved_view() {
        let mut buffer = StereoBuffer::silence(2);
        buffer[0] = StereoSample::new(1.0, 2.0);
        buffer[1] = StereoSample::new(3.0, 4.0);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.as_interleaved(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_loop_budget_finite() {
        let atomics = ChannelAtomics::new();
        atomics.set_loop_count(2);

        assert!(atomics.consume_loop());
        assert!(atomics.consume_loop());
        assert!(!atomics.consume_loop());
        assert_eq!(atomics.loop_count(), 0);
    }

    #[test]
    fn test_loop_budget_infinite() {
        let atomics = ChannelAtomics::new();
        atomics.set_loop_count(-7);
        assert_eq!(atomics.loop_count(), LOOP_INFINITE);

        for _ in 0..100 {
            assert!(atomics.consume_loop());
        }
        assert_eq!(atomics.loop_count(), LOOP_INFINITE);
    }

    #[test]
    fn test_play_once_never_wraps() {
        let atomics = ChannelAtomics::new();
        atomics.set_loop_count(0);
        assert!(!atomics.consume_loop());
    }

    #[test]
    fn test_channel_state_roundtrip() {
        let atomics = ChannelAtomics::new();
        assert_eq!(atomics.state(), ChannelState::Idle);
        atomics.set_state(ChannelState::Draining);
        assert_eq!(atomics.state(), ChannelState::Draining);
    }

    #[test]
    fn test_pause_flag() {
        let atomics = ChannelAtomics::new();
        assert!(!atomics.paused());
        atomics.set_paused(true);
        assert!(atomics.paused());
        atomics.set_paused(false);
        assert!(!atomics.paused());
    }

    #[test]
    fn test_completed_flag_is_consumed() {
        let atomics = ChannelAtomics::new();
        atomics.mark_completed(true);
        assert!(atomics.take_completed());
        assert!(!atomics.take_completed());
    }
}
