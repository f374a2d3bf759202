//! Two-tap echo
//!
//! A mono delay line with two read taps: the first at `delay`, the second
//! `lr_delay` after it. The second tap is damped and fed back. `spread` pans
//! the taps in opposite directions (-1 = first tap hard left).

use super::filter::OnePole;
use super::EffectDsp;
use crate::effect::{EffectParam, ParamSet};
use crate::types::{StereoBuffer, StereoSample};

/// Mono delay line sized for the longest combined tap
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(2)],
            write_pos: 0,
        }
    }

    /// Read the sample written `delay` samples ago
    #[inline]
    fn read(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        let delay = delay.min(len - 1);
        self.buffer[(self.write_pos + len - delay) % len]
    }

    #[inline]
    fn write(&mut self, value: f32) {
        self.buffer[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

pub struct EchoDsp {
    line: DelayLine,
    tap1: usize,
    tap2: usize,
    damping: f32,
    damper: OnePole,
    feedback: f32,
    /// (left, right) gains of the first and second tap
    tap1_gain: (f32, f32),
    tap2_gain: (f32, f32),
}

impl EchoDsp {
    pub fn new(params: &ParamSet, sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as f32;
        let delay = params.float(EffectParam::EchoDelay);
        let lr_delay = params.float(EffectParam::EchoLRDelay);
        // Zero delay still needs one sample so the read never sees the write
        let tap1 = ((delay * rate) as usize).max(1);
        let tap2 = tap1 + (lr_delay * rate) as usize;

        let spread = params.float(EffectParam::EchoSpread);
        let first = ((1.0 - spread) * 0.5, (1.0 + spread) * 0.5);

        Self {
            line: DelayLine::new(tap2 + 1),
            tap1,
            tap2,
            damping: params.float(EffectParam::EchoDamping),
            damper: OnePole::default(),
            feedback: params.float(EffectParam::EchoFeedback),
            tap1_gain: first,
            tap2_gain: (first.1, first.0),
        }
    }
}

impl EffectDsp for EchoDsp {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let input = (sample.left + sample.right) * 0.5;
            let first = self.line.read(self.tap1);
            let second = self.line.read(self.tap2);

            let fed_back = self.damper.process(second, self.damping) * self.feedback;
            self.line.write(input + fed_back);

            *sample = StereoSample::new(
                first * self.tap1_gain.0 + second * self.tap2_gain.0,
                first * self.tap1_gain.1 + second * self.tap2_gain.1,
            );
        }
    }

    fn reset(&mut self) {
        self.line.reset();
        self.damper.reset();
    }
}
