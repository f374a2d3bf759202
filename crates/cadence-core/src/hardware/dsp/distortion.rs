//! Distortion: pre-lowpass, soft-clip waveshaper, band-pass EQ, output gain

use super::filter::SvfFilter;
use super::EffectDsp;
use crate::effect::{EffectParam, ParamSet};
use crate::types::{StereoBuffer, StereoSample};

pub struct DistortionDsp {
    lowpass: SvfFilter,
    eq: SvfFilter,
    /// Waveshaper drive derived from edge
    drive: f32,
    gain: f32,
}

impl DistortionDsp {
    pub fn new(params: &ParamSet, sample_rate: u32) -> Self {
        let edge = params.float(EffectParam::Edge).min(0.99);
        let center = params.float(EffectParam::EqCenter);
        let bandwidth = params.float(EffectParam::EqBandwidth).max(1.0);

        Self {
            lowpass: SvfFilter::new(sample_rate, params.float(EffectParam::LowpassCutoff), 0.707),
            eq: SvfFilter::new(sample_rate, center, center / bandwidth),
            drive: 2.0 * edge / (1.0 - edge),
            gain: params.float(EffectParam::DistortionGain),
        }
    }

    #[inline]
    fn shape(&self, x: f32) -> f32 {
        (1.0 + self.drive) * x / (1.0 + self.drive * x.abs())
    }
}

impl EffectDsp for DistortionDsp {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let filtered = self.lowpass.process(*sample).low;
            let shaped = StereoSample::new(self.shape(filtered.left), self.shape(filtered.right));
            *sample = self.eq.process(shaped).band * self.gain;
        }
    }

    fn reset(&mut self) {
        self.lowpass.reset();
        self.eq.reset();
    }
}
