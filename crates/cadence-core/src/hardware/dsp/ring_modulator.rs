//! Ring modulator: high-passed input multiplied by a sine, saw or square carrier

use super::filter::SvfFilter;
use super::EffectDsp;
use crate::effect::{EffectParam, ParamSet};
use crate::types::StereoBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waveform {
    Sine,
    Sawtooth,
    Square,
}

impl Waveform {
    fn from_param(value: f32) -> Self {
        match value.round() as i32 {
            1 => Waveform::Sawtooth,
            2 => Waveform::Square,
            _ => Waveform::Sine,
        }
    }

    #[inline]
    fn sample(&self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

pub struct RingModulatorDsp {
    highpass: SvfFilter,
    waveform: Waveform,
    phase: f32,
    increment: f32,
}

impl RingModulatorDsp {
    pub fn new(params: &ParamSet, sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as f32;
        Self {
            highpass: SvfFilter::new(sample_rate, params.float(EffectParam::HighpassCutoff), 0.707),
            waveform: Waveform::from_param(params.float(EffectParam::Waveform)),
            phase: 0.0,
            increment: params.float(EffectParam::Frequency) / rate,
        }
    }
}

impl EffectDsp for RingModulatorDsp {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let carrier = self.waveform.sample(self.phase);
            *sample = self.highpass.process(*sample).high * carrier;
            self.phase = (self.phase + self.increment).fract();
        }
    }

    fn reset(&mut self) {
        self.highpass.reset();
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectType, ParamValue};

    #[test]
    fn test_waveform_selection() {
        assert_eq!(Waveform::from_param(0.0), Waveform::Sine);
        assert_eq!(Waveform::from_param(1.0), Waveform::Sawtooth);
        assert_eq!(Waveform::from_param(2.0), Waveform::Square);
        assert_eq!(Waveform::Square.sample(0.25), 1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.0), -1.0);
    }

    #[test]
    fn test_zero_frequency_sine_silences() {
        let mut params = ParamSet::defaults(EffectType::RingModulator);
        params.set(EffectParam::Frequency, ParamValue::Float(0.0)).unwrap();
        let mut dsp = RingModulatorDsp::new(&params, 48000);

        let mut buffer = StereoBuffer::silence(256);
        for s in buffer.iter_mut() {
            s.left = 0.5;
            s.right = -0.5;
        }
        dsp.process(&mut buffer);
        // sin(0) carrier
        assert_eq!(buffer.peak(), 0.0);
    }
}
