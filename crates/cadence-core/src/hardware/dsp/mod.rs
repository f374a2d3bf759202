//! Effect DSP run by auxiliary slots
//!
//! Each slot owns one processor built from a snapshot of its effect's
//! parameters. Processors are wet-only: they replace the send bus contents
//! with the effect output, which the mixer then adds to the dry mix.

mod distortion;
mod echo;
mod filter;
mod reverb;
mod ring_modulator;

pub use distortion::DistortionDsp;
pub use echo::EchoDsp;
pub use reverb::ReverbDsp;
pub use ring_modulator::RingModulatorDsp;

use crate::effect::{EffectType, ParamSet};
use crate::types::StereoBuffer;

/// Audio processor bound to an auxiliary slot
pub trait EffectDsp: Send {
    /// Replace the send bus with the effect's wet output
    fn process(&mut self, buffer: &mut StereoBuffer);

    /// Clear delay lines and filter state
    fn reset(&mut self);
}

/// Build the processor for a parameter snapshot
pub fn build_dsp(params: &ParamSet, sample_rate: u32) -> Box<dyn EffectDsp> {
    match params.kind() {
        EffectType::Reverb | EffectType::AdvancedReverb => {
            Box::new(ReverbDsp::new(params, sample_rate))
        }
        EffectType::Echo => Box::new(EchoDsp::new(params, sample_rate)),
        EffectType::Distortion => Box::new(DistortionDsp::new(params, sample_rate)),
        EffectType::RingModulator => Box::new(RingModulatorDsp::new(params, sample_rate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_every_type_builds_and_stays_finite() {
        for kind in EffectType::ALL {
            let mut dsp = build_dsp(&ParamSet::defaults(kind), 44100);
            let mut buffer = StereoBuffer::silence(2048);
            buffer[0] = StereoSample::mono(1.0);
            dsp.process(&mut buffer);
            assert!(
                buffer.iter().all(|s| s.left.is_finite() && s.right.is_finite()),
                "{:?} produced non-finite output",
                kind
            );
        }
    }
}
