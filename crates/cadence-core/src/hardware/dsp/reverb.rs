//! Aux-slot reverb
//!
//! Freeverb-style comb/allpass network driven by environmental reverb
//! parameters:
//! - decay time sets each comb's feedback for a -60 dB tail
//! - decay HF ratio, gain HF and air absorption set the comb damping
//! - density scales the comb lengths, diffusion the allpass feedback
//! - reflections and late reverb each get their own pre-delay, gain and pan
//!
//! The advanced variant adds low-frequency shaping, a feedback echo on the
//! late reverb and a slow pitch modulation of the tail.

use super::filter::OnePole;
use super::EffectDsp;
use crate::effect::{EffectParam, EffectType, ParamSet};
use crate::types::{StereoBuffer, StereoSample};

/// Comb filter delay line lengths (in samples at 44.1kHz)
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Stereo spread offset for the right channel (in samples at 44.1kHz)
const STEREO_SPREAD: usize = 23;

/// Gain compensation for summing eight combs
const COMB_GAIN: f32 = 0.125;

fn scaled_len(length: usize, scale: f32) -> usize {
    ((length as f32 * scale) as usize).max(1)
}

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    damping: OnePole,
    feedback: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length],
            pos: 0,
            damping: OnePole::default(),
            feedback: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];
        let filtered = self.damping.process(output, damp);
        self.buffer[self.pos] = input + filtered * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.damping.reset();
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Fixed-length stereo delay used for pre-delays and the tail echo
struct StereoDelay {
    buffer: Vec<StereoSample>,
    pos: usize,
}

impl StereoDelay {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![StereoSample::silence(); length.max(1)],
            pos: 0,
        }
    }

    /// Push a sample and return the one written `len` samples ago
    #[inline]
    fn process(&mut self, input: StereoSample) -> StereoSample {
        let out = self.buffer[self.pos];
        self.buffer[self.pos] = input;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    /// Feedback echo: the output is written back into the line
    #[inline]
    fn feedback(&mut self, input: StereoSample, amount: f32) -> StereoSample {
        let out = input + self.buffer[self.pos] * amount;
        self.buffer[self.pos] = out;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(StereoSample::silence());
    }
}

/// Left/right balance from the x component of a pan vector
fn pan_gains(pan: [f32; 3]) -> (f32, f32) {
    let x = pan[0].clamp(-1.0, 1.0);
    (1.0 - x.max(0.0), 1.0 + x.min(0.0))
}

/// Extras only the advanced variant runs
struct AdvancedStage {
    gain_lf: f32,
    lf_coeff: f32,
    lf_split: [OnePole; 2],
    echo: StereoDelay,
    echo_depth: f32,
    /// Modulated read-back of the tail
    mod_line: Vec<StereoSample>,
    mod_pos: usize,
    mod_phase: f32,
    mod_rate: f32,
    mod_depth_samples: f32,
}

impl AdvancedStage {
    fn new(params: &ParamSet, sample_rate: f32) -> Self {
        let lf_reference = params.float(EffectParam::LFReference);
        let echo_time = params.float(EffectParam::EchoTime);
        let mod_time = params.float(EffectParam::ModulationTime).max(0.04);
        let mod_depth = params.float(EffectParam::ModulationDepth);
        let max_mod = (sample_rate * 0.004) as usize + 2;

        Self {
            gain_lf: params.float(EffectParam::GainLF),
            lf_coeff: (-std::f32::consts::TAU * lf_reference / sample_rate).exp(),
            lf_split: [OnePole::default(); 2],
            echo: StereoDelay::new((echo_time * sample_rate) as usize),
            echo_depth: params.float(EffectParam::EchoDepth).min(0.9),
            mod_line: vec![StereoSample::silence(); max_mod],
            mod_pos: 0,
            mod_phase: 0.0,
            mod_rate: 1.0 / (mod_time * sample_rate),
            mod_depth_samples: mod_depth * (max_mod - 2) as f32,
        }
    }

    #[inline]
    fn process(&mut self, late: StereoSample) -> StereoSample {
        // Low shelf: scale the band below the LF reference
        let low_l = self.lf_split[0].process(late.left, self.lf_coeff);
        let low_r = self.lf_split[1].process(late.right, self.lf_coeff);
        let shaped = StereoSample::new(
            late.left + low_l * (self.gain_lf - 1.0),
            late.right + low_r * (self.gain_lf - 1.0),
        );

        // Echo: the tail feeds back into itself at echo time
        let echoed = if self.echo_depth > 0.0 {
            self.echo.feedback(shaped, self.echo_depth)
        } else {
            shaped
        };

        if self.mod_depth_samples <= 0.0 {
            return echoed;
        }

        let len = self.mod_line.len();
        self.mod_line[self.mod_pos] = echoed;
        let offset = 1.0
            + self.mod_depth_samples * 0.5 * (1.0 + (self.mod_phase * std::f32::consts::TAU).sin());
        let read = self.mod_pos as f32 + len as f32 - offset;
        let i0 = read.floor() as usize % len;
        let i1 = (i0 + 1) % len;
        let frac = read.fract();
        let out = self.mod_line[i0] * (1.0 - frac) + self.mod_line[i1] * frac;

        self.mod_pos = (self.mod_pos + 1) % len;
        self.mod_phase = (self.mod_phase + self.mod_rate).fract();
        out
    }

    fn reset(&mut self) {
        for lp in &mut self.lf_split {
            lp.reset();
        }
        self.echo.reset();
        self.mod_line.fill(StereoSample::silence());
        self.mod_phase = 0.0;
    }
}

/// Reverb DSP bound to an aux slot
pub struct ReverbDsp {
    combs_l: Vec<CombFilter>,
    combs_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,
    reflections_delay: StereoDelay,
    late_delay: StereoDelay,
    damp: f32,
    allpass_feedback: f32,
    gain: f32,
    reflections_gain: (f32, f32),
    late_gain: (f32, f32),
    advanced: Option<AdvancedStage>,
}

impl ReverbDsp {
    pub fn new(params: &ParamSet, sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as f32;
        let density = params.float(EffectParam::Density);
        // Denser rooms pack reflections closer together
        let scale = rate / 44100.0 * (0.5 + 0.5 * density);

        let decay_time = params.float(EffectParam::DecayTime).max(0.1);
        let feedback_for = |len: usize| 0.001f32.powf(len as f32 / (rate * decay_time));

        let mut combs_l: Vec<_> = COMB_LENGTHS
            .iter()
            .map(|&len| CombFilter::new(scaled_len(len, scale)))
            .collect();
        let mut combs_r: Vec<_> = COMB_LENGTHS
            .iter()
            .map(|&len| CombFilter::new(scaled_len(len + STEREO_SPREAD, scale)))
            .collect();
        for comb in combs_l.iter_mut().chain(combs_r.iter_mut()) {
            comb.feedback = feedback_for(comb.buffer.len());
        }

        let allpass_l = ALLPASS_LENGTHS
            .iter()
            .map(|&len| AllpassFilter::new(scaled_len(len, scale)))
            .collect();
        let allpass_r = ALLPASS_LENGTHS
            .iter()
            .map(|&len| AllpassFilter::new(scaled_len(len + STEREO_SPREAD, scale)))
            .collect();

        // HF decay shorter than the mid decay, and HF attenuation, both darken the tail
        let hf_ratio = params.float(EffectParam::DecayHFRatio);
        let gain_hf = params.float(EffectParam::GainHF);
        let air = params.float(EffectParam::AirAbsorptionGainHF);
        let mut damp = (1.0 - hf_ratio.min(1.0)) * 0.5 + (1.0 - gain_hf) * 0.3 + (1.0 - air) * 2.0;
        if params.kind() == EffectType::AdvancedReverb {
            let hf_reference = params.float(EffectParam::HFReference);
            damp *= (5000.0 / hf_reference).sqrt();
        }
        if params.float(EffectParam::DecayHFLimit) < 0.5 {
            damp *= 0.5;
        }

        let reflections_pan = pan_gains(params.vector(EffectParam::ReflectionsPan));
        let late_pan = pan_gains(params.vector(EffectParam::LateReverbPan));
        let reflections_gain = params.float(EffectParam::ReflectionsGain);
        let late_gain = params.float(EffectParam::LateReverbGain);

        Self {
            combs_l,
            combs_r,
            allpass_l,
            allpass_r,
            reflections_delay: StereoDelay::new(
                (params.float(EffectParam::ReflectionsDelay) * rate) as usize,
            ),
            late_delay: StereoDelay::new((params.float(EffectParam::LateReverbDelay) * rate) as usize),
            damp: damp.clamp(0.0, 0.95),
            allpass_feedback: 0.2 + 0.5 * params.float(EffectParam::Diffusion),
            gain: params.float(EffectParam::Gain),
            reflections_gain: (reflections_gain * reflections_pan.0, reflections_gain * reflections_pan.1),
            late_gain: (late_gain * late_pan.0, late_gain * late_pan.1),
            advanced: (params.kind() == EffectType::AdvancedReverb)
                .then(|| AdvancedStage::new(params, rate)),
        }
    }
}

impl EffectDsp for ReverbDsp {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let early = self.reflections_delay.process(*sample);
            let late_in = self.late_delay.process(early);
            let input = (late_in.left + late_in.right) * 0.5;

            let mut out_l = 0.0f32;
            let mut out_r = 0.0f32;
            for comb in &mut self.combs_l {
                out_l += comb.process(input, self.damp);
            }
            for comb in &mut self.combs_r {
                out_r += comb.process(input, self.damp);
            }
            out_l *= COMB_GAIN;
            out_r *= COMB_GAIN;

            for ap in &mut self.allpass_l {
                out_l = ap.process(out_l, self.allpass_feedback);
            }
            for ap in &mut self.allpass_r {
                out_r = ap.process(out_r, self.allpass_feedback);
            }

            let mut late = StereoSample::new(out_l * self.late_gain.0, out_r * self.late_gain.1);
            if let Some(stage) = &mut self.advanced {
                late = stage.process(late);
            }

            let reflections = StereoSample::new(
                early.left * self.reflections_gain.0,
                early.right * self.reflections_gain.1,
            );
            *sample = (reflections + late) * self.gain;
        }
    }

    fn reset(&mut self) {
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.reset();
        }
        for ap in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            ap.reset();
        }
        self.reflections_delay.reset();
        self.late_delay.reset();
        if let Some(stage) = &mut self.advanced {
            stage.reset();
        }
    }
}
