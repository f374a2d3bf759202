//! Filter building blocks shared by the effect DSP

use crate::types::StereoSample;

/// Two-pole (12dB/octave) stereo state-variable filter
pub struct SvfFilter {
    sample_rate: f32,
    ic1eq: StereoSample,
    ic2eq: StereoSample,
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

/// Simultaneous outputs of one SVF step
#[derive(Debug, Clone, Copy)]
pub struct SvfOutput {
    pub low: StereoSample,
    pub high: StereoSample,
    pub band: StereoSample,
}

impl SvfFilter {
    pub fn new(sample_rate: u32, cutoff: f32, q: f32) -> Self {
        let mut f = Self {
            sample_rate: sample_rate.max(1) as f32,
            ic1eq: StereoSample::silence(),
            ic2eq: StereoSample::silence(),
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
        };
        f.set_params(cutoff, q);
        f
    }

    pub fn set_params(&mut self, cutoff: f32, q: f32) {
        let nyquist = self.sample_rate * 0.49;
        let cutoff = cutoff.clamp(10.0, nyquist);
        let q = q.clamp(0.1, 10.0);

        let g = (std::f32::consts::PI * cutoff / self.sample_rate).tan();
        self.k = 1.0 / q;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    #[inline]
    fn tick(&self, x: f32, ic1: &mut f32, ic2: &mut f32) -> (f32, f32, f32) {
        let v3 = x - *ic2;
        let v1 = self.a1 * *ic1 + self.a2 * v3;
        let v2 = *ic2 + self.a2 * *ic1 + self.a3 * v3;
        *ic1 = 2.0 * v1 - *ic1;
        *ic2 = 2.0 * v2 - *ic2;
        let high = x - self.k * v1 - v2;
        (v2, high, v1)
    }

    #[inline]
    pub fn process(&mut self, input: StereoSample) -> SvfOutput {
        let (mut ic1, mut ic2) = (self.ic1eq, self.ic2eq);
        let (low_l, high_l, band_l) = self.tick(input.left, &mut ic1.left, &mut ic2.left);
        let (low_r, high_r, band_r) = self.tick(input.right, &mut ic1.right, &mut ic2.right);
        self.ic1eq = ic1;
        self.ic2eq = ic2;

        SvfOutput {
            low: StereoSample::new(low_l, low_r),
            high: StereoSample::new(high_l, high_r),
            band: StereoSample::new(band_l, band_r),
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = StereoSample::silence();
        self.ic2eq = StereoSample::silence();
    }
}

/// One-pole lowpass used for damping feedback paths
///
/// `damp` = 0 passes everything, values towards 1 darken the signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnePole {
    state: f32,
}

impl OnePole {
    #[inline]
    pub fn process(&mut self, input: f32, damp: f32) -> f32 {
        self.state = input * (1.0 - damp) + self.state * damp;
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowpass_passes_dc() {
        let mut svf = SvfFilter::new(48000, 1000.0, 0.707);
        let mut out = StereoSample::silence();
        for _ in 0..4800 {
            out = svf.process(StereoSample::mono(1.0)).low;
        }
        assert!((out.left - 1.0).abs() < 0.01);
        assert!((out.right - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut svf = SvfFilter::new(48000, 1000.0, 0.707);
        let mut out = StereoSample::silence();
        for _ in 0..4800 {
            out = svf.process(StereoSample::mono(1.0)).high;
        }
        assert!(out.left.abs() < 0.01);
    }

    #[test]
    fn test_one_pole_converges() {
        let mut lp = OnePole::default();
        let mut out = 0.0;
        for _ in 0..200 {
            out = lp.process(1.0, 0.9);
        }
        assert!((out - 1.0).abs() < 0.01);
        lp.reset();
        assert_eq!(lp.process(0.0, 0.5), 0.0);
    }
}
