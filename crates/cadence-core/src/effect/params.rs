//! Effect types and parameter descriptions
//!
//! Every parameter has a fixed value kind, range and default. The hardware
//! validates writes against these descriptions, and the DSP reads its
//! snapshot through [`ParamSet`].

use std::collections::BTreeMap;

use crate::error::{AudioError, AudioResult};

/// Kind of auxiliary effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectType {
    /// Basic reverb (EFX standard reverb)
    Reverb,
    /// Advanced reverb with LF shaping, echo and modulation (EAX reverb)
    AdvancedReverb,
    Echo,
    Distortion,
    RingModulator,
}

impl EffectType {
    pub const ALL: [EffectType; 5] = [
        EffectType::Reverb,
        EffectType::AdvancedReverb,
        EffectType::Echo,
        EffectType::Distortion,
        EffectType::RingModulator,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EffectType::Reverb => "reverb",
            EffectType::AdvancedReverb => "advanced reverb",
            EffectType::Echo => "echo",
            EffectType::Distortion => "distortion",
            EffectType::RingModulator => "ring modulator",
        }
    }

    pub fn is_reverb(&self) -> bool {
        matches!(self, EffectType::Reverb | EffectType::AdvancedReverb)
    }
}

/// How a parameter value is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
    /// Three-component vector (panning)
    Vector,
}

/// A parameter value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Vector([f32; 3]),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Vector(_) => ParamKind::Vector,
        }
    }

    /// Numeric view (ints widen, vectors report their length)
    pub fn as_f32(&self) -> f32 {
        match *self {
            ParamValue::Float(v) => v,
            ParamValue::Int(v) => v as f32,
            ParamValue::Vector([x, y, z]) => (x * x + y * y + z * z).sqrt(),
        }
    }
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::Float(0.0)
    }
}

/// Description of one effect parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamInfo {
    pub name: &'static str,
    pub kind: ParamKind,
    pub min: f32,
    pub max: f32,
    pub default: ParamValue,
    pub unit: &'static str,
}

impl ParamInfo {
    const fn float(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            kind: ParamKind::Float,
            min,
            max,
            default: ParamValue::Float(default),
            unit: "",
        }
    }

    const fn int(name: &'static str, min: i32, max: i32, default: i32) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
            min: min as f32,
            max: max as f32,
            default: ParamValue::Int(default),
            unit: "",
        }
    }

    /// Pan vectors: magnitude must not exceed 1
    const fn vector(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Vector,
            min: 0.0,
            max: 1.0,
            default: ParamValue::Vector([0.0, 0.0, 0.0]),
            unit: "",
        }
    }

    const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Check a value against this description
    pub fn validate(&self, value: ParamValue) -> AudioResult<ParamValue> {
        if value.kind() != self.kind {
            return Err(AudioError::InvalidPointer(format!(
                "{} expects a {:?} value",
                self.name, self.kind
            )));
        }
        let v = value.as_f32();
        if !v.is_finite() || v < self.min - f32::EPSILON || v > self.max + f32::EPSILON {
            return Err(AudioError::OutOfRange(format!(
                "{} = {} outside [{}, {}]",
                self.name, v, self.min, self.max
            )));
        }
        Ok(value)
    }
}

/// Named effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectParam {
    // Reverb (both variants)
    Density,
    Diffusion,
    Gain,
    GainHF,
    DecayTime,
    DecayHFRatio,
    ReflectionsGain,
    ReflectionsDelay,
    LateReverbGain,
    LateReverbDelay,
    AirAbsorptionGainHF,
    RoomRolloffFactor,
    DecayHFLimit,
    // Advanced reverb only
    GainLF,
    DecayLFRatio,
    ReflectionsPan,
    LateReverbPan,
    EchoTime,
    EchoDepth,
    ModulationTime,
    ModulationDepth,
    HFReference,
    LFReference,
    // Echo
    EchoDelay,
    EchoLRDelay,
    EchoDamping,
    EchoFeedback,
    EchoSpread,
    // Distortion
    Edge,
    DistortionGain,
    LowpassCutoff,
    EqCenter,
    EqBandwidth,
    // Ring modulator
    Frequency,
    HighpassCutoff,
    Waveform,
}

impl EffectParam {
    /// Parameters shared by both reverb variants
    pub const REVERB: [EffectParam; 13] = [
        EffectParam::Density,
        EffectParam::Diffusion,
        EffectParam::Gain,
        EffectParam::GainHF,
        EffectParam::DecayTime,
        EffectParam::DecayHFRatio,
        EffectParam::ReflectionsGain,
        EffectParam::ReflectionsDelay,
        EffectParam::LateReverbGain,
        EffectParam::LateReverbDelay,
        EffectParam::AirAbsorptionGainHF,
        EffectParam::RoomRolloffFactor,
        EffectParam::DecayHFLimit,
    ];

    /// Extra parameters of the advanced reverb
    pub const ADVANCED_REVERB: [EffectParam; 10] = [
        EffectParam::GainLF,
        EffectParam::DecayLFRatio,
        EffectParam::ReflectionsPan,
        EffectParam::LateReverbPan,
        EffectParam::EchoTime,
        EffectParam::EchoDepth,
        EffectParam::ModulationTime,
        EffectParam::ModulationDepth,
        EffectParam::HFReference,
        EffectParam::LFReference,
    ];

    pub const ECHO: [EffectParam; 5] = [
        EffectParam::EchoDelay,
        EffectParam::EchoLRDelay,
        EffectParam::EchoDamping,
        EffectParam::EchoFeedback,
        EffectParam::EchoSpread,
    ];

    pub const DISTORTION: [EffectParam; 5] = [
        EffectParam::Edge,
        EffectParam::DistortionGain,
        EffectParam::LowpassCutoff,
        EffectParam::EqCenter,
        EffectParam::EqBandwidth,
    ];

    pub const RING_MODULATOR: [EffectParam; 3] = [
        EffectParam::Frequency,
        EffectParam::HighpassCutoff,
        EffectParam::Waveform,
    ];

    /// Parameters accepted by an effect type
    pub fn for_type(kind: EffectType) -> Vec<EffectParam> {
        match kind {
            EffectType::Reverb => Self::REVERB.to_vec(),
            EffectType::AdvancedReverb => {
                let mut params = Self::REVERB.to_vec();
                params.extend_from_slice(&Self::ADVANCED_REVERB);
                params
            }
            EffectType::Echo => Self::ECHO.to_vec(),
            EffectType::Distortion => Self::DISTORTION.to_vec(),
            EffectType::RingModulator => Self::RING_MODULATOR.to_vec(),
        }
    }

    pub fn applies_to(&self, kind: EffectType) -> bool {
        match kind {
            EffectType::Reverb => Self::REVERB.contains(self),
            EffectType::AdvancedReverb => {
                Self::REVERB.contains(self) || Self::ADVANCED_REVERB.contains(self)
            }
            EffectType::Echo => Self::ECHO.contains(self),
            EffectType::Distortion => Self::DISTORTION.contains(self),
            EffectType::RingModulator => Self::RING_MODULATOR.contains(self),
        }
    }

    pub fn info(&self) -> ParamInfo {
        use EffectParam::*;
        match self {
            Density => ParamInfo::float("Density", 0.0, 1.0, 1.0),
            Diffusion => ParamInfo::float("Diffusion", 0.0, 1.0, 1.0),
            Gain => ParamInfo::float("Gain", 0.0, 1.0, 0.32),
            GainHF => ParamInfo::float("Gain HF", 0.0, 1.0, 0.89),
            DecayTime => ParamInfo::float("Decay Time", 0.1, 20.0, 1.49).with_unit("s"),
            DecayHFRatio => ParamInfo::float("Decay HF Ratio", 0.1, 2.0, 0.83),
            ReflectionsGain => ParamInfo::float("Reflections Gain", 0.0, 3.16, 0.05),
            ReflectionsDelay => {
                ParamInfo::float("Reflections Delay", 0.0, 0.3, 0.007).with_unit("s")
            }
            LateReverbGain => ParamInfo::float("Late Reverb Gain", 0.0, 10.0, 1.26),
            LateReverbDelay => {
                ParamInfo::float("Late Reverb Delay", 0.0, 0.1, 0.011).with_unit("s")
            }
            AirAbsorptionGainHF => ParamInfo::float("Air Absorption Gain HF", 0.892, 1.0, 0.994),
            RoomRolloffFactor => ParamInfo::float("Room Rolloff Factor", 0.0, 10.0, 0.0),
            DecayHFLimit => ParamInfo::int("Decay HF Limit", 0, 1, 1),
            GainLF => ParamInfo::float("Gain LF", 0.0, 1.0, 1.0),
            DecayLFRatio => ParamInfo::float("Decay LF Ratio", 0.1, 2.0, 1.0),
            ReflectionsPan => ParamInfo::vector("Reflections Pan"),
            LateReverbPan => ParamInfo::vector("Late Reverb Pan"),
            EchoTime => ParamInfo::float("Echo Time", 0.075, 0.25, 0.25).with_unit("s"),
            EchoDepth => ParamInfo::float("Echo Depth", 0.0, 1.0, 0.0),
            ModulationTime => ParamInfo::float("Modulation Time", 0.04, 4.0, 0.25).with_unit("s"),
            ModulationDepth => ParamInfo::float("Modulation Depth", 0.0, 1.0, 0.0),
            HFReference => ParamInfo::float("HF Reference", 1000.0, 20000.0, 5000.0).with_unit("Hz"),
            LFReference => ParamInfo::float("LF Reference", 20.0, 1000.0, 250.0).with_unit("Hz"),
            EchoDelay => ParamInfo::float("Delay", 0.0, 0.207, 0.1).with_unit("s"),
            EchoLRDelay => ParamInfo::float("LR Delay", 0.0, 0.404, 0.1).with_unit("s"),
            EchoDamping => ParamInfo::float("Damping", 0.0, 0.99, 0.5),
            EchoFeedback => ParamInfo::float("Feedback", 0.0, 1.0, 0.5),
            EchoSpread => ParamInfo::float("Spread", -1.0, 1.0, -1.0),
            Edge => ParamInfo::float("Edge", 0.0, 1.0, 0.2),
            DistortionGain => ParamInfo::float("Gain", 0.01, 1.0, 0.05),
            LowpassCutoff => ParamInfo::float("Lowpass Cutoff", 80.0, 24000.0, 8000.0).with_unit("Hz"),
            EqCenter => ParamInfo::float("EQ Center", 80.0, 24000.0, 3600.0).with_unit("Hz"),
            EqBandwidth => ParamInfo::float("EQ Bandwidth", 80.0, 24000.0, 3600.0).with_unit("Hz"),
            Frequency => ParamInfo::float("Frequency", 0.0, 8000.0, 440.0).with_unit("Hz"),
            HighpassCutoff => {
                ParamInfo::float("Highpass Cutoff", 0.0, 24000.0, 800.0).with_unit("Hz")
            }
            Waveform => ParamInfo::int("Waveform", 0, 2, 0),
        }
    }
}

/// Current parameter values of one effect object
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    kind: EffectType,
    values: BTreeMap<EffectParam, ParamValue>,
}

impl ParamSet {
    /// Every parameter of `kind` at its default
    pub fn defaults(kind: EffectType) -> Self {
        let values = EffectParam::for_type(kind)
            .into_iter()
            .map(|p| (p, p.info().default))
            .collect();
        Self { kind, values }
    }

    pub fn kind(&self) -> EffectType {
        self.kind
    }

    /// Validate and store a value
    pub fn set(&mut self, param: EffectParam, value: ParamValue) -> AudioResult<()> {
        if !param.applies_to(self.kind) {
            return Err(AudioError::InvalidPointer(format!(
                "{:?} is not a {} parameter",
                param,
                self.kind.name()
            )));
        }
        let value = param.info().validate(value)?;
        self.values.insert(param, value);
        Ok(())
    }

    pub fn get(&self, param: EffectParam) -> AudioResult<ParamValue> {
        self.values.get(&param).copied().ok_or_else(|| {
            AudioError::InvalidPointer(format!("{:?} is not a {} parameter", param, self.kind.name()))
        })
    }

    /// Float view, falling back to the parameter default
    pub fn float(&self, param: EffectParam) -> f32 {
        self.values
            .get(&param)
            .copied()
            .unwrap_or_else(|| param.info().default)
            .as_f32()
    }

    pub fn vector(&self, param: EffectParam) -> [f32; 3] {
        match self.values.get(&param) {
            Some(ParamValue::Vector(v)) => *v,
            _ => [0.0; 3],
        }
    }
}
