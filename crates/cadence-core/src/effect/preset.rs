//! Reverb preset table
//!
//! Environment presets with the standard EFX reverb property values. The
//! basic reverb variant receives the shared subset of fields; the advanced
//! variant receives all of them.

use super::{EffectParam, EffectType, ParamValue};

/// Full set of reverb properties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbProperties {
    pub density: f32,
    pub diffusion: f32,
    pub gain: f32,
    pub gain_hf: f32,
    pub gain_lf: f32,
    pub decay_time: f32,
    pub decay_hf_ratio: f32,
    pub decay_lf_ratio: f32,
    pub reflections_gain: f32,
    pub reflections_delay: f32,
    pub reflections_pan: [f32; 3],
    pub late_reverb_gain: f32,
    pub late_reverb_delay: f32,
    pub late_reverb_pan: [f32; 3],
    pub echo_time: f32,
    pub echo_depth: f32,
    pub modulation_time: f32,
    pub modulation_depth: f32,
    pub air_absorption_gain_hf: f32,
    pub hf_reference: f32,
    pub lf_reference: f32,
    pub room_rolloff_factor: f32,
    pub decay_hf_limit: bool,
}

/// Compact constructor for the table below
///
/// Arguments in table order: density, diffusion, gain HF, decay time,
/// decay HF ratio, reflections gain/delay, late gain/delay, echo time/depth,
/// modulation time/depth, decay HF limit. The remaining fields are the same
/// for every preset.
#[allow(clippy::too_many_arguments)]
const fn props(
    density: f32,
    diffusion: f32,
    gain_hf: f32,
    decay_time: f32,
    decay_hf_ratio: f32,
    reflections: (f32, f32),
    late: (f32, f32),
    echo: (f32, f32),
    modulation: (f32, f32),
    decay_hf_limit: bool,
) -> ReverbProperties {
    ReverbProperties {
        density,
        diffusion,
        gain: 0.3162,
        gain_hf,
        gain_lf: 1.0,
        decay_time,
        decay_hf_ratio,
        decay_lf_ratio: 1.0,
        reflections_gain: reflections.0,
        reflections_delay: reflections.1,
        reflections_pan: [0.0; 3],
        late_reverb_gain: late.0,
        late_reverb_delay: late.1,
        late_reverb_pan: [0.0; 3],
        echo_time: echo.0,
        echo_depth: echo.1,
        modulation_time: modulation.0,
        modulation_depth: modulation.1,
        air_absorption_gain_hf: 0.9943,
        hf_reference: 5000.0,
        lf_reference: 250.0,
        room_rolloff_factor: 0.0,
        decay_hf_limit,
    }
}

const ECHO_NONE: (f32, f32) = (0.25, 0.0);
const MOD_NONE: (f32, f32) = (0.25, 0.0);

/// Named reverb environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReverbPreset {
    #[default]
    Generic,
    PaddedCell,
    Room,
    Bathroom,
    LivingRoom,
    StoneRoom,
    Auditorium,
    ConcertHall,
    Cave,
    Arena,
    Hangar,
    CarpetedHallway,
    Hallway,
    StoneCorridor,
    Alley,
    Forest,
    City,
    Mountains,
    Quarry,
    Plain,
    ParkingLot,
    SewerPipe,
    Underwater,
    Drugged,
    Dizzy,
    Psychotic,
}

impl ReverbPreset {
    pub const ALL: [ReverbPreset; 26] = [
        ReverbPreset::Generic,
        ReverbPreset::PaddedCell,
        ReverbPreset::Room,
        ReverbPreset::Bathroom,
        ReverbPreset::LivingRoom,
        ReverbPreset::StoneRoom,
        ReverbPreset::Auditorium,
        ReverbPreset::ConcertHall,
        ReverbPreset::Cave,
        ReverbPreset::Arena,
        ReverbPreset::Hangar,
        ReverbPreset::CarpetedHallway,
        ReverbPreset::Hallway,
        ReverbPreset::StoneCorridor,
        ReverbPreset::Alley,
        ReverbPreset::Forest,
        ReverbPreset::City,
        ReverbPreset::Mountains,
        ReverbPreset::Quarry,
        ReverbPreset::Plain,
        ReverbPreset::ParkingLot,
        ReverbPreset::SewerPipe,
        ReverbPreset::Underwater,
        ReverbPreset::Drugged,
        ReverbPreset::Dizzy,
        ReverbPreset::Psychotic,
    ];

    /// Identifier used in configuration and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            ReverbPreset::Generic => "generic",
            ReverbPreset::PaddedCell => "padded_cell",
            ReverbPreset::Room => "room",
            ReverbPreset::Bathroom => "bathroom",
            ReverbPreset::LivingRoom => "living_room",
            ReverbPreset::StoneRoom => "stone_room",
            ReverbPreset::Auditorium => "auditorium",
            ReverbPreset::ConcertHall => "concert_hall",
            ReverbPreset::Cave => "cave",
            ReverbPreset::Arena => "arena",
            ReverbPreset::Hangar => "hangar",
            ReverbPreset::CarpetedHallway => "carpeted_hallway",
            ReverbPreset::Hallway => "hallway",
            ReverbPreset::StoneCorridor => "stone_corridor",
            ReverbPreset::Alley => "alley",
            ReverbPreset::Forest => "forest",
            ReverbPreset::City => "city",
            ReverbPreset::Mountains => "mountains",
            ReverbPreset::Quarry => "quarry",
            ReverbPreset::Plain => "plain",
            ReverbPreset::ParkingLot => "parking_lot",
            ReverbPreset::SewerPipe => "sewer_pipe",
            ReverbPreset::Underwater => "underwater",
            ReverbPreset::Drugged => "drugged",
            ReverbPreset::Dizzy => "dizzy",
            ReverbPreset::Psychotic => "psychotic",
        }
    }

    /// Human-readable description
    pub fn describe(&self) -> &'static str {
        match self {
            ReverbPreset::Generic => "Generic",
            ReverbPreset::PaddedCell => "Padded Cell",
            ReverbPreset::Room => "Room",
            ReverbPreset::Bathroom => "Bathroom",
            ReverbPreset::LivingRoom => "Living Room",
            ReverbPreset::StoneRoom => "Stone Room",
            ReverbPreset::Auditorium => "Auditorium",
            ReverbPreset::ConcertHall => "Concert Hall",
            ReverbPreset::Cave => "Cave",
            ReverbPreset::Arena => "Arena",
            ReverbPreset::Hangar => "Hangar",
            ReverbPreset::CarpetedHallway => "Carpeted Hallway",
            ReverbPreset::Hallway => "Hallway",
            ReverbPreset::StoneCorridor => "Stone Corridor",
            ReverbPreset::Alley => "Alley",
            ReverbPreset::Forest => "Forest",
            ReverbPreset::City => "City",
            ReverbPreset::Mountains => "Mountains",
            ReverbPreset::Quarry => "Quarry",
            ReverbPreset::Plain => "Plain",
            ReverbPreset::ParkingLot => "Parking Lot",
            ReverbPreset::SewerPipe => "Sewer Pipe",
            ReverbPreset::Underwater => "Underwater",
            ReverbPreset::Drugged => "Drugged",
            ReverbPreset::Dizzy => "Dizzy",
            ReverbPreset::Psychotic => "Psychotic",
        }
    }

    /// Look up a preset by name (case-insensitive, '-' and ' ' accepted for '_')
    pub fn from_name(name: &str) -> Option<ReverbPreset> {
        let wanted: String = name
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Self::ALL.into_iter().find(|p| p.name() == wanted)
    }

    pub fn properties(&self) -> ReverbProperties {
        match self {
            ReverbPreset::Generic => props(1.0, 1.0, 0.8913, 1.49, 0.83, (0.05, 0.007), (1.2589, 0.011), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::PaddedCell => props(0.1715, 1.0, 0.001, 0.17, 0.1, (0.25, 0.001), (1.2691, 0.002), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Room => props(0.4287, 1.0, 0.5929, 0.4, 0.83, (0.1503, 0.002), (1.0629, 0.003), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Bathroom => props(0.1715, 1.0, 0.2512, 1.49, 0.54, (0.6531, 0.007), (3.2734, 0.011), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::LivingRoom => props(0.9766, 1.0, 0.001, 0.5, 0.1, (0.2051, 0.003), (0.2805, 0.004), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::StoneRoom => props(1.0, 1.0, 0.7079, 2.31, 0.64, (0.4411, 0.012), (1.1003, 0.017), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Auditorium => props(1.0, 1.0, 0.5781, 4.32, 0.59, (0.4032, 0.02), (0.717, 0.03), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::ConcertHall => props(1.0, 1.0, 0.5623, 3.92, 0.7, (0.2427, 0.02), (0.9977, 0.029), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Cave => props(1.0, 1.0, 1.0, 2.91, 1.3, (0.5, 0.015), (0.7063, 0.022), ECHO_NONE, MOD_NONE, false),
            ReverbPreset::Arena => props(1.0, 1.0, 0.4477, 7.24, 0.33, (0.2612, 0.02), (1.0186, 0.03), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Hangar => props(1.0, 1.0, 0.3162, 10.05, 0.23, (0.5, 0.02), (1.256, 0.03), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::CarpetedHallway => props(0.4287, 1.0, 0.01, 0.3, 0.1, (0.1215, 0.002), (0.1531, 0.03), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Hallway => props(0.3645, 1.0, 0.7079, 1.49, 0.59, (0.2458, 0.007), (1.6615, 0.011), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::StoneCorridor => props(1.0, 1.0, 0.7612, 2.7, 0.79, (0.2472, 0.013), (1.5758, 0.02), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Alley => props(1.0, 0.3, 0.7328, 1.49, 0.86, (0.25, 0.007), (0.9954, 0.011), (0.125, 0.95), MOD_NONE, true),
            ReverbPreset::Forest => props(1.0, 0.3, 0.0224, 1.49, 0.54, (0.0525, 0.162), (0.7682, 0.088), (0.125, 1.0), MOD_NONE, true),
            ReverbPreset::City => props(1.0, 0.5, 0.3981, 1.49, 0.67, (0.073, 0.007), (0.1427, 0.011), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Mountains => props(1.0, 0.27, 0.0562, 1.49, 0.21, (0.0407, 0.3), (0.1919, 0.1), (0.25, 1.0), MOD_NONE, false),
            ReverbPreset::Quarry => props(1.0, 1.0, 0.3162, 1.49, 0.83, (0.0, 0.061), (1.7783, 0.025), (0.125, 0.7), MOD_NONE, true),
            ReverbPreset::Plain => props(1.0, 0.21, 0.1, 1.49, 0.5, (0.0585, 0.179), (0.1089, 0.1), (0.25, 1.0), MOD_NONE, true),
            ReverbPreset::ParkingLot => props(1.0, 1.0, 1.0, 1.65, 1.5, (0.2082, 0.008), (0.2652, 0.012), ECHO_NONE, MOD_NONE, false),
            ReverbPreset::SewerPipe => props(0.3071, 0.8, 0.3162, 2.81, 0.14, (1.6387, 0.014), (3.2471, 0.021), ECHO_NONE, MOD_NONE, true),
            ReverbPreset::Underwater => props(0.3645, 1.0, 0.01, 1.49, 0.1, (0.5963, 0.007), (7.0795, 0.011), ECHO_NONE, (1.18, 0.348), true),
            ReverbPreset::Drugged => props(0.4287, 0.5, 1.0, 8.39, 1.39, (0.876, 0.002), (3.1081, 0.03), ECHO_NONE, (0.25, 1.0), false),
            ReverbPreset::Dizzy => props(0.3645, 0.6, 0.631, 17.23, 0.56, (0.1392, 0.02), (0.4937, 0.03), (0.25, 1.0), (0.81, 0.31), false),
            ReverbPreset::Psychotic => props(0.0625, 0.5, 0.8404, 7.56, 0.91, (0.4864, 0.02), (2.4378, 0.03), ECHO_NONE, (4.0, 1.0), false),
        }
    }
}

impl std::fmt::Display for ReverbPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

impl ReverbProperties {
    /// Parameter writes for a reverb of the given variant
    ///
    /// Non-reverb effect types get nothing.
    pub fn param_values(&self, kind: EffectType) -> Vec<(EffectParam, ParamValue)> {
        use EffectParam::*;
        use ParamValue::{Float, Int, Vector};

        if !kind.is_reverb() {
            return Vec::new();
        }

        let mut values = vec![
            (Density, Float(self.density)),
            (Diffusion, Float(self.diffusion)),
            (Gain, Float(self.gain)),
            (GainHF, Float(self.gain_hf)),
            (DecayTime, Float(self.decay_time)),
            (DecayHFRatio, Float(self.decay_hf_ratio)),
            (ReflectionsGain, Float(self.reflections_gain)),
            (ReflectionsDelay, Float(self.reflections_delay)),
            (LateReverbGain, Float(self.late_reverb_gain)),
            (LateReverbDelay, Float(self.late_reverb_delay)),
            (AirAbsorptionGainHF, Float(self.air_absorption_gain_hf)),
            (RoomRolloffFactor, Float(self.room_rolloff_factor)),
            (DecayHFLimit, Int(self.decay_hf_limit as i32)),
        ];

        if kind == EffectType::AdvancedReverb {
            values.extend([
                (GainLF, Float(self.gain_lf)),
                (DecayLFRatio, Float(self.decay_lf_ratio)),
                (ReflectionsPan, Vector(self.reflections_pan)),
                (LateReverbPan, Vector(self.late_reverb_pan)),
                (EchoTime, Float(self.echo_time)),
                (EchoDepth, Float(self.echo_depth)),
                (ModulationTime, Float(self.modulation_time)),
                (ModulationDepth, Float(self.modulation_depth)),
                (HFReference, Float(self.hf_reference)),
                (LFReference, Float(self.lf_reference)),
            ]);
        }
        values
    }
}
