//! Auxiliary effects - handles, parameters and reverb presets
//!
//! An [`Effect`] is a hardware effect object. Attaching it to a channel
//! allocates an [`AuxSend`]: an effect slot loaded with the effect's
//! parameters and wired to one of the channel voice's aux-send inputs.
//! Effects outlive their sends; only an explicit release deletes them.

mod params;
pub mod preset;

pub use params::{EffectParam, EffectType, ParamInfo, ParamKind, ParamSet, ParamValue};
pub use preset::{ReverbPreset, ReverbProperties};

use crate::hardware::{EffectId, SlotId};

/// Handle to a hardware effect object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    pub(crate) id: EffectId,
    kind: EffectType,
}

impl Effect {
    pub(crate) fn new(id: EffectId, kind: EffectType) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn kind(&self) -> EffectType {
        self.kind
    }
}

/// One entry of a channel's send chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxSend {
    /// Slot the send is routed into
    pub slot: SlotId,
    /// Effect currently loaded in the slot
    pub effect: Effect,
}
