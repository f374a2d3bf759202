//! Cadence Core - streaming audio channel engine
//!
//! Sounds are decoded on per-channel worker threads and streamed through a
//! small ring of hardware buffers into a software voice mixer, which a cpal
//! output stream (or a headless clock) renders.
//!
//! ```ignore
//! use cadence_core::{config::EngineConfig, system::AudioSystem};
//!
//! let system = AudioSystem::new(EngineConfig::default())?;
//! system.pool().play(0, "music.ogg", 1.0, 1.0, -1)?;
//! ```

pub mod channel;
pub mod config;
pub mod device;
pub mod effect;
pub mod error;
pub mod events;
pub mod hardware;
pub mod pool;
pub mod sound;
pub mod system;
pub mod types;

pub use error::{AudioError, AudioResult};
pub use types::*;
