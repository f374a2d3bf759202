//! Engine configuration and YAML persistence
//!
//! # Usage
//!
//! ```ignore
//! use cadence_core::config::{load_config, save_config, default_config_path, EngineConfig};
//!
//! let path = default_config_path("engine.yaml");
//! let config: EngineConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{
    BackendKind, BufferSize, DeviceConfig, DeviceId, EffectsConfig, EngineConfig,
    StreamingConfig, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE,
};
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
