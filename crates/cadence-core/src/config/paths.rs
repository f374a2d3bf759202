//! Standard locations for cadence configuration files

use std::path::PathBuf;

/// Get the cadence configuration directory
///
/// Returns: `<platform config dir>/cadence` (e.g. `~/.config/cadence` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
}

/// Get the default config file path for a given file name
///
/// Returns: `<config dir>/cadence/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_cadence() {
        assert!(default_config_dir().ends_with("cadence"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("engine.yaml");
        assert!(path.ends_with("cadence/engine.yaml"));
    }
}
