//! Standard locations of featx configuration files

use std::path::PathBuf;

/// Directory holding featx configuration
///
/// Returns: `<config dir>/featx` (e.g. `~/.config/featx` on Linux), or
/// `./featx` where no config directory is known.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("featx")
}

/// Run description used when none is named on the command line
///
/// Returns: `<config dir>/featx/featx.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join("featx.yaml")
}
