//! YAML configuration I/O
//!
//! Works with any serde-serializable configuration type.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file
///
/// Unlike [`load_config_or_default`], a missing or invalid file is an error:
/// a run description that cannot be read must not silently run nothing.
pub fn load_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    log::info!("load_config: Loading from {:?}", path);

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    log::info!("load_config: Successfully loaded config from {:?}", path);
    Ok(config)
}

/// Load configuration, falling back to defaults
///
/// If the file doesn't exist, returns the default config.
/// If the file exists but is invalid, logs a warning and returns the default config.
pub fn load_config_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return T::default();
    }
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        value: i32,
        name: String,
    }

    #[test]
    fn test_load_nonexistent() {
        let path = Path::new("/nonexistent/path/config.yaml");
        assert!(load_config::<TestConfig>(path).is_err());
        let config: TestConfig = load_config_or_default(path);
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "value: [unterminated").unwrap();

        let err = load_config::<TestConfig>(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
        assert_eq!(load_config_or_default::<TestConfig>(&path), TestConfig::default());
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.yaml");

        let config = TestConfig {
            value: 42,
            name: "test".to_string(),
        };
        save_config(&config, &path).unwrap();
        let loaded: TestConfig = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
