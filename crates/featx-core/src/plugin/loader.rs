//! Plugin lookup and instantiation
//!
//! Plugins are addressed by a key of the form `library:identifier`
//! (e.g. `featx:power`). A [`PluginLoader`] turns such a key into a fresh
//! instance for a given input sample rate.

use std::collections::BTreeMap;

use super::{AnalysisPlugin, PluginError, PluginResult};
use crate::analysis;

/// Creates a plugin instance for the given input sample rate
pub type PluginFactory = Box<dyn Fn(u32) -> Box<dyn AnalysisPlugin>>;

/// Source of analysis plugin instances
pub trait PluginLoader {
    /// Instantiate the plugin registered under `key` at `sample_rate`
    fn load(&self, key: &str, sample_rate: u32) -> PluginResult<Box<dyn AnalysisPlugin>>;

    /// Every key this loader can instantiate, sorted
    fn plugin_keys(&self) -> Vec<String>;
}

/// Split a plugin key into `(library, identifier)`
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (library, identifier) = key.split_once(':')?;
    if library.is_empty() || identifier.is_empty() || identifier.contains(':') {
        return None;
    }
    Some((library, identifier))
}

/// In-process registry of plugin factories
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in `featx` plugins
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        analysis::register_builtin(&mut registry);
        registry
    }

    /// Register a factory under `key`, replacing any previous registration
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(u32) -> Box<dyn AnalysisPlugin> + 'static,
    {
        let key = key.into();
        if self.factories.insert(key.clone(), Box::new(factory)).is_some() {
            log::warn!("PluginRegistry: replacing existing registration for '{}'", key);
        } else {
            log::debug!("PluginRegistry: registered '{}'", key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl PluginLoader for PluginRegistry {
    fn load(&self, key: &str, sample_rate: u32) -> PluginResult<Box<dyn AnalysisPlugin>> {
        if split_key(key).is_none() {
            return Err(PluginError::LoadFailed {
                plugin_id: key.to_string(),
                reason: "expected a key of the form library:identifier".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(PluginError::LoadFailed {
                plugin_id: key.to_string(),
                reason: "sample rate must be non-zero".to_string(),
            });
        }
        let factory = self.factories.get(key).ok_or_else(|| PluginError::NotFound {
            plugin_id: key.to_string(),
        })?;
        let plugin = factory(sample_rate);
        log::debug!(
            "PluginRegistry: loaded '{}' ({}) v{} at {} Hz",
            key,
            plugin.name(),
            plugin.version(),
            sample_rate
        );
        Ok(plugin)
    }

    fn plugin_keys(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
