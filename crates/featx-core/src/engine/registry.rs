//! Transform registration and the plugin instance cache
//!
//! Transforms identical in everything but output and summary type share one
//! plugin instance. The cache maps transforms (both as registered and as
//! resolved) to stable [`InstanceId`]s; sharing can upgrade an instance's
//! capabilities (enable summaries) but never replaces it.

use std::rc::Rc;

use super::{
    CacheEntry, ExtractionManager, InstanceId, PluginInstance, RegistrationError, TransformWork,
};
use crate::plugin::adapters;
use crate::plugin::AnalysisPlugin;
use crate::transform::Transform;
use crate::writer::SharedWriter;

impl ExtractionManager {
    /// Register a transform whose features go to `writers`
    ///
    /// Zero step/block sizes and an empty output are resolved from the plugin.
    /// A failed registration leaves the manager unchanged.
    ///
    /// # Arguments
    ///
    /// * `transform` - The requested analysis. Its sample rate is replaced by
    ///   the run rate once one is established.
    /// * `writers` - Destinations for the transform's features. Registering
    ///   the same transform again adds to its writers.
    ///
    /// # Returns
    ///
    /// The instance now serving the transform. Transforms differing only in
    /// output or summary type get the same id.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let rms = manager.add_feature_extractor(
    ///     Transform::new("featx:power").with_output("rms"),
    ///     vec![writer.clone()],
    /// )?;
    /// let peak = manager.add_feature_extractor(
    ///     Transform::new("featx:power").with_output("peak"),
    ///     vec![writer],
    /// )?;
    /// assert_eq!(rms, peak);
    /// ```
    pub fn add_feature_extractor(
        &mut self,
        mut transform: Transform,
        writers: Vec<SharedWriter>,
    ) -> Result<InstanceId, RegistrationError> {
        let rate = self.normalize_rate(&mut transform)?;
        let as_registered = transform.clone();

        let (id, created) = if let Some(entry) = self.cache.iter().find(|e| e.key == transform) {
            transform = entry.resolved.clone();
            (entry.instance, None)
        } else if let Some(id) = self
            .cache
            .iter()
            .find(|e| e.key.shares_instance_with(&transform))
            .map(|e| e.instance)
        {
            log::info!(
                "Already have a transform identical to '{}' in every detail except output and/or summary type; sharing its plugin instance",
                transform.plugin_id
            );
            let instance = &self.instances[id.0];
            if let Some(requested) = transform.plugin_version {
                check_version(&transform.plugin_id, requested, instance.plugin.version())?;
            }
            if transform.step_size == 0 {
                transform.step_size = instance.step_size;
            }
            if transform.block_size == 0 {
                transform.block_size = instance.block_size;
            }
            (id, None)
        } else {
            let instance = self.create_instance(&mut transform, rate)?;
            (InstanceId(self.instances.len()), Some(instance))
        };

        let outputs = match &created {
            Some(instance) => &instance.outputs,
            None => &self.instances[id.0].outputs,
        };
        resolve_output(&mut transform, outputs)?;

        // Nothing below can fail: commit
        if let Some(instance) = created {
            self.instances.push(instance);
        }
        self.sample_rate = rate;

        let instance = &mut self.instances[id.0];
        let wants_summary = !transform.summary.is_none() || !self.summaries.is_empty();
        if wants_summary && !instance.plugin.is_summarising() {
            log::info!(
                "Enabling summaries on the plugin instance for '{}'",
                transform.plugin_id
            );
            instance.plugin.enable(&self.boundaries);
        }

        for key in [transform.clone(), as_registered] {
            if !self.cache.iter().any(|e| e.key == key) {
                self.cache.push(CacheEntry {
                    key,
                    resolved: transform.clone(),
                    instance: id,
                });
            }
        }

        match instance.work.iter_mut().find(|w| w.transform == transform) {
            Some(work) => {
                for writer in writers {
                    if !work.writers.iter().any(|w| Rc::ptr_eq(w, &writer)) {
                        work.writers.push(writer);
                    }
                }
            }
            None => instance.work.push(TransformWork { transform, writers }),
        }

        Ok(id)
    }

    /// Register the default transform of `plugin_id` at the run (or default) rate
    pub fn add_default_feature_extractor(
        &mut self,
        plugin_id: &str,
        writers: Vec<SharedWriter>,
    ) -> Result<InstanceId, RegistrationError> {
        let transform = self.default_transform_for(plugin_id)?;
        self.add_feature_extractor(transform, writers)
    }

    /// Default transform of `plugin_id` at the run rate, or the default rate
    /// while no run rate is established
    pub fn default_transform_for(&self, plugin_id: &str) -> Result<Transform, RegistrationError> {
        let rate = match (self.sample_rate, self.default_sample_rate) {
            (0, 0) => {
                return Err(RegistrationError::NoSampleRate {
                    plugin_id: plugin_id.to_string(),
                })
            }
            (0, default) => {
                log::info!(
                    "Using default sample rate of {} Hz for default transform '{}'",
                    default,
                    plugin_id
                );
                default
            }
            (rate, _) => rate,
        };
        self.default_transform(plugin_id, rate)
    }

    /// The transform a plugin runs with when nothing is customised: its
    /// preferred geometry, default parameters and first output
    pub fn default_transform(&self, plugin_id: &str, sample_rate: u32) -> Result<Transform, RegistrationError> {
        let plugin = self
            .loader
            .load(plugin_id, sample_rate)
            .map_err(|source| RegistrationError::PluginLoad {
                plugin_id: plugin_id.to_string(),
                source,
            })?;

        let parameters = plugin
            .parameter_descriptors()
            .into_iter()
            .map(|p| (p.identifier, p.default))
            .collect();
        let output = plugin
            .outputs()
            .first()
            .map(|o| o.identifier.clone())
            .ok_or_else(|| RegistrationError::NoOutputs {
                plugin_id: plugin_id.to_string(),
            })?;
        let wrapped = adapters::wrap(plugin, Default::default(), 0, 0);

        let mut transform = Transform::new(plugin_id)
            .with_output(output)
            .with_sample_rate(sample_rate)
            .with_sizes(wrapped.step_size, wrapped.block_size);
        transform.parameters = parameters;
        Ok(transform)
    }

    /// Fill in or override the transform's rate; returns the rate of the run
    fn normalize_rate(&self, transform: &mut Transform) -> Result<u32, RegistrationError> {
        if transform.sample_rate == 0 {
            if self.sample_rate != 0 {
                log::info!(
                    "Transform '{}' does not specify a sample rate, using the run rate of {} Hz",
                    transform.plugin_id,
                    self.sample_rate
                );
                transform.sample_rate = self.sample_rate;
            } else if self.default_sample_rate != 0 {
                log::info!(
                    "Transform '{}' does not specify a sample rate, using default rate of {} Hz",
                    transform.plugin_id,
                    self.default_sample_rate
                );
                transform.sample_rate = self.default_sample_rate;
            } else {
                return Err(RegistrationError::NoSampleRate {
                    plugin_id: transform.plugin_id.clone(),
                });
            }
        }

        if self.sample_rate != 0 && transform.sample_rate != self.sample_rate {
            log::warn!(
                "Transform '{}' sample rate {} Hz does not match the run rate of {} Hz; only one rate is supported per run, using {} Hz",
                transform.plugin_id,
                transform.sample_rate,
                self.sample_rate,
                self.sample_rate
            );
            transform.sample_rate = self.sample_rate;
        }
        Ok(transform.sample_rate)
    }

    /// Load, configure, wrap and initialise a fresh plugin instance
    fn create_instance(
        &self,
        transform: &mut Transform,
        rate: u32,
    ) -> Result<PluginInstance, RegistrationError> {
        let plugin_id = transform.plugin_id.clone();
        let mut plugin = self
            .loader
            .load(&plugin_id, rate)
            .map_err(|source| RegistrationError::PluginLoad {
                plugin_id: plugin_id.clone(),
                source,
            })?;

        if let Some(requested) = transform.plugin_version {
            check_version(&plugin_id, requested, plugin.version())?;
        }

        if let Some(program) = &transform.program {
            if let Err(e) = plugin.select_program(program) {
                log::warn!("{}", e);
            }
        }
        configure_parameters(plugin.as_mut(), transform);

        let wrapped = adapters::wrap(plugin, transform.window, transform.step_size, transform.block_size);
        let mut plugin = wrapped.plugin;
        plugin
            .initialise(self.channels, self.block_size, self.block_size)
            .map_err(|source| RegistrationError::InitialiseFailed {
                plugin_id: plugin_id.clone(),
                channels: self.channels,
                block_size: self.block_size,
                source,
            })?;

        transform.step_size = wrapped.step_size;
        transform.block_size = wrapped.block_size;

        let outputs = plugin.outputs();
        if outputs.is_empty() {
            return Err(RegistrationError::NoOutputs { plugin_id });
        }

        log::info!(
            "Loaded and initialised plugin '{}' v{} (step {}, block {}, {} output(s))",
            plugin_id,
            plugin.version(),
            wrapped.step_size,
            wrapped.block_size,
            outputs.len()
        );

        Ok(PluginInstance {
            plugin,
            outputs,
            step_size: wrapped.step_size,
            block_size: wrapped.block_size,
            work: Vec::new(),
        })
    }
}

fn check_version(plugin_id: &str, requested: u32, found: u32) -> Result<(), RegistrationError> {
    if requested != found {
        return Err(RegistrationError::VersionMismatch {
            plugin_id: plugin_id.to_string(),
            requested,
            found,
        });
    }
    Ok(())
}

/// Apply the transform's parameters, constrained to each parameter's range
fn configure_parameters(plugin: &mut dyn AnalysisPlugin, transform: &Transform) {
    let descriptors = plugin.parameter_descriptors();
    for (name, value) in &transform.parameters {
        let Some(descriptor) = descriptors.iter().find(|d| &d.identifier == name) else {
            log::warn!(
                "Plugin '{}' has no parameter '{}', ignoring it",
                transform.plugin_id,
                name
            );
            continue;
        };
        let constrained = descriptor.constrain(*value);
        if constrained != *value {
            log::warn!(
                "Parameter '{}' of '{}' constrained from {} to {}",
                name,
                transform.plugin_id,
                value,
                constrained
            );
        }
        if let Err(e) = plugin.set_parameter(name, constrained) {
            log::warn!("{}", e);
        }
    }
}

/// Resolve an empty output to the first one; reject unknown outputs
fn resolve_output(
    transform: &mut Transform,
    outputs: &[crate::plugin::OutputDescriptor],
) -> Result<(), RegistrationError> {
    if transform.output.is_empty() {
        let first = outputs.first().ok_or_else(|| RegistrationError::NoOutputs {
            plugin_id: transform.plugin_id.clone(),
        })?;
        transform.output = first.identifier.clone();
        return Ok(());
    }
    if outputs.iter().any(|o| o.identifier == transform.output) {
        return Ok(());
    }
    Err(RegistrationError::UnknownOutput {
        plugin_id: transform.plugin_id.clone(),
        output: transform.output.clone(),
        available: outputs
            .iter()
            .map(|o| o.identifier.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
