//! featx - batch audio feature extractor
//!
//! Loads a YAML run description, extends it with command-line values, and
//! runs every transform over every source. Exit status is 0 only when every
//! transform registered and every source was extracted, 1 otherwise, 2 on
//! usage errors.

mod args;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use featx_core::audio::playlist::expand_sources;
use featx_core::config::{self, RunConfig};
use featx_core::plugin::{AnalysisPlugin, PluginLoader, PluginRegistry};
use featx_core::writer::{create_writer, SharedWriter};
use featx_core::ExtractionManager;

use args::{Args, Command};

/// Rate skeletons are generated at when the run description names none
const SKELETON_SAMPLE_RATE: u32 = 44100;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help and version requests print to stdout and succeed
            let usage_error = e.use_stderr();
            let _ = e.print();
            return if usage_error {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match args.command() {
        Command::List => list_plugins().map(|()| true),
        Command::Skeleton { plugin, output } => {
            skeleton(&args, &plugin, output.as_deref()).map(|()| true)
        }
        Command::Run => run(&args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Named run description, else the default one if present
fn load_run_config(args: &Args) -> Result<RunConfig> {
    match args.config() {
        Some(path) => config::load_config(&path),
        None => Ok(config::load_config_or_default(&config::default_config_path())),
    }
}

fn list_plugins() -> Result<()> {
    let registry = PluginRegistry::with_builtin();
    for key in registry.plugin_keys() {
        let plugin = registry
            .load(&key, SKELETON_SAMPLE_RATE)
            .with_context(|| format!("Failed to load plugin '{}'", key))?;
        for output in plugin.outputs() {
            println!("{}:{}\t{}", key, output.identifier, output.name);
        }
    }
    Ok(())
}

fn skeleton(args: &Args, plugin: &str, output: Option<&Path>) -> Result<()> {
    let base = match args.config() {
        Some(path) => config::load_config(&path)?,
        None => RunConfig::default(),
    };
    let mut manager = ExtractionManager::new();
    manager.set_default_sample_rate(if base.sample_rate != 0 {
        base.sample_rate
    } else {
        SKELETON_SAMPLE_RATE
    });
    let transform = manager.default_transform_for(plugin)?;

    let skeleton = RunConfig {
        transforms: vec![transform],
        ..RunConfig::default()
    };
    match output {
        Some(path) => config::save_config(&skeleton, path),
        None => {
            print!("{}", serde_yaml::to_string(&skeleton)?);
            Ok(())
        }
    }
}

/// Returns whether every unit of work completed
fn run(args: &Args) -> Result<bool> {
    let mut config = load_run_config(args)?;
    args.apply_to(&mut config);

    if !config.has_work() {
        anyhow::bail!("No transforms given; name a run description or use --default");
    }
    if config.sources.is_empty() {
        anyhow::bail!("No audio sources given");
    }

    let mut manager = ExtractionManager::new();
    config.apply_settings(&mut manager)?;
    let mut complete = true;

    let sources = expand_sources(&config.sources, config.recursive)?;
    if config.multiplex {
        manager.add_multiplexed_source(&sources)?;
    } else {
        for source in &sources {
            if let Err(e) = manager.add_source(source) {
                log::error!("{}", e);
                complete = false;
                if !config.force {
                    return Ok(false);
                }
            }
        }
    }

    let writers = config
        .writers
        .iter()
        .map(|tag| create_writer(tag))
        .collect::<Result<Vec<SharedWriter>, _>>()?;

    let mut registered = 0;
    for transform in &config.transforms {
        match manager.add_feature_extractor(transform.clone(), writers.clone()) {
            Ok(_) => registered += 1,
            Err(e) => {
                log::error!("{}", e);
                complete = false;
            }
        }
    }
    for plugin in &config.default_transforms {
        match manager.add_default_feature_extractor(plugin, writers.clone()) {
            Ok(_) => registered += 1,
            Err(e) => {
                log::error!("{}", e);
                complete = false;
            }
        }
    }
    if registered == 0 {
        anyhow::bail!("No transforms could be registered");
    }
    log::info!(
        "{} transform(s) on {} plugin instance(s), {} source(s)",
        registered,
        manager.instance_count(),
        manager.source_ids().len()
    );

    let report = manager.run()?;
    for (source, reason) in &report.failed {
        log::warn!("Skipped '{}': {}", source, reason);
    }
    Ok(complete && report.is_success())
}
