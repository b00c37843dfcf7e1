//! Command-line definitions

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use featx_core::config::RunConfig;
use featx_core::SummaryType;

/// Extract audio features in batch.
///
/// Runs the transforms described in CONFIG.yaml (default:
/// <config dir>/featx/featx.yaml) over every AUDIO file, directory or
/// playlist given.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "featx",
    version,
    disable_version_flag = true,
    arg(clap::Arg::new("version")
        .short('v')
        .long("version")
        .action(clap::ArgAction::Version)
        .help("Print version"))
)]
pub struct Args {
    /// Run description (when the first value ends in .yaml or .yml), then audio sources.
    #[arg(value_name = "CONFIG.yaml|AUDIO")]
    inputs: Vec<String>,

    /// Also run PLUGIN with its default transform.
    #[arg(short = 'd', long = "default", value_name = "PLUGIN")]
    pub defaults: Vec<String>,

    /// Summarise every transform: min, max, mean, median, mode, sum, variance, sd or count.
    #[arg(short = 'S', long = "summary", value_name = "KIND", value_parser = parse_summary)]
    pub summaries: Vec<SummaryType>,

    /// Write summaries only, no raw features.
    #[arg(long, requires = "summaries")]
    pub summary_only: bool,

    /// Summarise separately between these times, in seconds.
    #[arg(
        long,
        value_name = "A,B,...",
        value_delimiter = ',',
        value_parser = parse_boundary,
        requires = "summaries"
    )]
    pub segments: Vec<f64>,

    /// Scan directories recursively.
    #[arg(short, long)]
    pub recursive: bool,

    /// Read all audio as one multi-channel source.
    #[arg(short, long)]
    pub multiplex: bool,

    /// Keep going when a source fails.
    #[arg(short, long)]
    pub force: bool,

    /// List available plugins and outputs.
    #[arg(short, long, conflicts_with = "skeleton")]
    pub list: bool,

    /// Write a run description for PLUGIN's default transform, to FILE or stdout.
    #[arg(short, long, num_args = 1..=2, value_names = ["PLUGIN", "FILE"])]
    skeleton: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run,
    List,
    Skeleton { plugin: String, output: Option<PathBuf> },
}

fn parse_summary(s: &str) -> Result<SummaryType, String> {
    match SummaryType::from_str(s)? {
        SummaryType::None => Err(format!("'{s}' is not a summary kind")),
        kind => Ok(kind),
    }
}

fn parse_boundary(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid segment boundary: {s}"))?;
    if secs >= 0.0 {
        Ok(secs)
    } else {
        Err("segment boundaries must be non-negative".to_string())
    }
}

fn is_config_file(arg: &str) -> bool {
    let lower = arg.to_ascii_lowercase();
    lower.ends_with(".yaml") || lower.ends_with(".yml")
}

impl Args {
    pub fn command(&self) -> Command {
        if self.list {
            return Command::List;
        }
        match self.skeleton.as_slice() {
            [] => Command::Run,
            [plugin, rest @ ..] => Command::Skeleton {
                plugin: plugin.clone(),
                output: rest.first().map(PathBuf::from),
            },
        }
    }

    /// Run description named on the command line
    pub fn config(&self) -> Option<PathBuf> {
        self.inputs
            .first()
            .filter(|first| is_config_file(first))
            .map(PathBuf::from)
    }

    /// Audio sources named on the command line
    pub fn audio(&self) -> &[String] {
        let skip = usize::from(self.config().is_some());
        &self.inputs[skip..]
    }

    /// Extend a loaded run description with command-line values
    pub fn apply_to(&self, config: &mut RunConfig) {
        config.sources.extend(self.audio().iter().cloned());
        config.default_transforms.extend(self.defaults.iter().cloned());
        for kind in &self.summaries {
            if !config.summaries.contains(kind) {
                config.summaries.push(*kind);
            }
        }
        config.segments.extend(self.segments.iter().copied());
        config.summary_only |= self.summary_only;
        config.recursive |= self.recursive;
        config.multiplex |= self.multiplex;
        config.force |= self.force;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("featx").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_run() {
        let args = parse(&[
            "run.yaml", "-f", "-S", "mean", "--summary", "max", "--segments", "10, 20", "-d",
            "featx:power", "a.wav", "b.flac",
        ])
        .unwrap();
        assert_eq!(args.command(), Command::Run);
        assert_eq!(args.config(), Some(PathBuf::from("run.yaml")));
        assert_eq!(args.audio(), ["a.wav".to_string(), "b.flac".to_string()]);
        assert_eq!(args.summaries, vec![SummaryType::Mean, SummaryType::Maximum]);
        assert_eq!(args.segments, vec![10.0, 20.0]);
        assert_eq!(args.defaults, vec!["featx:power".to_string()]);
        assert!(args.force);
    }

    #[test]
    fn test_audio_only() {
        let args = parse(&["a.wav", "later.yaml"]).unwrap();
        assert_eq!(args.config(), None);
        assert_eq!(args.audio().len(), 2);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(&["-l"]).unwrap().command(), Command::List);
        assert_eq!(
            parse(&["-s", "featx:power", "out.yaml"]).unwrap().command(),
            Command::Skeleton {
                plugin: "featx:power".to_string(),
                output: Some(PathBuf::from("out.yaml")),
            }
        );
        assert_eq!(
            parse(&["-s", "featx:power", "-f"]).unwrap().command(),
            Command::Skeleton {
                plugin: "featx:power".to_string(),
                output: None,
            }
        );
    }

    #[test]
    fn test_usage_errors() {
        for bad in [
            &["--bogus"][..],
            &["-S"],
            &["-S", "loudest"],
            &["-S", "none"],
            &["--segments", "10"],
            &["--summary-only"],
            &["-S", "mean", "--segments=-3"],
            &["-l", "-s", "featx:power"],
        ] {
            let err = parse(bad).unwrap_err();
            // Reported on stderr, which main maps to exit status 2
            assert!(err.use_stderr(), "{bad:?} should be a usage error");
        }
    }

    #[test]
    fn test_help_and_version_are_not_errors() {
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["-v"]).unwrap_err().kind(), ErrorKind::DisplayVersion);
        assert!(!parse(&["--version"]).unwrap_err().use_stderr());
    }

    #[test]
    fn test_apply_extends_config() {
        let mut config = RunConfig {
            sources: vec!["first.wav".to_string()],
            summaries: vec![SummaryType::Mean],
            ..Default::default()
        };
        let args = parse(&["-S", "mean", "-S", "sd", "-r", "second.wav"]).unwrap();
        args.apply_to(&mut config);
        assert_eq!(config.sources, vec!["first.wav".to_string(), "second.wav".to_string()]);
        assert_eq!(config.summaries, vec![SummaryType::Mean, SummaryType::StandardDeviation]);
        assert!(config.recursive);
        assert!(!config.force);
    }
}
