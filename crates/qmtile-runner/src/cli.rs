//! Command-line arguments and logging setup.

use crate::TilerConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Generate quantized-mesh terrain tiles from elevation rasters.
///
/// Flags override values from the configuration file.
#[derive(Parser, Debug, Default)]
#[command(name = "qmtile", version, about)]
pub struct CliArgs {
    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Folder of elevation rasters (repeatable).
    #[arg(short, long = "input")]
    pub input: Vec<PathBuf>,

    /// Output root for tiles and layer.json.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// First depth to generate.
    #[arg(long)]
    pub min_depth: Option<u32>,

    /// Last depth to generate.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Keep complete depths already on disk.
    #[arg(long)]
    pub resume: bool,

    /// Write oct-encoded vertex normals.
    #[arg(long)]
    pub normals: bool,

    /// Refinement intensity (1-16).
    #[arg(long)]
    pub intensity: Option<f64>,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl TilerConfig {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if !args.input.is_empty() {
            self.input_dirs = args.input.clone();
        }
        if let Some(ref output) = args.output {
            self.output_root = output.clone();
        }
        if let Some(min) = args.min_depth {
            self.min_depth = min;
        }
        if let Some(max) = args.max_depth {
            self.max_depth = max;
        }
        if args.resume {
            self.resume = true;
        }
        if args.normals {
            self.oct_normals = true;
        }
        if let Some(intensity) = args.intensity {
            self.intensity = intensity;
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows `verbose`.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let console = fmt::layer().with_target(true).with_level(true);
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let args = CliArgs::parse_from([
            "qmtile",
            "--input",
            "/dem/a",
            "-i",
            "/dem/b",
            "--output",
            "/out",
            "--max-depth",
            "7",
            "--resume",
            "--intensity",
            "3",
            "-vv",
        ]);
        assert_eq!(args.verbose, 2);

        let mut config = TilerConfig::default();
        config.apply_cli_overrides(&args);
        assert_eq!(config.input_dirs, vec![PathBuf::from("/dem/a"), PathBuf::from("/dem/b")]);
        assert_eq!(config.output_root, PathBuf::from("/out"));
        assert_eq!(config.max_depth, 7);
        assert_eq!(config.min_depth, 0);
        assert!(config.resume);
        assert!(!config.oct_normals);
        assert_eq!(config.intensity, 3.0);
    }

    #[test]
    fn test_no_overrides_keep_file_values() {
        let mut config = TilerConfig {
            max_depth: 14,
            oct_normals: true,
            ..Default::default()
        };
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config.max_depth, 14);
        assert!(config.oct_normals);
    }
}
