use clap::Parser;
use qmtile_runner::{init_logging, CliArgs, Result, RunReport, Tiler, TilerConfig};
use std::process::ExitCode;
use tracing::error;

fn run(args: &CliArgs) -> Result<RunReport> {
    let mut config = match &args.config {
        Some(path) => TilerConfig::from_file(path)?,
        None => TilerConfig::default(),
    };
    config.apply_cli_overrides(args);
    qmtile_metrics::describe_metrics();
    Tiler::new(config)?.run()
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(report) => {
            report.log_summary();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "tiling failed");
            ExitCode::FAILURE
        }
    }
}
