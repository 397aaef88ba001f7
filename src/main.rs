use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::{debug, LevelFilter};

use winprinters::app::RunConfig;
use winprinters::cli::Cli;
use winprinters::config;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    let settings = match config::loading::load_config() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    colog::default_builder()
        .filter_level(settings.log_level.parse().unwrap_or(LevelFilter::Warn))
        .init();
    debug!("Loaded {settings:?}");

    let result = RunConfig::from_cli(cli, &settings)
        .map_err(anyhow::Error::from)
        .and_then(|run_config| run(&run_config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(windows)]
fn run(run_config: &RunConfig) -> Result<()> {
    let spooler = winprinters::spooler::win32::WinSpooler::new();
    winprinters::app::run(&spooler, run_config, &mut std::io::stdout().lock())
}

#[cfg(not(windows))]
fn run(_run_config: &RunConfig) -> Result<()> {
    anyhow::bail!("the Windows print spooler is not available on this platform")
}
