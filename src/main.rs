use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use signal_hook::flag as signal_flag;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

use subsyncd::config::Config;
use subsyncd::daemon::{self, ShutdownToken};

/// Reserved exit code for an unreadable or invalid configuration.
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Run a single reconciliation pass and exit instead of daemonizing
    #[arg(long)]
    one_shot: bool,

    /// Log at debug level regardless of the configured log level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    if let Err(err) = color_eyre::install() {
        eprintln!("Failed to install error handler: {err}");
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();

    // Config problems are fatal before anything else runs
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(EXIT_CONFIG);
        },
    };

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::from(config.log_level)
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting subsyncd...");

    if cli.one_shot {
        return match daemon::run_cycle(&config) {
            Ok(result) => {
                info!(
                    "one-shot reconciliation finished ({})",
                    if result.changed { "files updated" } else { "no changes" }
                );
                ExitCode::SUCCESS
            },
            Err(err) => {
                error!("one-shot reconciliation failed: {err}");
                ExitCode::FAILURE
            },
        };
    }

    let token = ShutdownToken::new();

    for signal in signal_hook::consts::TERM_SIGNALS {
        if let Err(err) = signal_flag::register(*signal, token.flag()) {
            error!("Failed to register signal handler for signal {signal}: {err}");
            return ExitCode::FAILURE;
        }
    }

    daemon::run(&config, &token);

    info!("Clean shutdown");

    ExitCode::SUCCESS
}
