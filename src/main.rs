//! # build-exe: The Main Entry Point
//!
//! Command Line Interface (CLI) parsing, logging initialization, and dispatch to the
//! build orchestration. Double-clicking the executable runs the full build, the same as
//! the batch launcher it replaces.

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use log::{error, LevelFilter};
use simplelog::{Config, SimpleLogger};

mod artifact;
mod config;
mod console;
mod discovery;
mod interpreter;
mod orchestrator;
mod system;

use config::{BuildConfig, Overrides};
use system::HostSystem;

/// The primary Command Line Interface (CLI) configuration.
#[derive(Parser)]
#[command(name = "build-exe")]
#[command(about = "Builds the customer delivery ZIP by running build_exe.py with a local Python", long_about = None)]
struct Cli {
    /// The sub-command to execute (defaults to `build`).
    #[command(subcommand)]
    command: Option<Commands>,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory containing the packaging script (default: current directory).
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Packaging script to run, relative to the project directory.
    #[arg(long, global = true)]
    script: Option<PathBuf>,

    /// Expected output archive, relative to the project directory.
    #[arg(long, global = true)]
    artifact: Option<PathBuf>,

    /// Use this interpreter instead of searching for one.
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// JSON config file (default: `build-exe.json` in the project directory, if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Exit without waiting for a key press.
    #[arg(long, global = true)]
    no_pause: bool,

    /// Exit with status 2 when no fresh archive was delivered.
    #[arg(long, global = true)]
    strict: bool,
}

/// Available sub-commands.
#[derive(Subcommand)]
enum Commands {
    /// Find Python, run the packaging script and check the delivery ZIP.
    Build,
    /// Report which interpreter and script a build would use, without building.
    Doctor,
}

impl From<&Cli> for Overrides {
    fn from(cli: &Cli) -> Self {
        Self {
            project_dir: cli.project_dir.clone(),
            config: cli.config.clone(),
            script: cli.script.clone(),
            artifact: cli.artifact.clone(),
            python: cli.python.clone(),
            no_pause: cli.no_pause,
            strict: cli.strict,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Determine log level based on verbosity flag
    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // We ignore the result here as logging failure shouldn't crash the startup
    let _ = SimpleLogger::init(log_level, Config::default());

    console::enable_utf8();

    let system = HostSystem;
    let config = match BuildConfig::resolve(&Overrides::from(&cli)) {
        Ok(config) => config,
        Err(e) => {
            let code = orchestrator::config_failed(&system, &e, !cli.no_pause, &mut std::io::stdout());
            std::process::exit(code);
        }
    };

    let mut stdout = std::io::stdout();
    match cli.command {
        Some(Commands::Build) | None => match orchestrator::run(&system, &config, &mut stdout) {
            Ok(outcome) => std::process::exit(outcome.exit_code(config.strict)),
            Err(e) => {
                error!("Build launcher failed: {:#}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Doctor) => {
            if let Err(e) = orchestrator::doctor(&system, &config, &mut stdout) {
                error!("Doctor check failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
