//! suiteforge CLI - resolve suites, print build plans and fetch libraries

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use suiteforge_pkg::{ComposeError, ConflictPolicy, MaterializeError, Platform, ResolveError};
use tracing_subscriber::EnvFilter;

mod materialize;
mod plan;
mod resolve;
mod session;
mod verify;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "SUITEFORGE_LOG";

#[derive(Parser)]
#[command(name = "suiteforge")]
#[command(version)]
#[command(about = "Resolve multi-repository suites into build plans", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Directory holding the root suite.toml
    #[arg(long, global = true, default_value = ".")]
    pub suite: PathBuf,

    /// Override every suite's conflict policy (strict, ignore or latest)
    #[arg(long, global = true)]
    pub conflict_resolution: Option<ConflictPolicy>,

    /// Configuration file (defaults to $SUITEFORGE_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Target platform flags.
#[derive(Args, Debug, Clone, Default)]
pub struct PlatformArgs {
    /// Target operating system (defaults to the host)
    #[arg(long)]
    pub os: Option<String>,

    /// Target architecture (defaults to the host)
    #[arg(long)]
    pub arch: Option<String>,
}

impl PlatformArgs {
    pub fn platform(&self) -> Platform {
        let host = Platform::host();
        Platform::new(
            self.os.clone().unwrap_or(host.os),
            self.arch.clone().unwrap_or(host.arch),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve imports and print the merged suite set
    Resolve {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the build plan for distributions
    Plan {
        /// Distributions to plan, as NAME or suite:NAME (defaults to all
        /// distributions of the root suite)
        #[arg(long = "dist")]
        distributions: Vec<String>,

        #[command(flatten)]
        platform: PlatformArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Download and verify required libraries first
        #[arg(long)]
        fetch: bool,

        /// Print the handler action for every step
        #[arg(long)]
        dry_run: bool,
    },

    /// Download and verify the libraries required by distributions
    Materialize {
        /// Distributions to materialize (defaults to all distributions of
        /// the root suite)
        distributions: Vec<String>,

        #[command(flatten)]
        platform: PlatformArgs,
    },

    /// Check library checksums
    Verify {
        /// Libraries to check (defaults to every registered library)
        libraries: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.global);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let global = cli.global;

    match cli.command {
        Commands::Resolve { json } => {
            let session = session::Session::open(&global)?;
            resolve::print_resolution(&session.resolution, json)?;
        }

        Commands::Plan {
            distributions,
            platform,
            json,
            fetch,
            dry_run,
        } => {
            let options = plan::PlanOptions {
                distributions,
                platform: platform.platform(),
                json,
                fetch,
                dry_run,
            };
            plan::run(&global, &options)?;
        }

        Commands::Materialize {
            distributions,
            platform,
        } => {
            let options = materialize::MaterializeOptions {
                distributions,
                platform: platform.platform(),
            };
            materialize::run(&global, &options)?;
        }

        Commands::Verify { libraries } => {
            verify::run(&global, &libraries)?;
        }
    }

    Ok(())
}

fn init_logging(global: &GlobalOptions) {
    let default = if global.quiet {
        "error"
    } else {
        match global.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Map the root cause of an error to the documented exit codes.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<ResolveError>() {
                Some(e.kind().exit_code())
            } else if let Some(e) = cause.downcast_ref::<ComposeError>() {
                Some(e.kind().exit_code())
            } else {
                cause
                    .downcast_ref::<MaterializeError>()
                    .map(|e| e.kind().exit_code())
            }
        })
        .unwrap_or(1)
}
