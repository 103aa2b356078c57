#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use flight_core::{Config, ResolverOptions};
use miette::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "flight")]
#[command(author, version, about = "npm-compatible dependency resolver", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve dependencies and write flight.lock
    #[command(visible_alias = "install")]
    Resolve {
        /// Root packages (e.g., "react@^18", "@types/node"). Reads package.json when omitted.
        specs: Vec<String>,

        /// Include devDependencies from package.json
        #[arg(long)]
        dev: bool,

        /// Registry URL (default: https://registry.npmjs.org/)
        #[arg(long, value_name = "URL", env = flight_core::pkg::REGISTRY_ENV)]
        registry: Option<String>,

        /// Time budget for the whole resolution, in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 10_000)]
        timeout_ms: u64,

        /// Maximum concurrent registry fetches
        #[arg(long, value_name = "N", default_value_t = flight_core::pkg::MAX_CONCURRENT_FETCHES)]
        concurrency: usize,

        /// Do not reject on missing peer dependencies
        #[arg(long)]
        no_peer_check: bool,

        /// Never match pre-release versions against ranges
        #[arg(long)]
        exclude_prerelease: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Resolve {
            specs,
            dev,
            registry,
            timeout_ms,
            concurrency,
            no_peer_check,
            exclude_prerelease,
        }) => {
            config = config.with_registry_url(registry).with_resolver(
                ResolverOptions::default()
                    .with_timeout(Duration::from_millis(timeout_ms))
                    .with_concurrency(concurrency)
                    .with_peer_validation(!no_peer_check)
                    .with_prerelease(!exclude_prerelease),
            );
            commands::resolve::run(&config, &specs, dev, cli.json)
        }
    }
}
