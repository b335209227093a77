#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;
mod middleware;
mod server;

use clap::Parser;
use devssr_core::Config;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::Instrument;

#[derive(Parser, Debug)]
#[command(name = "devssr")]
#[command(author, version, about = "Development server for server-rendered web apps", long_about = None)]
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

    /// Compile client and server in watch mode and serve the app
    Dev {
        /// Port to listen on [default: config, then 3000]
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Host to bind to [default: config, then localhost]
        #[arg(long)]
        host: Option<String>,

        /// Path to a config file (overrides auto-discovery)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Compile every target once and write outputs to disk
    Build {
        /// Path to a config file (overrides auto-discovery)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Show the loader chain and asset policy applied to a request
    Inspect {
        /// Module request, e.g. `~/images/logo.png`
        request: String,

        /// Importing module, for issuer-conditioned rules
        #[arg(long)]
        issuer: Option<PathBuf>,

        /// Target whose rules apply [default: client]
        #[arg(long, short = 't')]
        target: Option<String>,

        /// Path to a config file (overrides auto-discovery)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json)
        .with_interactive(matches!(cli.command, Some(Commands::Dev { .. })));

    // inspect prints its own output and stays quiet otherwise
    if !matches!(cli.command, Some(Commands::Inspect { .. })) {
        logging::init(config.verbosity, config.json_logs);
    }

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Dev {
            port,
            host,
            config: config_path,
        }) => {
            let span = tracing::info_span!("dev", cmd = "dev", cwd = %cwd.display());
            let action = commands::dev::DevAction {
                cwd,
                config: config_path,
                port,
                host,
            };
            let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
            runtime.block_on(commands::dev::run(action, &config).instrument(span))
        }
        Some(Commands::Build {
            config: config_path,
        }) => {
            let span = tracing::info_span!("build", cmd = "build", cwd = %cwd.display());
            let _guard = span.enter();
            commands::build::run(
                commands::build::BuildAction {
                    cwd,
                    config: config_path,
                },
                &config,
            )
        }
        Some(Commands::Inspect {
            request,
            issuer,
            target,
            config: config_path,
        }) => commands::inspect::run(
            commands::inspect::InspectAction {
                cwd,
                request,
                issuer,
                target,
                config: config_path,
            },
            cli.json,
        ),
    }
}
