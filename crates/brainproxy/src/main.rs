mod commands;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use brainproxy::config::DEFAULT_CONFIG_FILE;

// ============================================================================
// CLI Types
// ============================================================================

/// Brainproxy - a stateful proxy in front of the Gemini API
#[derive(Parser, Debug)]
#[command(version = brainproxy::build_info::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the HTTP server
    Serve {
        #[command(subcommand)]
        action: Option<ServeAction>,

        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
        config: String,

        /// Host to bind to (overrides config file)
        #[arg(long, global = true)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides config file)
        #[arg(short, long, global = true)]
        port: Option<u16>,

        /// Default model (overrides config file)
        #[arg(short, long)]
        model: Option<String>,

        /// Attach an existing context cache by reference
        #[arg(long, conflicts_with = "cache_path")]
        cache_id: Option<String>,

        /// Build a context cache from this directory at startup
        #[arg(long)]
        cache_path: Option<PathBuf>,

        /// Verbose logging and a dump of the last answer
        #[arg(long)]
        debug: bool,
    },

    /// List upstream models and exit
    Models {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,

        /// Include blocked and non-generative models
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ServeAction {
    /// Stop a running server
    Stop,
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let debug = matches!(cli.command, Commands::Serve { debug: true, .. });
    init_tracing(debug);

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            action,
            config,
            host,
            port,
            model,
            cache_id,
            cache_path,
            debug,
        } => match action {
            Some(ServeAction::Stop) => commands::serve::stop(&config, port).await,
            None => {
                let overrides = commands::serve::Overrides {
                    host,
                    port,
                    model,
                    cache_id,
                    cache_path,
                    debug,
                };
                commands::serve::run(&config, overrides).await
            }
        },
        Commands::Models { config, all } => commands::models::run(&config, all).await,
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
