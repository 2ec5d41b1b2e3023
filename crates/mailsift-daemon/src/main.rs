//! Mailsift daemon - background service for session lifecycle, entitlement
//! checks, and contact synchronization.

mod app;
mod auth;
mod extract;
mod ipc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mailsift_core::{init_logging, Config, Paths};

/// Mailsift daemon command-line interface.
#[derive(Parser)]
#[command(name = "mailsiftd")]
#[command(about = "Mailsift daemon for session lifecycle and contact sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for runtime files (socket, logs, store). Defaults to ~/.mailsift
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },
    /// Stop the daemon
    Stop,
    /// Check daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    match cli.command {
        Some(Commands::Start { foreground }) => {
            if foreground {
                app::run_daemon(config, paths).await?;
            } else {
                app::spawn_background(&paths, &cli.log_level)?;
            }
        }
        None => {
            // Default to start in foreground if no command given
            app::run_daemon(config, paths).await?;
        }
        Some(Commands::Stop) => {
            app::stop_daemon(&paths).await?;
        }
        Some(Commands::Status) => {
            app::check_status(&paths).await?;
        }
    }

    Ok(())
}
