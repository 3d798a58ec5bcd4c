//! # floor-sync
//!
//! CLI tool for floor-sync.
//!
//! ## Commands
//!
//! - `session-id`: Print a fresh session id
//! - `link`: Print the public-viewer link of a session
//! - `demo`: Run a host, directors and a public viewer in-process
//!
//! ## Example
//!
//! ```bash
//! # Share this with the other staff devices
//! floor-sync session-id
//!
//! # Put this on the lobby screen
//! floor-sync link ab12cd34 --base https://floor.example
//!
//! # Watch replication end to end
//! RUST_LOG=debug floor-sync demo --directors 3
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{demo, session};

/// CLI tool for floor-sync.
#[derive(Parser, Debug)]
#[command(name = "floor-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a fresh random session id
    SessionId,

    /// Print the public-viewer link for a session
    Link {
        /// Session id
        session: String,

        /// Base URL of the web app
        #[arg(long, default_value = "")]
        base: String,
    },

    /// Run a host, directors and a public viewer in-process
    Demo {
        /// Host configuration file (TOML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Number of director devices
        #[arg(long, short, default_value = "2")]
        directors: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::SessionId => session::generate()?,
        Commands::Link { session, base } => session::link(&session, &base)?,
        Commands::Demo { config, directors } => demo::run(config.as_deref(), directors).await?,
    }

    Ok(())
}
