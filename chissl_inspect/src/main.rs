//! chissl inspect - Watch traffic flowing through chissl tunnels
//!
//! Usage:
//!   chissl-inspect recent <KIND> <ID>     Print recent captured traffic
//!   chissl-inspect live <KIND> <ID>       Follow live traffic
//!   chissl-inspect inspect <KIND> <ID>    Interactive inspector
//!   chissl-inspect watch                  Dashboard stats
//!   chissl-inspect connections <ID>       Captured connections of a tunnel

mod commands;

use anyhow::Result;
use chissl_common::{EntityRef, FilterKind};
use chissl_inspect::config::Config;
use chissl_inspect::inspector::RenderMode;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chissl-inspect")]
#[command(version)]
#[command(about = "Inspect traffic captured by a chissl server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Capture service URL (overrides the config file)
    #[arg(long, global = true, env = "CHISSL_SERVER")]
    server: Option<String>,

    /// Basic authentication (format: user:password)
    #[arg(long, global = true, env = "CHISSL_AUTH", hide_env_values = true)]
    auth: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the most recent captured traffic
    Recent {
        /// Entity kind (tunnel, listener or multicast)
        kind: String,

        /// Entity ID
        id: String,

        /// Only show requests or responses
        #[arg(short = 't', long = "type", default_value = "all")]
        filter: FilterKind,

        /// Print bodies verbatim instead of pretty-printing JSON
        #[arg(long)]
        raw: bool,
    },

    /// Follow live traffic until Ctrl+C
    Live {
        /// Entity kind (tunnel, listener or multicast)
        kind: String,

        /// Entity ID
        id: String,
    },

    /// Open the interactive inspector
    Inspect {
        /// Entity kind (tunnel, listener or multicast)
        kind: String,

        /// Entity ID
        id: String,

        /// Start with raw history rendering
        #[arg(long)]
        raw: bool,
    },

    /// Show dashboard stats, refreshed periodically
    Watch {
        /// Refresh interval in seconds (default from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List captured connections for a tunnel
    Connections {
        /// Tunnel ID
        tunnel_id: String,
    },
}

fn render_mode(raw: bool) -> RenderMode {
    if raw {
        RenderMode::Raw
    } else {
        RenderMode::Pretty
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},chissl_inspect=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = Config::load()?.with_overrides(cli.server, cli.auth);
    tracing::debug!("Using capture service at {}", config.server_url);
    let api = commands::connect(&config)?;

    match cli.command {
        Commands::Recent {
            kind,
            id,
            filter,
            raw,
        } => {
            let entity = EntityRef::new(commands::parse_kind(&kind)?, id);
            commands::recent::run(api, entity, filter, render_mode(raw)).await?;
        }

        Commands::Live { kind, id } => {
            let entity = EntityRef::new(commands::parse_kind(&kind)?, id);
            commands::live::run(api, entity, config.live_buffer_capacity).await?;
        }

        Commands::Inspect { kind, id, raw } => {
            let entity = EntityRef::new(commands::parse_kind(&kind)?, id);
            commands::inspect::run(api, entity, config.live_buffer_capacity, render_mode(raw))
                .await?;
        }

        Commands::Watch { interval } => {
            let interval = interval
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.stats_interval());
            commands::watch::run(api, interval).await?;
        }

        Commands::Connections { tunnel_id } => {
            commands::connections::run(api, &tunnel_id).await?;
        }
    }

    Ok(())
}
