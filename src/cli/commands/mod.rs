mod subcommands;


use crate::config::{Config, load_config};
use crate::gateway::GatewayState;
use crate::provider::GraphMediaFetcher;
use crate::relay::MediaRelay;
use crate::storage::build_object_store;
use crate::store::SqliteMessageStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sewdle-relay")]
#[command(about = "WhatsApp webhook media relay")]
#[command(version)]
pub struct Cli {
    /// Path to config.json (default: ~/.sewdle-relay/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Run the webhook server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },
    /// Retry media uploads that failed during relay
    Retry {
        #[arg(long, short = 'l', default_value = "100")]
        limit: usize,
    },
    /// List media messages still waiting for upload
    Pending {
        #[arg(long, short = 'l', default_value = "20")]
        limit: usize,
    },
    /// Show relay status
    Status,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { force } => {
            init(config_path, force)?;
        }
        Commands::Serve { host, port } => {
            serve(config_path, host, port).await?;
        }
        Commands::Retry { limit } => {
            subcommands::retry_command(config_path, limit).await?;
        }
        Commands::Pending { limit } => {
            subcommands::pending_command(config_path, limit).await?;
        }
        Commands::Status => {
            subcommands::status_command(config_path).await?;
        }
    }

    Ok(())
}

fn init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => crate::config::get_config_path()?,
    };
    if !write_default_config(&path, force)? {
        println!(
            "\u{26a0}\u{fe0f}  Config already exists at {} (use --force to overwrite)",
            path.display()
        );
        return Ok(());
    }
    println!("\u{2713} Created config at {}", path.display());
    println!("\nNext steps:");
    println!("  1. Set provider.accessToken and provider.appSecret in {}", path.display());
    println!("     (or SEWDLE_RELAY_ACCESS_TOKEN / SEWDLE_RELAY_APP_SECRET)");
    println!("  2. Map phone number ids to organizations under provider.organizations");
    println!("  3. Start the server: sewdle-relay serve");
    Ok(())
}

/// Returns false when a config exists and `force` is not set.
fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    crate::config::save_config(&Config::default(), Some(path))?;
    Ok(true)
}

/// Wire the production fetcher, object store and message store.
pub(crate) fn build_relay(config: &Config) -> Result<MediaRelay> {
    let db_path = config.database_path()?;
    let store = SqliteMessageStore::open(&db_path)
        .with_context(|| format!("Failed to open message store at {}", db_path.display()))?;
    let objects = build_object_store(config)?;
    let fetcher = GraphMediaFetcher::new(&config.provider);
    Ok(MediaRelay::new(Arc::new(fetcher), objects, Arc::new(store)))
}

async fn serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }
    config.validate()?;

    let relay = build_relay(&config)?;
    let host = config.server.host.clone();
    let port = config.server.port;
    info!(
        "relaying to bucket {} ({:?} backend)",
        config.storage.bucket, config.storage.backend
    );

    let state = GatewayState::new(Arc::new(config), relay);
    let mut handle = crate::gateway::start(&host, port, state).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            handle.abort();
        }
        res = &mut handle => {
            if let Err(e) = res {
                warn!("webhook server task ended: {}", e);
            }
        }
    }

    Ok(())
}
