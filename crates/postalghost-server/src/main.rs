//! PostalGhost server binary.
//!
//! # Usage
//!
//! ```bash
//! # Ephemeral store, self-signed certificate (development)
//! postalghost-server --bind 0.0.0.0:4850
//!
//! # Durable store (production)
//! postalghost-server --bind 0.0.0.0:4850 --store keys.redb
//! ```
//!
//! On first start the server writes its Ed25519 identity seed to the
//! `--identity` file and logs the public key; publish that key to clients
//! alongside the address.

use std::path::PathBuf;

use clap::Parser;
use postalghost_server::{MemoryStore, RedbStore, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// PostalGhost key server
#[derive(Parser, Debug)]
#[command(name = "postalghost-server")]
#[command(about = "PostalGhost dead-man's-switch key server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4850")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Path to the identity seed file (created on first start)
    #[arg(long, default_value = "postalghost.identity")]
    identity: PathBuf,

    /// Path to the key database; omit for a non-persistent in-memory store
    #[arg(long)]
    store: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("PostalGhost server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        identity_path: args.identity,
        max_connections: args.max_connections,
    };

    match args.store {
        Some(path) => {
            tracing::info!("Using durable store at {}", path.display());
            let server = Server::bind(&config, RedbStore::open(&path)?)?;
            server.run().await?;
        },
        None => {
            tracing::warn!("No --store path given - keys will not survive a restart");
            let server = Server::bind(&config, MemoryStore::new())?;
            server.run().await?;
        },
    }

    Ok(())
}
