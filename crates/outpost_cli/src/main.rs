//! Outpost CLI
//!
//! Runs a node of the Outpost synchronization engine.
//!
//! # Commands
//!
//! - `origin` - Serve leaves from the authoritative store
//! - `leaf` - Connect to an origin and keep a local copy in sync
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Outpost origin/leaf synchronization node.
#[derive(Parser)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Location label of this node
    #[arg(global = true, short, long, env = "OUTPOST_LOCATION", default_value = "")]
    location: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve leaves as the origin
    Origin {
        /// Address to listen on
        #[arg(short, long, env = "OUTPOST_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Shared secret for unrestricted leaves
        #[arg(long, env = "OUTPOST_LEAF_SECRET", hide_env_values = true)]
        leaf_secret: String,

        /// Timezone reported to leaves
        #[arg(long, env = "OUTPOST_TIMEZONE", default_value = "UTC")]
        timezone: String,

        /// Seconds of silence after which a leaf session is dropped
        #[arg(long, env = "OUTPOST_IDLE_TIMEOUT", default_value = "30")]
        idle_timeout: u64,
    },

    /// Run as a leaf of an origin
    Leaf {
        /// Origin URL (http, https, ws or wss)
        #[arg(short, long, env = "OUTPOST_ORIGIN")]
        origin: String,

        /// Shared secret or API token
        #[arg(long, env = "OUTPOST_LEAF_SECRET", hide_env_values = true)]
        secret: String,

        /// Skip TLS certificate verification
        #[arg(long, env = "OUTPOST_TLS_SKIP_VERIFY")]
        tls_skip_verify: bool,

        /// Seconds to wait before redialing
        #[arg(long, env = "OUTPOST_RETRY_DELAY", default_value = "5")]
        retry_delay: u64,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Origin {
            bind,
            leaf_secret,
            timezone,
            idle_timeout,
        } => {
            commands::origin::run(bind, leaf_secret, cli.location, timezone, idle_timeout).await?;
        }
        Commands::Leaf {
            origin,
            secret,
            tls_skip_verify,
            retry_delay,
        } => {
            commands::leaf::run(origin, secret, cli.location, tls_skip_verify, retry_delay).await?;
        }
        Commands::Version => {
            println!("Outpost CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Outpost protocol v{}", outpost_core::VERSION);
        }
    }

    Ok(())
}
