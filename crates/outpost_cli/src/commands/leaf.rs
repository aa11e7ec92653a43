//! Leaf command implementation.

use outpost_core::{MemoryRepository, Repository, RoleCache};
use outpost_leaf::{LeafClient, LeafConfig, WebSocketConnector};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Runs a leaf until a fatal error stops it.
pub async fn run(
    origin: String,
    secret: String,
    location: String,
    tls_skip_verify: bool,
    retry_delay: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = LeafConfig::new(origin, secret)
        .with_location(location)
        .with_tls_skip_verify(tls_skip_verify)
        .with_retry_delay(Duration::from_secs(retry_delay));

    let connector = Arc::new(WebSocketConnector::new(&config)?);
    info!(url = %connector.url(), "connecting to origin");

    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let roles = Arc::new(RoleCache::load(repo.as_ref())?);
    let client = LeafClient::new(config, connector, repo, roles);

    let mut state = client.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            info!(state = ?current, "connection state changed");
        }
    });

    let gate = client.gate();
    tokio::spawn(async move {
        gate.wait().await;
        info!("initial full sync complete");
    });

    client.run().await?;
    Ok(())
}
