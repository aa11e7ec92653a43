//! Origin command implementation.

use outpost_core::{MemoryRepository, Repository, RoleCache};
use outpost_origin::{OriginConfig, OriginContext, OriginServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Runs an origin until the listener fails.
pub async fn run(
    bind: SocketAddr,
    leaf_secret: String,
    location: String,
    timezone: String,
    idle_timeout: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    if leaf_secret.is_empty() {
        info!("no leaf secret configured, only API tokens are accepted");
    }

    let idle_timeout = Duration::from_secs(idle_timeout.max(1));
    let config = OriginConfig::new(bind)
        .with_leaf_secret(leaf_secret)
        .with_location(location)
        .with_timezone(timezone)
        .with_idle_timeout(idle_timeout, idle_timeout / 3);

    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let roles = Arc::new(RoleCache::load(repo.as_ref())?);
    let ctx = OriginContext::new(config, repo, roles);

    OriginServer::new(Arc::new(ctx)).run().await?;
    Ok(())
}
