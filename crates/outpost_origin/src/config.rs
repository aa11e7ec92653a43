//! Origin configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the origin's leaf endpoint.
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Shared secret granting unrestricted leaf access. Empty disables it.
    pub leaf_secret: String,
    /// Location assigned to leaves that register without one.
    pub location: String,
    /// Timezone reported to leaves.
    pub timezone: String,
    /// Software version reported to leaves.
    pub version: String,
    /// Capacity of each session's mailbox.
    pub mailbox_capacity: usize,
    /// Bound on receiving a leaf's REGISTER.
    pub handshake_timeout: Duration,
    /// Sessions silent for longer than this are reaped.
    pub idle_timeout: Duration,
    /// How often the reaper runs.
    pub reap_interval: Duration,
}

impl OriginConfig {
    /// Creates a new origin configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            leaf_secret: String::new(),
            location: String::new(),
            timezone: "UTC".to_string(),
            version: outpost_core::VERSION.to_string(),
            mailbox_capacity: 100,
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            reap_interval: Duration::from_secs(10),
        }
    }

    /// Sets the shared leaf secret.
    pub fn with_leaf_secret(mut self, secret: impl Into<String>) -> Self {
        self.leaf_secret = secret.into();
        self
    }

    /// Sets the origin's own location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Sets the reported timezone.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Overrides the reported version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the per-session mailbox capacity.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Sets the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the idle timeout and reap interval.
    pub fn with_idle_timeout(mut self, timeout: Duration, reap_interval: Duration) -> Self {
        self.idle_timeout = timeout;
        self.reap_interval = reap_interval;
        self
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
