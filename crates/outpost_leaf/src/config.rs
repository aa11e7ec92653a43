//! Configuration for the leaf client.

use std::time::Duration;

/// Configuration for a leaf's connection to its origin.
#[derive(Debug, Clone)]
pub struct LeafConfig {
    /// Origin base URL (`http://`, `https://`, `ws://` or `wss://`).
    pub origin_url: String,
    /// Bearer credential: the shared leaf secret or an API token id.
    pub secret: String,
    /// Location label this leaf serves.
    pub location: String,
    /// Software version advertised during registration.
    pub version: String,
    /// Accept invalid TLS certificates from the origin.
    pub tls_skip_verify: bool,
    /// Fixed delay before redialing after a failure.
    pub retry_delay: Duration,
    /// Bound on dialing and on the REGISTER exchange.
    pub handshake_timeout: Duration,
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Capacity of the primary outbound queue.
    pub queue_capacity: usize,
    /// Capacity of the retry queue.
    pub retry_capacity: usize,
}

impl LeafConfig {
    /// Creates a configuration for `origin_url` with default tunables.
    pub fn new(origin_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            origin_url: origin_url.into(),
            secret: secret.into(),
            location: String::new(),
            version: outpost_core::VERSION.to_string(),
            tls_skip_verify: false,
            retry_delay: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(2),
            queue_capacity: 100,
            retry_capacity: 2,
        }
    }

    /// Sets the location label.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Overrides the advertised version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Accepts invalid origin certificates.
    pub fn with_tls_skip_verify(mut self, skip: bool) -> Self {
        self.tls_skip_verify = skip;
        self
    }

    /// Sets the redial delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the primary and retry queue capacities.
    pub fn with_queue_capacity(mut self, primary: usize, retry: usize) -> Self {
        self.queue_capacity = primary.max(1);
        self.retry_capacity = retry.max(1);
        self
    }
}

impl Default for LeafConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LeafConfig::default();
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.keepalive_interval, Duration::from_secs(2));
        assert_eq!((config.queue_capacity, config.retry_capacity), (100, 2));
        assert_eq!(config.version, outpost_core::VERSION);
    }

    #[test]
    fn builder() {
        let config = LeafConfig::new("https://origin.example.com", "s3cret")
            .with_location("eu")
            .with_tls_skip_verify(true)
            .with_retry_delay(Duration::from_millis(10))
            .with_queue_capacity(0, 0);

        assert_eq!(config.origin_url, "https://origin.example.com");
        assert_eq!(config.location, "eu");
        assert!(config.tls_skip_verify);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!((config.queue_capacity, config.retry_capacity), (1, 1));
    }
}
