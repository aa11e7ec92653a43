//! Connection state and counters.

use parking_lot::RwLock;
use std::sync::Arc;

/// The lifecycle state of the leaf's link to the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection; waiting to dial.
    #[default]
    Disconnected,
    /// Opening the WebSocket.
    Dialing,
    /// Exchanging REGISTER.
    Registering,
    /// Connected and waiting for the full-sync marker.
    Syncing,
    /// Connected and in sync.
    Active,
}

impl ConnectionState {
    /// Returns true while a connection is open.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Registering | ConnectionState::Syncing | ConnectionState::Active
        )
    }
}

/// Statistics about the leaf's sync link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafStats {
    /// Connections successfully dialed.
    pub connections: u64,
    /// Full syncs completed (bootstrap marker received).
    pub full_syncs: u64,
    /// Envelopes written to the origin.
    pub envelopes_sent: u64,
    /// Envelopes received from the origin.
    pub envelopes_received: u64,
    /// Envelopes moved to the retry queue.
    pub retries: u64,
    /// Envelopes dropped after failing twice.
    pub dropped: u64,
}

/// Stats shared between the client's tasks.
pub(crate) type SharedStats = Arc<RwLock<LeafStats>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_states() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Dialing.is_connected());
        assert!(ConnectionState::Syncing.is_connected());
        assert!(ConnectionState::Active.is_connected());
    }

    #[test]
    fn stats_default_to_zero() {
        let stats = LeafStats::default();
        assert_eq!(stats.envelopes_sent, 0);
        assert_eq!(stats.dropped, 0);
    }
}
