//! # Outpost Leaf
//!
//! Leaf-side synchronization client for Outpost.
//!
//! This crate provides:
//! - Connection lifecycle (disconnected → dialing → registering → syncing → active)
//! - Outbound queue with a single retry per envelope
//! - Full sync on first connect and on session change
//! - Ordered application of origin changes to the local repository
//! - WebSocket connector with bearer authentication
//!
//! ## Architecture
//!
//! Application code writes locally and calls the [`LeafLink`] replicator,
//! which queues the change. Per connection, a reader, a sender and a
//! keepalive run together and end together; a long-lived applier task
//! applies what the reader decodes.
//!
//! ## Key Invariants
//!
//! - Envelopes reach the origin in enqueue order
//! - A failed write is retried once, before anything else
//! - Origin changes are applied in arrival order
//! - Credential and version errors stop the client

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod bootstrap;
mod client;
mod config;
mod error;
mod handlers;
mod link;
mod queue;
mod state;
mod transport;

pub use bootstrap::{full_sync_plan, BootstrapGate};
pub use client::LeafClient;
pub use config::LeafConfig;
pub use error::{LeafError, LeafResult};
pub use link::LeafLink;
pub use state::{ConnectionState, LeafStats};
pub use transport::{leaf_endpoint, Connector, WebSocketConnector};
