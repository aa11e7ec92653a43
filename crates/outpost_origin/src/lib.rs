//! # Outpost Origin
//!
//! Origin-side synchronization server for Outpost.
//!
//! This crate provides:
//! - The leaf endpoint (`GET /api/v1/leaf-server`, upgraded to WebSocket)
//! - Authentication by shared secret or user-scoped API token
//! - A registry of resumable leaf sessions, each with its own mailbox
//! - Full-sync reconciliation and incremental fan-out
//!
//! # Architecture
//!
//! Each leaf connection is served by one task that reads envelopes and
//! handles them in arrival order; each session owns a sender task that
//! drains its mailbox onto whichever connection is currently attached.
//! Changes are propagated through [`Fanout`], which skips the session a
//! change came from and any session whose scope does not cover it.
//!
//! # Restricted leaves
//!
//! A leaf that authenticated with an API token sees only its owner's
//! user, spaces and tokens. Writes outside that scope are never applied;
//! the origin answers them with a DELETE (or its own copy) so the leaf
//! converges back to what it is entitled to.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod fanout;
mod handlers;
mod registry;
mod server;
mod session;
mod sync;

pub use auth::{AccessScope, Authenticator};
pub use config::OriginConfig;
pub use error::{OriginError, OriginResult};
pub use fanout::Fanout;
pub use handlers::{OriginContext, SessionHandler};
pub use registry::{Registration, SessionRegistry};
pub use server::{serve_connection, spawn_reaper, OriginServer};
pub use session::Session;
pub use sync::{reconcile, Reconciliation};
