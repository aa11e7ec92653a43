//! # Outpost Sync Protocol
//!
//! Wire protocol between an Outpost origin and its leaves.
//!
//! This crate provides:
//! - [`Command`], the closed set of command codes
//! - [`Envelope`] framing (`cbor(payload) || command_byte`)
//! - Typed payloads and the [`Message`] sum type
//! - Major/minor version compatibility
//! - Transport-agnostic [`Connection`] halves and an in-memory [`duplex`]
//!
//! This is a pure protocol crate with no network I/O.
//!
//! ## Example
//!
//! ```rust
//! use outpost_protocol::{Message, SyncExisting};
//!
//! let frame = Message::SyncTemplates(SyncExisting::default()).encode().unwrap();
//! let decoded = Message::decode(frame).unwrap();
//! assert_eq!(decoded, Message::SyncTemplates(SyncExisting::default()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod command;
mod envelope;
mod error;
mod messages;
mod transport;
mod version;

pub use command::Command;
pub use envelope::Envelope;
pub use error::{ProtocolError, ProtocolResult, TransportError};
pub use messages::{
    Message, MirrorToken, RegisterRequest, RegisterResponse, SyncExisting, SyncSpace, SyncUser,
    SyncUserSpaces, Tombstone, UpdateRole, UpdateSpace, UpdateTemplate, UpdateTemplateVar,
    UpdateUser, UpdateVolume,
};
pub use transport::{duplex, Connection, Frame, FrameSink, FrameStream};
pub use version::{is_compatible, Version};

/// HTTP path of the origin's leaf endpoint.
pub const LEAF_SERVER_PATH: &str = "/api/v1/leaf-server";
