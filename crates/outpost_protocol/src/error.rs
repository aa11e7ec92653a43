//! Error types for the protocol crate.

use crate::command::Command;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing or decoding envelopes.
///
/// Every variant is unrecoverable for the connection that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame did not even contain a command byte.
    #[error("empty frame")]
    EmptyFrame,

    /// The trailing byte is outside the closed command set.
    #[error("unknown command code {0}")]
    UnknownCommand(u8),

    /// The payload could not be serialized.
    #[error("failed to encode {command} payload: {message}")]
    Encode {
        /// Command being encoded.
        command: Command,
        /// Serializer message.
        message: String,
    },

    /// The payload did not match the command's shape.
    #[error("failed to decode {command} payload: {message}")]
    Decode {
        /// Command being decoded.
        command: Command,
        /// Deserializer message.
        message: String,
    },

    /// The command is valid but not expected at this point of the exchange.
    #[error("unexpected command {0}")]
    UnexpectedCommand(Command),

    /// A version string could not be parsed.
    #[error("invalid version string: {0:?}")]
    InvalidVersion(String),
}

/// Errors raised by a transport connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// Reading or writing failed.
    #[error("transport i/o error: {0}")]
    Io(String),

    /// The peer sent a frame type the protocol does not use.
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}

impl TransportError {
    /// Creates an i/o error from any displayable error.
    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }
}
