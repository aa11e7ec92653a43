//! Transport-agnostic connection types.
//!
//! Both ends of the sync link see a connection as a sink and a stream of
//! [`Frame`]s. The WebSocket adapters live with the leaf and origin crates;
//! [`duplex`] provides an in-memory pair for tests.

use crate::error::TransportError;
use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;

/// A message-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An encoded envelope.
    Binary(Vec<u8>),
    /// Keepalive request.
    Ping(Vec<u8>),
    /// Keepalive reply.
    Pong(Vec<u8>),
    /// Orderly shutdown.
    Close,
}

/// Outgoing half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Incoming half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// A full-duplex, message-oriented connection.
pub struct Connection {
    sink: FrameSink,
    stream: FrameStream,
}

impl Connection {
    /// Wraps an already split connection.
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }

    /// Splits the connection into its halves.
    pub fn split(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Creates two connected in-memory endpoints.
///
/// Each direction buffers up to `capacity` frames. Dropping one end's sink
/// ends the other end's stream.
pub fn duplex(capacity: usize) -> (Connection, Connection) {
    let (a_tx, a_rx) = mpsc::channel::<Frame>(capacity);
    let (b_tx, b_rx) = mpsc::channel::<Frame>(capacity);

    let left = Connection::new(
        Box::pin(a_tx.sink_map_err(|_| TransportError::Closed)),
        Box::pin(b_rx.map(Ok::<Frame, TransportError>)),
    );
    let right = Connection::new(
        Box::pin(b_tx.sink_map_err(|_| TransportError::Closed)),
        Box::pin(a_rx.map(Ok::<Frame, TransportError>)),
    );
    (left, right)
}
