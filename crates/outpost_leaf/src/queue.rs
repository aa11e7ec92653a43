//! Outbound queue: bounded primary queue plus a small retry queue.
//!
//! Producers encode at enqueue time and block while the primary queue is
//! full. A single drain per connection writes frames in enqueue order,
//! always preferring the retry queue. A frame that fails to write moves to
//! the retry queue once; a second failure drops it.

use crate::error::{LeafError, LeafResult};
use crate::state::SharedStats;
use futures::SinkExt;
use outpost_core::{ReplicateError, ReplicateResult};
use outpost_protocol::{Command, Frame, FrameSink, Message};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// A connection's outgoing half, shared by the drain and the keepalive.
pub(crate) type SharedSink = Arc<Mutex<FrameSink>>;

/// An encoded envelope waiting to be written.
#[derive(Debug, Clone)]
pub(crate) struct QueuedFrame {
    bytes: Vec<u8>,
    command: Command,
    retried: bool,
}

/// Producer side of the queue.
#[derive(Clone)]
pub(crate) struct QueueProducer {
    tx: mpsc::Sender<QueuedFrame>,
}

impl QueueProducer {
    /// Encodes and enqueues a message, waiting while the queue is full.
    pub(crate) async fn push(&self, message: &Message) -> ReplicateResult<()> {
        let bytes = message
            .encode()
            .map_err(|e| ReplicateError::Encode(e.to_string()))?;
        let frame = QueuedFrame {
            bytes,
            command: message.command(),
            retried: false,
        };
        self.tx.send(frame).await.map_err(|_| ReplicateError::Closed)
    }
}

struct Drain {
    primary: mpsc::Receiver<QueuedFrame>,
    retry: mpsc::Receiver<QueuedFrame>,
    in_flight: Option<QueuedFrame>,
}

impl Drain {
    async fn next(&mut self) -> Option<QueuedFrame> {
        if let Some(frame) = self.in_flight.take() {
            return Some(frame);
        }
        if let Ok(frame) = self.retry.try_recv() {
            return Some(frame);
        }
        let Drain { primary, retry, .. } = self;
        tokio::select! {
            biased;
            Some(frame) = retry.recv() => Some(frame),
            frame = primary.recv() => frame,
        }
    }
}

/// The leaf's outbound queue; outlives individual connections.
pub(crate) struct OutboundQueue {
    primary_tx: mpsc::Sender<QueuedFrame>,
    retry_tx: mpsc::Sender<QueuedFrame>,
    drain: Mutex<Drain>,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize, retry_capacity: usize) -> Self {
        let (primary_tx, primary) = mpsc::channel(capacity.max(1));
        let (retry_tx, retry) = mpsc::channel(retry_capacity.max(1));
        Self {
            primary_tx,
            retry_tx,
            drain: Mutex::new(Drain {
                primary,
                retry,
                in_flight: None,
            }),
        }
    }

    pub(crate) fn producer(&self) -> QueueProducer {
        QueueProducer {
            tx: self.primary_tx.clone(),
        }
    }

    /// Writes queued frames to `sink` until a write fails.
    ///
    /// Cancelling the returned future keeps the frame being written at the
    /// head of the queue for the next connection.
    pub(crate) async fn drain(&self, sink: &SharedSink, stats: &SharedStats) -> LeafResult<()> {
        let mut drain = self.drain.lock().await;
        loop {
            let frame = match drain.next().await {
                Some(frame) => frame,
                None => return Err(ReplicateError::Closed.into()),
            };
            let bytes = frame.bytes.clone();
            drain.in_flight = Some(frame);

            let result = sink.lock().await.send(Frame::Binary(bytes)).await;
            let Some(frame) = drain.in_flight.take() else {
                continue;
            };

            match result {
                Ok(()) => {
                    debug!(command = %frame.command, "sent envelope");
                    stats.write().envelopes_sent += 1;
                }
                Err(err) => {
                    self.requeue(frame, stats);
                    return Err(LeafError::Transport(err));
                }
            }
        }
    }

    fn requeue(&self, mut frame: QueuedFrame, stats: &SharedStats) {
        if frame.retried {
            warn!(command = %frame.command, "dropping envelope after second write failure");
            stats.write().dropped += 1;
            return;
        }
        frame.retried = true;
        let command = frame.command;
        match self.retry_tx.try_send(frame) {
            Ok(()) => {
                debug!(command = %command, "moved envelope to retry queue");
                stats.write().retries += 1;
            }
            Err(_) => {
                warn!(command = %command, "retry queue full, dropping envelope");
                stats.write().dropped += 1;
            }
        }
    }
}
