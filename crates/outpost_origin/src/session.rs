//! A connected leaf, as seen by the origin.

use crate::auth::AccessScope;
use crate::registry::SessionRegistry;
use futures::SinkExt;
use outpost_protocol::{Frame, FrameSink, Message, TransportError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// The connection a session currently writes to.
pub(crate) struct Link {
    pub(crate) connection_id: u64,
    pub(crate) sink: FrameSink,
}

/// A registered leaf.
///
/// The session identity outlives individual connections: a leaf that
/// reconnects with a live session id gets its connection swapped in, and
/// anything still waiting in the mailbox is delivered on the new link.
pub struct Session {
    id: String,
    scope: AccessScope,
    location: RwLock<String>,
    mailbox: mpsc::Sender<Vec<u8>>,
    pub(crate) link: AsyncMutex<Link>,
    connection_id: AtomicU64,
    last_seen: Mutex<Instant>,
    closer: Mutex<Option<oneshot::Sender<()>>>,
    sender: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        scope: AccessScope,
        location: String,
        link: Link,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Vec<u8>>, oneshot::Receiver<()>) {
        let (mailbox, outbox) = mpsc::channel(capacity.max(1));
        let (closer, closed) = oneshot::channel();
        let session = Self {
            id,
            scope,
            location: RwLock::new(location),
            mailbox,
            connection_id: AtomicU64::new(link.connection_id),
            link: AsyncMutex::new(link),
            last_seen: Mutex::new(Instant::now()),
            closer: Mutex::new(Some(closer)),
            sender: Mutex::new(None),
        };
        (session, outbox, closed)
    }

    /// Returns the session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the access scope of the leaf.
    pub fn scope(&self) -> AccessScope {
        self.scope
    }

    /// Returns the effective location of the leaf.
    pub fn location(&self) -> String {
        self.location.read().clone()
    }

    /// Returns the id of the connection currently attached.
    pub fn connection_id(&self) -> u64 {
        self.connection_id.load(Ordering::SeqCst)
    }

    /// Refreshes the liveness marker.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Returns how long the leaf has been silent.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Queues an encoded envelope, waiting while the mailbox is full.
    ///
    /// Returns false if the session has been shut down.
    pub async fn enqueue(&self, bytes: Vec<u8>) -> bool {
        self.mailbox.send(bytes).await.is_ok()
    }

    /// Encodes and queues a message.
    pub async fn send(&self, message: &Message) -> bool {
        match message.encode() {
            Ok(bytes) => self.enqueue(bytes).await,
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "failed to encode message");
                false
            }
        }
    }

    /// Swaps in a new connection. The caller holds the link lock.
    pub(crate) fn swap(
        &self,
        link: &mut Link,
        replacement: Link,
        location: String,
    ) -> oneshot::Receiver<()> {
        self.connection_id.store(replacement.connection_id, Ordering::SeqCst);
        *link = replacement;
        *self.location.write() = location;
        self.touch();

        let (closer, closed) = oneshot::channel();
        if let Some(previous) = self.closer.lock().replace(closer) {
            let _ = previous.send(());
        }
        closed
    }

    pub(crate) fn set_sender(&self, handle: JoinHandle<()>) {
        *self.sender.lock() = Some(handle);
    }

    /// Stops the sender task and tells the current reader to stop.
    pub(crate) fn shutdown(&self) {
        if let Some(sender) = self.sender.lock().take() {
            sender.abort();
        }
        if let Some(closer) = self.closer.lock().take() {
            let _ = closer.send(());
        }
    }

    /// Sends a close frame on the current connection if it is still `connection_id`.
    pub(crate) async fn close_link(&self, connection_id: u64) {
        let close = async {
            let mut link = self.link.lock().await;
            if link.connection_id == connection_id {
                let _ = link.sink.send(Frame::Close).await;
                let _ = link.sink.close().await;
            }
        };
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, close).await;
    }

    async fn write(&self, bytes: Vec<u8>) -> (u64, Result<(), TransportError>) {
        let mut link = self.link.lock().await;
        let result = link.sink.send(Frame::Binary(bytes)).await;
        (link.connection_id, result)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("connection_id", &self.connection_id())
            .finish_non_exhaustive()
    }
}

/// Drains a session's mailbox in enqueue order.
pub(crate) async fn run_sender(
    session: Arc<Session>,
    mut outbox: mpsc::Receiver<Vec<u8>>,
    registry: Weak<SessionRegistry>,
) {
    while let Some(bytes) = outbox.recv().await {
        loop {
            let (connection_id, result) = session.write(bytes.clone()).await;
            let Err(err) = result else {
                break;
            };
            if session.connection_id() != connection_id {
                debug!(session_id = %session.id, "connection swapped, retrying write");
                continue;
            }
            warn!(session_id = %session.id, error = %err, "write to leaf failed");
            if let Some(registry) = registry.upgrade() {
                registry.unregister_connection(&session.id, connection_id);
            }
            return;
        }
    }
}
