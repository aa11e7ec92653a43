//! Registry of connected leaves.

use crate::auth::AccessScope;
use crate::error::{OriginError, OriginResult};
use crate::session::{run_sender, Link, Session};
use futures::SinkExt;
use outpost_protocol::{Frame, FrameSink, Message, RegisterResponse, TransportError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of [`SessionRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    /// The registered session.
    pub session: Arc<Session>,
    /// Identifies the connection within the session.
    pub connection_id: u64,
    /// Fires when the connection is superseded or the session is shut down.
    pub closed: oneshot::Receiver<()>,
    /// True if an existing session was resumed.
    pub resumed: bool,
}

enum Resume {
    Resumed(oneshot::Receiver<()>),
    /// The session went away before the swap; the link is handed back.
    Gone(Link),
    Failed,
}

/// Live leaf sessions keyed by session id.
///
/// The map is only locked for short synchronous sections; fan-out works
/// on a snapshot.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    mailbox_capacity: usize,
    next_connection: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            mailbox_capacity,
            next_connection: AtomicU64::new(1),
        }
    }

    /// Registers a connection.
    ///
    /// A live `requested_id` with the same scope is resumed by swapping the
    /// connection; an empty or unknown id gets a freshly minted one. The
    /// completed `reply` is written to the new connection before anything
    /// from the mailbox.
    pub async fn register(
        self: &Arc<Self>,
        requested_id: &str,
        sink: FrameSink,
        location: String,
        scope: AccessScope,
        reply: RegisterResponse,
    ) -> OriginResult<Registration> {
        let connection_id = self.next_connection.fetch_add(1, Ordering::SeqCst);
        let mut link = Link {
            connection_id,
            sink,
        };

        let existing = if requested_id.is_empty() {
            None
        } else {
            self.get(requested_id).filter(|session| session.scope() == scope)
        };

        if let Some(session) = existing {
            match self.resume(&session, link, location.clone(), reply.clone()).await {
                Resume::Resumed(closed) => {
                    info!(session_id = %session.id(), %location, "session resumed");
                    return Ok(Registration {
                        session,
                        connection_id,
                        closed,
                        resumed: true,
                    });
                }
                Resume::Failed => return Err(OriginError::Transport(TransportError::Closed)),
                Resume::Gone(returned) => link = returned,
            }
        }

        self.create(link, location, scope, reply).await
    }

    async fn resume(
        &self,
        session: &Arc<Session>,
        replacement: Link,
        location: String,
        mut reply: RegisterResponse,
    ) -> Resume {
        let connection_id = replacement.connection_id;
        let mut link = session.link.lock().await;

        let closed = {
            let sessions = self.sessions.read();
            let live = sessions
                .get(session.id())
                .is_some_and(|current| Arc::ptr_eq(current, session));
            if !live {
                return Resume::Gone(replacement);
            }
            session.swap(&mut link, replacement, location)
        };

        reply.session_id = session.id().to_string();
        let greeting = Message::encode_register_response(&reply);
        let sent = match greeting {
            Ok(bytes) => link.sink.send(Frame::Binary(bytes)).await.is_ok(),
            Err(_) => false,
        };
        drop(link);

        if !sent {
            self.unregister_connection(session.id(), connection_id);
            return Resume::Failed;
        }
        Resume::Resumed(closed)
    }

    async fn create(
        self: &Arc<Self>,
        mut link: Link,
        location: String,
        scope: AccessScope,
        mut reply: RegisterResponse,
    ) -> OriginResult<Registration> {
        let id = Uuid::new_v4().to_string();
        reply.session_id = id.clone();
        let greeting = Message::encode_register_response(&reply)?;
        link.sink.send(Frame::Binary(greeting)).await?;

        let connection_id = link.connection_id;
        let (session, outbox, closed) = Session::new(
            id.clone(),
            scope,
            location.clone(),
            link,
            self.mailbox_capacity,
        );
        let session = Arc::new(session);
        self.sessions.write().insert(id.clone(), Arc::clone(&session));

        let sender = tokio::spawn(run_sender(
            Arc::clone(&session),
            outbox,
            Arc::downgrade(self),
        ));
        session.set_sender(sender);

        info!(
            session_id = %id,
            %location,
            restricted = scope.is_restricted(),
            "session registered"
        );
        Ok(Registration {
            session,
            connection_id,
            closed,
            resumed: false,
        })
    }

    /// Returns a live session.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no leaf is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Stops and removes a session.
    pub fn unregister(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(id);
        if let Some(session) = &removed {
            session.shutdown();
            debug!(session_id = %id, "session unregistered");
        }
        removed
    }

    /// Stops and removes a session only if `connection_id` is still attached.
    pub(crate) fn unregister_connection(
        &self,
        id: &str,
        connection_id: u64,
    ) -> Option<Arc<Session>> {
        let removed = {
            let mut sessions = self.sessions.write();
            let attached = sessions
                .get(id)
                .is_some_and(|session| session.connection_id() == connection_id);
            if attached {
                sessions.remove(id)
            } else {
                None
            }
        };
        if let Some(session) = &removed {
            session.shutdown();
            debug!(session_id = %id, connection_id, "session unregistered");
        }
        removed
    }

    /// Visits every live session except `skip`.
    ///
    /// The visitor runs on a snapshot taken under the read lock, so it may
    /// call back into the registry.
    pub fn for_each_except(&self, skip: Option<&str>, mut visit: impl FnMut(&Arc<Session>)) {
        let snapshot: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        for session in snapshot.iter().filter(|s| skip != Some(s.id())) {
            visit(session);
        }
    }

    /// Unregisters sessions silent for longer than `timeout`.
    pub fn reap_idle(&self, timeout: Duration) -> Vec<String> {
        let reaped: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            let idle: Vec<String> = sessions
                .values()
                .filter(|session| session.idle_for() > timeout)
                .map(|session| session.id().to_string())
                .collect();
            idle.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        reaped
            .into_iter()
            .map(|session| {
                session.shutdown();
                info!(session_id = %session.id(), "reaped idle session");
                session.id().to_string()
            })
            .collect()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use outpost_protocol::{duplex, Connection, FrameStream};

    fn reply() -> RegisterResponse {
        RegisterResponse {
            success: true,
            version: "1.4.2".into(),
            location: "eu".into(),
            timezone: "UTC".into(),
            ..RegisterResponse::default()
        }
    }

    fn pair() -> (FrameSink, Connection) {
        let (origin, leaf) = duplex(16);
        let (sink, _stream) = origin.split();
        (sink, leaf)
    }

    async fn next_message(stream: &mut FrameStream) -> Vec<u8> {
        match stream.next().await {
            Some(Ok(Frame::Binary(bytes))) => bytes,
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_id_mints_a_session() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (sink, leaf) = pair();
        let (_leaf_sink, mut leaf_stream) = leaf.split();

        let registration = registry
            .register("", sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();

        assert!(!registration.resumed);
        assert!(Uuid::parse_str(registration.session.id()).is_ok());
        assert_eq!(registry.len(), 1);

        let bytes = next_message(&mut leaf_stream).await;
        let response = Message::decode_register_response(bytes).unwrap();
        assert!(response.success);
        assert_eq!(response.session_id, registration.session.id());
    }

    #[tokio::test]
    async fn unknown_id_is_replaced() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (sink, _leaf) = pair();

        let registration = registry
            .register("stale", sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();

        assert!(!registration.resumed);
        assert_ne!(registration.session.id(), "stale");
    }

    #[tokio::test]
    async fn live_id_resumes_and_keeps_the_mailbox() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (first_sink, first_leaf) = pair();
        let first = registry
            .register("", first_sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();
        let id = first.session.id().to_string();
        drop(first_leaf);

        let (second_sink, second_leaf) = pair();
        let (_leaf_sink, mut leaf_stream) = second_leaf.split();
        let second = registry
            .register(&id, second_sink, "us".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();

        assert!(second.resumed);
        assert!(Arc::ptr_eq(&first.session, &second.session));
        assert_eq!(second.session.location(), "us");
        assert!(first.closed.await.is_ok());

        let bytes = next_message(&mut leaf_stream).await;
        let response = Message::decode_register_response(bytes).unwrap();
        assert_eq!(response.session_id, id);

        assert!(second.session.send(&Message::Bootstrap).await);
        let bytes = next_message(&mut leaf_stream).await;
        assert_eq!(Message::decode(bytes).unwrap(), Message::Bootstrap);
    }

    #[tokio::test]
    async fn resume_requires_the_same_scope() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (sink, _leaf) = pair();
        let first = registry
            .register("", sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();

        let restricted = AccessScope::Restricted {
            token_id: Uuid::from_u128(1),
            user_id: Uuid::from_u128(2),
        };
        let (sink, _leaf) = pair();
        let second = registry
            .register(first.session.id(), sink, "eu".into(), restricted, reply())
            .await
            .unwrap();

        assert!(!second.resumed);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn stale_connection_cannot_unregister() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (sink, _first_leaf) = pair();
        let first = registry
            .register("", sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();
        let id = first.session.id().to_string();

        let (sink, _second_leaf) = pair();
        let second = registry
            .register(&id, sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();

        assert!(registry.unregister_connection(&id, first.connection_id).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister_connection(&id, second.connection_id).is_some());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn for_each_except_skips_the_origin_session() {
        let registry = Arc::new(SessionRegistry::new(8));
        let mut ids = Vec::new();
        let mut leaves = Vec::new();
        for _ in 0..3 {
            let (sink, leaf) = pair();
            leaves.push(leaf);
            let registration = registry
                .register("", sink, "eu".into(), AccessScope::Unrestricted, reply())
                .await
                .unwrap();
            ids.push(registration.session.id().to_string());
        }

        let mut visited = Vec::new();
        registry.for_each_except(Some(ids[1].as_str()), |session| {
            visited.push(session.id().to_string())
        });

        visited.sort();
        let mut expected = vec![ids[0].clone(), ids[2].clone()];
        expected.sort();
        assert_eq!(visited, expected);
    }

    #[tokio::test]
    async fn unregister_closes_the_reader() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (sink, _leaf) = pair();
        let registration = registry
            .register("", sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();

        assert!(registry.unregister(registration.session.id()).is_some());
        assert!(registration.closed.await.is_ok());
    }

    #[tokio::test]
    async fn idle_sessions_are_reaped() {
        let registry = Arc::new(SessionRegistry::new(8));
        let (sink, _leaf) = pair();
        let registration = registry
            .register("", sink, "eu".into(), AccessScope::Unrestricted, reply())
            .await
            .unwrap();

        assert!(registry.reap_idle(Duration::from_secs(60)).is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let reaped = registry.reap_idle(Duration::from_millis(10));
        assert_eq!(reaped, vec![registration.session.id().to_string()]);
        assert!(registry.is_empty());
    }
}
