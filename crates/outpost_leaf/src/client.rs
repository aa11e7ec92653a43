//! The leaf client: connection lifecycle, registration and session loop.

use crate::bootstrap::{full_sync_plan, BootstrapGate};
use crate::config::LeafConfig;
use crate::error::{LeafError, LeafResult};
use crate::handlers::{accepted_from_origin, LeafHandlers};
use crate::link::LeafLink;
use crate::queue::{OutboundQueue, SharedSink};
use crate::state::{ConnectionState, LeafStats, SharedStats};
use crate::transport::Connector;
use futures::{SinkExt, StreamExt};
use outpost_core::{Repository, RoleCache};
use outpost_protocol::{
    is_compatible, Frame, FrameStream, Message, ProtocolError, RegisterRequest, RegisterResponse,
    TransportError,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

/// A leaf's link to its origin.
///
/// The client owns the outbound queue, the role cache handle, the full-sync
/// gate and the applier. [`LeafClient::run`] keeps the connection alive and
/// only returns on a fatal error.
pub struct LeafClient {
    config: LeafConfig,
    connector: Arc<dyn Connector>,
    repo: Arc<dyn Repository>,
    roles: Arc<RoleCache>,
    queue: Arc<OutboundQueue>,
    gate: Arc<BootstrapGate>,
    state: watch::Sender<ConnectionState>,
    stats: SharedStats,
    session_id: Mutex<String>,
    registration: RwLock<Option<RegisterResponse>>,
    applier_tx: mpsc::UnboundedSender<Message>,
    applier_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl LeafClient {
    /// Creates a client. Nothing is dialed until [`LeafClient::run`].
    pub fn new(
        config: LeafConfig,
        connector: Arc<dyn Connector>,
        repo: Arc<dyn Repository>,
        roles: Arc<RoleCache>,
    ) -> Self {
        let queue = Arc::new(OutboundQueue::new(
            config.queue_capacity,
            config.retry_capacity,
        ));
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (applier_tx, applier_rx) = mpsc::unbounded_channel();
        Self {
            config,
            connector,
            repo,
            roles,
            queue,
            gate: Arc::new(BootstrapGate::new()),
            state,
            stats: Arc::new(RwLock::new(LeafStats::default())),
            session_id: Mutex::new(String::new()),
            registration: RwLock::new(None),
            applier_tx,
            applier_rx: Mutex::new(Some(applier_rx)),
        }
    }

    /// Returns the replicator application code uses after local writes.
    pub fn link(&self) -> LeafLink {
        LeafLink::new(self.queue.producer())
    }

    /// Watches the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Returns the full-sync gate.
    pub fn gate(&self) -> Arc<BootstrapGate> {
        self.gate.clone()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> LeafStats {
        self.stats.read().clone()
    }

    /// Returns the session id assigned by the origin, empty before the
    /// first registration.
    pub fn session_id(&self) -> String {
        self.session_id.lock().clone()
    }

    /// Returns the last registration reply.
    pub fn registration(&self) -> Option<RegisterResponse> {
        self.registration.read().clone()
    }

    /// Returns the role cache kept current by the origin.
    pub fn roles(&self) -> Arc<RoleCache> {
        self.roles.clone()
    }

    /// Connects, reconnecting after every non-fatal failure.
    ///
    /// Returns only when a fatal error (rejected credential, incompatible
    /// version, unusable URL) makes further attempts pointless.
    pub async fn run(&self) -> LeafResult<()> {
        let rx = self
            .applier_rx
            .lock()
            .take()
            .ok_or(LeafError::AlreadyRunning)?;
        let handlers = LeafHandlers::new(
            self.repo.clone(),
            self.roles.clone(),
            self.gate.clone(),
            self.stats.clone(),
        );
        let applier = tokio::spawn(handlers.run(rx));

        let result = self.reconnect_loop().await;
        applier.abort();
        result
    }

    async fn reconnect_loop(&self) -> LeafResult<()> {
        loop {
            match self.connect_once().await {
                Ok(()) => info!("connection to origin closed"),
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "leaf cannot connect to origin");
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Err(err);
                }
                Err(err) => warn!(error = %err, "connection to origin failed"),
            }
            self.state.send_replace(ConnectionState::Disconnected);
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    async fn connect_once(&self) -> LeafResult<()> {
        self.state.send_replace(ConnectionState::Dialing);
        let connection = self.connector.dial().await?;
        self.stats.write().connections += 1;

        let (sink, mut stream) = connection.split();
        let sink: SharedSink = Arc::new(AsyncMutex::new(sink));

        self.state.send_replace(ConnectionState::Registering);
        let result = self.session(&sink, &mut stream).await;
        let _ = sink.lock().await.close().await;
        result
    }

    async fn session(&self, sink: &SharedSink, stream: &mut FrameStream) -> LeafResult<()> {
        let response = tokio::time::timeout(
            self.config.handshake_timeout,
            self.register(sink, stream),
        )
        .await
        .map_err(|_| LeafError::Timeout)??;

        if !is_compatible(&self.config.version, &response.version) {
            return Err(LeafError::VersionMismatch {
                local: self.config.version.clone(),
                remote: response.version,
            });
        }
        if !response.success {
            return Err(LeafError::Rejected(response.version));
        }

        let session_changed = {
            let mut current = self.session_id.lock();
            let changed = *current != response.session_id;
            current.clone_from(&response.session_id);
            changed
        };
        let do_full_sync = session_changed || self.gate.needs_full_sync();
        info!(
            session_id = %response.session_id,
            location = %response.location,
            restricted = response.restricted_node,
            full_sync = do_full_sync,
            "registered with origin"
        );
        *self.registration.write() = Some(response);

        if do_full_sync {
            self.state.send_replace(ConnectionState::Syncing);
        } else {
            self.state.send_replace(ConnectionState::Active);
        }

        tokio::select! {
            result = self.read_loop(sink, stream) => result,
            result = self.queue.drain(sink, &self.stats) => result,
            result = self.keepalive(sink) => result,
            result = self.bootstrap(do_full_sync) => result,
        }
    }

    async fn register(
        &self,
        sink: &SharedSink,
        stream: &mut FrameStream,
    ) -> LeafResult<RegisterResponse> {
        let request = RegisterRequest {
            version: self.config.version.clone(),
            location: self.config.location.clone(),
            session_id: self.session_id(),
        };
        let frame = Message::Register(request).encode()?;
        sink.lock().await.send(Frame::Binary(frame)).await?;

        loop {
            match stream.next().await {
                Some(Ok(Frame::Binary(bytes))) => {
                    return Ok(Message::decode_register_response(bytes)?);
                }
                Some(Ok(Frame::Ping(payload))) => {
                    sink.lock().await.send(Frame::Pong(payload)).await?;
                }
                Some(Ok(Frame::Pong(_))) => {}
                Some(Ok(Frame::Close)) | None => return Err(TransportError::Closed.into()),
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }

    async fn read_loop(&self, sink: &SharedSink, stream: &mut FrameStream) -> LeafResult<()> {
        while let Some(frame) = stream.next().await {
            match frame? {
                Frame::Binary(bytes) => {
                    let message = Message::decode(bytes)?;
                    let command = message.command();
                    if !accepted_from_origin(&message) {
                        return Err(ProtocolError::UnexpectedCommand(command).into());
                    }
                    debug!(%command, "received envelope");
                    self.stats.write().envelopes_received += 1;
                    if self.applier_tx.send(message).is_err() {
                        return Err(TransportError::Closed.into());
                    }
                }
                Frame::Ping(payload) => sink.lock().await.send(Frame::Pong(payload)).await?,
                Frame::Pong(_) => {}
                Frame::Close => return Ok(()),
            }
        }
        Ok(())
    }

    async fn keepalive(&self, sink: &SharedSink) -> LeafResult<()> {
        let mut ticker = tokio::time::interval(self.config.keepalive_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sink.lock().await.send(Frame::Ping(Vec::new())).await?;
        }
    }

    async fn bootstrap(&self, do_full_sync: bool) -> LeafResult<()> {
        if do_full_sync {
            self.gate.begin();
            let repo = Arc::clone(&self.repo);
            let plan = tokio::task::spawn_blocking(move || full_sync_plan(repo.as_ref())).await??;
            debug!(requests = plan.len(), "starting full sync");
            let producer = self.queue.producer();
            for message in &plan {
                producer.push(message).await?;
            }
            self.gate.wait_settled().await;
            self.state.send_replace(ConnectionState::Active);
        }
        futures::future::pending::<()>().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connector;
    use futures::future::BoxFuture;
    use outpost_core::Replicator;
    use outpost_protocol::{duplex, Connection, FrameSink, SyncExisting, UpdateUser};
    use outpost_testkit::{user, World};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Hands the origin side of every dialed connection to the test.
    struct ChannelConnector {
        failures: AtomicUsize,
        tx: mpsc::UnboundedSender<Connection>,
    }

    impl Connector for ChannelConnector {
        fn dial(&self) -> BoxFuture<'_, LeafResult<Connection>> {
            Box::pin(async move {
                if self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(LeafError::Dial("connection refused".into()));
                }
                let (leaf, origin) = duplex(64);
                self.tx
                    .send(origin)
                    .map_err(|_| LeafError::Dial("test ended".into()))?;
                Ok(leaf)
            })
        }
    }

    fn client(
        version: &str,
        failures: usize,
    ) -> (Arc<LeafClient>, mpsc::UnboundedReceiver<Connection>, World) {
        let world = World::seed();
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(ChannelConnector {
            failures: AtomicUsize::new(failures),
            tx,
        });
        let config = LeafConfig::new("ws://origin", "secret")
            .with_location("eu")
            .with_version(version)
            .with_retry_delay(Duration::from_millis(10))
            .with_handshake_timeout(Duration::from_secs(2));
        let roles = Arc::new(RoleCache::load(world.repo.as_ref()).unwrap());
        let client = LeafClient::new(config, connector, world.repository(), roles);
        (Arc::new(client), rx, world)
    }

    async fn next_message(stream: &mut FrameStream) -> Option<Message> {
        while let Some(frame) = stream.next().await {
            if let Ok(Frame::Binary(bytes)) = frame {
                return Some(Message::decode(bytes).unwrap());
            }
        }
        None
    }

    async fn accept(
        origin: Connection,
        version: &str,
        session_id: &str,
    ) -> (FrameSink, FrameStream, RegisterRequest) {
        let (mut sink, mut stream) = origin.split();
        let Some(Message::Register(request)) = next_message(&mut stream).await else {
            panic!("expected REGISTER");
        };
        let response = RegisterResponse {
            success: is_compatible(version, &request.version),
            restricted_node: false,
            version: version.into(),
            location: request.location.clone(),
            timezone: "UTC".into(),
            session_id: session_id.into(),
        };
        let frame = Message::encode_register_response(&response).unwrap();
        sink.send(Frame::Binary(frame)).await.unwrap();
        (sink, stream, request)
    }

    /// Answers the full sync with only the BOOTSTRAP echo.
    async fn finish_full_sync(sink: &mut FrameSink, stream: &mut FrameStream) -> Vec<Message> {
        let mut requests = Vec::new();
        while let Some(message) = next_message(stream).await {
            if message == Message::Bootstrap {
                sink.send(Frame::Binary(Message::Bootstrap.encode().unwrap()))
                    .await
                    .unwrap();
                return requests;
            }
            requests.push(message);
        }
        panic!("connection closed during full sync");
    }

    #[tokio::test]
    async fn incompatible_origin_is_fatal() {
        let (client, mut dials, _world) = client("1.3.0", 0);
        let run = tokio::spawn({
            let client = client.clone();
            async move { client.run().await }
        });

        let origin = dials.recv().await.unwrap();
        let _conn = accept(origin, "1.4.0", "s1").await;

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(LeafError::VersionMismatch { ref local, ref remote })
                if local == "1.3.0" && remote == "1.4.0"
        ));
        assert_eq!(*client.state().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn registers_and_completes_full_sync() {
        let (client, mut dials, _world) = client("1.4.0", 2);
        let run = tokio::spawn({
            let client = client.clone();
            async move { client.run().await }
        });

        let origin = dials.recv().await.unwrap();
        let (mut sink, mut stream, request) = accept(origin, "1.4.2", "s1").await;
        assert_eq!(request.location, "eu");
        assert_eq!(request.session_id, "");

        let requests = finish_full_sync(&mut sink, &mut stream).await;
        assert_eq!(
            requests.first().map(Message::command),
            Some(outpost_protocol::Command::SyncTemplates)
        );

        tokio::time::timeout(Duration::from_secs(2), client.gate().wait())
            .await
            .unwrap();
        let mut state = client.state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ConnectionState::Active),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(client.session_id(), "s1");
        let stats = client.stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.full_syncs, 1);
        run.abort();
    }

    #[tokio::test]
    async fn resumed_session_skips_full_sync() {
        let (client, mut dials, _world) = client("1.4.0", 0);
        let run = tokio::spawn({
            let client = client.clone();
            async move { client.run().await }
        });

        let origin = dials.recv().await.unwrap();
        let (mut sink, mut stream, _) = accept(origin, "1.4.0", "s1").await;
        finish_full_sync(&mut sink, &mut stream).await;
        tokio::time::timeout(Duration::from_secs(2), client.gate().wait())
            .await
            .unwrap();
        drop((sink, stream));

        let origin = dials.recv().await.unwrap();
        let (_sink, mut stream, request) = accept(origin, "1.4.0", "s1").await;
        assert_eq!(request.session_id, "s1");

        client
            .link()
            .update_user(&user(0x900, "carol"))
            .await
            .unwrap();
        let Some(Message::UpdateUser(UpdateUser { user })) = next_message(&mut stream).await else {
            panic!("expected the queued update, not a full sync");
        };
        assert_eq!(user.username, "carol");
        run.abort();
    }

    #[tokio::test]
    async fn sync_request_from_origin_closes_connection() {
        let (client, mut dials, _world) = client("1.4.0", 0);
        let run = tokio::spawn({
            let client = client.clone();
            async move { client.run().await }
        });

        let origin = dials.recv().await.unwrap();
        let (mut sink, mut stream, _) = accept(origin, "1.4.0", "s1").await;
        let bogus = Message::SyncRoles(SyncExisting::default()).encode().unwrap();
        sink.send(Frame::Binary(bogus)).await.unwrap();

        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while next_message(&mut stream).await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());

        // The client redials.
        let redial = tokio::time::timeout(Duration::from_secs(2), dials.recv()).await;
        assert!(redial.unwrap().is_some());
        run.abort();
    }

    #[tokio::test]
    async fn run_twice_is_rejected() {
        let (client, mut dials, _world) = client("1.3.0", 0);
        let first = tokio::spawn({
            let client = client.clone();
            async move { client.run().await }
        });
        let origin = dials.recv().await.unwrap();

        let second = client.run().await;
        assert!(matches!(second, Err(LeafError::AlreadyRunning)));

        let _conn = accept(origin, "1.4.0", "s1").await;
        assert!(first.await.unwrap().is_err());
    }
}
