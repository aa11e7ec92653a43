//! Leaf endpoint.

use crate::auth::AccessScope;
use crate::error::{OriginError, OriginResult};
use crate::handlers::{OriginContext, SessionHandler};
use crate::registry::Registration;
use crate::session::Session;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{future, SinkExt, StreamExt};
use outpost_protocol::{
    is_compatible, Connection, Frame, FrameStream, Message, ProtocolError, RegisterRequest,
    RegisterResponse, TransportError, LEAF_SERVER_PATH,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The origin server.
///
/// Exposes the leaf endpoint and runs the idle reaper.
///
/// # Example
///
/// ```no_run
/// use outpost_core::{MemoryRepository, RoleCache};
/// use outpost_origin::{OriginConfig, OriginContext, OriginServer};
/// use std::sync::Arc;
///
/// # async fn run() -> outpost_origin::OriginResult<()> {
/// let config = OriginConfig::default().with_leaf_secret("s3cret");
/// let repo = Arc::new(MemoryRepository::new());
/// let ctx = OriginContext::new(config, repo, Arc::new(RoleCache::new()));
/// OriginServer::new(Arc::new(ctx)).run().await
/// # }
/// ```
pub struct OriginServer {
    ctx: Arc<OriginContext>,
}

impl OriginServer {
    /// Creates a new server.
    pub fn new(ctx: Arc<OriginContext>) -> Self {
        Self { ctx }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Arc<OriginContext> {
        &self.ctx
    }

    /// Returns the router serving the leaf endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route(LEAF_SERVER_PATH, get(leaf_upgrade))
            .with_state(Arc::clone(&self.ctx))
    }

    /// Binds the configured address and serves until the listener fails.
    pub async fn run(self) -> OriginResult<()> {
        let listener = TcpListener::bind(self.ctx.config().bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves leaves on `listener`.
    pub async fn serve(self, listener: TcpListener) -> OriginResult<()> {
        info!(
            addr = %listener.local_addr()?,
            path = LEAF_SERVER_PATH,
            version = %self.ctx.config().version,
            "origin listening"
        );
        let reaper = spawn_reaper(Arc::clone(&self.ctx));
        let result = axum::serve(listener, self.router()).await;
        reaper.abort();
        result.map_err(OriginError::from)
    }
}

async fn leaf_upgrade(
    State(ctx): State<Arc<OriginContext>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let auth_ctx = Arc::clone(&ctx);
    let verdict =
        tokio::task::spawn_blocking(move || auth_ctx.authenticate(header.as_deref())).await;
    let scope = match verdict {
        Ok(Ok(scope)) => scope,
        Ok(Err(err)) if err.is_client_error() => {
            warn!(error = %err, "rejected leaf connection");
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
        Ok(Err(err)) => {
            warn!(error = %err, "failed to authenticate leaf");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(err) => {
            warn!(error = %err, "authentication task failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        match serve_connection(ctx, websocket_connection(socket), scope).await {
            Ok(()) => debug!("leaf connection closed"),
            Err(err) if err.is_client_error() => warn!(error = %err, "leaf connection rejected"),
            Err(err) => warn!(error = %err, "leaf connection failed"),
        }
    })
}

fn websocket_connection(socket: WebSocket) -> Connection {
    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(TransportError::io)
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_ws(frame))));
    let stream = stream.filter_map(|msg| future::ready(from_ws(msg)));
    Connection::new(Box::pin(sink), Box::pin(stream))
}

fn to_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Binary(bytes) => WsMessage::Binary(bytes),
        Frame::Ping(bytes) => WsMessage::Ping(bytes),
        Frame::Pong(bytes) => WsMessage::Pong(bytes),
        Frame::Close => WsMessage::Close(None),
    }
}

fn from_ws(msg: Result<WsMessage, axum::Error>) -> Option<Result<Frame, TransportError>> {
    match msg {
        Ok(WsMessage::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
        Ok(WsMessage::Ping(bytes)) => Some(Ok(Frame::Ping(bytes))),
        Ok(WsMessage::Pong(bytes)) => Some(Ok(Frame::Pong(bytes))),
        Ok(WsMessage::Close(_)) => Some(Ok(Frame::Close)),
        Ok(WsMessage::Text(_)) => Some(Err(TransportError::UnsupportedFrame("text"))),
        Err(err) => Some(Err(TransportError::io(err))),
    }
}

/// Serves one authenticated leaf connection until it closes.
///
/// Waits for REGISTER, registers or resumes the session, then handles
/// envelopes in arrival order. A version mismatch is answered with an
/// unsuccessful reply carrying the origin's version.
pub async fn serve_connection(
    ctx: Arc<OriginContext>,
    connection: Connection,
    scope: AccessScope,
) -> OriginResult<()> {
    let config = ctx.config();
    let (mut sink, mut stream) = connection.split();

    let request = tokio::time::timeout(config.handshake_timeout, read_register(&mut stream))
        .await
        .map_err(|_| OriginError::HandshakeTimeout)??;

    let location = if request.location.is_empty() {
        config.location.clone()
    } else {
        request.location.clone()
    };
    let reply = RegisterResponse {
        success: true,
        restricted_node: scope.is_restricted(),
        version: config.version.clone(),
        location: location.clone(),
        timezone: config.timezone.clone(),
        session_id: String::new(),
    };

    if !is_compatible(&config.version, &request.version) {
        let refusal = RegisterResponse {
            success: false,
            ..reply
        };
        let bytes = Message::encode_register_response(&refusal)?;
        let _ = sink.send(Frame::Binary(bytes)).await;
        let _ = sink.close().await;
        return Err(OriginError::VersionMismatch {
            origin: config.version.clone(),
            leaf: request.version,
        });
    }

    let Registration {
        session,
        connection_id,
        mut closed,
        resumed,
    } = ctx
        .registry()
        .register(&request.session_id, sink, location, scope, reply)
        .await?;
    debug!(
        session_id = %session.id(),
        connection_id,
        resumed,
        leaf_version = %request.version,
        "leaf connected"
    );

    let result = read_loop(&ctx, &session, &mut stream, &mut closed).await;

    if ctx
        .registry()
        .unregister_connection(session.id(), connection_id)
        .is_some()
    {
        session.close_link(connection_id).await;
        info!(session_id = %session.id(), "leaf disconnected");
    }
    result
}

async fn read_register(stream: &mut FrameStream) -> OriginResult<RegisterRequest> {
    loop {
        match stream.next().await {
            Some(Ok(Frame::Binary(bytes))) => {
                return match Message::decode(bytes)? {
                    Message::Register(request) => Ok(request),
                    other => Err(ProtocolError::UnexpectedCommand(other.command()).into()),
                };
            }
            Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => continue,
            Some(Ok(Frame::Close)) | None => return Err(TransportError::Closed.into()),
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

async fn read_loop(
    ctx: &OriginContext,
    session: &Session,
    stream: &mut FrameStream,
    closed: &mut oneshot::Receiver<()>,
) -> OriginResult<()> {
    let handler = SessionHandler::new(ctx, session);
    loop {
        let frame = tokio::select! {
            _ = &mut *closed => {
                debug!(session_id = %session.id(), "connection superseded");
                return Ok(());
            }
            frame = stream.next() => frame,
        };

        session.touch();
        match frame {
            None | Some(Ok(Frame::Close)) => return Ok(()),
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => {}
            Some(Ok(Frame::Binary(bytes))) => {
                let message = Message::decode(bytes)?;
                if let Err(err) = handler.handle(message).await {
                    if err.is_client_error() {
                        return Err(err);
                    }
                    warn!(session_id = %session.id(), error = %err, "failed to handle envelope");
                }
            }
        }
    }
}

/// Periodically unregisters sessions whose leaves stopped sending keepalives.
pub fn spawn_reaper(ctx: Arc<OriginContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = ctx.config().reap_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let reaped = ctx.registry().reap_idle(ctx.config().idle_timeout);
            if !reaped.is_empty() {
                info!(count = reaped.len(), "reaped idle sessions");
            }
        }
    })
}
