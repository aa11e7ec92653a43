//! Dialing the origin.
//!
//! [`Connector`] abstracts how a connection is opened so that the client
//! can run over a real WebSocket or an in-memory pair in tests.

use crate::config::LeafConfig;
use crate::error::{LeafError, LeafResult};
use futures::future::{self, BoxFuture};
use futures::{SinkExt, StreamExt};
use outpost_protocol::{Connection, Frame, TransportError, LEAF_SERVER_PATH};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Opens connections to the origin.
pub trait Connector: Send + Sync {
    /// Dials the origin and returns an open connection.
    fn dial(&self) -> BoxFuture<'_, LeafResult<Connection>>;
}

/// Builds the WebSocket URL of the origin's leaf endpoint.
///
/// `http` maps to `ws` and `https` to `wss`; WebSocket URLs pass through.
pub fn leaf_endpoint(origin_url: &str) -> LeafResult<String> {
    let base = origin_url.trim().trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("wss://") || base.starts_with("ws://") {
        base.to_string()
    } else {
        return Err(LeafError::InvalidUrl(origin_url.to_string()));
    };
    if base.ends_with(LEAF_SERVER_PATH) {
        Ok(base)
    } else {
        Ok(format!("{base}{LEAF_SERVER_PATH}"))
    }
}

/// Dials the origin over WebSocket with a bearer credential.
pub struct WebSocketConnector {
    url: String,
    secret: String,
    tls_skip_verify: bool,
    timeout: Duration,
}

impl WebSocketConnector {
    /// Creates a connector from the leaf configuration.
    pub fn new(config: &LeafConfig) -> LeafResult<Self> {
        Ok(Self {
            url: leaf_endpoint(&config.origin_url)?,
            secret: config.secret.clone(),
            tls_skip_verify: config.tls_skip_verify,
            timeout: config.handshake_timeout,
        })
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> LeafResult<Connection> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| LeafError::InvalidUrl(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.secret))
            .map_err(|_| LeafError::Unauthorized)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let tls = if self.tls_skip_verify {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| LeafError::Dial(e.to_string()))?;
            Some(tokio_tungstenite::Connector::NativeTls(connector))
        } else {
            None
        };

        debug!(url = %self.url, "dialing origin");
        let dial = tokio_tungstenite::connect_async_tls_with_config(request, None, false, tls);
        let (stream, _response) = tokio::time::timeout(self.timeout, dial)
            .await
            .map_err(|_| LeafError::Timeout)?
            .map_err(dial_error)?;
        Ok(websocket_connection(stream))
    }
}

impl Connector for WebSocketConnector {
    fn dial(&self) -> BoxFuture<'_, LeafResult<Connection>> {
        Box::pin(self.open())
    }
}

fn dial_error(err: tungstenite::Error) -> LeafError {
    match &err {
        tungstenite::Error::Http(response) if response.status() == StatusCode::UNAUTHORIZED => {
            LeafError::Unauthorized
        }
        _ => LeafError::Dial(err.to_string()),
    }
}

fn websocket_connection(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Connection {
    let (sink, stream) = stream.split();
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

fn from_ws(msg: Result<WsMessage, tungstenite::Error>) -> Option<Result<Frame, TransportError>> {
    match msg {
        Ok(WsMessage::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
        Ok(WsMessage::Ping(bytes)) => Some(Ok(Frame::Ping(bytes))),
        Ok(WsMessage::Pong(bytes)) => Some(Ok(Frame::Pong(bytes))),
        Ok(WsMessage::Close(_)) => Some(Ok(Frame::Close)),
        Ok(WsMessage::Text(_)) => Some(Err(TransportError::UnsupportedFrame("text"))),
        Ok(WsMessage::Frame(_)) => None,
        Err(tungstenite::Error::ConnectionClosed) => None,
        Err(err) => Some(Err(TransportError::io(err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_schemes() {
        assert_eq!(
            leaf_endpoint("http://origin:8080").unwrap(),
            "ws://origin:8080/api/v1/leaf-server"
        );
        assert_eq!(
            leaf_endpoint("https://origin.example.com/").unwrap(),
            "wss://origin.example.com/api/v1/leaf-server"
        );
        assert_eq!(
            leaf_endpoint("wss://origin/api/v1/leaf-server").unwrap(),
            "wss://origin/api/v1/leaf-server"
        );
    }

    #[test]
    fn unknown_scheme_is_fatal() {
        let err = leaf_endpoint("ftp://origin").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn frames_map_both_ways() {
        assert_eq!(
            from_ws(Ok(to_ws(Frame::Binary(vec![1])))),
            Some(Ok(Frame::Binary(vec![1])))
        );
        assert_eq!(from_ws(Ok(to_ws(Frame::Close))), Some(Ok(Frame::Close)));
        assert_eq!(
            from_ws(Ok(WsMessage::Text("hi".into()))),
            Some(Err(TransportError::UnsupportedFrame("text")))
        );
    }

    #[tokio::test]
    async fn refused_dial_is_retryable() {
        let config = LeafConfig::new("http://127.0.0.1:1", "secret")
            .with_handshake_timeout(Duration::from_secs(2));
        let connector = WebSocketConnector::new(&config).unwrap();
        let err = connector.dial().await.unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
