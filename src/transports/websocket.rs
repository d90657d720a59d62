//! WebSocket transport using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the game stream over a WebSocket. Both
//! `ws://` and `wss://` are supported; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream). The server
//! authenticates the upgrade request by its `jwt` and `roomId` cookies, so
//! [`WebSocketTransport::connect`] takes an optional `Cookie` header value.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), pickup_client::PickupError> {
//! use pickup_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect(
//!     "ws://localhost:8080/v1/game/ws",
//!     Some("jwt=eyJ...; roomId=A"),
//! )
//! .await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("received: {frame}");
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::config::ClientConfig;
use crate::connection::Connector;
use crate::error::PickupError;
use crate::transport::Transport;

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// [`recv`](Transport::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket to `url`, sending `cookie` as the `Cookie` header.
    ///
    /// # Errors
    ///
    /// [`PickupError::Io`] if the URL or cookie is invalid or the connection
    /// cannot be established. I/O error kinds are preserved; everything else
    /// maps to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str, cookie: Option<&str>) -> Result<Self, PickupError> {
        tracing::debug!(url = %url, with_cookie = cookie.is_some(), "connecting to game stream");

        let mut request = url.into_client_request().map_err(handshake_error)?;
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(cookie).map_err(|e| {
                PickupError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(handshake_error)?;

        tracing::info!(url = %url, "game stream established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) with a deadline.
    ///
    /// # Errors
    ///
    /// [`PickupError::Timeout`] if the deadline elapses, or any error
    /// [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        cookie: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, PickupError> {
        tokio::time::timeout(timeout, Self::connect(url, cookie))
            .await
            .map_err(|_| PickupError::Timeout)?
    }
}

fn handshake_error(e: tokio_tungstenite::tungstenite::Error) -> PickupError {
    let kind = match &e {
        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    PickupError::Io(std::io::Error::new(kind, e))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), PickupError> {
        if self.closed {
            return Err(PickupError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| PickupError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, PickupError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(PickupError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("unexpected binary frame on game stream, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("raw frame on game stream, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), PickupError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| PickupError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens [`WebSocketTransport`]s with a fixed cookie and handshake timeout.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    cookie: Option<String>,
    timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(cookie: Option<String>, timeout: Duration) -> Self {
        Self { cookie, timeout }
    }

    /// Connector carrying the credential and room cookies of `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.cookie_header(), config.request_timeout)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &str) -> Result<WebSocketTransport, PickupError> {
        WebSocketTransport::connect_with_timeout(url, self.cookie.as_deref(), self.timeout).await
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_send_debug<T: Send + std::fmt::Debug>() {}
        assert_send_debug::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PickupError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/v1/game/ws", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PickupError::Io(_)));
    }

    #[tokio::test]
    async fn connect_rejects_cookie_with_newline() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/v1/game/ws", Some("jwt=a\nb"))
            .await
            .unwrap_err();
        assert!(matches!(err, PickupError::Io(_)));
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection. Returns the stream URL.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/v1/game/ws")
    }

    #[tokio::test]
    async fn cookie_header_reaches_the_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cookie_tx, cookie_rx) = oneshot::channel::<Option<String>>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let cookie = req
                    .headers()
                    .get("cookie")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let _ = cookie_tx.send(cookie);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let url = format!("ws://{addr}/v1/game/ws");
        let _transport = WebSocketTransport::connect(&url, Some("jwt=t0k; roomId=A"))
            .await
            .unwrap();
        assert_eq!(
            cookie_rx.await.unwrap().as_deref(),
            Some("jwt=t0k; roomId=A")
        );
    }

    #[tokio::test]
    async fn recv_receives_text_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"score"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url, None).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"score"}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url, None).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url, None).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, PickupError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_times_out_on_unroutable_host() {
        let connector = WebSocketConnector::new(None, Duration::from_millis(50));
        let err = connector
            .connect("ws://192.0.2.1:1/v1/game/ws")
            .await
            .unwrap_err();
        assert!(matches!(err, PickupError::Timeout));
    }

    #[tokio::test]
    async fn connector_echo_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(None, Duration::from_secs(5));
        let mut transport = connector.connect(&url).await.unwrap();
        transport.send("echo".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "echo");
    }
}
