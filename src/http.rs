//! HTTP collaborator using `reqwest`.
//!
//! [`HttpConfigSource`] implements [`ConfigSource`] against the game server's
//! REST routes and also fetches lobby room status:
//!
//! | Route | Result |
//! |---|---|
//! | `GET /v1/config/js` | [`ServerConfig`] |
//! | `GET /v1/user/id` | player identity (by `jwt` cookie) |
//! | `GET /v1/game/room-status?roomId=R` | [`RoomStatus`] |

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::{ConfigSource, ServerConfig};
use crate::error::{PickupError, Result};
use crate::lobby::RoomStatus;
use crate::protocol::PlayerId;

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    #[serde(default)]
    user_id: Option<String>,
}

/// REST client for configuration, identity and room status.
#[derive(Debug, Clone)]
pub struct HttpConfigSource {
    client: reqwest::Client,
    base_url: String,
    cookie: Option<String>,
}

impl HttpConfigSource {
    /// Build a source for `config.base_url`, carrying its cookies and
    /// request timeout.
    ///
    /// # Errors
    ///
    /// [`PickupError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PickupError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            cookie: config.cookie_header(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.base_url));
        match &self.cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> Result<reqwest::Response> {
        debug!(path, "HTTP GET");
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                PickupError::Timeout
            } else {
                PickupError::Http(format!("GET {path}: {e}"))
            }
        })
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(PickupError::Http(format!("GET {path}: HTTP {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PickupError::Http(format!("GET {path}: invalid body: {e}")))
    }

    /// Fetch the lobby status of `room_id`.
    ///
    /// # Errors
    ///
    /// [`PickupError::Http`] on transport failure, a non-success status
    /// (unknown room, missing id) or an undecodable body.
    pub async fn room_status(&self, room_id: &str) -> Result<RoomStatus> {
        let path = "/v1/game/room-status";
        let response = self
            .send(self.get(path).query(&[("roomId", room_id)]), path)
            .await?;
        Self::read_json(response, path).await
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch_config(&self) -> Result<ServerConfig> {
        let path = "/v1/config/js";
        let response = self.send(self.get(path), path).await?;
        Self::read_json(response, path).await
    }

    async fn fetch_identity(&self) -> Result<Option<PlayerId>> {
        let path = "/v1/user/id";
        let response = self.send(self.get(path), path).await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!(status = %response.status(), "credential not accepted");
            return Ok(None);
        }
        let body: IdentityResponse = Self::read_json(response, path).await?;
        Ok(body.user_id.filter(|id| !id.is_empty()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Answer one HTTP request with `status` and a JSON `body`. Resolves to
    /// the raw request head the client sent.
    async fn one_shot_server(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (head_tx, head_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !String::from_utf8_lossy(&buf[..read]).contains("\r\n\r\n") {
                let n = tcp.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
            }
            let _ = head_tx.send(String::from_utf8_lossy(&buf[..read]).into_owned());
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            tcp.write_all(response.as_bytes()).await.unwrap();
            tcp.shutdown().await.unwrap();
        });

        (format!("http://{addr}"), head_rx)
    }

    #[tokio::test]
    async fn fetches_server_config() {
        let (base, _head) = one_shot_server(
            "200 OK",
            r#"{"endpoint":"localhost:8080","ws":"ws","gridsize":15,"domain":"localhost"}"#,
        )
        .await;
        let source = HttpConfigSource::new(&ClientConfig::new(base)).unwrap();
        let config = source.fetch_config().await.unwrap();
        assert_eq!(config.stream_url(), "ws://localhost:8080/v1/game/ws");
        assert_eq!(config.grid_size, 15);
    }

    #[tokio::test]
    async fn identity_request_carries_cookie() {
        let (base, head) = one_shot_server("200 OK", r#"{"user_id":"p-42"}"#).await;
        let config = ClientConfig::new(base).with_auth_token("t0k").with_room_id("A");
        let source = HttpConfigSource::new(&config).unwrap();
        assert_eq!(source.fetch_identity().await.unwrap().as_deref(), Some("p-42"));

        let head = head.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /v1/user/id "));
        assert!(head.contains("cookie: jwt=t0k; roomid=a"));
    }

    #[tokio::test]
    async fn unauthorized_identity_is_none() {
        let (base, _head) = one_shot_server("401 Unauthorized", r#"{"error":"unauthorized"}"#).await;
        let source = HttpConfigSource::new(&ClientConfig::new(base)).unwrap();
        assert!(source.fetch_identity().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_is_http_error() {
        let (base, _head) = one_shot_server("500 Internal Server Error", "{}").await;
        let source = HttpConfigSource::new(&ClientConfig::new(base)).unwrap();
        assert!(matches!(
            source.fetch_config().await.unwrap_err(),
            PickupError::Http(_)
        ));
    }

    #[tokio::test]
    async fn room_status_sends_room_query() {
        let (base, head) =
            one_shot_server("200 OK", r#"{"state":"waiting","nextRoundStart":1714564830000}"#).await;
        let source = HttpConfigSource::new(&ClientConfig::new(base)).unwrap();
        let status = source.room_status("B").await.unwrap();
        assert_eq!(status.next_round_start, 1_714_564_830_000);
        assert!(head.await.unwrap().starts_with("GET /v1/game/room-status?roomId=B "));
    }
}
