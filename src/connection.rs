//! Connection establishment with bounded retry.
//!
//! Startup runs three steps in order, each of which can abort it:
//!
//! 1. [`acquire_configuration`]: fetch server parameters, retried.
//! 2. [`resolve_identity`]: stored credential or one identity request, never retried.
//! 3. [`open_stream`]: open the game stream, retried.
//!
//! No stream is opened when configuration or identity fails. Once open, a
//! dropped stream is terminal for the session; it is never reopened.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{ClientConfig, RetryPolicy};
use crate::error::{PickupError, Result};
use crate::protocol::PlayerId;
use crate::session::{DEFAULT_GRID_SIZE, MAX_GRID_SIZE};
use crate::transport::Transport;

/// Lifecycle of the game stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Startup in progress; nothing may be sent.
    Connecting,
    /// The stream is open; intents may be sent.
    Open,
    /// The stream was closed cleanly (server close or local shutdown).
    Closed,
    /// The stream could not be opened or broke with an error.
    Failed,
}

impl ConnectionState {
    /// Move and item requests may only be sent while open.
    pub fn can_send(self) -> bool {
        matches!(self, Self::Open)
    }
}

// ── Server configuration ────────────────────────────────────────────

/// WebSocket scheme advertised by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamScheme {
    #[default]
    Ws,
    Wss,
}

impl StreamScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Server-provided parameters (`GET /v1/config/js`).
///
/// Unknown keys in the server's settings dump are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host (and port) of the game server, without scheme.
    pub endpoint: String,
    #[serde(
        rename = "ws",
        alias = "transport_scheme",
        alias = "transport-scheme",
        default
    )]
    pub scheme: StreamScheme,
    #[serde(rename = "gridsize", alias = "grid_size", default = "default_grid_size")]
    pub grid_size: i32,
}

fn default_grid_size() -> i32 {
    DEFAULT_GRID_SIZE
}

impl ServerConfig {
    /// URL of the game stream, `{scheme}://{endpoint}/v1/game/ws`.
    pub fn stream_url(&self) -> String {
        format!(
            "{}://{}/v1/game/ws",
            self.scheme.as_str(),
            self.endpoint.trim_end_matches('/')
        )
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(PickupError::MalformedMessage(
                "server config has an empty endpoint".into(),
            ));
        }
        if !(1..=MAX_GRID_SIZE).contains(&self.grid_size) {
            return Err(PickupError::MalformedMessage(format!(
                "server config grid size {} outside 1..={MAX_GRID_SIZE}",
                self.grid_size
            )));
        }
        Ok(())
    }
}

// ── Collaborator seams ──────────────────────────────────────────────

/// Source of server configuration and player identity.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch server parameters. Idempotent; may be retried.
    async fn fetch_config(&self) -> Result<ServerConfig>;

    /// Ask the server who the stored credential belongs to.
    ///
    /// `Ok(None)` means the server answered but knows no identity.
    async fn fetch_identity(&self) -> Result<Option<PlayerId>>;
}

/// Opens game streams.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    /// Make one attempt to open the stream at `url`, resolving once it is ready.
    async fn connect(&self, url: &str) -> Result<Self::Transport>;
}

// ── Steps ───────────────────────────────────────────────────────────

async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    what: &'static str,
    mut op: F,
) -> std::result::Result<T, (u32, PickupError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(what, attempt, attempts, error = %e, "attempt failed");
                if attempt >= attempts {
                    return Err((attempts, e));
                }
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Fetch and validate server configuration under `policy`.
///
/// # Errors
///
/// Returns [`PickupError::ConfigUnavailable`] once every attempt has failed.
pub async fn acquire_configuration(
    source: &impl ConfigSource,
    policy: RetryPolicy,
) -> Result<ServerConfig> {
    retry(policy, "fetch configuration", || async {
        let config = source.fetch_config().await?;
        config.validate()?;
        Ok(config)
    })
    .await
    .map_err(|(attempts, last)| PickupError::ConfigUnavailable {
        attempts,
        last_error: last.to_string(),
    })
}

/// Resolve the local player's identity.
///
/// A non-empty stored identity wins; otherwise one identity request is made.
///
/// # Errors
///
/// Returns [`PickupError::IdentityMissing`] when neither yields an identity.
pub async fn resolve_identity(
    stored: Option<&str>,
    source: &impl ConfigSource,
) -> Result<PlayerId> {
    if let Some(id) = stored.filter(|id| !id.trim().is_empty()) {
        return Ok(id.to_owned());
    }
    match source.fetch_identity().await {
        Ok(Some(id)) if !id.trim().is_empty() => Ok(id),
        Ok(_) => Err(PickupError::IdentityMissing),
        Err(e) => {
            warn!(error = %e, "identity request failed");
            Err(PickupError::IdentityMissing)
        }
    }
}

/// Open the game stream at `url` under `policy`.
///
/// # Errors
///
/// Returns [`PickupError::ConnectionUnavailable`] once every attempt has failed.
pub async fn open_stream<C: Connector>(
    connector: &C,
    url: &str,
    policy: RetryPolicy,
) -> Result<C::Transport> {
    retry(policy, "open stream", || connector.connect(url))
        .await
        .map_err(|(attempts, last)| PickupError::ConnectionUnavailable {
            attempts,
            last_error: last.to_string(),
        })
}

/// Everything startup produced.
#[derive(Debug)]
pub struct Established<T> {
    pub server: ServerConfig,
    pub player_id: PlayerId,
    pub transport: T,
}

/// Run configuration → identity → stream, aborting at the first fatal error.
///
/// # Errors
///
/// [`PickupError::ConfigUnavailable`], [`PickupError::IdentityMissing`] or
/// [`PickupError::ConnectionUnavailable`]. The error is logged once here.
pub async fn establish<S, C>(
    config: &ClientConfig,
    source: &S,
    connector: &C,
) -> Result<Established<C::Transport>>
where
    S: ConfigSource,
    C: Connector,
{
    let result = async {
        let server = acquire_configuration(source, config.config_retry).await?;
        let player_id = resolve_identity(config.player_id.as_deref(), source).await?;
        let url = server.stream_url();
        let transport = open_stream(connector, &url, config.stream_retry).await?;
        info!(%url, player_id = %player_id, grid_size = server.grid_size, "game stream open");
        Ok::<_, PickupError>(Established {
            server,
            player_id,
            transport,
        })
    }
    .await;

    if let Err(e) = &result {
        error!(error = %e, "startup aborted");
    }
    result
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
    use std::time::Duration;

    #[test]
    fn server_config_from_settings_dump() {
        let raw = r#"{"endpoint":"game.example:8080","ws":"wss","gridsize":20,"domain":"example"}"#;
        let config: ServerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.scheme, StreamScheme::Wss);
        assert_eq!(config.grid_size, 20);
        assert_eq!(config.stream_url(), "wss://game.example:8080/v1/game/ws");
    }

    #[test]
    fn server_config_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"endpoint":"h"}"#).unwrap();
        assert_eq!(config.scheme, StreamScheme::Ws);
        assert_eq!(config.grid_size, DEFAULT_GRID_SIZE);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ServerConfig {
            endpoint: "h".into(),
            scheme: StreamScheme::Ws,
            grid_size: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn only_open_can_send() {
        assert!(ConnectionState::Open.can_send());
        assert!(!ConnectionState::Connecting.can_send());
        assert!(!ConnectionState::Closed.can_send());
        assert!(!ConnectionState::Failed.can_send());
    }

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let mut calls = 0;
        let result = retry(RetryPolicy::new(5, Duration::ZERO), "test", || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(PickupError::Timeout)
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn retry_reports_attempt_count() {
        let result: std::result::Result<(), _> =
            retry(RetryPolicy::new(2, Duration::ZERO), "test", || async {
                Err(PickupError::Timeout)
            })
            .await;
        let (attempts, last) = result.unwrap_err();
        assert_eq!(attempts, 2);
        assert!(matches!(last, PickupError::Timeout));
    }
}
