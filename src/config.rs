//! Client configuration.
//!
//! [`ClientConfig`] carries everything needed before the server has been
//! contacted: where the HTTP collaborator lives, the stored credential, and
//! the retry budgets for configuration retrieval and stream opening.

use std::time::Duration;

use crate::protocol::PlayerId;

/// Default HTTP base URL when `PICKUP_SERVER_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for a single HTTP request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-delay bounded retry.
///
/// `attempts` counts every try including the first; values below 1 are
/// clamped to 1. There is no backoff: the same `delay` separates all tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Budget for configuration retrieval: 3 attempts, 1 second apart.
    pub fn config_default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Budget for opening the game stream: 5 attempts, 2 seconds apart.
    pub fn stream_default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Configuration for a Pickup client.
///
/// # Example
///
/// ```
/// use pickup_client::config::{ClientConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = ClientConfig::new("http://localhost:8080")
///     .with_auth_token("eyJhbGciOi...")
///     .with_room_id("A")
///     .with_config_retry(RetryPolicy::new(2, Duration::from_millis(500)));
/// assert_eq!(config.config_retry.attempts, 2);
/// assert_eq!(config.cookie_header().as_deref(), Some("jwt=eyJhbGciOi...; roomId=A"));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the HTTP collaborator, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Stored credential (JWT), sent as the `jwt` cookie.
    pub auth_token: Option<String>,
    /// Room to join, sent as the `roomId` cookie.
    pub room_id: Option<String>,
    /// Stored player identity. When absent it is requested from the server.
    pub player_id: Option<PlayerId>,
    /// Retry budget for configuration retrieval.
    pub config_retry: RetryPolicy,
    /// Retry budget for opening the game stream.
    pub stream_retry: RetryPolicy,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning)
    /// so the client loop never blocks. `Disconnected` is always delivered.
    /// Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the client loop gets to close the stream on shutdown before it
    /// is aborted.
    pub shutdown_timeout: Duration,
    /// Timeout for a single HTTP request or WebSocket handshake.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with the given base URL and default values.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            room_id: None,
            player_id: None,
            config_retry: RetryPolicy::config_default(),
            stream_retry: RetryPolicy::stream_default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Build a configuration from the environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `PICKUP_SERVER_URL` | `base_url` (default `http://localhost:8080`) |
    /// | `PICKUP_TOKEN` | `auth_token` |
    /// | `PICKUP_ROOM` | `room_id` |
    /// | `PICKUP_PLAYER_ID` | `player_id` |
    pub fn from_env() -> Self {
        let base_url = env_non_empty("PICKUP_SERVER_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let mut config = Self::new(base_url);
        config.auth_token = env_non_empty("PICKUP_TOKEN");
        config.room_id = env_non_empty("PICKUP_ROOM");
        config.player_id = env_non_empty("PICKUP_PLAYER_ID");
        config
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    #[must_use]
    pub fn with_player_id(mut self, player_id: impl Into<PlayerId>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    #[must_use]
    pub fn with_config_retry(mut self, policy: RetryPolicy) -> Self {
        self.config_retry = policy;
        self
    }

    #[must_use]
    pub fn with_stream_retry(mut self, policy: RetryPolicy) -> Self {
        self.stream_retry = policy;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// `Cookie` header value carrying the credential and room, if any.
    pub fn cookie_header(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(token) = &self.auth_token {
            parts.push(format!("jwt={token}"));
        }
        if let Some(room) = &self.room_id {
            parts.push(format!("roomId={room}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://example.test");
        assert_eq!(config.base_url, "http://example.test");
        assert!(config.auth_token.is_none());
        assert!(config.cookie_header().is_none());
        assert_eq!(config.config_retry, RetryPolicy::new(3, Duration::from_secs(1)));
        assert_eq!(config.stream_retry, RetryPolicy::new(5, Duration::from_secs(2)));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn retry_attempts_are_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = ClientConfig::new("http://x").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn cookie_with_token_only() {
        let config = ClientConfig::new("http://x").with_auth_token("t0k");
        assert_eq!(config.cookie_header().as_deref(), Some("jwt=t0k"));
    }
}
