//! Error types for the Pickup client.

use thiserror::Error;

/// Errors that can occur while starting or running the Pickup client.
///
/// Startup failures ([`ConfigUnavailable`](PickupError::ConfigUnavailable),
/// [`IdentityMissing`](PickupError::IdentityMissing),
/// [`ConnectionUnavailable`](PickupError::ConnectionUnavailable)) abort
/// initialization. Per-frame failures ([`MalformedMessage`](PickupError::MalformedMessage),
/// [`UnknownMessageType`](PickupError::UnknownMessageType)) are logged by the
/// client loop and never stop it.
#[derive(Debug, Error)]
pub enum PickupError {
    /// Server configuration could not be retrieved within the retry budget.
    #[error("server configuration unavailable after {attempts} attempt(s): {last_error}")]
    ConfigUnavailable {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },

    /// The game stream could not be opened within the retry budget.
    #[error("game stream unavailable after {attempts} attempt(s): {last_error}")]
    ConnectionUnavailable {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },

    /// No player identity could be obtained. Never retried.
    #[error("player identity missing")]
    IdentityMissing,

    /// An inbound frame was not a valid `{type, content}` envelope or its
    /// content did not match the declared type.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An inbound frame carried a `type` tag the client does not handle.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize an outbound message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open connection.
    #[error("not connected to server")]
    NotConnected,

    /// An HTTP collaborator request failed or returned a non-success status.
    #[error("http error: {0}")]
    Http(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Pickup client operations.
pub type Result<T> = std::result::Result<T, PickupError>;
