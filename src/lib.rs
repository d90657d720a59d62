//! # Pickup Client
//!
//! Client-side sync engine for Pickup, a round-based grid game where players
//! walk a square board collecting coins and diamonds around obstacles.
//!
//! The crate keeps a local view of the game consistent with the server's
//! authoritative state:
//!
//! - **Optimistic movement**: moves apply immediately and are reconciled
//!   against the server's verdicts ([`movement`])
//! - **Round lifecycle**: `waiting → preparing → playing → ended → cleanup`
//!   with input gating, overlays and a skew-corrected countdown ([`round`])
//! - **Connection management**: configuration, identity and stream opening
//!   with bounded retry ([`connection`])
//! - **Message dispatch**: a closed, serde-tagged message set routed by an
//!   exhaustive match ([`dispatch`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-config"))]
//! # async fn run() -> Result<(), pickup_client::PickupError> {
//! use pickup_client::{ClientConfig, GameClient, GameEvent, HttpConfigSource, WebSocketConnector};
//!
//! let config = ClientConfig::from_env();
//! let source = HttpConfigSource::new(&config)?;
//! let connector = WebSocketConnector::from_config(&config);
//! let (mut client, mut events) = GameClient::connect(&config, &source, &connector).await?;
//!
//! client.press_key("ArrowRight")?;
//! while let Some(event) = events.recv().await {
//!     if let GameEvent::Disconnected { .. } = event {
//!         break;
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod board;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
#[cfg(feature = "http-config")]
pub mod http;
pub mod lobby;
pub mod movement;
pub mod protocol;
pub mod registry;
pub mod round;
pub mod session;
pub mod transport;
pub mod transports;

pub use client::GameClient;
pub use config::{ClientConfig, RetryPolicy};
pub use connection::{ConfigSource, ConnectionState, Connector, ServerConfig};
pub use error::PickupError;
pub use event::{GameEvent, Notice, NoticeKind};
#[cfg(feature = "http-config")]
pub use http::HttpConfigSource;
pub use movement::{Direction, PlayerAction};
pub use protocol::{ClientMessage, Position, RoundPhase, ServerMessage};
pub use session::{GameSession, SessionSnapshot};
pub use transport::Transport;
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
