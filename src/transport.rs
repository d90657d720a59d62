//! Transport abstraction for the game stream.
//!
//! The [`Transport`] trait is a bidirectional channel of JSON text frames
//! between the client and the game server. Opening a stream is not part of
//! the trait; that is the job of a [`Connector`](crate::connection::Connector).
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use pickup_client::error::PickupError;
//! use pickup_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), PickupError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, PickupError>> {
//!         // None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), PickupError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::PickupError;

/// A bidirectional text frame transport.
///
/// Each [`send`](Transport::send) transmits one complete JSON envelope and each
/// [`recv`](Transport::recv) yields one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the client loop polls it
/// inside `tokio::select!`, and a cancelled call must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// [`PickupError::TransportSend`] if the frame could not be written, or
    /// [`PickupError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), PickupError>;

    /// Receive the next text frame.
    ///
    /// - `Some(Ok(text))`: a frame arrived
    /// - `Some(Err(e))`: the stream broke
    /// - `None`: the server closed the stream cleanly
    async fn recv(&mut self) -> Option<Result<String, PickupError>>;

    /// Close the stream gracefully. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails; resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), PickupError>;
}
