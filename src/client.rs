//! Async game client.
//!
//! [`GameClient`] is a thin handle that talks to a background session loop
//! over an unbounded MPSC channel. The loop is the only owner of the
//! [`GameSession`]: it applies inbound frames and local key actions one at a
//! time, so handlers never race. Collaborators observe the session through
//! the bounded [`GameEvent`] channel returned from [`GameClient::start`] and
//! through [`SessionSnapshot`]s published on a `watch` channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env();
//! let source = HttpConfigSource::new(&config)?;
//! let connector = WebSocketConnector::from_config(&config);
//! let (client, mut events) = GameClient::connect(&config, &source, &connector).await?;
//!
//! client.press_key("ArrowRight")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GameEvent::PhaseChanged { phase, .. } => { /* … */ }
//!         GameEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::connection::{self, ConfigSource, ConnectionState, Connector};
use crate::dispatch;
use crate::error::{PickupError, Result};
use crate::event::GameEvent;
use crate::movement::PlayerAction;
use crate::protocol::{ClientMessage, PlayerId};
use crate::session::{GameSession, SessionSnapshot};
use crate::transport::Transport;

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running game session.
///
/// Created by [`GameClient::start`] (with an already-open transport) or
/// [`GameClient::connect`] (which runs startup first). Methods queue a
/// command for the session loop and return immediately.
pub struct GameClient {
    self_id: PlayerId,
    cmd_tx: mpsc::UnboundedSender<PlayerAction>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    connected: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl GameClient {
    /// Start the session loop over an open `transport`.
    ///
    /// The loop marks the connection open and emits [`GameEvent::Connected`].
    /// The player's start cell is whatever the server first reports for
    /// `self_id`; nothing is sent until a key is pressed. `grid_size` is
    /// clamped to `1..=MAX_GRID_SIZE`.
    ///
    /// Returns the handle and the event receiver. Events stop after
    /// [`GameEvent::Disconnected`].
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        self_id: impl Into<PlayerId>,
        grid_size: i32,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<GameEvent>) {
        let self_id = self_id.into();
        let session = GameSession::new(self_id.clone(), grid_size);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<PlayerAction>();
        let (event_tx, event_rx) = mpsc::channel::<GameEvent>(config.event_channel_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let connected = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(session_loop(
            transport,
            session,
            cmd_rx,
            Outlets {
                events: event_tx,
                snapshots: snapshot_tx,
                connected: Arc::clone(&connected),
            },
            shutdown_rx,
        ));

        let client = Self {
            self_id,
            cmd_tx,
            snapshot_rx,
            connected,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    /// Run startup (configuration, identity, stream) and start the session.
    ///
    /// # Errors
    ///
    /// [`PickupError::ConfigUnavailable`], [`PickupError::IdentityMissing`] or
    /// [`PickupError::ConnectionUnavailable`]. No session is started then.
    pub async fn connect<S, C>(
        config: &ClientConfig,
        source: &S,
        connector: &C,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)>
    where
        S: ConfigSource,
        C: Connector,
    {
        let established = connection::establish(config, source, connector).await?;
        Ok(Self::start(
            established.transport,
            established.player_id,
            established.server.grid_size,
            config,
        ))
    }

    // ── Input ───────────────────────────────────────────────────────

    /// Queue a key action for the session loop.
    ///
    /// # Errors
    ///
    /// [`PickupError::NotConnected`] once the stream has closed.
    pub fn send_action(&self, action: PlayerAction) -> Result<()> {
        if !self.is_connected() {
            return Err(PickupError::NotConnected);
        }
        self.cmd_tx
            .send(action)
            .map_err(|_| PickupError::NotConnected)
    }

    /// Translate a key name (`"ArrowUp"`, `" "`, …) and queue it.
    ///
    /// Returns `Ok(false)` for keys that map to no action.
    ///
    /// # Errors
    ///
    /// [`PickupError::NotConnected`] once the stream has closed.
    pub fn press_key(&self, key: &str) -> Result<bool> {
        match PlayerAction::from_key(key) {
            Some(action) => self.send_action(action).map(|()| true),
            None => Ok(false),
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Latest published snapshot of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A receiver that is notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot_rx.borrow().connection
    }

    /// `true` until the stream closes or the client shuts down.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Close the stream and stop the session loop.
    ///
    /// The loop gets `shutdown_timeout` to close the transport and deliver
    /// [`GameEvent::Disconnected`]; after that it is aborted.
    pub async fn shutdown(&mut self) {
        debug!("GameClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("self_id", &self.self_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Where the session loop publishes what happened.
struct Outlets {
    events: mpsc::Sender<GameEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
    connected: Arc<AtomicBool>,
}

impl Outlets {
    /// Publish a fresh snapshot, then forward pending events.
    ///
    /// The snapshot goes first so a consumer reacting to an event already
    /// sees the state that produced it.
    fn publish(&self, session: &mut GameSession) {
        self.snapshots.send_replace(session.snapshot());
        for event in session.drain_events() {
            emit_event(&self.events, event);
        }
    }

    /// Mark the session finished and deliver the final `Disconnected`.
    async fn finish(&self, session: &mut GameSession, state: ConnectionState, reason: Option<String>) {
        self.connected.store(false, Ordering::Release);
        session.set_connection_state(state);
        self.publish(session);
        emit_disconnected(&self.events, reason).await;
    }
}

/// Multiplexes key commands, the shutdown signal and inbound frames.
///
/// Exits when the handle is dropped or shut down, the server closes the
/// stream, or the stream breaks. The stream is never reopened.
async fn session_loop(
    mut transport: impl Transport,
    mut session: GameSession,
    mut cmd_rx: mpsc::UnboundedReceiver<PlayerAction>,
    outlets: Outlets,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(self_id = session.self_id(), "session loop started");

    session.set_connection_state(ConnectionState::Open);
    session.emit(GameEvent::Connected);
    // The start cell arrives as the server's first self `playerPosition`.
    outlets.publish(&mut session);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(action) => {
                        if let Some(message) = session.handle_action(action) {
                            if let Err(e) = send_message(&mut transport, &message).await {
                                error!("transport send error: {e}");
                                outlets.finish(
                                    &mut session,
                                    ConnectionState::Failed,
                                    Some(format!("transport send error: {e}")),
                                ).await;
                                break;
                            }
                        }
                        outlets.publish(&mut session);
                    }
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        let _ = transport.close().await;
                        outlets.finish(
                            &mut session,
                            ConnectionState::Closed,
                            Some("client shut down".into()),
                        ).await;
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                outlets.finish(
                    &mut session,
                    ConnectionState::Closed,
                    Some("client shut down".into()),
                ).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        if dispatch::on_frame(&mut session, &text, Utc::now()) {
                            outlets.publish(&mut session);
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        outlets.finish(
                            &mut session,
                            ConnectionState::Failed,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        info!("game stream closed by server");
                        outlets.finish(&mut session, ConnectionState::Closed, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("session loop exited");
}

async fn send_message(transport: &mut impl Transport, message: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(message)?;
    debug!(kind = message_kind(message), "sending client message");
    transport.send(json).await
}

fn message_kind(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::PlayerPosition(_) => "playerPosition",
        ClientMessage::ItemAction(_) => "itemAction",
    }
}

/// Forward an event without blocking. Dropped with a warning when the
/// channel is full.
fn emit_event(event_tx: &mpsc::Sender<GameEvent>, event: GameEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {:?}", dropped);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// `Disconnected` is the last event and is awaited, never dropped.
async fn emit_disconnected(event_tx: &mpsc::Sender<GameEvent>, reason: Option<String>) {
    if event_tx
        .send(GameEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
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
    use crate::protocol::{MoveVerdict, Position, ServerMessage};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Records sent frames and replays scripted inbound ones.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, PickupError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, PickupError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), PickupError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, PickupError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), PickupError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new("http://localhost:8080")
    }

    #[tokio::test]
    async fn start_waits_for_the_server_start_cell() {
        let start = serde_json::to_string(&ServerMessage::PlayerPosition(MoveVerdict {
            id: "me".into(),
            valid: true,
            position: Position::new(4, 7),
            reason: None,
        }))
        .unwrap();
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Ok(start))]);
        let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

        assert_eq!(events.recv().await.unwrap(), GameEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            GameEvent::PlayerMoved {
                id: "me".into(),
                position: Position::new(4, 7),
                confirmed: true,
            }
        );
        assert!(sent.lock().unwrap().is_empty());
        assert!(client.snapshot().message_log.is_empty());
        assert_eq!(client.connection_state(), ConnectionState::Open);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn start_clamps_the_grid_size() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = GameClient::start(transport, "me", i32::MAX, &config());
        assert_eq!(client.snapshot().grid_size, crate::session::MAX_GRID_SIZE);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnected_on_server_close() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(last, Some(GameEvent::Disconnected { reason: None }));
        assert!(!client.is_connected());
        assert_eq!(client.connection_state(), ConnectionState::Closed);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn receive_error_marks_failed() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Err(
            PickupError::TransportReceive("reset".into()),
        ))]);
        let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

        while events.recv().await.is_some() {}
        assert_eq!(client.connection_state(), ConnectionState::Failed);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());
        let _ = events.recv().await; // Connected

        client.shutdown().await;

        assert!(closed.load(Ordering::Relaxed));
        assert!(matches!(
            client.press_key("ArrowRight"),
            Err(PickupError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn unmapped_key_is_ignored() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = GameClient::start(transport, "me", 15, &config());
        assert!(!client.press_key("q").unwrap());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn snapshot_follows_frames() {
        let obstacle = serde_json::to_string(&ServerMessage::ObstaclePosition(Position::new(3, 3)))
            .unwrap();
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(obstacle))]);
        let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

        loop {
            if let GameEvent::ObstacleAdded { position } = events.recv().await.unwrap() {
                assert_eq!(position, Position::new(3, 3));
                break;
            }
        }
        assert_eq!(client.snapshot().obstacles, vec![Position::new(3, 3)]);

        client.shutdown().await;
    }
}
