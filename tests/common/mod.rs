#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Pickup client integration tests.
//!
//! Provides a scripted [`MockTransport`], scripted startup collaborators and
//! helpers that build server frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pickup_client::protocol::{
    CountdownPayload, ErrorPayload, Item, ItemCollected, ItemKind, ItemPlacement, MoveVerdict,
    PlayerId, Position, RoundPhase, RoundStatePayload, ScoreUpdate, ServerMessage,
    WaitingNotificationPayload,
};
use pickup_client::{ConfigSource, Connector, PickupError, ServerConfig, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted server frames are consumed in order by `recv()`; every frame
/// the client sends is recorded in `sent`.
#[derive(Debug)]
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, PickupError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(
        incoming: Vec<Option<Result<String, PickupError>>>,
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
    async fn send(&mut self, message: String) -> Result<(), PickupError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, PickupError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Out of script: stay open until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), PickupError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// A transport fed from a channel, so tests can push frames on demand.
/// Dropping the sender closes the stream cleanly.
#[derive(Debug)]
pub struct ChannelTransport {
    incoming: tokio::sync::mpsc::UnboundedReceiver<String>,
    pub sent: Arc<StdMutex<Vec<String>>>,
}

impl ChannelTransport {
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedSender<String>,
        Arc<StdMutex<Vec<String>>>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = Self {
            incoming: rx,
            sent: Arc::clone(&sent),
        };
        (transport, tx, sent)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), PickupError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, PickupError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), PickupError> {
        self.incoming.close();
        Ok(())
    }
}

// ── Startup collaborators ───────────────────────────────────────────

/// Config source that fails the first `config_failures` fetches.
pub struct ScriptedSource {
    pub config: ServerConfig,
    pub config_failures: usize,
    pub identity: Result<Option<PlayerId>, ()>,
    pub config_calls: AtomicUsize,
    pub identity_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(config_failures: usize, identity: Option<&str>) -> Self {
        Self {
            config: ServerConfig {
                endpoint: "localhost:8080".into(),
                scheme: pickup_client::connection::StreamScheme::Ws,
                grid_size: 15,
            },
            config_failures,
            identity: Ok(identity.map(str::to_owned)),
            config_calls: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConfigSource for ScriptedSource {
    async fn fetch_config(&self) -> Result<ServerConfig, PickupError> {
        let call = self.config_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.config_failures {
            Err(PickupError::Http(format!("GET /v1/config/js: HTTP 503 (call {call})")))
        } else {
            Ok(self.config.clone())
        }
    }

    async fn fetch_identity(&self) -> Result<Option<PlayerId>, PickupError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.identity
            .clone()
            .map_err(|()| PickupError::Http("GET /v1/user/id: connection refused".into()))
    }
}

/// Connector that refuses the first `failures` attempts, then hands out
/// [`MockTransport`]s with the given script.
pub struct ScriptedConnector {
    pub failures: usize,
    pub script: StdMutex<Vec<Option<Result<String, PickupError>>>>,
    pub attempts: AtomicUsize,
    pub urls: StdMutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            script: StdMutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            urls: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport, PickupError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_owned());
        if attempt < self.failures {
            return Err(PickupError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let script = std::mem::take(&mut *self.script.lock().unwrap());
        Ok(MockTransport::new(script).0)
    }
}

// ── Frame builders ──────────────────────────────────────────────────

fn frame(message: &ServerMessage) -> String {
    serde_json::to_string(message).expect("server frame serialization")
}

pub fn ts(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub fn verdict_json(id: &str, valid: bool, x: i32, y: i32, reason: Option<&str>) -> String {
    frame(&ServerMessage::PlayerPosition(MoveVerdict {
        id: id.into(),
        valid,
        position: Position::new(x, y),
        reason: reason.map(Into::into),
    }))
}

pub fn obstacle_json(x: i32, y: i32) -> String {
    frame(&ServerMessage::ObstaclePosition(Position::new(x, y)))
}

pub fn item_position_json(kind: ItemKind, x: i32, y: i32) -> String {
    frame(&ServerMessage::ItemPosition(ItemPlacement {
        position: Position::new(x, y),
        item: Item::new(kind),
    }))
}

pub fn item_collected_json(by: Option<&str>, valid: bool, kind: ItemKind, x: i32, y: i32, reason: Option<&str>) -> String {
    frame(&ServerMessage::ItemCollected(ItemCollected {
        valid,
        id: by.map(Into::into),
        item: Some(Item::new(kind)),
        position: Position::new(x, y),
        reason: reason.map(Into::into),
    }))
}

pub fn score_json(id: &str, score: i64) -> String {
    frame(&ServerMessage::Score(ScoreUpdate {
        id: id.into(),
        score,
    }))
}

pub fn round_state_json(state: RoundPhase, current: &str, end: &str) -> String {
    frame(&ServerMessage::RoundState(RoundStatePayload {
        state,
        current_time: ts(current),
        end_time: ts(end),
    }))
}

pub fn countdown_json(state: RoundPhase, remaining: i64) -> String {
    frame(&ServerMessage::Countdown(CountdownPayload {
        remaining_time: remaining,
        current_state: state,
    }))
}

pub fn waiting_json(message: &str, next_round_start: &str) -> String {
    frame(&ServerMessage::WaitingNotification(WaitingNotificationPayload {
        message: message.into(),
        next_round_start: ts(next_round_start),
    }))
}

pub fn error_json(text: &str) -> String {
    frame(&ServerMessage::ErrorMsg(ErrorPayload {
        id: None,
        error: text.into(),
    }))
}
