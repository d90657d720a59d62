//! # Loopback Session
//!
//! Runs a full client session without a server. A tiny in-memory
//! [`Transport`] plays the server role: it answers every move intent with a
//! verdict and pushes a short round script, so you can watch the round
//! lifecycle, optimistic movement and reconciliation at work.
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback_session
//! ```

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pickup_client::protocol::{
    Item, ItemKind, ItemPlacement, MoveVerdict, RoundStatePayload, ScoreUpdate,
};
use pickup_client::{
    ClientConfig, ClientMessage, GameClient, GameEvent, PickupError, Position, RoundPhase,
    ServerMessage, Transport,
};
use tokio::sync::mpsc;

/// Column that the loopback server refuses to let anyone enter.
const WALL_X: i32 = 3;

// ── Loopback transport ──────────────────────────────────────────────

/// Client side of the loopback. Frames sent by the client go to the fake
/// server task, frames from the fake server arrive on `inbound`.
struct LoopbackTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), PickupError> {
        self.outbound
            .send(message)
            .map_err(|_| PickupError::TransportSend("loopback server gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, PickupError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), PickupError> {
        self.inbound.close();
        Ok(())
    }
}

fn frame(message: &ServerMessage) -> String {
    serde_json::to_string(message).unwrap_or_default()
}

/// Fake server: validates moves against a wall and scores item pickups.
async fn serve(
    mut from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
) {
    let mut score = 0;
    while let Some(raw) = from_client.recv().await {
        let Ok(message) = serde_json::from_str::<ClientMessage>(&raw) else {
            continue;
        };
        let reply = match message {
            ClientMessage::PlayerPosition(intent) => {
                let blocked = intent.position.x == WALL_X;
                ServerMessage::PlayerPosition(MoveVerdict {
                    id: intent.id,
                    valid: !blocked,
                    position: intent.position,
                    reason: blocked.then(|| "wall".to_owned()),
                })
            }
            ClientMessage::ItemAction(intent) => {
                score += 10;
                let _ = to_client.send(frame(&ServerMessage::ItemCollected(
                    pickup_client::protocol::ItemCollected {
                        valid: true,
                        id: Some(intent.id.clone()),
                        item: Some(Item::new(ItemKind::Coin)),
                        position: intent.position,
                        reason: None,
                    },
                )));
                ServerMessage::Score(ScoreUpdate {
                    id: intent.id,
                    score,
                })
            }
        };
        if to_client.send(frame(&reply)).is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    let transport = LoopbackTransport {
        outbound: client_tx,
        inbound: client_rx,
    };
    tokio::spawn(serve(server_rx, server_tx.clone()));

    let config = ClientConfig::new("http://loopback");
    let (mut client, mut events) = GameClient::start(transport, "solo", 8, &config);

    // ── Round script ────────────────────────────────────────────────
    let now = Utc::now();
    let script = [
        ServerMessage::RoundState(RoundStatePayload {
            state: RoundPhase::Playing,
            current_time: now,
            end_time: now + Duration::seconds(30),
        }),
        ServerMessage::ObstaclePosition(Position::new(WALL_X, 0)),
        ServerMessage::ItemPosition(ItemPlacement {
            position: Position::new(2, 0),
            item: Item::new(ItemKind::Coin),
        }),
    ];
    for message in &script {
        server_tx.send(frame(message))?;
    }

    // ── Player input ────────────────────────────────────────────────
    // Two steps right reach the coin; the third bumps into the wall.
    for key in ["ArrowRight", "ArrowRight", " ", "ArrowRight"] {
        client.press_key(key)?;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    server_tx.send(frame(&ServerMessage::RoundState(RoundStatePayload {
        state: RoundPhase::Ended,
        current_time: now + Duration::seconds(30),
        end_time: now + Duration::seconds(40),
    })))?;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // ── Report ──────────────────────────────────────────────────────
    client.shutdown().await;
    while let Some(event) = events.recv().await {
        match event {
            GameEvent::Notice(notice) => println!("notice: {}", notice.text),
            GameEvent::PhaseChanged { phase, .. } => println!("phase: {}", phase.label()),
            GameEvent::ScoreChanged { id, score } => println!("score: {id} = {score}"),
            GameEvent::Disconnected { .. } => break,
            _ => {}
        }
    }

    let snapshot = client.snapshot();
    println!("{}", snapshot.board.render_text());
    println!(
        "final position {} with score {}",
        snapshot.confirmed_position,
        snapshot.score_of("solo")
    );
    Ok(())
}
