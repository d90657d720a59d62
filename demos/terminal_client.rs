//! # Terminal Client
//!
//! Plays Pickup from a terminal:
//!
//! 1. Load settings from the environment
//! 2. Check the room's join window (when `PICKUP_ROOM` is set)
//! 3. Fetch configuration and identity, then open the game stream
//! 4. Map typed commands to keys and print the board as it changes
//! 5. Redraw the round countdown once a second
//!
//! ## Running
//!
//! ```sh
//! PICKUP_SERVER_URL=http://localhost:8080 PICKUP_TOKEN=<jwt> PICKUP_ROOM=<room> \
//!     cargo run --example terminal_client
//! ```
//!
//! Type `w`, `a`, `s`, `d` (or `up`, `left`, `down`, `right`) and press
//! Enter to move. An empty line or `space` collects the item underfoot.
//! `q` quits.

use chrono::Utc;
use pickup_client::lobby::{JoinEligibility, JoinWindow, ROOM_STATUS_POLL_INTERVAL};
use pickup_client::{
    ClientConfig, GameClient, GameEvent, HttpConfigSource, NoticeKind, WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Translate a typed command into a key name the client understands.
fn key_for(line: &str) -> Option<&'static str> {
    match line.trim() {
        "w" | "up" => Some("ArrowUp"),
        "s" | "down" => Some("ArrowDown"),
        "a" | "left" => Some("ArrowLeft"),
        "d" | "right" => Some("ArrowRight"),
        "" | "space" | "e" => Some(" "),
        _ => None,
    }
}

/// Poll the room status until the join window opens.
async fn wait_for_join_window(
    source: &HttpConfigSource,
    room_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let status = source.room_status(room_id).await?;
        let window = JoinWindow::new(status, Utc::now());
        let deadline = tokio::time::Instant::now() + ROOM_STATUS_POLL_INTERVAL;
        loop {
            match window.evaluate(Utc::now()) {
                JoinEligibility::Open => {
                    tracing::info!("{}", JoinEligibility::Open.text());
                    return Ok(());
                }
                JoinEligibility::Refresh => break,
                wait @ JoinEligibility::Wait { .. } => println!("{}", wait.text()),
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        println!("{}", JoinEligibility::Refresh.text());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = ClientConfig::from_env();
    tracing::info!("Using server {}", config.base_url);
    let source = HttpConfigSource::new(&config)?;

    if let Some(room_id) = config.room_id.clone() {
        wait_for_join_window(&source, &room_id).await?;
    }

    // ── Connect ─────────────────────────────────────────────────────
    let connector = WebSocketConnector::from_config(&config);
    let (mut client, mut events) = GameClient::connect(&config, &source, &connector).await?;
    tracing::info!("Playing as {}", client.self_id());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut last_countdown = None;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    GameEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("server closed the stream"));
                        break;
                    }
                    GameEvent::Notice(notice) => match notice.kind {
                        NoticeKind::Error => tracing::error!("{}", notice.text),
                        NoticeKind::Alert => tracing::warn!("{}", notice.text),
                        NoticeKind::Info => tracing::info!("{}", notice.text),
                    },
                    GameEvent::PhaseChanged { phase, remaining_seconds, .. } => {
                        println!("{}", phase.countdown_text(remaining_seconds));
                    }
                    GameEvent::Countdown { phase, remaining_seconds } => {
                        println!("{}", phase.countdown_text(remaining_seconds));
                    }
                    GameEvent::OverlayShown(overlay) => {
                        println!("── {} ──", overlay.message);
                        if let Some(top) = overlay.top_player_text() {
                            println!("{top}");
                        }
                        if let Some(line) = overlay.countdown_text(client.snapshot().round.clock().server_time(Utc::now())) {
                            println!("{line}");
                        }
                    }
                    GameEvent::ScoreChanged { id, score } => {
                        println!("{id}: {score}");
                    }
                    GameEvent::PlayerMoved { .. }
                    | GameEvent::ItemSpawned { .. }
                    | GameEvent::ItemCollected { .. }
                    | GameEvent::RoundReset => {
                        println!("{}", client.snapshot().board.render_text());
                    }
                    other => tracing::debug!(?other, "event"),
                }
            }

            _ = tick.tick() => {
                let round = client.snapshot().round;
                let now = Utc::now();
                let text = round
                    .overlay_countdown_text(now)
                    .or_else(|| round.countdown_text(now));
                if text.is_some() && text != last_countdown {
                    if let Some(line) = &text {
                        println!("{line}");
                    }
                    last_countdown = text;
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim() == "q" {
                    break;
                }
                match key_for(&line) {
                    Some(key) => {
                        if let Err(e) = client.press_key(key) {
                            tracing::warn!("{e}");
                            break;
                        }
                    }
                    None => println!("unknown command: {}", line.trim()),
                }
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Goodbye");
    Ok(())
}
