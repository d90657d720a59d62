#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Client loop tests: the handle, the background session loop and event
//! delivery, driven through scripted transports.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use pickup_client::protocol::{ClientMessage, ItemKind, Position, RoundPhase};
use pickup_client::{
    ClientConfig, ConnectionState, Direction, GameClient, GameEvent, PickupError, PlayerAction,
};
use tokio::sync::mpsc;

use common::{
    item_collected_json, item_position_json, round_state_json, verdict_json, ChannelTransport,
    MockTransport,
};

fn config() -> ClientConfig {
    ClientConfig::new("http://localhost:8080")
}

/// Receive events until one matches `pred`, or fail after a second.
async fn wait_for(
    events: &mut mpsc::Receiver<GameEvent>,
    pred: impl Fn(&GameEvent) -> bool,
) -> GameEvent {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn sent_messages(sent: &std::sync::Mutex<Vec<String>>) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn joining_sends_nothing_and_adopts_the_server_start_cell() {
    let (transport, sent, _closed) =
        MockTransport::new(vec![Some(Ok(verdict_json("me", true, 4, 7, None)))]);
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

    assert_eq!(events.recv().await.unwrap(), GameEvent::Connected);
    wait_for(&mut events, |e| {
        matches!(e, GameEvent::PlayerMoved { position, confirmed: true, .. } if *position == Position::new(4, 7))
    })
    .await;

    assert!(sent_messages(&sent).is_empty());
    let snapshot = client.snapshot();
    assert_eq!(snapshot.confirmed_position, Position::new(4, 7));
    assert_eq!(snapshot.pending_position, None);
    assert!(snapshot.message_log.is_empty());

    client.shutdown().await;
    while let Some(event) = events.recv().await {
        assert!(
            !matches!(event, GameEvent::Notice(_)),
            "unexpected notice on join: {event:?}"
        );
    }
}

#[tokio::test]
async fn shutdown_closes_transport_and_delivers_disconnected() {
    let (transport, _sent, closed) = MockTransport::new(vec![]);
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());
    let _ = events.recv().await;

    client.shutdown().await;

    assert!(closed.load(Ordering::Relaxed));
    assert!(!client.is_connected());
    let last = wait_for(&mut events, |e| matches!(e, GameEvent::Disconnected { .. })).await;
    assert_eq!(
        last,
        GameEvent::Disconnected {
            reason: Some("client shut down".into())
        }
    );
    assert_eq!(client.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn server_close_is_terminal() {
    let (transport, _sent, _closed) = MockTransport::new(vec![None]);
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

    wait_for(&mut events, |e| matches!(e, GameEvent::Disconnected { reason: None })).await;
    assert!(events.recv().await.is_none());
    assert!(matches!(
        client.send_action(PlayerAction::Move(Direction::Down)),
        Err(PickupError::NotConnected)
    ));
    client.shutdown().await;
}

#[tokio::test]
async fn disconnected_survives_a_full_channel() {
    let frames = (0..20)
        .map(|i| Some(Ok(common::obstacle_json(i % 15, i / 15))))
        .chain(std::iter::once(None))
        .collect();
    let (transport, _sent, _closed) = MockTransport::new(frames);
    let config = config().with_event_channel_capacity(1);
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config);

    // Let the loop run ahead and overflow the channel before reading.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut last = None;
    while let Some(event) = events.recv().await {
        last = Some(event);
    }
    assert!(matches!(last, Some(GameEvent::Disconnected { .. })));
    // Snapshots are never dropped.
    assert_eq!(client.snapshot().obstacles.len(), 20);
    client.shutdown().await;
}

#[tokio::test]
async fn debug_output_names_the_player() {
    let (transport, _sent, _closed) = MockTransport::new(vec![]);
    let (mut client, _events) = GameClient::start(transport, "me", 15, &config());
    let debug = format!("{client:?}");
    assert!(debug.contains("GameClient"));
    assert!(debug.contains("me"));
    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Input round trips
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn key_press_moves_optimistically_then_confirms() {
    let (transport, server, sent) = ChannelTransport::new();
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

    server.send(verdict_json("me", true, 7, 7, None)).unwrap();
    wait_for(&mut events, |e| {
        matches!(e, GameEvent::PlayerMoved { position, confirmed: true, .. } if *position == Position::new(7, 7))
    })
    .await;

    assert!(client.press_key("ArrowUp").unwrap());
    wait_for(&mut events, |e| {
        matches!(e, GameEvent::PlayerMoved { position, confirmed: false, .. } if *position == Position::new(7, 6))
    })
    .await;
    assert_eq!(client.snapshot().pending_position, Some(Position::new(7, 6)));

    let ClientMessage::PlayerPosition(intent) = sent_messages(&sent).pop().unwrap() else {
        panic!("expected a move intent");
    };
    assert_eq!(intent.position, Position::new(7, 6));

    server.send(verdict_json("me", true, 7, 6, None)).unwrap();
    wait_for(&mut events, |e| {
        matches!(e, GameEvent::PlayerMoved { position, confirmed: true, .. } if *position == Position::new(7, 6))
    })
    .await;
    let snapshot = client.snapshot();
    assert_eq!(snapshot.confirmed_position, Position::new(7, 6));
    assert_eq!(snapshot.pending_position, None);

    client.shutdown().await;
}

#[tokio::test]
async fn space_collects_the_item_underfoot() {
    let (transport, server, sent) = ChannelTransport::new();
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

    server.send(item_position_json(ItemKind::Diamond, 0, 0)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::ItemSpawned { .. })).await;

    assert!(client.press_key(" ").unwrap());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(
        sent_messages(&sent).last(),
        Some(ClientMessage::ItemAction(intent)) if intent.position == Position::new(0, 0)
    ));

    server
        .send(item_collected_json(Some("me"), true, ItemKind::Diamond, 0, 0, None))
        .unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::ItemCollected { .. })).await;
    assert!(client.snapshot().items.is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn keys_are_ignored_while_paused() {
    let (transport, server, sent) = ChannelTransport::new();
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

    server
        .send(round_state_json(
            RoundPhase::Preparing,
            "2024-05-01T12:00:20Z",
            "2024-05-01T12:00:30Z",
        ))
        .unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::InputEnabled(false))).await;

    client.press_key("ArrowRight").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sent_messages(&sent).is_empty());
    assert!(client.snapshot().round.overlay().is_some());

    client.shutdown().await;
}

#[tokio::test]
async fn phase_change_event_carries_remaining_time() {
    let (transport, server, _sent) = ChannelTransport::new();
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());

    server
        .send(round_state_json(
            RoundPhase::Playing,
            "2024-05-01T12:00:30Z",
            "2024-05-01T12:01:30Z",
        ))
        .unwrap();
    let event = wait_for(&mut events, |e| matches!(e, GameEvent::PhaseChanged { .. })).await;
    let GameEvent::PhaseChanged {
        phase,
        remaining_seconds,
        ..
    } = event
    else {
        unreachable!()
    };
    assert_eq!(phase, RoundPhase::Playing);
    assert_eq!(remaining_seconds, 60);

    client.shutdown().await;
}

#[tokio::test]
async fn dropping_the_server_side_closes_cleanly() {
    let (transport, server, _sent) = ChannelTransport::new();
    let (mut client, mut events) = GameClient::start(transport, "me", 15, &config());
    drop(server);

    wait_for(&mut events, |e| matches!(e, GameEvent::Disconnected { reason: None })).await;
    assert_eq!(client.connection_state(), ConnectionState::Closed);
    client.shutdown().await;
}
