#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Startup sequencing: configuration, identity and stream opening with
//! bounded retry.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use pickup_client::connection::{self, establish};
use pickup_client::{ClientConfig, GameClient, GameEvent, PickupError, RetryPolicy};

use common::{ScriptedConnector, ScriptedSource};

/// Fast retry budgets with the default attempt counts.
fn config() -> ClientConfig {
    ClientConfig::new("http://localhost:8080")
        .with_config_retry(RetryPolicy::new(3, Duration::from_millis(1)))
        .with_stream_retry(RetryPolicy::new(5, Duration::from_millis(1)))
}

#[tokio::test]
async fn config_failure_aborts_before_any_stream() {
    let source = ScriptedSource::new(usize::MAX, Some("me"));
    let connector = ScriptedConnector::new(0);

    let err = establish(&config(), &source, &connector).await.unwrap_err();

    match err {
        PickupError::ConfigUnavailable {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"));
        }
        other => panic!("expected ConfigUnavailable, got {other:?}"),
    }
    assert_eq!(source.config_calls.load(Ordering::SeqCst), 3);
    assert_eq!(source.identity_calls.load(Ordering::SeqCst), 0);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn config_recovers_within_budget() {
    let source = ScriptedSource::new(2, Some("me"));
    let connector = ScriptedConnector::new(0);

    let established = establish(&config(), &source, &connector).await.unwrap();
    assert_eq!(established.player_id, "me");
    assert_eq!(source.config_calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        connector.urls.lock().unwrap().as_slice(),
        ["ws://localhost:8080/v1/game/ws"]
    );
}

#[tokio::test]
async fn stored_identity_skips_the_request() {
    let source = ScriptedSource::new(0, None);
    let connector = ScriptedConnector::new(0);
    let config = config().with_player_id("stored");

    let established = establish(&config, &source, &connector).await.unwrap();
    assert_eq!(established.player_id, "stored");
    assert_eq!(source.identity_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_identity_is_fatal_and_not_retried() {
    let source = ScriptedSource::new(0, None);
    let connector = ScriptedConnector::new(0);

    let err = establish(&config(), &source, &connector).await.unwrap_err();
    assert!(matches!(err, PickupError::IdentityMissing));
    assert_eq!(source.identity_calls.load(Ordering::SeqCst), 1);
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_identity_request_is_identity_missing() {
    let mut source = ScriptedSource::new(0, None);
    source.identity = Err(());
    let err = connection::resolve_identity(None, &source).await.unwrap_err();
    assert!(matches!(err, PickupError::IdentityMissing));
}

#[tokio::test]
async fn blank_stored_identity_falls_back_to_server() {
    let source = ScriptedSource::new(0, Some("from-server"));
    let id = connection::resolve_identity(Some("  "), &source).await.unwrap();
    assert_eq!(id, "from-server");
}

#[tokio::test]
async fn stream_gives_up_after_five_attempts() {
    let source = ScriptedSource::new(0, Some("me"));
    let connector = ScriptedConnector::new(usize::MAX);

    let err = establish(&config(), &source, &connector).await.unwrap_err();
    assert!(matches!(
        err,
        PickupError::ConnectionUnavailable { attempts: 5, .. }
    ));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn stream_opens_on_last_attempt() {
    let source = ScriptedSource::new(0, Some("me"));
    let connector = ScriptedConnector::new(4);

    assert!(establish(&config(), &source, &connector).await.is_ok());
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn retry_waits_between_attempts() {
    let source = ScriptedSource::new(usize::MAX, Some("me"));
    let policy = RetryPolicy::new(3, Duration::from_millis(20));

    let started = tokio::time::Instant::now();
    let err = connection::acquire_configuration(&source, policy)
        .await
        .unwrap_err();
    assert!(matches!(err, PickupError::ConfigUnavailable { attempts: 3, .. }));
    // Two waits between three attempts, none after the last.
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn connect_starts_a_session() {
    let source = ScriptedSource::new(0, Some("me"));
    let connector = ScriptedConnector::new(0);
    connector
        .script
        .lock()
        .unwrap()
        .push(Some(Ok(common::obstacle_json(1, 2))));

    let (mut client, mut events) = GameClient::connect(&config(), &source, &connector)
        .await
        .unwrap();
    assert_eq!(client.self_id(), "me");
    assert_eq!(events.recv().await.unwrap(), GameEvent::Connected);

    loop {
        if let GameEvent::ObstacleAdded { .. } = events.recv().await.unwrap() {
            break;
        }
    }
    assert_eq!(client.snapshot().grid_size, 15);
    client.shutdown().await;
}
