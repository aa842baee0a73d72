//! Lifecycle of the periodic sync loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{entity, fixture, primary_key, reconciler, wait_until, FakeSource, FakeStore};
use scrape_sync::{HealthState, Phase, SyncError, SyncService};
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_millis(20);

fn service(
    source: Arc<FakeSource>,
    store: Arc<FakeStore>,
    shutdown: &CancellationToken,
) -> SyncService {
    SyncService::new(
        reconciler(source, store),
        INTERVAL,
        HealthState::new(),
        shutdown.clone(),
    )
}

#[tokio::test]
async fn test_first_cycle_marks_ready() {
    let store = FakeStore::with(primary_key(), &fixture("default.yaml"));
    let source = FakeSource::new(vec![entity("node1", &[])]);
    let shutdown = CancellationToken::new();
    let service = service(source, store.clone(), &shutdown);

    assert!(!service.health().is_ready());
    service.start().await;

    let health = service.health().clone();
    wait_until(|| health.is_ready()).await;

    assert!(health.is_live());
    assert!(health.last_sync().is_some());
    assert_eq!(store.writes().len(), 1);

    service.stop().await.unwrap();
    assert!(!health.is_live());
    assert!(health.is_ready());
}

#[tokio::test]
async fn test_loop_keeps_running_cycles() {
    let store = FakeStore::with(primary_key(), &fixture("default.yaml"));
    let source = FakeSource::new(Vec::new());
    let shutdown = CancellationToken::new();
    let service = service(source.clone(), store, &shutdown);

    service.start().await;
    wait_until(|| source.calls() >= 3).await;

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_secret_still_becomes_ready() {
    let store = FakeStore::empty();
    let source = FakeSource::new(vec![entity("node1", &[])]);
    let shutdown = CancellationToken::new();
    let service = service(source, store.clone(), &shutdown);

    service.start().await;
    let health = service.health().clone();
    wait_until(|| health.is_ready()).await;

    assert!(health.last_sync().is_none());
    assert!(store.writes().is_empty());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_fatal_error_ends_loop() {
    let store = FakeStore::with(primary_key(), &fixture("default.yaml"));
    store.deny();
    let source = FakeSource::new(Vec::new());
    let shutdown = CancellationToken::new();
    let service = service(source.clone(), store, &shutdown);

    service.start().await;
    let result = tokio::time::timeout(Duration::from_secs(2), service.join())
        .await
        .unwrap();

    match result {
        Err(SyncError::Api(e)) => assert!(e.is_access_denied()),
        other => panic!("expected access denied, got {:?}", other),
    }
    assert!(!service.health().is_ready());
    assert!(!service.health().is_live());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_shutdown_token_stops_loop() {
    let store = FakeStore::with(primary_key(), &fixture("default.yaml"));
    let source = FakeSource::new(Vec::new());
    let shutdown = CancellationToken::new();
    let reconciler = reconciler(source.clone(), store);
    let service = SyncService::new(
        reconciler.clone(),
        Duration::from_secs(3600),
        HealthState::new(),
        shutdown.clone(),
    );

    service.start().await;
    wait_until(|| source.calls() >= 1).await;

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), service.join())
        .await
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(reconciler.phase(), Phase::Cancelled);
    assert!(!service.health().is_live());
}

#[tokio::test]
async fn test_restart_replaces_previous_loop() {
    let store = FakeStore::with(primary_key(), &fixture("default.yaml"));
    let source = FakeSource::new(Vec::new());
    let shutdown = CancellationToken::new();
    let service = service(source.clone(), store, &shutdown);

    service.start().await;
    wait_until(|| source.calls() >= 1).await;
    service.start().await;
    wait_until(|| source.calls() >= 3).await;

    service.stop().await.unwrap();

    // No loop is left behind once stopped
    let after_stop = source.calls();
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(source.calls(), after_stop);
}

#[tokio::test]
async fn test_stop_without_start_is_ok() {
    let shutdown = CancellationToken::new();
    let service = service(FakeSource::new(Vec::new()), FakeStore::empty(), &shutdown);

    assert!(service.stop().await.is_ok());
    assert!(service.join().await.is_ok());
}

#[tokio::test]
async fn test_start_waits_for_loop_held_by_join() {
    let store = FakeStore::with(primary_key(), &fixture("default.yaml"));
    let source = FakeSource::new(Vec::new());
    source.slow_down(Duration::from_millis(200));
    let shutdown = CancellationToken::new();
    let service = Arc::new(service(source.clone(), store, &shutdown));

    service.start().await;
    let joiner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.join().await })
    };
    wait_until(|| source.active() == 1).await;

    service.start().await;

    // The first loop has exited, and the second has not begun listing yet
    assert_eq!(source.active(), 0);
    assert!(joiner.await.unwrap().is_ok());
    wait_until(|| source.calls() >= 2).await;
    assert_eq!(source.max_active(), 1);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_waits_for_loop_held_by_join() {
    let store = FakeStore::with(primary_key(), &fixture("default.yaml"));
    let source = FakeSource::new(Vec::new());
    source.slow_down(Duration::from_millis(200));
    let shutdown = CancellationToken::new();
    let reconciler = reconciler(source.clone(), store);
    let service = Arc::new(SyncService::new(
        reconciler.clone(),
        INTERVAL,
        HealthState::new(),
        shutdown.clone(),
    ));

    service.start().await;
    let joiner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.join().await })
    };
    wait_until(|| source.active() == 1).await;

    service.stop().await.unwrap();

    assert_eq!(source.active(), 0);
    assert_eq!(reconciler.phase(), Phase::Cancelled);
    assert!(!service.health().is_live());
    assert!(joiner.await.unwrap().is_ok());
}
