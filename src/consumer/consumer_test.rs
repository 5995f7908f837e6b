use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use warp::http::StatusCode;

use super::*;
use crate::encode_event;
use crate::BroadcastChannel;
use crate::ChangeEvent;
use crate::Channel;
use crate::ChannelConfig;
use crate::ConsumerConfig;
use crate::SyncError;

fn source_with(
    flags: fn() -> crate::Result<Vec<RemoteFlag>>,
    healthy: bool,
) -> Arc<dyn FlagSource> {
    let mut source = MockFlagSource::new();
    source.expect_endpoint().returning(|| "mock://api/flags".to_string());
    source.expect_fetch_all().returning(flags);
    source.expect_is_healthy().returning(move || healthy);
    Arc::new(source)
}

fn consumer(source: Arc<dyn FlagSource>) -> Arc<FlagConsumer> {
    Arc::new(FlagConsumer::with_source(&ConsumerConfig::default(), source))
}

#[tokio::test]
async fn test_start_runs_startup_sync_and_live_listener() {
    let consumer = consumer(source_with(|| Ok(vec![RemoteFlag::new("dark_mode", true)]), true));
    let channel = Arc::new(BroadcastChannel::new(&ChannelConfig::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let mut handles = consumer
        .start(channel.clone(), Default::default(), shutdown_rx)
        .await;
    assert_eq!(handles.len(), 2);
    assert_eq!(channel.subscriber_count(), 1);

    // startup sync
    handles.pop().unwrap().await.unwrap();
    assert!(consumer.is_enabled("dark_mode"));

    channel
        .publish(encode_event(&ChangeEvent::updated("maintenance_mode", true)).unwrap())
        .await
        .unwrap();
    timeout(Duration::from_secs(2), async {
        while !consumer.cache().is_maintenance_mode() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(()).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_start_without_startup_sync_serves_defaults() {
    let mut source = MockFlagSource::new();
    source.expect_endpoint().returning(|| "mock://api/flags".to_string());
    source.expect_fetch_all().never();
    let config = ConsumerConfig {
        sync_on_startup: false,
        defaults: [("dark_mode".to_string(), true)].into(),
        ..Default::default()
    };
    let consumer = FlagConsumer::with_source(&config, Arc::new(source));
    let channel = Arc::new(BroadcastChannel::new(&ChannelConfig::default()));
    let (_shutdown_tx, shutdown_rx) = watch::channel(());

    let handles = consumer.start(channel, Default::default(), shutdown_rx).await;

    assert_eq!(handles.len(), 1);
    assert!(consumer.is_enabled("dark_mode"));
}

#[tokio::test]
async fn test_status_route_reports_cache() {
    let consumer = consumer(source_with(|| Ok(Vec::new()), true));
    consumer.cache().apply(&ChangeEvent::updated("dark_mode", true));

    let response = warp::test::request()
        .method("GET")
        .path("/api/flags/status")
        .reply(&http::routes(consumer))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["darkMode"], true);
    assert_eq!(body["flags"]["dark_mode"], true);
    assert_eq!(body["cacheStats"]["enabledFlags"], 1);
}

#[tokio::test]
async fn test_refresh_route_returns_fresh_status() {
    let consumer = consumer(source_with(
        || Ok(vec![RemoteFlag::new("maintenance_mode", true)]),
        true,
    ));

    let response = warp::test::request()
        .method("POST")
        .path("/api/flags/refresh")
        .reply(&http::routes(consumer))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["message"], "Feature flags refreshed successfully");
    assert_eq!(body["flagStatus"]["maintenanceMode"], true);
}

#[tokio::test]
async fn test_refresh_route_reports_failure_and_keeps_cache() {
    let consumer = consumer(source_with(|| Err(SyncError::Status(502).into()), false));
    consumer.cache().apply(&ChangeEvent::updated("dark_mode", true));

    let response = warp::test::request()
        .method("POST")
        .path("/api/flags/refresh")
        .reply(&http::routes(consumer.clone()))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["error"], "Failed to refresh feature flags");
    assert!(consumer.is_enabled("dark_mode"));
}

#[tokio::test]
async fn test_health_route_follows_maintenance_mode() {
    let consumer = consumer(source_with(|| Ok(Vec::new()), false));
    let routes = http::routes(consumer.clone());

    let up = warp::test::request().path("/api/health").reply(&routes).await;
    let up: serde_json::Value = serde_json::from_slice(up.body()).unwrap();
    assert_eq!(up["status"], "UP");
    assert_eq!(up["authorityHealthy"], false);

    consumer.cache().apply(&ChangeEvent::updated("maintenance_mode", true));
    let down = warp::test::request().path("/api/health").reply(&routes).await;
    let down: serde_json::Value = serde_json::from_slice(down.body()).unwrap();
    assert_eq!(down["status"], "DOWN");
    assert_eq!(down["maintenanceMode"], true);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let consumer = consumer(source_with(|| Ok(Vec::new()), true));

    let response = warp::test::request()
        .method("DELETE")
        .path("/api/flags/status")
        .reply(&http::routes(consumer))
        .await;

    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_startup_sync_failure_keeps_defaults() {
    let config = ConsumerConfig {
        defaults: [("dark_mode".to_string(), true)].into(),
        ..Default::default()
    };
    let consumer = FlagConsumer::with_source(
        &config,
        source_with(|| Err(SyncError::Decode("not a list".to_string()).into()), false),
    );
    let channel = Arc::new(BroadcastChannel::new(&ChannelConfig::default()));
    let (_shutdown_tx, shutdown_rx) = watch::channel(());

    let mut handles = consumer.start(channel, Default::default(), shutdown_rx).await;
    handles.pop().unwrap().await.unwrap();

    assert!(consumer.is_enabled("dark_mode"));
}
