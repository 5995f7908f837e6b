//! Full reconciliation: startup pull, on-demand refresh and failure isolation.

use std::sync::Arc;

use flagsync::authority::FlagRequest;
use flagsync::consumer::FlagConsumer;
use flagsync::consumer::FlagSource;
use flagsync::consumer::HttpFlagSource;
use flagsync::consumer::RemoteFlag;
use flagsync::BroadcastChannel;
use flagsync::ChannelConfig;
use flagsync::ConsumerConfig;
use reqwest::StatusCode;
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::watch;

use crate::common::*;
use crate::enable_logger;

#[tokio::test]
async fn test_restarted_node_pulls_persisted_flags_on_startup() {
    enable_logger();
    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("flags");

    let (node, shutdown_tx) = start_node(node_config(free_port(), &["dark_mode"], Some(db_path.clone()))).await;
    node.service()
        .create(FlagRequest::new("dark_mode", true))
        .expect("create");
    stop_node(node, shutdown_tx).await;

    let (node, shutdown_tx) = start_node(node_config(free_port(), &["dark_mode"], Some(db_path))).await;
    let consumer = node.consumer().clone();
    assert!(eventually(|| consumer.is_enabled("dark_mode")).await);

    stop_node(node, shutdown_tx).await;
}

#[tokio::test]
async fn test_refresh_heals_missed_events() {
    let (node, shutdown_tx) = start_node(node_config(free_port(), &["dark_mode"], None)).await;

    // a second consumer on its own channel never hears a single event
    let detached = Arc::new(FlagConsumer::new(&ConsumerConfig {
        authority_url: format!("http://{}", node.authority_addr()),
        allow_list: vec!["dark_mode".to_string()],
        sync_on_startup: false,
        ..Default::default()
    }));
    let (_detached_tx, detached_rx) = watch::channel(());
    detached
        .start(
            Arc::new(BroadcastChannel::new(&ChannelConfig::default())),
            Default::default(),
            detached_rx,
        )
        .await;

    node.service()
        .create(FlagRequest::new("dark_mode", true))
        .expect("create");
    let live = node.consumer().clone();
    assert!(eventually(|| live.is_enabled("dark_mode")).await);
    assert!(!detached.is_enabled("dark_mode"));

    let report = detached.refresh().await.expect("refresh");
    assert_eq!(report.applied, 1);
    assert!(detached.is_enabled("dark_mode"));

    // the refresh endpoint reports the same view
    let response = post_json(&url(node.consumer_addr(), "/api/flags/refresh"), &json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    stop_node(node, shutdown_tx).await;
}

#[tokio::test]
async fn test_refresh_against_empty_authority_empties_cache() {
    let config = {
        let mut config = node_config(free_port(), &["dark_mode"], None);
        config.consumer.defaults = [("dark_mode".to_string(), true)].into();
        config.consumer.sync_on_startup = false;
        config
    };
    let (node, shutdown_tx) = start_node(config).await;
    assert!(node.consumer().is_enabled("dark_mode"));

    let report = node.consumer().refresh().await.expect("refresh");

    assert_eq!(report.pulled, 0);
    assert!(!node.consumer().is_enabled("dark_mode"));
    assert!(node.consumer().status().flags.is_empty());

    stop_node(node, shutdown_tx).await;
}

#[tokio::test]
async fn test_unreachable_authority_keeps_cache_and_reports_500() {
    let port = free_port();
    let consumer = Arc::new(FlagConsumer::new(&ConsumerConfig {
        authority_url: format!("http://127.0.0.1:{port}"),
        defaults: [("maintenance_mode".to_string(), true)].into(),
        pull_timeout_ms: 500,
        health_timeout_ms: 500,
        ..Default::default()
    }));

    assert!(consumer.refresh().await.is_err());
    assert!(consumer.cache().is_maintenance_mode());
    assert!(!consumer.authority_healthy().await);

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let (addr, server) = flagsync::consumer::http::bind(
        consumer.clone(),
        "127.0.0.1:0".parse().expect("addr"),
        shutdown_rx,
    )
    .expect("bind");
    tokio::spawn(server);

    let response = post_json(&url(addr, "/api/flags/refresh"), &json!({})).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["error"], "Failed to refresh feature flags");
}

#[tokio::test]
async fn test_http_source_looks_up_single_flag_by_name() {
    let (node, shutdown_tx) = start_node(node_config(free_port(), &["dark_mode"], None)).await;
    node.service()
        .create(FlagRequest::new("dark_mode", true))
        .expect("create");

    let source = HttpFlagSource::new(&ConsumerConfig {
        authority_url: format!("http://{}", node.authority_addr()),
        ..Default::default()
    });

    assert_eq!(
        source.fetch_by_name("dark_mode").await.expect("lookup"),
        Some(RemoteFlag::new("dark_mode", true))
    );
    assert_eq!(source.fetch_by_name("unknown_flag").await.expect("lookup"), None);

    stop_node(node, shutdown_tx).await;
}
