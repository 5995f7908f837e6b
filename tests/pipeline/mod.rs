//! Authority mutations flowing through the channel into the consumer cache.

use reqwest::StatusCode;
use serde_json::json;

use crate::common::*;
use crate::enable_logger;

#[tokio::test]
async fn test_created_flag_reaches_consumer_cache() {
    enable_logger();
    let (node, shutdown_tx) = start_node(node_config(free_port(), &["dark_mode", "maintenance_mode"], None)).await;

    let created = post_json(
        &url(node.authority_addr(), "/api/flags"),
        &json!({"name": "dark_mode", "enabled": true}),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let consumer = node.consumer().clone();
    assert!(eventually(|| consumer.is_enabled("dark_mode")).await);

    let status = get_json(&url(node.consumer_addr(), "/api/flags/status")).await;
    assert_eq!(status["darkMode"], true);
    assert_eq!(status["maintenanceMode"], false);

    stop_node(node, shutdown_tx).await;
}

#[tokio::test]
async fn test_flag_outside_allow_list_never_reaches_cache() {
    let (node, shutdown_tx) = start_node(node_config(free_port(), &["dark_mode"], None)).await;

    post_json(
        &url(node.authority_addr(), "/api/flags"),
        &json!({"name": "beta_search", "enabled": true}),
    )
    .await;
    post_json(
        &url(node.authority_addr(), "/api/flags"),
        &json!({"name": "dark_mode", "enabled": true}),
    )
    .await;

    let consumer = node.consumer().clone();
    assert!(eventually(|| consumer.is_enabled("dark_mode")).await);
    assert!(!consumer.is_enabled("beta_search"));
    assert!(!consumer.status().flags.contains_key("beta_search"));

    stop_node(node, shutdown_tx).await;
}

#[tokio::test]
async fn test_rename_moves_value_to_new_name() {
    enable_logger();
    let (node, shutdown_tx) = start_node(node_config(free_port(), &["x", "y"], None)).await;
    let service = node.service().clone();

    let flag = service
        .create(flagsync::authority::FlagRequest::new("x", true))
        .expect("create x");
    service
        .update(flag.id, flagsync::authority::FlagRequest::new("y", true))
        .expect("rename to y");

    let consumer = node.consumer().clone();
    assert!(eventually(|| consumer.is_enabled("y") && !consumer.status().flags.contains_key("x")).await);

    stop_node(node, shutdown_tx).await;
}

#[tokio::test]
async fn test_toggle_and_delete_propagate() {
    let (node, shutdown_tx) = start_node(node_config(free_port(), &["maintenance_mode"], None)).await;
    let authority = node.authority_addr();
    let consumer = node.consumer().clone();

    let created = post_json(
        &url(authority, "/api/flags"),
        &json!({"name": "maintenance_mode", "enabled": false}),
    )
    .await
    .json::<serde_json::Value>()
    .await
    .expect("created body");
    let id = created["id"].as_u64().expect("id");

    post_json(&url(authority, &format!("/api/flags/{id}/toggle")), &json!({})).await;
    assert!(eventually(|| consumer.cache().is_maintenance_mode()).await);

    let health = get_json(&url(node.consumer_addr(), "/api/health")).await;
    assert_eq!(health["status"], "DOWN");
    assert_eq!(health["authorityHealthy"], true);

    let deleted = reqwest::Client::new()
        .delete(url(authority, &format!("/api/flags/{id}")))
        .send()
        .await
        .expect("delete sent");
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert!(eventually(|| !consumer.status().flags.contains_key("maintenance_mode")).await);

    stop_node(node, shutdown_tx).await;
}
