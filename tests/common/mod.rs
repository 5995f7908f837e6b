use std::net::SocketAddr;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;

use flagsync::AuthorityConfig;
use flagsync::ConsumerConfig;
use flagsync::FlagSyncConfig;
use flagsync::Node;
use flagsync::NodeBuilder;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time;

pub const WAIT_FOR_PROPAGATION: Duration = Duration::from_secs(3);

/// Port nobody listens on right now
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

pub fn node_config(
    authority_port: u16,
    allow_list: &[&str],
    db_path: Option<PathBuf>,
) -> FlagSyncConfig {
    FlagSyncConfig {
        authority: AuthorityConfig {
            listen_addr: format!("127.0.0.1:{authority_port}"),
            db_path,
            publish_timeout_ms: 500,
            ..Default::default()
        },
        consumer: ConsumerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            authority_url: format!("http://127.0.0.1:{authority_port}"),
            allow_list: allow_list.iter().map(|s| s.to_string()).collect(),
            defaults: Default::default(),
            pull_timeout_ms: 2000,
            health_timeout_ms: 1000,
            sync_on_startup: true,
        },
        ..Default::default()
    }
}

pub async fn start_node(config: FlagSyncConfig) -> (Node, watch::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let node = NodeBuilder::init(config.validate().expect("valid config"), shutdown_rx)
        .start()
        .await
        .expect("node starts");
    (node, shutdown_tx)
}

pub async fn stop_node(
    node: Node,
    shutdown_tx: watch::Sender<()>,
) {
    shutdown_tx.send(()).expect("node still running");
    time::timeout(Duration::from_secs(5), node.run())
        .await
        .expect("node stops in time")
        .expect("node stops cleanly");
}

pub fn url(
    addr: SocketAddr,
    path: &str,
) -> String {
    format!("http://{addr}{path}")
}

pub async fn get_json(url: &str) -> Value {
    reqwest::get(url)
        .await
        .expect("request sent")
        .json()
        .await
        .expect("json body")
}

pub async fn post_json(
    url: &str,
    body: &Value,
) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .expect("request sent")
}

/// Polls `check` until it holds or `WAIT_FOR_PROPAGATION` runs out
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    time::timeout(WAIT_FOR_PROPAGATION, async {
        while !check() {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
