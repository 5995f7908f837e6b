use std::future::Future;
use std::net::SocketAddr;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::Error;


lazy_static! {
    pub static ref EVENTS_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("flag_events_published", "Change events handed to the channel"),
        &["change_type"]
    )
    .expect("metric can not be created");

    pub static ref PUBLISH_FAILURES: IntCounter = IntCounter::new(
        "flag_publish_failures",
        "Change events lost to a transport error or publish timeout"
    )
    .expect("metric can not be created");

    pub static ref EVENTS_DROPPED: IntCounter = IntCounter::new(
        "flag_events_dropped",
        "Change events dropped because the publish queue was full"
    )
    .expect("metric can not be created");

    pub static ref EVENTS_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new("flag_events_applied", "Change events applied to the local cache"),
        &["change_type"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_IGNORED: IntCounter = IntCounter::new(
        "flag_events_ignored",
        "Change events for flags outside the allow-list"
    )
    .expect("metric can not be created");

    pub static ref DECODE_FAILURES: IntCounter = IntCounter::new(
        "flag_event_decode_failures",
        "Malformed change event payloads"
    )
    .expect("metric can not be created");

    pub static ref MISSED_EVENTS: IntCounter = IntCounter::new(
        "flag_events_missed",
        "Change events a lagging subscriber never received"
    )
    .expect("metric can not be created");

    pub static ref SYNC_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("flag_full_sync_total", "Full reconciliation attempts"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref SYNC_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("flag_full_sync_duration_ms", "Full reconciliation latency in ms")
            .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        Box::new(EVENTS_DROPPED.clone()),
        Box::new(EVENTS_APPLIED.clone()),
        Box::new(EVENTS_IGNORED.clone()),
        Box::new(DECODE_FAILURES.clone()),
        Box::new(MISSED_EVENTS.clone()),
        Box::new(SYNC_TOTAL.clone()),
        Box::new(SYNC_DURATION_MS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {}", e);
        }
    }
}

/// Binds `/metrics`. Returns the bound address and the server future, which
/// resolves once `shutdown_signal` fires.
pub fn bind(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) -> crate::Result<(SocketAddr, impl Future<Output = ()>)> {
    register_custom_metrics(&REGISTRY);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    let (bound, server) = warp::serve(metrics_route)
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        })
        .map_err(|source| Error::Bind { addr, source })?;

    info!(%bound, "metrics server listening");
    Ok((bound, async move {
        server.await;
        info!("metrics server stopped");
    }))
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics(&REGISTRY))
}

pub(crate) fn encode_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
