//! Consumer diagnostics: cache status, on-demand refresh and health.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tracing::info;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::FlagConsumer;
use crate::Error;
use crate::Result;

fn with_consumer(
    consumer: Arc<FlagConsumer>
) -> impl Filter<Extract = (Arc<FlagConsumer>,), Error = Infallible> + Clone {
    warp::any().map(move || consumer.clone())
}

/// `GET /api/flags/status`, `POST /api/flags/refresh` and `GET /api/health`
pub fn routes(
    consumer: Arc<FlagConsumer>
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let status = warp::path!("api" / "flags" / "status")
        .and(warp::get())
        .and(with_consumer(consumer.clone()))
        .and_then(status_handler);

    let refresh = warp::path!("api" / "flags" / "refresh")
        .and(warp::post())
        .and(with_consumer(consumer.clone()))
        .and_then(refresh_handler);

    let health = warp::path!("api" / "health")
        .and(warp::get())
        .and(with_consumer(consumer))
        .and_then(health_handler);

    status.or(refresh).unify().or(health).unify()
}

async fn status_handler(consumer: Arc<FlagConsumer>) -> std::result::Result<Response, Rejection> {
    Ok(warp::reply::json(&consumer.status()).into_response())
}

async fn refresh_handler(consumer: Arc<FlagConsumer>) -> std::result::Result<Response, Rejection> {
    info!("Manual feature flag refresh requested");
    let reply = match consumer.refresh().await {
        Ok(report) => warp::reply::with_status(
            warp::reply::json(&json!({
                "message": "Feature flags refreshed successfully",
                "flagStatus": consumer.status(),
                "sync": report,
            })),
            StatusCode::OK,
        ),
        Err(e) => warp::reply::with_status(
            warp::reply::json(&json!({
                "error": "Failed to refresh feature flags",
                "message": e.to_string(),
            })),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    };
    Ok(reply.into_response())
}

async fn health_handler(consumer: Arc<FlagConsumer>) -> std::result::Result<Response, Rejection> {
    let maintenance_mode = consumer.cache().is_maintenance_mode();
    let authority_healthy = consumer.authority_healthy().await;
    let body = json!({
        "status": if maintenance_mode { "DOWN" } else { "UP" },
        "maintenanceMode": maintenance_mode,
        "darkMode": consumer.cache().is_dark_mode(),
        "authorityHealthy": authority_healthy,
    });
    Ok(warp::reply::json(&body).into_response())
}

/// Binds the consumer API. Returns the bound address and the server future,
/// which resolves once `shutdown` fires.
pub fn bind(
    consumer: Arc<FlagConsumer>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let (bound, server) = warp::serve(routes(consumer))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|source| Error::Bind { addr, source })?;
    info!(%bound, "Consumer API listening");
    Ok((bound, server))
}
