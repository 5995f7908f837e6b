//! Operator API of the flag authority.
//!
//! | method | path                      | success |
//! |--------|---------------------------|---------|
//! | GET    | `/api/flags`              | 200     |
//! | GET    | `/api/flags/{id}`         | 200     |
//! | GET    | `/api/flags/name/{name}`  | 200     |
//! | POST   | `/api/flags`              | 201     |
//! | PUT    | `/api/flags/{id}`         | 200     |
//! | DELETE | `/api/flags/{id}`         | 204     |
//! | POST   | `/api/flags/{id}/toggle`  | 200     |
//! | GET    | `/api/flags/stats`        | 200     |
//! | GET    | `/api/flags/health`       | 200     |
//!
//! Unknown ids and names map to 404, name collisions to 409 and invalid
//! bodies to 400. Errors carry a JSON body `{"error": "..."}`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::FlagRequest;
use super::FlagService;
use crate::constants::AUTHORITY_HEALTHY_BODY;
use crate::Error;
use crate::Result;
use crate::StoreError;

fn with_service(
    service: Arc<FlagService>
) -> impl Filter<Extract = (Arc<FlagService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

pub fn routes(
    service: Arc<FlagService>
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "flags")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(|service: Arc<FlagService>| respond(service, StatusCode::OK, |s| s.list()));

    let create = warp::path!("api" / "flags")
        .and(warp::post())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(|request: FlagRequest, service: Arc<FlagService>| {
            respond(service, StatusCode::CREATED, move |s| s.create(request))
        });

    let stats = warp::path!("api" / "flags" / "stats")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(|service: Arc<FlagService>| respond(service, StatusCode::OK, |s| s.stats()));

    let health = warp::path!("api" / "flags" / "health")
        .and(warp::get())
        .map(|| AUTHORITY_HEALTHY_BODY.into_response());

    let by_name = warp::path!("api" / "flags" / "name" / String)
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(|name: String, service: Arc<FlagService>| {
            respond(service, StatusCode::OK, move |s| s.get_by_name(&name))
        });

    let get = warp::path!("api" / "flags" / u64)
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(|id: u64, service: Arc<FlagService>| respond(service, StatusCode::OK, move |s| s.get(id)));

    let update = warp::path!("api" / "flags" / u64)
        .and(warp::put())
        .and(json_body())
        .and(with_service(service.clone()))
        .and_then(|id: u64, request: FlagRequest, service: Arc<FlagService>| {
            respond(service, StatusCode::OK, move |s| s.update(id, request))
        });

    let delete = warp::path!("api" / "flags" / u64)
        .and(warp::delete())
        .and(with_service(service.clone()))
        .and_then(|id: u64, service: Arc<FlagService>| async move {
            let response = match offload(service, move |s| s.delete(id)).await {
                Ok(_) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => error_reply(&e),
            };
            Ok::<_, Rejection>(response)
        });

    let toggle = warp::path!("api" / "flags" / u64 / "toggle")
        .and(warp::post())
        .and(with_service(service))
        .and_then(|id: u64, service: Arc<FlagService>| respond(service, StatusCode::OK, move |s| s.toggle(id)));

    list.or(create)
        .unify()
        .or(stats)
        .unify()
        .or(health)
        .unify()
        .or(by_name)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(toggle)
        .unify()
        .recover(handle_rejection)
        .unify()
}

fn json_body() -> impl Filter<Extract = (FlagRequest,), Error = Rejection> + Clone {
    warp::body::content_length_limit(64 * 1024).and(warp::body::json())
}

/// Runs a service call on the blocking pool. Store writes may wait on disk
/// and must stay off the async workers.
async fn offload<T, F>(
    service: Arc<FlagService>,
    op: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&FlagService) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&service)).await?
}

async fn respond<T, F>(
    service: Arc<FlagService>,
    status: StatusCode,
    op: F,
) -> std::result::Result<Response, Rejection>
where
    T: Serialize + Send + 'static,
    F: FnOnce(&FlagService) -> Result<T> + Send + 'static,
{
    Ok(reply(offload(service, op).await, status))
}

fn reply<T: Serialize>(
    result: Result<T>,
    status: StatusCode,
) -> Response {
    match result {
        Ok(body) => warp::reply::with_status(warp::reply::json(&body), status).into_response(),
        Err(e) => error_reply(&e),
    }
}

fn status_of(e: &Error) -> StatusCode {
    match e {
        Error::Store(StoreError::NotFound(_)) | Error::Store(StoreError::NameNotFound(_)) => StatusCode::NOT_FOUND,
        Error::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
        Error::Store(StoreError::Validation(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(e: &Error) -> Response {
    let status = status_of(e);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Flag request failed: {}", e);
    }
    warp::reply::with_status(warp::reply::json(&json!({ "error": e.to_string() })), status).into_response()
}

async fn handle_rejection(rejection: Rejection) -> std::result::Result<Response, Rejection> {
    if rejection.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        let body = json!({ "error": "Validation failed: malformed request body" });
        return Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::BAD_REQUEST).into_response());
    }
    Err(rejection)
}

/// Binds the operator API. Returns the bound address and the server future,
/// which resolves once `shutdown` fires.
pub fn bind(
    service: Arc<FlagService>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let (bound, server) = warp::serve(routes(service))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|source| Error::Bind { addr, source })?;
    info!(%bound, "Feature Flag Service listening");
    Ok((bound, server))
}
