//! Health HTTP surface (spec §6 "Health surface"): liveness, readiness,
//! Prometheus exposition, and debug routes gated by `DebugEndpoints`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::model::ClusterSnapshot;
use crate::observability::Metrics;
use crate::store::Store;

/// Shared read-only view the orchestrator publishes into and the health
/// surface reads out of, without the two sides taking a shared lock on
/// anything but the snapshot pointer itself (spec §5 "Shared-resource
/// policy": the ready flag and latest snapshot are atomic/lock-light).
#[derive(Clone)]
pub struct AgentHandle {
    pub ready: Arc<AtomicBool>,
    pub latest_snapshot: watch::Receiver<Option<Arc<ClusterSnapshot>>>,
    pub metrics: Metrics,
    pub store: Arc<Store>,
    pub debug_endpoints: bool,
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    ready: bool,
}

pub fn router(handle: AgentHandle) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/debug/snapshot", get(debug_snapshot))
        .route("/debug/store", get(debug_store))
        .with_state(handle)
}

pub async fn serve(handle: AgentHandle, port: u16, shutdown: CancellationToken) -> std::io::Result<()> {
    let app = router(handle);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health surface listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn healthz() -> impl IntoResponse {
    Json(StatusBody { status: "ok" })
}

async fn readyz(State(handle): State<AgentHandle>) -> Response {
    let ready = handle.ready.load(Ordering::SeqCst);
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadyBody { ready })).into_response()
}

async fn metrics(State(handle): State<AgentHandle>) -> Response {
    let families = handle.metrics.registry.gather();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }
    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buf,
    )
        .into_response()
}

async fn debug_snapshot(State(handle): State<AgentHandle>) -> Response {
    if !handle.debug_endpoints {
        return StatusCode::NOT_FOUND.into_response();
    }
    match handle.latest_snapshot.borrow().clone() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn debug_store(State(handle): State<AgentHandle>) -> Response {
    if !handle.debug_endpoints {
        return StatusCode::NOT_FOUND.into_response();
    }
    let counts: HashMap<&'static str, usize> = handle.store.item_counts();
    Json(counts).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn handle(debug_endpoints: bool, ready: bool) -> AgentHandle {
        let (_tx, rx) = watch::channel(None);
        AgentHandle {
            ready: Arc::new(AtomicBool::new(ready)),
            latest_snapshot: rx,
            metrics: Metrics::new(),
            store: Arc::new(Store::new(system_clock())),
            debug_endpoints,
        }
    }

    #[tokio::test]
    async fn healthz_always_reports_ok() {
        let app = router(handle(false, false));
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_reflects_the_ready_flag() {
        let not_ready = router(handle(false, false));
        let response = not_ready
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ready = router(handle(false, true));
        let response = ready
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn debug_routes_404_when_disabled() {
        let app = router(handle(false, true));
        let response = app
            .oneshot(Request::builder().uri("/debug/store").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn debug_snapshot_is_204_before_the_first_build() {
        let app = router(handle(true, true));
        let response = app
            .oneshot(Request::builder().uri("/debug/snapshot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn debug_store_reports_item_counts_when_enabled() {
        let app = router(handle(true, true));
        let response = app
            .oneshot(Request::builder().uri("/debug/store").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
