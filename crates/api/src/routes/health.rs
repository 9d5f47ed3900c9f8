//! Readiness, liveness and metrics endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::Serialize;
use state_store::StateStore;

use crate::AppState;

/// How long readiness waits for the database.
const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
}

/// GET /readiness: 200 when the database answers within a second, 500 otherwise.
pub async fn readiness<S: StateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let check = tokio::time::timeout(READINESS_TIMEOUT, state.store.status_check()).await;

    match check {
        Ok(Ok(())) => (StatusCode::OK, Json(ReadinessResponse { status: "ok" })),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "readiness: status check failed");
            not_ready()
        }
        Err(_) => {
            tracing::error!("readiness: status check timed out");
            not_ready()
        }
    }
}

fn not_ready() -> (StatusCode, Json<ReadinessResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ReadinessResponse {
            status: "db not ready",
        }),
    )
}

/// Empty fields are left out of the JSON body.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pod: String,
    #[serde(rename = "podIP", skip_serializing_if = "String::is_empty")]
    pub pod_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub node: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// GET /liveness: always 200 while the process serves requests.
pub async fn liveness<S: StateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<LivenessResponse> {
    let pod = &state.pod;
    Json(LivenessResponse {
        status: "up",
        build: state.build.clone(),
        host: pod.host.clone(),
        pod: pod.pod.clone(),
        pod_ip: pod.pod_ip.clone(),
        node: pod.node.clone(),
        namespace: pod.namespace.clone(),
    })
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn metrics<S: StateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
