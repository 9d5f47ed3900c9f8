//! HTTP surface and process wiring for the saga service.
//!
//! Exposes `/start` to begin sagas plus readiness, liveness and Prometheus
//! endpoints, and holds the pieces both binaries share: configuration,
//! telemetry setup and the participant stub.

pub mod config;
pub mod error;
pub mod routes;
pub mod stub;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaCoordinator;
use state_store::StateStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::PodInfo;

/// Shared application state accessible from all handlers.
pub struct AppState<S: StateStore> {
    pub coordinator: Arc<SagaCoordinator<S>>,
    /// Same store the coordinator writes to; used by readiness.
    pub store: S,
    pub build: String,
    pub pod: PodInfo,
    pub metrics: PrometheusHandle,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StateStore + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/start", post(routes::start::start::<S>))
        .route("/readiness", get(routes::health::readiness::<S>))
        .route("/liveness", get(routes::health::liveness::<S>))
        .route("/metrics", get(routes::health::metrics::<S>))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
