//! Saga start endpoint.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::SagaId;
use state_store::StateStore;

use crate::AppState;
use crate::error::{ApiError, INVALID_SAGA_ID};

/// Query key carrying the saga id.
const SAGA_ID_PARAM: &str = "saga_id";

/// POST /start?saga_id=<uuid>: starts (or restarts) a saga.
pub async fn start<S: StateStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let raw = first_saga_id(query);
    let saga_id: SagaId = raw.trim().parse().map_err(|e| {
        metrics::counter!("saga_start_rejected_total").increment(1);
        tracing::warn!(saga_id = %raw, error = %e, "rejecting start request");
        ApiError::BadRequest(INVALID_SAGA_ID.to_string())
    })?;

    state.coordinator.start(saga_id).await?;

    Ok(StatusCode::OK)
}

/// First `saga_id` value of the query string; repeats are ignored and an
/// undecodable query counts as a missing id.
fn first_saga_id(query: Result<Query<Vec<(String, String)>>, QueryRejection>) -> String {
    match query {
        Ok(Query(pairs)) => pairs
            .into_iter()
            .find(|(key, _)| key == SAGA_ID_PARAM)
            .map(|(_, value)| value)
            .unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "undecodable start query");
            String::new()
        }
    }
}
