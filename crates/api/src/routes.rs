use crate::{coordinator::Coordinator, error::ApiError};
use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use chainpulse_ingestor::types::Network;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/overview", get(overview))
        .route("/api/validators", get(validators))
        .with_state(coordinator)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct OverviewQuery {
    /// Clears all nested caches and forces a fresh fetch.
    #[serde(default)]
    refresh: bool,
}

async fn overview(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<OverviewQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let response = coordinator.overview(query.refresh).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct ValidatorsQuery {
    network: Option<String>,
}

async fn validators(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<ValidatorsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = query.network.ok_or_else(|| {
        ApiError::Validation(format!(
            "missing network parameter, accepted values: {}",
            Network::ACCEPTED.join(", ")
        ))
    })?;
    let network: Network = raw.parse().map_err(ApiError::Validation)?;

    let subnets = coordinator.subnet_stats(network).await?;
    Ok(Json(subnets))
}
