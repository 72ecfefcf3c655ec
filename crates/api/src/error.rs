use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chainpulse_ingestor::error::FetchError;
use chainpulse_processor::aggregate::AggregationError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("aggregation deadline exceeded")]
    AggregateTimeout,

    #[error("upstream failure: {0}")]
    Upstream(FetchError),

    #[error("configuration error: {0}")]
    Configuration(#[from] AggregationError),
}

impl ApiError {
    /// Failures escaping a coordinator-level fetch: a timeout there means the
    /// deadline was exceeded, anything else is an upstream failure.
    pub fn from_fetch(err: FetchError) -> Self {
        match err {
            FetchError::Timeout => ApiError::AggregateTimeout,
            other => ApiError::Upstream(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::AggregateTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(_) | ApiError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
