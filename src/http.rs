//! HTTP API over the prediction service

use crate::error::ChurnError;
use crate::metrics::MetricsSnapshot;
use crate::service::{CustomerLookup, PredictionService};
use crate::types::{Industry, RawBatch, ScoredPrediction};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub const ACCEPTED_HEADER: &str = "x-customers-accepted";
pub const REJECTED_HEADER: &str = "x-customers-rejected";

type SharedService = Arc<PredictionService>;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub industry: Industry,
    pub features: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub industry: Industry,
    pub data: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub metrics: MetricsSnapshot,
}

/// Service error rendered as `{"error": message}`
#[derive(Debug)]
pub struct ApiError(ChurnError);

impl From<ChurnError> for ApiError {
    fn from(err: ChurnError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ChurnError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChurnError::Validation(_) => StatusCode::BAD_REQUEST,
            ChurnError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.0.is_client_error() {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        } else {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the router with CORS and request tracing
pub fn router(service: SharedService, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict_batch", post(predict_batch))
        .route("/predict_single", post(predict_single))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(service)
}

/// Any origin when none are configured, otherwise exactly the configured ones
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(ACCEPTED_HEADER),
            HeaderName::from_static(REJECTED_HEADER),
        ]);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

async fn predict(
    State(service): State<SharedService>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<ScoredPrediction>, ApiError> {
    let Json(request) = payload?;
    let prediction = run_blocking(service, move |service| {
        service.predict(request.industry, &request.features)
    })
    .await?;
    Ok(Json(prediction))
}

async fn predict_batch(
    State(service): State<SharedService>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let batch = RawBatch::from_json_rows(request.industry, request.data)?;
    let result = run_blocking(service, move |service| service.predict_batch(batch)).await?;

    let headers = [
        (ACCEPTED_HEADER, result.summary.accepted.to_string()),
        (REJECTED_HEADER, result.summary.rejected_count().to_string()),
    ];
    Ok((headers, Json(result.predictions)))
}

async fn predict_single(
    State(service): State<SharedService>,
    payload: Result<Json<CustomerLookup>, JsonRejection>,
) -> Result<Json<ScoredPrediction>, ApiError> {
    let Json(lookup) = payload?;
    let prediction = run_blocking(service, move |service| service.predict_single(&lookup)).await?;
    Ok(Json(prediction))
}

/// Table I/O, lock waits and inference run on the blocking pool
async fn run_blocking<T, F>(service: SharedService, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&PredictionService) -> crate::error::Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || work(&service))
        .await
        .map_err(|e| ChurnError::Task(e.to_string()))?;
    Ok(result?)
}

async fn health(State(service): State<SharedService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        metrics: service.metrics().snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |err: ChurnError| ApiError::from(err).into_response().status();

        assert_eq!(status(ChurnError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ChurnError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ChurnError::Model("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
