use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::DetectionError;
use crate::fetch::resolve_reference;
use crate::model::InferenceModel;
use crate::pipeline::EggCounter;
use crate::report::EggReport;

pub const MISSING_IMAGE_PATH: &str = "No image path provided";

/// Shared state of the HTTP service.
pub struct AppState<M> {
    pub counter: EggCounter<M>,
    pub download_dir: PathBuf,
}

impl<M> AppState<M> {
    pub fn new(counter: EggCounter<M>, download_dir: PathBuf) -> Self {
        Self {
            counter,
            download_dir,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CountRequest {
    #[serde(default)]
    pub image_path: Option<String>,
}

/// Error half of a handler result, rendered as `{"error": ...}`.
#[derive(Debug)]
pub enum ServiceError {
    BadRequest(String),
    Detection(DetectionError),
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Detection(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Detection(DetectionError::ModelUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Detection(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::BadRequest(m) | Self::Internal(m) => m.clone(),
            Self::Detection(e) => e.to_string(),
        }
    }
}

impl From<DetectionError> for ServiceError {
    fn from(e: DetectionError) -> Self {
        Self::Detection(e)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

pub fn router<M: InferenceModel + 'static>(state: Arc<AppState<M>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/count_eggs", post(count_eggs::<M>))
        .with_state(state)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /count_eggs` with `{"image_path": "<path or URL>"}`.
pub async fn count_eggs<M: InferenceModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    body: Bytes,
) -> Result<Json<EggReport>, ServiceError> {
    let request: CountRequest = serde_json::from_slice(&body).unwrap_or_default();
    let reference = request
        .image_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ServiceError::BadRequest(MISSING_IMAGE_PATH.to_string()))?;

    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        let image_path = resolve_reference(&reference, &state.download_dir)?;
        state.counter.count(&image_path)
    })
    .await
    .map_err(|e| ServiceError::Internal(format!("detection task failed: {e}")))?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(report) => {
            info!(egg_count = report.egg_count, elapsed_ms, "count_eggs");
            Ok(Json(report))
        }
        Err(e) => {
            error!(error = %e, elapsed_ms, "count_eggs failed");
            Err(e.into())
        }
    }
}
