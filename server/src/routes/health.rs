//! Liveness endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub model_layer: String,
}

#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// GET / - Banner
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "AgroDetect AI Backend Running".to_string(),
    })
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: agrodetect::VERSION.to_string(),
        model_layer: state.model_layer.clone(),
    })
}
