//! Prediction endpoint - classify an uploaded leaf image with a Grad-CAM overlay

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use agrodetect::{AgroDetectError, Analysis};

use crate::state::SharedState;

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub disease: String,
    pub confidence: f32,
    /// Base64 JPEG of the heatmap overlay
    pub heatmap: String,
    pub ai_text: String,
}

impl From<Analysis> for PredictResponse {
    fn from(analysis: Analysis) -> Self {
        Self {
            disease: analysis.prediction.label,
            confidence: analysis.prediction.confidence,
            heatmap: analysis.overlay_base64,
            ai_text: analysis.explanation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Map an analysis failure onto an HTTP error
fn analysis_error(err: AgroDetectError) -> ApiError {
    if err.is_client_error() {
        warn!("Rejected upload: {}", err);
        api_error(StatusCode::BAD_REQUEST, "Invalid image")
    } else {
        error!("Analysis failed: {}", err);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Analysis failed")
    }
}

/// Read the bytes of the `file` field
async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {}", e);
        api_error(StatusCode::BAD_REQUEST, "Malformed multipart body")
    })? {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field.bytes().await.map_err(|e| {
                warn!("Failed to read upload: {}", e);
                api_error(StatusCode::BAD_REQUEST, "Failed to read upload")
            })?;
            return Ok(bytes.to_vec());
        }
    }

    Err(api_error(StatusCode::BAD_REQUEST, "No file uploaded"))
}

/// POST /predict - Analyze the image in multipart field `file`
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let bytes = read_file_field(&mut multipart).await?;
    info!("Received {} byte upload", bytes.len());

    let analysis = tokio::task::spawn_blocking(move || state.analyzer.analyze(&bytes))
        .await
        .map_err(|e| {
            error!("Analysis task failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Analysis failed")
        })?
        .map_err(analysis_error)?;

    Ok(Json(analysis.into()))
}
