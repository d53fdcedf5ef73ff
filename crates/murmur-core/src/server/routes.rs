use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::AppState;
use crate::client::probe::RUNNING;
use crate::dispatcher::SynthesisRequest;
use crate::error::MurmurError;
use crate::model::{ModelInventory, ModelKey};

/// File name offered to clients that save the response
pub const OUTPUT_FILE_NAME: &str = "tts_output.wav";

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// Every field optional so a missing `text` is reported as a bad request
// rather than a deserialization failure.
#[derive(Debug, Deserialize)]
pub(crate) struct TtsBody {
    text: Option<String>,
    #[serde(default)]
    model_name: Option<ModelKey>,
    #[serde(default)]
    language: Option<String>,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: RUNNING })
}

pub(crate) async fn synthesize(
    State(state): State<AppState>,
    body: Result<Json<TtsBody>, JsonRejection>,
) -> Result<Response, MurmurError> {
    let Json(body) = body.map_err(|rejection| MurmurError::bad_request(rejection.body_text()))?;
    let text = body
        .text
        .ok_or_else(|| MurmurError::bad_request("No text provided"))?;
    let request = SynthesisRequest {
        text,
        model_name: body.model_name,
        language: body.language,
    };

    let audio = state.dispatcher.synthesize(&request).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{OUTPUT_FILE_NAME}\""),
            ),
        ],
        audio,
    )
        .into_response())
}

pub(crate) async fn models(State(state): State<AppState>) -> Json<ModelInventory> {
    Json(state.dispatcher.cache().inventory())
}

impl IntoResponse for MurmurError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest { message } => {
                warn!("Rejected request: {}", message);
                (StatusCode::BAD_REQUEST, message)
            }
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
