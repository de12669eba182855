//! Minimal chunk-upload endpoint feeding the chunk processor. Full job CRUD
//! lives in the embedding application; this route exists so live-session
//! chunks have an ingress next to the streaming socket.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use verbatim_core::params::JobParams;
use verbatim_stream::ChunkSubmission;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct QuickTranscribeQuery {
    #[serde(default)]
    token: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    save_to_portal: bool,
    #[serde(default)]
    synchronous: bool,
    #[serde(default)]
    model_family: String,
    #[serde(default)]
    diarize: bool,
}

/// POST raw audio bytes; returns the quick-job entry.
pub async fn quick_transcribe(
    Query(query): Query<QuickTranscribeQuery>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    if state.verifier.verify(&query.token).is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty audio body").into_response();
    }

    let params = JobParams {
        model_family: query.model_family,
        diarize: query.diarize,
        ..Default::default()
    };

    let submission = ChunkSubmission {
        audio: body.to_vec(),
        filename: query.filename.unwrap_or_else(|| "chunk.webm".to_owned()),
        title: query.title,
        params,
        session_id: query.session_id,
        save_to_portal: query.save_to_portal,
        synchronous: query.synchronous,
    };

    match state.chunks.clone().submit(submission).await {
        Ok(entry) => axum::Json(entry).into_response(),
        Err(e) => {
            warn!(error = %e, "chunk submission failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
