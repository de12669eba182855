//! WebSocket upgrade and frame loop for live streaming sessions.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, info, warn};

use verbatim_stream::StreamSession;

use crate::auth::AuthenticatedUser;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Bearer credential; headers are awkward on browser WebSockets, so the
    /// token rides the upgrade query string.
    #[serde(default)]
    token: String,
}

/// Rejects with 401 before the channel opens; the socket protocol itself
/// never carries authentication.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> Response {
    let user = match state.verifier.verify(&query.token) {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "rejecting stream upgrade");
            return (
                StatusCode::UNAUTHORIZED,
                axum::Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    info!(user_id = %user.user_id, "authenticated user connected to stream");
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user: AuthenticatedUser) {
    let mut session = StreamSession::new(state.upload_root.clone(), state.jobs.clone(), user.user_id);

    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = session.handle_text(text.as_str()).await {
                    // Only a failure to open the session file lands here
                    error!(session_id = %session.id(), error = %e, "closing stream");
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                if let Err(e) = session.handle_binary(&data).await {
                    warn!(session_id = %session.id(), error = %e, "failed to write audio frame");
                }
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "websocket read error");
                break;
            }
        }
    }

    let session_id = session.id().clone();
    session.close().await;

    // Merge any chunk files the session accumulated; a single-file session
    // is a quiet no-op. Runs on its own scope, the socket is already gone.
    if let Err(e) = state
        .finalizer
        .finalize(session_id.as_str(), &tokio_util::sync::CancellationToken::new())
        .await
    {
        warn!(session_id = %session_id, error = %e, "session finalization failed");
    }
}
