//! Fire-and-forget HTTP callback after a job reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// Upper bound on one webhook delivery.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("network error: {0}")]
    Network(String),
    #[error("callback returned status {0}")]
    Status(u16),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub job_id: String,
    pub status: String,
    pub audio_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub completed_at: String,
    pub metadata: Value,
}

/// Posts terminal-state payloads on a fresh, bounded scope so delivery
/// survives teardown of the job's own cancellation scope.
pub struct WebhookDispatcher {
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Detached delivery; failures are logged only.
    pub fn dispatch(self: &Arc<Self>, url: String, payload: WebhookPayload) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let job_id = payload.job_id.clone();
            match dispatcher.send(&url, &payload).await {
                Ok(()) => info!(job_id = %job_id, "webhook delivered"),
                Err(e) => error!(job_id = %job_id, error = %e, "failed to send webhook"),
            }
        });
    }

    pub async fn send(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| WebhookError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WebhookError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> WebhookPayload {
        WebhookPayload {
            job_id: "job_1".into(),
            status: "completed".into(),
            audio_path: "/audio/a.wav".into(),
            transcript: Some(r#"{"text":"hi"}"#.into()),
            summary: None,
            error_message: None,
            completed_at: "2026-08-02T12:00:00Z".into(),
            metadata: serde_json::json!({
                "model": "whisper-large-v3",
                "model_family": "groq",
                "duration_ms": 1234,
            }),
        }
    }

    #[test]
    fn payload_serializes_required_fields() {
        let json = serde_json::to_value(payload()).unwrap();
        assert_eq!(json["job_id"], "job_1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["metadata"]["duration_ms"], 1234);
        // Unset optionals are absent, not null
        assert!(json.get("summary").is_none());
        assert!(json.get("error_message").is_none());
    }

    #[tokio::test]
    async fn unreachable_callback_is_network_error() {
        let dispatcher = WebhookDispatcher::new();
        // Nothing listens on this port; the connection is refused
        let result = dispatcher.send("http://127.0.0.1:1/callback", &payload()).await;
        assert!(matches!(result, Err(WebhookError::Network(_))));
    }

    #[tokio::test]
    async fn dispatch_does_not_block_caller() {
        let dispatcher = Arc::new(WebhookDispatcher::new());
        // Fire-and-forget must return immediately even though delivery fails
        dispatcher.dispatch("http://127.0.0.1:1/callback".into(), payload());
    }
}
