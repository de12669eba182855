use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event published for one job and fanned out to its subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: String,
    /// Event kind, e.g. `job_update`.
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: String,
    pub data: Value,
}

impl JobEvent {
    pub fn new(job_id: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            job_id: job_id.into(),
            event_type: event_type.into(),
            timestamp: Utc::now().to_rfc3339(),
            data,
        }
    }

    /// The status-change event emitted at every pipeline transition.
    pub fn job_update(job_id: impl Into<String>, status: &str, error: Option<&str>) -> Self {
        let job_id = job_id.into();
        let mut data = serde_json::json!({
            "job_id": job_id.clone(),
            "status": status,
        });
        if let Some(err) = error {
            data["error"] = Value::String(err.to_owned());
        }
        Self::new(job_id, "job_update", data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_update_carries_status() {
        let evt = JobEvent::job_update("job_1", "processing", None);
        assert_eq!(evt.event_type, "job_update");
        assert_eq!(evt.data["status"], "processing");
        assert_eq!(evt.data["job_id"], "job_1");
        assert!(evt.data.get("error").is_none());
    }

    #[test]
    fn job_update_includes_error_when_present() {
        let evt = JobEvent::job_update("job_1", "failed", Some("backend returned 500"));
        assert_eq!(evt.data["error"], "backend returned 500");
    }

    #[test]
    fn serializes_type_field() {
        let evt = JobEvent::new("job_2", "job_update", serde_json::json!({}));
        let json = serde_json::to_string(&evt).unwrap();
        assert!(json.contains(r#""type":"job_update""#));
        assert!(json.contains(r#""job_id":"job_2""#));
    }
}
