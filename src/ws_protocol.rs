use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TIMER_TICK: &str = "timer_tick";
pub const QUIZ_SUBMITTED: &str = "quiz_submitted";
pub const ATTEMPT_ABANDONED: &str = "attempt_abandoned";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    pub event: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl WsEnvelope {
    pub fn now(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
            request_id: None,
            ts: Some(Utc::now().to_rfc3339()),
        }
    }
}
