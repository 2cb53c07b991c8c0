//! Audit records for generative-AI calls
//!
//! Payloads whose serialized JSON exceeds [`OVERFLOW_THRESHOLD_CHARS`] are
//! spilled to raw bytes and the JSON field keeps a small placeholder. Read
//! through [`AiInteractionLog::full_request_payload`] and
//! [`AiInteractionLog::full_response_data`] to always get the complete value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Serialized-character count above which payloads spill to bytes
pub const OVERFLOW_THRESHOLD_CHARS: usize = 16_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AiEndpoint {
    AnalyzeImage,
    GenerateExercises,
    AnalyzeWordDetails,
    AnalyzePronunciation,
}

impl AiEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiEndpoint::AnalyzeImage => "analyzeImage",
            AiEndpoint::GenerateExercises => "generateExercises",
            AiEndpoint::AnalyzeWordDetails => "analyzeWordDetails",
            AiEndpoint::AnalyzePronunciation => "analyzePronunciation",
        }
    }
}

impl std::fmt::Display for AiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AiEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyzeImage" => Ok(AiEndpoint::AnalyzeImage),
            "generateExercises" => Ok(AiEndpoint::GenerateExercises),
            "analyzeWordDetails" => Ok(AiEndpoint::AnalyzeWordDetails),
            "analyzePronunciation" => Ok(AiEndpoint::AnalyzePronunciation),
            other => Err(format!("unknown AI endpoint: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionStatus {
    #[default]
    Pending,
    Success,
    Error,
    Timeout,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::Pending => "pending",
            InteractionStatus::Success => "success",
            InteractionStatus::Error => "error",
            InteractionStatus::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for InteractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InteractionStatus::Pending),
            "success" => Ok(InteractionStatus::Success),
            "error" => Ok(InteractionStatus::Error),
            "timeout" => Ok(InteractionStatus::Timeout),
            other => Err(format!("unknown interaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInteractionLog {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub endpoint: AiEndpoint,
    pub ai_model: String,
    pub request_payload: Value,
    pub response_data: Value,
    /// Stored out of line by the store, never in the JSON document
    #[serde(skip)]
    pub request_payload_overflow: Option<Vec<u8>>,
    #[serde(skip)]
    pub response_data_overflow: Option<Vec<u8>>,
    pub request_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub response_timestamp: Option<DateTime<Utc>>,
    /// Milliseconds
    pub response_time: u64,
    pub status: InteractionStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Split a value into (json field, overflow bytes) using `limit`
pub fn spill(value: Value, limit: usize) -> (Value, Option<Vec<u8>>) {
    let serialized = match serde_json::to_string(&value) {
        Ok(s) => s,
        Err(_) => return (value, None),
    };
    // Byte length bounds char count from above
    if serialized.len() <= limit || serialized.chars().count() <= limit {
        return (value, None);
    }
    let placeholder = json!({
        "overflow": true,
        "size": serialized.len(),
    });
    (placeholder, Some(serialized.into_bytes()))
}

fn resolve(field: &Value, overflow: Option<&Vec<u8>>) -> Value {
    match overflow {
        Some(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|_| field.clone()),
        None => field.clone(),
    }
}

impl AiInteractionLog {
    pub fn new(session_id: &str, endpoint: AiEndpoint, ai_model: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: super::new_id(),
            session_id: session_id.to_string(),
            user_id: None,
            endpoint,
            ai_model: ai_model.to_string(),
            request_payload: Value::Null,
            response_data: Value::Null,
            request_payload_overflow: None,
            response_data_overflow: None,
            request_timestamp: now,
            response_timestamp: None,
            response_time: 0,
            status: InteractionStatus::Pending,
            error_message: None,
            user_agent: None,
            ip_address: None,
            tags: Vec::new(),
            notes: None,
            created_at: now,
        }
    }

    pub fn set_request_payload(&mut self, payload: Value) {
        self.set_request_payload_with_limit(payload, OVERFLOW_THRESHOLD_CHARS);
    }

    pub fn set_response_data(&mut self, data: Value) {
        self.set_response_data_with_limit(data, OVERFLOW_THRESHOLD_CHARS);
    }

    pub(crate) fn set_request_payload_with_limit(&mut self, payload: Value, limit: usize) {
        let (field, overflow) = spill(payload, limit);
        self.request_payload = field;
        self.request_payload_overflow = overflow;
    }

    pub(crate) fn set_response_data_with_limit(&mut self, data: Value, limit: usize) {
        let (field, overflow) = spill(data, limit);
        self.response_data = field;
        self.response_data_overflow = overflow;
    }

    pub fn full_request_payload(&self) -> Value {
        resolve(&self.request_payload, self.request_payload_overflow.as_ref())
    }

    pub fn full_response_data(&self) -> Value {
        resolve(&self.response_data, self.response_data_overflow.as_ref())
    }

    /// Milliseconds between request and response, if the response arrived
    pub fn processing_time(&self) -> Option<i64> {
        self.response_timestamp
            .map(|done| (done - self.request_timestamp).num_milliseconds())
    }

    pub fn add_tags(&mut self, tags: &[String]) {
        super::merge_tags(&mut self.tags, tags);
    }
}
