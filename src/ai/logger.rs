//! AI Interaction Logger
//!
//! Turns one finished AI call into an [`AiInteractionLog`] and persists it.
//! Logs are written once, with their terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{StudyError, StudyResult};
use crate::models::{AiEndpoint, AiInteractionLog, InteractionStatus};
use crate::store::{InteractionFilter, InteractionStats, Store};

/// Everything known about a finished call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub endpoint: AiEndpoint,
    pub ai_model: String,
    pub request_payload: Value,
    #[serde(default)]
    pub response_data: Value,
    pub status: InteractionStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    pub request_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub response_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Tags every log for the endpoint carries
pub fn default_tags(endpoint: AiEndpoint) -> Vec<String> {
    let kind = match endpoint {
        AiEndpoint::AnalyzeImage => "image-analysis",
        AiEndpoint::GenerateExercises => "exercise-generation",
        AiEndpoint::AnalyzeWordDetails => "word-analysis",
        AiEndpoint::AnalyzePronunciation => "pronunciation-analysis",
    };
    vec![kind.to_string(), "chinese-learning".to_string()]
}

impl InteractionRecord {
    /// Build the persisted log, spilling oversized payloads
    pub fn into_log(self) -> AiInteractionLog {
        let mut log = AiInteractionLog::new(
            &self.session_id,
            self.endpoint,
            &self.ai_model,
            self.request_timestamp,
        );
        log.user_id = self.user_id;
        log.set_request_payload(self.request_payload);
        log.set_response_data(self.response_data);
        log.status = self.status;
        log.error_message = self.error_message;
        log.response_timestamp = self.response_timestamp;
        log.response_time = log
            .processing_time()
            .map(|ms| ms.max(0) as u64)
            .unwrap_or_default();
        log.user_agent = self.user_agent;
        log.ip_address = self.ip_address;
        log.add_tags(&default_tags(self.endpoint));
        log.add_tags(&self.tags);
        log.notes = self.notes;
        log
    }
}

pub struct InteractionLogger {
    store: Arc<dyn Store>,
}

impl InteractionLogger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record(&self, record: InteractionRecord) -> StudyResult<AiInteractionLog> {
        let log = record.into_log();
        self.store.save_interaction(&log).await?;
        debug!(
            "Logged {} call {} ({}, {}ms)",
            log.endpoint,
            log.id,
            log.status.as_str(),
            log.response_time
        );
        Ok(log)
    }

    pub async fn get(&self, id: &str) -> StudyResult<AiInteractionLog> {
        self.store
            .get_interaction(id)
            .await?
            .ok_or_else(|| StudyError::not_found("interaction", id))
    }

    /// Newest first
    pub async fn by_session(&self, session_id: &str, limit: usize) -> StudyResult<Vec<AiInteractionLog>> {
        let filter = InteractionFilter {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        };
        Ok(self.store.list_interactions(&filter, limit).await?)
    }

    /// Newest first
    pub async fn by_user(&self, user_id: &str, limit: usize) -> StudyResult<Vec<AiInteractionLog>> {
        let filter = InteractionFilter {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        };
        Ok(self.store.list_interactions(&filter, limit).await?)
    }

    pub async fn list(&self, filter: &InteractionFilter, limit: usize) -> StudyResult<Vec<AiInteractionLog>> {
        Ok(self.store.list_interactions(filter, limit).await?)
    }

    pub async fn stats(&self, filter: &InteractionFilter) -> StudyResult<InteractionStats> {
        Ok(self.store.interaction_stats(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::Duration;
    use serde_json::json;

    fn record(session: &str, status: InteractionStatus) -> InteractionRecord {
        let started = Utc::now();
        InteractionRecord {
            session_id: session.to_string(),
            user_id: Some("u1".to_string()),
            endpoint: AiEndpoint::AnalyzeImage,
            ai_model: "gemini-2.5-flash".to_string(),
            request_payload: json!({"image": "data:image/png;base64,AAAA"}),
            response_data: json!({"vocabulary": []}),
            status,
            error_message: None,
            request_timestamp: started,
            response_timestamp: Some(started + Duration::milliseconds(1500)),
            user_agent: None,
            ip_address: None,
            tags: vec!["chinese-learning".to_string(), "lesson-3".to_string()],
            notes: None,
        }
    }

    #[test]
    fn test_into_log_derives_response_time_and_tags() {
        let log = record("s1", InteractionStatus::Success).into_log();
        assert_eq!(log.response_time, 1500);
        assert_eq!(log.tags, vec!["image-analysis", "chinese-learning", "lesson-3"]);
        assert!(log.request_payload_overflow.is_none());
    }

    #[tokio::test]
    async fn test_record_and_query() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let logger = InteractionLogger::new(store);

        let ok = logger.record(record("s1", InteractionStatus::Success)).await.unwrap();
        logger.record(record("s1", InteractionStatus::Error)).await.unwrap();
        logger.record(record("s2", InteractionStatus::Success)).await.unwrap();

        assert_eq!(logger.by_session("s1", 10).await.unwrap().len(), 2);
        assert_eq!(logger.by_user("u1", 10).await.unwrap().len(), 3);
        assert_eq!(logger.get(&ok.id).await.unwrap().session_id, "s1");
        assert!(matches!(
            logger.get("missing").await.unwrap_err(),
            StudyError::NotFound { .. }
        ));

        let stats = logger.stats(&InteractionFilter::default()).await.unwrap();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.success_calls, 2);
        assert_eq!(stats.error_calls, 1);
    }
}
