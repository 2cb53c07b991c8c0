//! AI gateway (primary request path)
//!
//! Calls the backend under the configured timeout and answers the caller
//! as soon as the result is known. Logging and the auto-task go to the
//! background worker; nothing after the dispatch can fail the call.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::content::AiContent;
use super::logger::InteractionRecord;
use super::upstream::{UpstreamCategory, UpstreamError};
use crate::config::AiConfig;
use crate::models::{merge_tags, AiEndpoint, InteractionStatus};
use crate::pipeline::{AutoTask, BackgroundJob, PipelineMetadata, WorkerHandle};

/// Normalized backend output
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub content: Value,
    /// Unparsed model text, when the backend has it
    pub raw: Option<String>,
}

/// The generative-AI client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn generate(&self, endpoint: AiEndpoint, payload: &Value) -> Result<BackendResponse, UpstreamError>;
}

/// Who is calling, for logs and created records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub endpoint: AiEndpoint,
    pub content: Value,
    /// Milliseconds
    pub response_time: u64,
    /// Whether logging and post-processing were queued
    pub queued: bool,
}

pub struct AiGateway {
    backend: Arc<dyn AiBackend>,
    worker: WorkerHandle,
    model: String,
    timeout: Duration,
}

impl AiGateway {
    pub fn new(backend: Arc<dyn AiBackend>, worker: WorkerHandle, config: &AiConfig) -> Self {
        Self {
            backend,
            worker,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn call(
        &self,
        endpoint: AiEndpoint,
        payload: Value,
        ctx: &CallContext,
    ) -> Result<AiResponse, UpstreamError> {
        let requested_at = Utc::now();
        let result = match tokio::time::timeout(self.timeout, self.backend.generate(endpoint, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::timeout(self.timeout.as_secs())),
        };
        let responded_at = Utc::now();
        let response_time = (responded_at - requested_at).num_milliseconds().max(0) as u64;

        let mut record = InteractionRecord {
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id.clone(),
            endpoint,
            ai_model: self.model.clone(),
            request_payload: payload,
            response_data: Value::Null,
            status: InteractionStatus::Pending,
            error_message: None,
            request_timestamp: requested_at,
            response_timestamp: Some(responded_at),
            user_agent: ctx.user_agent.clone(),
            ip_address: ctx.ip_address.clone(),
            tags: ctx.tags.clone(),
            notes: None,
        };

        let parsed = result.and_then(|response| match AiContent::parse(endpoint, response.content.clone()) {
            Ok(content) => Ok((response, content)),
            Err(e) => {
                record.response_data = match &response.raw {
                    Some(raw) => json!({ "raw": raw }),
                    None => response.content,
                };
                Err(UpstreamError::malformed_response(format!(
                    "{} result does not match the expected shape: {}",
                    endpoint, e
                )))
            }
        });

        match parsed {
            Ok((response, content)) => {
                record.status = InteractionStatus::Success;
                record.response_data = response.content.clone();

                let task = match content {
                    AiContent::Pronunciation(_) => None,
                    content => {
                        let mut metadata =
                            PipelineMetadata::for_endpoint(endpoint, &ctx.session_id, &self.model, ctx.user_id.clone());
                        merge_tags(&mut metadata.tags, &ctx.tags);
                        Some(AutoTask { content, metadata })
                    }
                };
                let queued = self.worker.dispatch(BackgroundJob {
                    interaction: Some(record),
                    task,
                });
                debug!("{} answered in {}ms", endpoint, response_time);

                Ok(AiResponse {
                    endpoint,
                    content: response.content,
                    response_time,
                    queued,
                })
            }
            Err(err) => {
                record.status = match err.category() {
                    UpstreamCategory::Timeout => InteractionStatus::Timeout,
                    _ => InteractionStatus::Error,
                };
                record.error_message = Some(err.to_string());
                warn!("{} call failed after {}ms: {}", endpoint, response_time, err);
                self.worker.dispatch(BackgroundJob {
                    interaction: Some(record),
                    task: None,
                });
                Err(err)
            }
        }
    }
}

/// Stand-in used while no AI service is configured
pub struct UnconfiguredBackend;

#[async_trait]
impl AiBackend for UnconfiguredBackend {
    async fn generate(&self, _endpoint: AiEndpoint, _payload: &Value) -> Result<BackendResponse, UpstreamError> {
        Err(UpstreamError::with_code("ECONNREFUSED", "no AI service base_url is configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::logger::InteractionLogger;
    use crate::config::RewardConfig;
    use crate::pipeline::{AutoTaskPipeline, BackgroundWorker};
    use crate::progress::ProgressService;
    use crate::store::{InteractionFilter, SqliteStore, Store};

    struct Harness {
        store: Arc<dyn Store>,
        worker: BackgroundWorker,
    }

    fn harness() -> Harness {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let progress = Arc::new(ProgressService::new(store.clone(), RewardConfig::default()));
        let worker = BackgroundWorker::spawn(
            Arc::new(InteractionLogger::new(store.clone())),
            Arc::new(AutoTaskPipeline::new(store.clone(), progress)),
            16,
        );
        Harness { store, worker }
    }

    fn ctx() -> CallContext {
        CallContext {
            session_id: "s1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_success_returns_content_and_queues_work() {
        let h = harness();
        let mut backend = MockAiBackend::new();
        backend.expect_generate().returning(|_, _| {
            Ok(BackendResponse {
                content: json!({"vocabulary": [
                    {"hanzi": "门", "pinyin": "mén", "meaning": "door"},
                    {"hanzi": "窗", "pinyin": "chuāng", "meaning": "window"}
                ]}),
                raw: None,
            })
        });
        let gateway = AiGateway::new(Arc::new(backend), h.worker.handle(), &AiConfig::default());

        let response = gateway
            .call(AiEndpoint::AnalyzeImage, json!({"image": "..."}), &ctx())
            .await
            .unwrap();
        assert!(response.queued);
        assert_eq!(response.content["vocabulary"][0]["hanzi"], "门");

        h.worker.shutdown().await;
        assert_eq!(h.store.count_vocabulary().await.unwrap(), 2);
        let logs = h.store.list_interactions(&InteractionFilter::default(), 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, InteractionStatus::Success);
    }

    #[tokio::test]
    async fn test_upstream_error_is_classified_and_logged() {
        let h = harness();
        let mut backend = MockAiBackend::new();
        backend
            .expect_generate()
            .returning(|_, _| Err(UpstreamError::http(429, "quota exceeded")));
        let gateway = AiGateway::new(Arc::new(backend), h.worker.handle(), &AiConfig::default());

        let err = gateway
            .call(AiEndpoint::GenerateExercises, json!({"topic": "food"}), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.category(), UpstreamCategory::RateLimited);

        h.worker.shutdown().await;
        let logs = h.store.list_interactions(&InteractionFilter::default(), 10).await.unwrap();
        assert_eq!(logs[0].status, InteractionStatus::Error);
        assert!(logs[0].error_message.as_deref().unwrap().contains("quota exceeded"));
        assert_eq!(h.store.count_exercises().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_content_is_an_upstream_error() {
        let h = harness();
        let mut backend = MockAiBackend::new();
        backend.expect_generate().returning(|_, _| {
            Ok(BackendResponse {
                content: json!({"vocabulary": 42}),
                raw: Some("{\"vocabulary\": 42}".into()),
            })
        });
        let gateway = AiGateway::new(Arc::new(backend), h.worker.handle(), &AiConfig::default());

        let err = gateway
            .call(AiEndpoint::AnalyzeImage, json!({}), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("MALFORMED_RESPONSE"));

        h.worker.shutdown().await;
        let logs = h.store.list_interactions(&InteractionFilter::default(), 10).await.unwrap();
        assert_eq!(logs[0].full_response_data(), json!({"raw": "{\"vocabulary\": 42}"}));
    }

    struct SlowBackend;

    #[async_trait]
    impl AiBackend for SlowBackend {
        async fn generate(&self, _: AiEndpoint, _: &Value) -> Result<BackendResponse, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(BackendResponse {
                content: Value::Null,
                raw: None,
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_gives_up_and_logs_timeout_status() {
        let h = harness();
        let gateway = AiGateway::new(Arc::new(SlowBackend), h.worker.handle(), &AiConfig::default())
            .with_timeout(Duration::from_millis(50));

        let err = gateway
            .call(AiEndpoint::AnalyzeWordDetails, json!({"word": "慢"}), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.category(), UpstreamCategory::Timeout);

        h.worker.shutdown().await;
        let logs = h.store.list_interactions(&InteractionFilter::default(), 10).await.unwrap();
        assert_eq!(logs[0].status, InteractionStatus::Timeout);
    }

    #[tokio::test]
    async fn test_unconfigured_backend_reports_unavailable() {
        let err = UnconfiguredBackend
            .generate(AiEndpoint::AnalyzeImage, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.category(), UpstreamCategory::ServiceUnavailable);
    }
}
