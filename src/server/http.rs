//! HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::ai::CallContext;
use crate::error::{StudyError, StudyResult};
use crate::models::{AiEndpoint, FrontendActivity, InteractionStatus, Session, StudySettings, StudyStatus, User};
use crate::pipeline::PipelineMetadata;
use crate::server::AppState;
use crate::store::InteractionFilter;
use crate::study::{AddWordRequest, StudyOutcome, WordFilter, WordUpdate};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

impl IntoResponse for StudyError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match &self {
            StudyError::Upstream(e) => {
                let category = e.category();
                json!({
                    "error": category.user_message(),
                    "category": category.to_string(),
                    "details": e.to_string(),
                })
            }
            StudyError::Storage(e) => {
                error!("Storage failure: {:#}", e);
                json!({ "error": "Internal storage error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

fn respond<T: Serialize>(result: StudyResult<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => e.into_response(),
    }
}

fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIST_LIMIT)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// First hop of X-Forwarded-For, if present
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
}

/// Status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub ai_configured: bool,
    pub ai_model: String,
    pub worker: crate::pipeline::WorkerStats,
}

pub async fn status_handler(State(state): State<AppState>) -> Response {
    let response = StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ai_configured: state.config.ai.base_url.is_some(),
        ai_model: state.gateway.model().to_string(),
        worker: state.worker.stats(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

// ---------------------------------------------------------------------------
// Users and sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

pub async fn create_user_handler(State(state): State<AppState>, Json(request): Json<CreateUserRequest>) -> Response {
    let result: StudyResult<User> = async move {
        let username = request.username.trim();
        if username.is_empty() {
            return Err(StudyError::validation("username is required"));
        }
        if state.store.find_user_by_username(username).await?.is_some() {
            return Err(StudyError::Conflict(format!("username '{}' is taken", username)));
        }
        let mut user = User::new(username);
        user.email = request.email;
        user.display_name = request.display_name;
        state.store.create_user(&user).await?;
        Ok(user)
    }
    .await;

    match result {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_users_handler(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    let limit = clamp_limit(query.limit, DEFAULT_LIST_LIMIT);
    respond(state.store.list_users(limit).await.map_err(StudyError::from))
}

pub async fn get_user_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    let result = match state.store.get_user(&user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(StudyError::not_found("user", user_id)),
        Err(e) => Err(e.into()),
    };
    respond(result)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn create_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    let result: StudyResult<Session> = async move {
        if let Some(user_id) = &request.user_id {
            if state.store.get_user(user_id).await?.is_none() {
                return Err(StudyError::not_found("user", user_id.clone()));
            }
        }
        let mut session = Session::new(request.user_id);
        session.user_agent = header_value(&headers, "user-agent");
        session.ip_address = client_ip(&headers);
        state.store.save_session(&session).await?;
        Ok(session)
    }
    .await;

    match result {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_session_handler(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    let result = match state.store.get_session(&session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(StudyError::not_found("session", session_id)),
        Err(e) => Err(e.into()),
    };
    respond(result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivityRequest {
    pub action: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn log_activity_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<LogActivityRequest>,
) -> Response {
    let result: StudyResult<FrontendActivity> = async move {
        if request.action.trim().is_empty() {
            return Err(StudyError::validation("action is required"));
        }
        let session = state
            .store
            .get_session(&session_id)
            .await?
            .ok_or_else(|| StudyError::not_found("session", session_id.clone()))?;
        let mut activity = FrontendActivity::new(&session.id, request.action.trim(), request.details);
        activity.user_id = request.user_id.or(session.user_id);
        state.store.log_activity(&activity).await?;
        Ok(activity)
    }
    .await;

    match result {
        Ok(activity) => (StatusCode::CREATED, Json(activity)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_activity_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = clamp_limit(query.limit, DEFAULT_LIST_LIMIT);
    respond(state.store.list_activity(&session_id, limit).await.map_err(StudyError::from))
}

// ---------------------------------------------------------------------------
// Personal vocabulary
// ---------------------------------------------------------------------------

/// Query-string form of [`WordFilter`]; one tag at most
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub mastery_level: Option<u8>,
    #[serde(default)]
    pub study_status: Option<StudyStatus>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl From<WordQuery> for WordFilter {
    fn from(query: WordQuery) -> Self {
        let defaults = WordFilter::default();
        WordFilter {
            search: query.search,
            mastery_level: query.mastery_level,
            study_status: query.study_status,
            tags: query.tag.into_iter().collect(),
            page: query.page.unwrap_or(defaults.page),
            limit: query.limit.unwrap_or(defaults.limit),
        }
    }
}

pub async fn list_words_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<WordQuery>,
) -> Response {
    respond(state.study.list_words(&user_id, &query.into()).await)
}

pub async fn add_word_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AddWordRequest>,
) -> Response {
    match state.study.add_word(&user_id, request).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_word_handler(
    State(state): State<AppState>,
    Path((user_id, entry_id)): Path<(String, String)>,
) -> Response {
    respond(state.study.get_word(&entry_id, &user_id).await)
}

pub async fn update_word_handler(
    State(state): State<AppState>,
    Path((user_id, entry_id)): Path<(String, String)>,
    Json(update): Json<WordUpdate>,
) -> Response {
    respond(state.study.update_word(&entry_id, &user_id, update).await)
}

pub async fn remove_word_handler(
    State(state): State<AppState>,
    Path((user_id, entry_id)): Path<(String, String)>,
) -> Response {
    match state.study.remove_word(&entry_id, &user_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "message": "Word removed" }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn study_result_handler(
    State(state): State<AppState>,
    Path((user_id, entry_id)): Path<(String, String)>,
    Json(outcome): Json<StudyOutcome>,
) -> Response {
    respond(state.study.record_study_result(&entry_id, &user_id, outcome).await)
}

pub async fn vocabulary_stats_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    respond(state.study.vocabulary_stats(&user_id).await)
}

pub async fn due_words_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = clamp_limit(query.limit, 20);
    respond(state.study.due_for_review(&user_id, limit, Utc::now()).await)
}

pub async fn new_words_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = clamp_limit(query.limit, 10);
    respond(state.study.new_words(&user_id, limit).await)
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

pub async fn review_schedule_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ScheduleQuery>,
) -> Response {
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    respond(state.study.review_schedule(&user_id, date).await)
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

pub async fn get_progress_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    respond(state.progress.get_progress(&user_id).await)
}

pub async fn reset_progress_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    respond(
        state
            .progress
            .reset(&user_id)
            .await
            .map(|removed| json!({ "removed": removed })),
    )
}

#[derive(Debug, Deserialize)]
pub struct ExperienceRequest {
    pub amount: i64,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "manual".to_string()
}

pub async fn add_experience_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ExperienceRequest>,
) -> Response {
    respond(state.progress.add_experience(&user_id, request.amount, &request.reason).await)
}

pub async fn check_achievements_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    respond(state.progress.check_achievements(&user_id).await)
}

pub async fn update_streak_handler(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    respond(state.progress.update_streak(&user_id).await)
}

pub async fn weekly_history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = clamp_limit(query.limit, 4);
    respond(state.progress.weekly_history(&user_id, limit).await)
}

pub async fn daily_history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = clamp_limit(query.limit, 7);
    respond(state.progress.daily_history(&user_id, limit).await)
}

pub async fn update_settings_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(settings): Json<StudySettings>,
) -> Response {
    respond(state.progress.update_settings(&user_id, settings).await)
}

// ---------------------------------------------------------------------------
// AI calls, auto-tasks and interaction logs
// ---------------------------------------------------------------------------

fn parse_endpoint(raw: &str) -> Result<AiEndpoint, Response> {
    raw.parse::<AiEndpoint>().map_err(|e| {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "Unknown AI endpoint", "details": e }))).into_response()
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiCallRequest {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub payload: Value,
}

pub async fn ai_call_handler(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AiCallRequest>,
) -> Response {
    let endpoint = match parse_endpoint(&endpoint) {
        Ok(endpoint) => endpoint,
        Err(response) => return response,
    };
    if request.session_id.trim().is_empty() {
        return StudyError::validation("sessionId is required").into_response();
    }

    let ctx = CallContext {
        session_id: request.session_id,
        user_id: request.user_id,
        user_agent: header_value(&headers, "user-agent"),
        ip_address: client_ip(&headers),
        tags: request.tags,
    };
    match state.gateway.call(endpoint, request.payload, &ctx).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => StudyError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AutoTaskRequest {
    pub metadata: PipelineMetadata,
    pub result: Value,
}

/// Run the pipeline synchronously on an already obtained AI result
pub async fn auto_task_handler(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Json(request): Json<AutoTaskRequest>,
) -> Response {
    let endpoint = match parse_endpoint(&endpoint) {
        Ok(endpoint) => endpoint,
        Err(response) => return response,
    };
    let summary = state.pipeline.process_raw(endpoint, request.result, &request.metadata).await;
    let status = if summary.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(summary)).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<AiEndpoint>,
    #[serde(default)]
    pub status: Option<InteractionStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl InteractionQuery {
    fn filter(&self) -> InteractionFilter {
        InteractionFilter {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            endpoint: self.endpoint,
            status: self.status,
        }
    }
}

pub async fn list_interactions_handler(
    State(state): State<AppState>,
    Query(query): Query<InteractionQuery>,
) -> Response {
    let limit = clamp_limit(query.limit, DEFAULT_LIST_LIMIT);
    respond(state.logger.list(&query.filter(), limit).await)
}

pub async fn interaction_stats_handler(
    State(state): State<AppState>,
    Query(query): Query<InteractionQuery>,
) -> Response {
    respond(state.logger.stats(&query.filter()).await)
}

pub async fn get_interaction_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.logger.get(&id).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::UpstreamError;

    #[test]
    fn test_word_query_defaults_to_first_page() {
        let filter: WordFilter = WordQuery {
            tag: Some("HSK1".into()),
            ..Default::default()
        }
        .into();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 20);
        assert_eq!(filter.tags, vec!["HSK1".to_string()]);
    }

    #[test]
    fn test_client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_error_statuses() {
        let response = StudyError::from(UpstreamError::http(503, "down")).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let response = StudyError::Storage(anyhow::anyhow!("disk full")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
