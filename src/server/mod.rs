//! HTTP surface over the study core
//!
//! Thin axum routes; no authentication. Every handler maps straight onto a
//! service call and returns its result as JSON.

pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::ai::{AiBackend, AiGateway, HttpBackend, InteractionLogger, UnconfiguredBackend};
use crate::config::Config;
use crate::pipeline::{AutoTaskPipeline, BackgroundWorker, WorkerHandle};
use crate::progress::ProgressService;
use crate::store::{SqliteStore, Store};
use crate::study::StudyService;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub study: Arc<StudyService>,
    pub progress: Arc<ProgressService>,
    pub pipeline: Arc<AutoTaskPipeline>,
    pub logger: Arc<InteractionLogger>,
    pub gateway: Arc<AiGateway>,
    pub worker: WorkerHandle,
}

impl AppState {
    /// Wire every service over one store; the worker must be shut down by the caller
    pub fn build(config: Config, store: Arc<dyn Store>, backend: Arc<dyn AiBackend>) -> (Self, BackgroundWorker) {
        let progress = Arc::new(ProgressService::new(store.clone(), config.rewards.clone()));
        let study = Arc::new(StudyService::new(store.clone(), progress.clone()));
        let pipeline = Arc::new(AutoTaskPipeline::new(store.clone(), progress.clone()));
        let logger = Arc::new(InteractionLogger::new(store.clone()));
        let worker = BackgroundWorker::spawn(logger.clone(), pipeline.clone(), config.pipeline.queue_capacity);
        let gateway = Arc::new(AiGateway::new(backend, worker.handle(), &config.ai));

        let state = Self {
            config: Arc::new(config),
            store,
            study,
            progress,
            pipeline,
            logger,
            gateway,
            worker: worker.handle(),
        };
        (state, worker)
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let users = Router::new()
        .route("/api/users", post(http::create_user_handler).get(http::list_users_handler))
        .route("/api/users/{user_id}", get(http::get_user_handler))
        .route(
            "/api/users/{user_id}/vocabulary",
            get(http::list_words_handler).post(http::add_word_handler),
        )
        .route("/api/users/{user_id}/vocabulary/stats", get(http::vocabulary_stats_handler))
        .route("/api/users/{user_id}/vocabulary/due", get(http::due_words_handler))
        .route("/api/users/{user_id}/vocabulary/new", get(http::new_words_handler))
        .route("/api/users/{user_id}/vocabulary/schedule", get(http::review_schedule_handler))
        .route(
            "/api/users/{user_id}/vocabulary/{entry_id}",
            get(http::get_word_handler)
                .put(http::update_word_handler)
                .delete(http::remove_word_handler),
        )
        .route(
            "/api/users/{user_id}/vocabulary/{entry_id}/study",
            post(http::study_result_handler),
        )
        .route(
            "/api/users/{user_id}/progress",
            get(http::get_progress_handler).delete(http::reset_progress_handler),
        )
        .route("/api/users/{user_id}/progress/experience", post(http::add_experience_handler))
        .route("/api/users/{user_id}/progress/achievements", post(http::check_achievements_handler))
        .route("/api/users/{user_id}/progress/streak", post(http::update_streak_handler))
        .route("/api/users/{user_id}/progress/weekly", get(http::weekly_history_handler))
        .route("/api/users/{user_id}/progress/daily", get(http::daily_history_handler))
        .route(
            "/api/users/{user_id}/progress/settings",
            axum::routing::put(http::update_settings_handler),
        );

    let sessions = Router::new()
        .route("/api/sessions", post(http::create_session_handler))
        .route("/api/sessions/{session_id}", get(http::get_session_handler))
        .route(
            "/api/sessions/{session_id}/activity",
            get(http::list_activity_handler).post(http::log_activity_handler),
        );

    let ai = Router::new()
        .route("/api/ai/{endpoint}", post(http::ai_call_handler))
        .route("/api/auto-tasks/{endpoint}", post(http::auto_task_handler))
        .route("/api/interactions", get(http::list_interactions_handler))
        .route("/api/interactions/stats", get(http::interaction_stats_handler))
        .route("/api/interactions/{id}", get(http::get_interaction_handler));

    Router::new()
        .route("/api/status", get(http::status_handler))
        .merge(users)
        .merge(sessions)
        .merge(ai)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and run until Ctrl+C
pub async fn start(config: Config) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&config.database.path).await?);
    let backend: Arc<dyn AiBackend> = match HttpBackend::from_config(&config.ai) {
        Some(backend) => Arc::new(backend),
        None => Arc::new(UnconfiguredBackend),
    };
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let ai_configured = config.ai.base_url.is_some();
    let database = config.database.path.clone();

    let (state, worker) = AppState::build(config, store, backend);
    let app = router(state);

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Hanzi Tutor Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Database: {}", database.display());
    if ai_configured {
        println!("✓ AI service configured");
    } else {
        println!("⚠ AI service not configured (set ai.base_url)");
    }
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    worker.shutdown().await;
    Ok(())
}
