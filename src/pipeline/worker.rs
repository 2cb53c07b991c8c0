//! Background worker for post-response work
//!
//! The request path hands a [`BackgroundJob`] to [`WorkerHandle::dispatch`],
//! which never waits: a full queue drops the job with a warning. The worker
//! writes the interaction log first, then runs the auto-task.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AutoTaskPipeline, PipelineMetadata};
use crate::ai::content::AiContent;
use crate::ai::logger::{InteractionLogger, InteractionRecord};

#[derive(Debug, Clone)]
pub struct AutoTask {
    pub content: AiContent,
    pub metadata: PipelineMetadata,
}

#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub interaction: Option<InteractionRecord>,
    pub task: Option<AutoTask>,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Cheap, cloneable sender side
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<BackgroundJob>,
    counters: Arc<Counters>,
}

impl WorkerHandle {
    fn channel(capacity: usize) -> (Self, mpsc::Receiver<BackgroundJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            tx,
            counters: Arc::new(Counters::default()),
        };
        (handle, rx)
    }

    /// Queue a job without waiting; false when it was dropped
    pub fn dispatch(&self, job: BackgroundJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Background queue full, job dropped");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Background worker stopped, job dropped");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct BackgroundWorker {
    handle: WorkerHandle,
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl BackgroundWorker {
    pub fn spawn(logger: Arc<InteractionLogger>, pipeline: Arc<AutoTaskPipeline>, capacity: usize) -> Self {
        let (handle, rx) = WorkerHandle::channel(capacity);
        let shutdown = Arc::new(Notify::new());
        let join = tokio::spawn(run(rx, logger, pipeline, handle.counters.clone(), shutdown.clone()));
        info!("Background worker started (queue capacity {})", capacity.max(1));
        Self { handle, shutdown, join }
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stop accepting jobs, finish everything already queued, then return
    pub async fn shutdown(self) -> WorkerStats {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            error!("Background worker panicked: {}", e);
        }
        let stats = self.handle.stats();
        info!(
            "Background worker stopped: {} processed, {} failed, {} dropped",
            stats.processed, stats.failed, stats.dropped
        );
        stats
    }
}

async fn run(
    mut rx: mpsc::Receiver<BackgroundJob>,
    logger: Arc<InteractionLogger>,
    pipeline: Arc<AutoTaskPipeline>,
    counters: Arc<Counters>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => handle_job(job, &logger, &pipeline, &counters).await,
                None => break,
            },
            _ = shutdown.notified() => {
                rx.close();
                while let Some(job) = rx.recv().await {
                    handle_job(job, &logger, &pipeline, &counters).await;
                }
                break;
            }
        }
    }
}

async fn handle_job(
    job: BackgroundJob,
    logger: &InteractionLogger,
    pipeline: &AutoTaskPipeline,
    counters: &Counters,
) {
    let mut ok = true;

    if let Some(record) = job.interaction {
        if let Err(e) = logger.record(record).await {
            error!("Failed to write AI interaction log: {}", e);
            ok = false;
        }
    }

    if let Some(task) = job.task {
        let summary = pipeline.process(&task.content, &task.metadata).await;
        if summary.success {
            debug!(
                "Auto-task for session {} done in {}ms",
                task.metadata.session_id, summary.processing_time
            );
        } else {
            error!(
                "Auto-task for session {} failed: {}",
                task.metadata.session_id,
                summary.error.as_deref().unwrap_or("unknown error")
            );
            ok = false;
        }
    }

    counters.processed.fetch_add(1, Ordering::Relaxed);
    if !ok {
        counters.failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::content::{ImageAnalysis, VocabItem};
    use crate::config::RewardConfig;
    use crate::models::{AiEndpoint, InteractionStatus};
    use crate::progress::ProgressService;
    use crate::store::{SqliteStore, Store};
    use chrono::Utc;
    use serde_json::json;

    fn job(session: &str) -> BackgroundJob {
        let analysis = ImageAnalysis {
            vocabulary: vec![VocabItem::new("书", "shū", "book"), VocabItem::new("笔", "bǐ", "pen")],
            ..Default::default()
        };
        let now = Utc::now();
        BackgroundJob {
            interaction: Some(InteractionRecord {
                session_id: session.to_string(),
                user_id: None,
                endpoint: AiEndpoint::AnalyzeImage,
                ai_model: "m".to_string(),
                request_payload: json!({"image": "..."}),
                response_data: json!({}),
                status: InteractionStatus::Success,
                error_message: None,
                request_timestamp: now,
                response_timestamp: Some(now),
                user_agent: None,
                ip_address: None,
                tags: Vec::new(),
                notes: None,
            }),
            task: Some(AutoTask {
                content: AiContent::ImageAnalysis(analysis),
                metadata: PipelineMetadata::for_endpoint(AiEndpoint::AnalyzeImage, session, "m", None),
            }),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_jobs() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let progress = Arc::new(ProgressService::new(store.clone(), RewardConfig::default()));
        let worker = BackgroundWorker::spawn(
            Arc::new(InteractionLogger::new(store.clone())),
            Arc::new(AutoTaskPipeline::new(store.clone(), progress)),
            8,
        );

        let handle = worker.handle();
        assert!(handle.dispatch(job("s1")));
        assert!(handle.dispatch(job("s2")));

        let stats = worker.shutdown().await;
        assert_eq!(stats, WorkerStats { processed: 2, failed: 0, dropped: 0 });
        assert_eq!(store.count_vocabulary().await.unwrap(), 2);
        assert_eq!(store.list_exercises_by_session("s1", 10).await.unwrap().len(), 1);

        // the queue is closed after shutdown
        assert!(!handle.dispatch(job("s3")));
        assert_eq!(handle.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (handle, _rx) = WorkerHandle::channel(1);
        assert!(handle.dispatch(job("s1")));
        assert!(!handle.dispatch(job("s2")));
        assert_eq!(handle.stats(), WorkerStats { processed: 0, failed: 0, dropped: 1 });
    }
}
