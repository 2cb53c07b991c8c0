//! SQLite document store
//!
//! Each collection is a table holding the serialized JSON document plus the
//! handful of columns used for lookup, ordering and aggregation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{InteractionFilter, InteractionStats, PersonalVocabStats, Store};
use crate::models::{
    AiInteractionLog, Exercise, FrontendActivity, PersonalVocabularyEntry, Session, User,
    UserProgress, VocabularyEntry,
};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn to_doc<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize document")
}

fn from_doc<T: DeserializeOwned>(doc: &str) -> Result<T> {
    serde_json::from_str(doc).context("Failed to decode stored document")
}

fn from_docs<T: DeserializeOwned>(docs: Vec<String>) -> Result<Vec<T>> {
    docs.iter().map(|d| from_doc(d)).collect()
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Throwaway store for tools and tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS frontend_activity (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vocabulary (
                id TEXT PRIMARY KEY,
                hanzi TEXT NOT NULL UNIQUE,
                updated_at INTEGER NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS personal_vocabulary (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                hanzi TEXT NOT NULL,
                word_id TEXT,
                created_at INTEGER NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS exercises (
                id TEXT PRIMARY KEY,
                session_id TEXT,
                user_id TEXT,
                created_at INTEGER NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_progress (
                user_id TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ai_interactions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                user_id TEXT,
                endpoint TEXT NOT NULL,
                status TEXT NOT NULL,
                response_time INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                doc TEXT NOT NULL,
                request_overflow BLOB,
                response_overflow BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_activity_session ON frontend_activity(session_id, timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_personal_user_hanzi ON personal_vocabulary(user_id, hanzi);
            CREATE INDEX IF NOT EXISTS idx_personal_user_word ON personal_vocabulary(user_id, word_id);
            CREATE INDEX IF NOT EXISTS idx_exercises_session ON exercises(session_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_interactions_session ON ai_interactions(session_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_interactions_user ON ai_interactions(user_id, created_at DESC);
        "#,
        )
        .context("Failed to initialize database schema")?;

        Ok(())
    }
}

const INTERACTION_FILTER: &str = "(?1 IS NULL OR session_id = ?1) \
     AND (?2 IS NULL OR user_id = ?2) \
     AND (?3 IS NULL OR endpoint = ?3) \
     AND (?4 IS NULL OR status = ?4)";

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (id, username, created_at, doc) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.username, user.created_at.timestamp_millis(), to_doc(user)?],
        )
        .with_context(|| format!("Failed to create user {}", user.username))?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM users WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .context("Failed to load user")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM users WHERE username = ?1", params![username], |row| row.get(0))
            .optional()
            .context("Failed to look up user")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn list_users(&self, limit: usize) -> Result<Vec<User>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT doc FROM users ORDER BY created_at ASC LIMIT ?1")?;
        let docs = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list users")?;
        from_docs(docs)
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, user_id, doc) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, doc = excluded.doc",
            params![session.id, session.user_id, to_doc(session)?],
        )
        .context("Failed to save session")?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM sessions WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .context("Failed to load session")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn log_activity(&self, activity: &FrontendActivity) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO frontend_activity (id, session_id, timestamp, doc) VALUES (?1, ?2, ?3, ?4)",
            params![
                activity.id,
                activity.session_id,
                activity.timestamp.timestamp_millis(),
                to_doc(activity)?
            ],
        )
        .context("Failed to log frontend activity")?;
        Ok(())
    }

    async fn list_activity(&self, session_id: &str, limit: usize) -> Result<Vec<FrontendActivity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT doc FROM frontend_activity WHERE session_id = ?1
             ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
        )?;
        let docs = stmt
            .query_map(params![session_id, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list frontend activity")?;
        from_docs(docs)
    }

    async fn save_vocabulary(&self, entry: &VocabularyEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO vocabulary (id, hanzi, updated_at, doc) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                hanzi = excluded.hanzi, updated_at = excluded.updated_at, doc = excluded.doc",
            params![entry.id, entry.hanzi, entry.updated_at.timestamp_millis(), to_doc(entry)?],
        )
        .with_context(|| format!("Failed to save vocabulary {}", entry.hanzi))?;
        Ok(())
    }

    async fn get_vocabulary(&self, id: &str) -> Result<Option<VocabularyEntry>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM vocabulary WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .context("Failed to load vocabulary")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn find_vocabulary_by_hanzi(&self, hanzi: &str) -> Result<Option<VocabularyEntry>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM vocabulary WHERE hanzi = ?1", params![hanzi], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to look up vocabulary")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn count_vocabulary(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vocabulary", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn save_personal(&self, entry: &PersonalVocabularyEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO personal_vocabulary (id, user_id, hanzi, word_id, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                hanzi = excluded.hanzi, word_id = excluded.word_id, doc = excluded.doc",
            params![
                entry.id,
                entry.user_id,
                entry.hanzi,
                entry.word_id,
                entry.created_at.timestamp_millis(),
                to_doc(entry)?
            ],
        )
        .with_context(|| format!("Failed to save personal vocabulary {}", entry.hanzi))?;
        Ok(())
    }

    async fn get_personal(&self, id: &str) -> Result<Option<PersonalVocabularyEntry>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM personal_vocabulary WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to load personal vocabulary")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn find_personal_by_hanzi(
        &self,
        user_id: &str,
        hanzi: &str,
    ) -> Result<Option<PersonalVocabularyEntry>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM personal_vocabulary WHERE user_id = ?1 AND hanzi = ?2
                 ORDER BY created_at ASC LIMIT 1",
                params![user_id, hanzi],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up personal vocabulary")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn find_personal_by_word(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<PersonalVocabularyEntry>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM personal_vocabulary WHERE user_id = ?1 AND word_id = ?2 LIMIT 1",
                params![user_id, word_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up personal vocabulary")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn list_personal(&self, user_id: &str) -> Result<Vec<PersonalVocabularyEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT doc FROM personal_vocabulary WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let docs = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list personal vocabulary")?;
        from_docs(docs)
    }

    async fn delete_personal(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute("DELETE FROM personal_vocabulary WHERE id = ?1", params![id])
            .context("Failed to delete personal vocabulary")?;
        Ok(rows > 0)
    }

    async fn personal_stats(&self, user_id: &str) -> Result<PersonalVocabStats> {
        let conn = self.conn.lock().await;
        let (total, mastered, avg_mastery, reviews, correct, attempts) = conn
            .query_row(
                r#"SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN json_extract(doc, '$.studyStatus') = 'mastered' THEN 1 ELSE 0 END), 0),
                    COALESCE(AVG(json_extract(doc, '$.masteryLevel')), 0.0),
                    COALESCE(SUM(json_extract(doc, '$.learningStats.reviewCount')), 0),
                    COALESCE(SUM(json_extract(doc, '$.learningStats.correctAnswers')), 0),
                    COALESCE(SUM(json_extract(doc, '$.learningStats.totalAttempts')), 0)
                FROM personal_vocabulary WHERE user_id = ?1"#,
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .context("Failed to aggregate personal vocabulary")?;

        let accuracy = if attempts > 0 {
            (correct as f64 / attempts as f64 * 100.0).round() as u8
        } else {
            0
        };

        Ok(PersonalVocabStats {
            total_words: total as u32,
            mastered_words: mastered as u32,
            average_mastery: (avg_mastery * 100.0).round() / 100.0,
            total_reviews: reviews as u64,
            total_correct: correct as u64,
            total_attempts: attempts as u64,
            accuracy,
        })
    }

    async fn save_exercise(&self, exercise: &Exercise) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO exercises (id, session_id, user_id, created_at, doc) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET doc = excluded.doc",
            params![
                exercise.id,
                exercise.session_id,
                exercise.user_id,
                exercise.created_at.timestamp_millis(),
                to_doc(exercise)?
            ],
        )
        .with_context(|| format!("Failed to save exercise '{}'", exercise.title))?;
        Ok(())
    }

    async fn get_exercise(&self, id: &str) -> Result<Option<Exercise>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM exercises WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .context("Failed to load exercise")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn list_exercises_by_session(&self, session_id: &str, limit: usize) -> Result<Vec<Exercise>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT doc FROM exercises WHERE session_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let docs = stmt
            .query_map(params![session_id, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list exercises")?;
        from_docs(docs)
    }

    async fn count_exercises(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM exercises", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM user_progress WHERE user_id = ?1", params![user_id], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to load user progress")?;
        doc.map(|d| from_doc(&d)).transpose()
    }

    async fn save_progress(&self, progress: &UserProgress) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_progress (user_id, updated_at, doc) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at, doc = excluded.doc",
            params![progress.user_id, progress.updated_at.timestamp_millis(), to_doc(progress)?],
        )
        .context("Failed to save user progress")?;
        Ok(())
    }

    async fn delete_progress(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute("DELETE FROM user_progress WHERE user_id = ?1", params![user_id])
            .context("Failed to delete user progress")?;
        Ok(rows > 0)
    }

    async fn save_interaction(&self, log: &AiInteractionLog) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO ai_interactions
                (id, session_id, user_id, endpoint, status, response_time, created_at, doc,
                 request_overflow, response_overflow)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status, response_time = excluded.response_time, doc = excluded.doc",
            params![
                log.id,
                log.session_id,
                log.user_id,
                log.endpoint.as_str(),
                log.status.as_str(),
                log.response_time as i64,
                log.created_at.timestamp_millis(),
                to_doc(log)?,
                log.request_payload_overflow,
                log.response_data_overflow,
            ],
        )
        .context("Failed to save AI interaction")?;
        Ok(())
    }

    async fn get_interaction(&self, id: &str) -> Result<Option<AiInteractionLog>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT doc, request_overflow, response_overflow FROM ai_interactions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, Option<Vec<u8>>>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to load AI interaction")?;

        row.map(|(doc, request_overflow, response_overflow)| -> Result<AiInteractionLog> {
            let mut log: AiInteractionLog = from_doc(&doc)?;
            log.request_payload_overflow = request_overflow;
            log.response_data_overflow = response_overflow;
            Ok(log)
        })
        .transpose()
    }

    async fn list_interactions(
        &self,
        filter: &InteractionFilter,
        limit: usize,
    ) -> Result<Vec<AiInteractionLog>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT doc, request_overflow, response_overflow FROM ai_interactions WHERE {}
             ORDER BY created_at DESC, rowid DESC LIMIT ?5",
            INTERACTION_FILTER
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    filter.session_id,
                    filter.user_id,
                    filter.endpoint.map(|e| e.as_str()),
                    filter.status.map(|s| s.as_str()),
                    limit as i64
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, Option<Vec<u8>>>(2)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list AI interactions")?;

        rows.into_iter()
            .map(|(doc, request_overflow, response_overflow)| -> Result<AiInteractionLog> {
                let mut log: AiInteractionLog = from_doc(&doc)?;
                log.request_payload_overflow = request_overflow;
                log.response_data_overflow = response_overflow;
                Ok(log)
            })
            .collect()
    }

    async fn interaction_stats(&self, filter: &InteractionFilter) -> Result<InteractionStats> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0),
                COALESCE(AVG(response_time), 0.0)
             FROM ai_interactions WHERE {}",
            INTERACTION_FILTER
        );
        let stats = conn
            .query_row(
                &sql,
                params![
                    filter.session_id,
                    filter.user_id,
                    filter.endpoint.map(|e| e.as_str()),
                    filter.status.map(|s| s.as_str()),
                ],
                |row| {
                    Ok(InteractionStats {
                        total_calls: row.get::<_, i64>(0)? as u64,
                        success_calls: row.get::<_, i64>(1)? as u64,
                        error_calls: row.get::<_, i64>(2)? as u64,
                        avg_response_time: row.get::<_, f64>(3)?,
                    })
                },
            )
            .context("Failed to aggregate AI interactions")?;
        Ok(stats)
    }
}
