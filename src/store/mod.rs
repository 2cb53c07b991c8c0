//! Durable store interface
//!
//! CRUD and aggregate queries over the persisted collections. Services hold
//! an `Arc<dyn Store>`; the shipped implementation is [`SqliteStore`].

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{
    AiEndpoint, AiInteractionLog, Exercise, FrontendActivity, InteractionStatus,
    PersonalVocabularyEntry, Session, User, UserProgress, VocabularyEntry,
};

pub use sqlite::SqliteStore;

/// Aggregate over one user's personal vocabulary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalVocabStats {
    pub total_words: u32,
    pub mastered_words: u32,
    pub average_mastery: f64,
    pub total_reviews: u64,
    pub total_correct: u64,
    pub total_attempts: u64,
    /// Rounded percentage over all attempts
    pub accuracy: u8,
}

/// Optional equality filters for interaction queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionFilter {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<AiEndpoint>,
    #[serde(default)]
    pub status: Option<InteractionStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionStats {
    pub total_calls: u64,
    pub success_calls: u64,
    pub error_calls: u64,
    /// Milliseconds
    pub avg_response_time: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn list_users(&self, limit: usize) -> Result<Vec<User>>;

    // Sessions
    async fn save_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>>;

    // Frontend activity
    async fn log_activity(&self, activity: &FrontendActivity) -> Result<()>;
    async fn list_activity(&self, session_id: &str, limit: usize) -> Result<Vec<FrontendActivity>>;

    // Global dictionary; `hanzi` is unique
    async fn save_vocabulary(&self, entry: &VocabularyEntry) -> Result<()>;
    async fn get_vocabulary(&self, id: &str) -> Result<Option<VocabularyEntry>>;
    async fn find_vocabulary_by_hanzi(&self, hanzi: &str) -> Result<Option<VocabularyEntry>>;
    async fn count_vocabulary(&self) -> Result<u64>;

    // Personal vocabulary
    async fn save_personal(&self, entry: &PersonalVocabularyEntry) -> Result<()>;
    async fn get_personal(&self, id: &str) -> Result<Option<PersonalVocabularyEntry>>;
    async fn find_personal_by_hanzi(
        &self,
        user_id: &str,
        hanzi: &str,
    ) -> Result<Option<PersonalVocabularyEntry>>;
    async fn find_personal_by_word(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<PersonalVocabularyEntry>>;
    /// Oldest first
    async fn list_personal(&self, user_id: &str) -> Result<Vec<PersonalVocabularyEntry>>;
    async fn delete_personal(&self, id: &str) -> Result<bool>;
    async fn personal_stats(&self, user_id: &str) -> Result<PersonalVocabStats>;

    // Exercises
    async fn save_exercise(&self, exercise: &Exercise) -> Result<()>;
    async fn get_exercise(&self, id: &str) -> Result<Option<Exercise>>;
    /// Newest first
    async fn list_exercises_by_session(&self, session_id: &str, limit: usize) -> Result<Vec<Exercise>>;
    async fn count_exercises(&self) -> Result<u64>;

    // Progress, one per user
    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>>;
    async fn save_progress(&self, progress: &UserProgress) -> Result<()>;
    async fn delete_progress(&self, user_id: &str) -> Result<bool>;

    // AI interaction logs
    async fn save_interaction(&self, log: &AiInteractionLog) -> Result<()>;
    async fn get_interaction(&self, id: &str) -> Result<Option<AiInteractionLog>>;
    /// Newest first
    async fn list_interactions(
        &self,
        filter: &InteractionFilter,
        limit: usize,
    ) -> Result<Vec<AiInteractionLog>>;
    async fn interaction_stats(&self, filter: &InteractionFilter) -> Result<InteractionStats>;
}
