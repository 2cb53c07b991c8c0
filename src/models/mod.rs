//! Persisted entities
//!
//! Plain data structures for every collection held by the durable store.
//! Behaviour lives in the `study`, `progress` and `ai` modules; the only
//! methods here are constructors and derived accessors.

pub mod account;
pub mod exercise;
pub mod interaction;
pub mod personal;
pub mod progress;
pub mod vocabulary;

use serde::{Deserialize, Serialize};

pub use account::{FrontendActivity, Session, User};
pub use exercise::{Exercise, ExerciseCategory, ExerciseType, GrammarPoint, RecordSource, UsageStats, VocabSnippet};
pub use interaction::{AiEndpoint, AiInteractionLog, InteractionStatus};
pub use personal::{
    LearningStats, PersonalSettings, PersonalVocabularyEntry, Priority, StudyAction,
    StudyHistoryEntry, StudyStatus,
};
pub use progress::{
    Achievement, DailyProgress, StudySettings, StudyStats, UserProgress, WeeklyProgress,
};
pub use vocabulary::{ExampleSentence, GrammarInfo, Meaning, Related, VocabStatistics, VocabularyEntry};

/// Difficulty shared by dictionary entries and exercises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

/// Append tags not already present, keeping first-seen order
pub fn merge_tags(existing: &mut Vec<String>, extra: &[String]) {
    for tag in extra {
        let tag = tag.trim();
        if !tag.is_empty() && !existing.iter().any(|t| t == tag) {
            existing.push(tag.to_string());
        }
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
