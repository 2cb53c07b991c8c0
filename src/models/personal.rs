//! Per-user vocabulary lists

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyStatus {
    #[default]
    New,
    Learning,
    Reviewing,
    Mastered,
}

impl std::fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudyStatus::New => write!(f, "new"),
            StudyStatus::Learning => write!(f, "learning"),
            StudyStatus::Reviewing => write!(f, "reviewing"),
            StudyStatus::Mastered => write!(f, "mastered"),
        }
    }
}

impl std::str::FromStr for StudyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(StudyStatus::New),
            "learning" => Ok(StudyStatus::Learning),
            "reviewing" => Ok(StudyStatus::Reviewing),
            "mastered" => Ok(StudyStatus::Mastered),
            other => Err(format!("unknown study status: {}", other)),
        }
    }
}

/// Ordering is low < medium < high
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyAction {
    Added,
    Reviewed,
    Mastered,
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyHistoryEntry {
    pub date: DateTime<Utc>,
    pub action: StudyAction,
    #[serde(default)]
    pub score: Option<u8>,
    /// Seconds
    #[serde(default)]
    pub time_spent: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    pub review_count: u32,
    pub correct_answers: u32,
    pub total_attempts: u32,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
    /// Days until the next review, never below 1
    pub interval: u32,
    pub ease_factor: f64,
    pub consecutive_correct: u32,
}

impl Default for LearningStats {
    fn default() -> Self {
        Self {
            review_count: 0,
            correct_answers: 0,
            total_attempts: 0,
            last_reviewed: None,
            next_review: None,
            interval: 1,
            ease_factor: 2.5,
            consecutive_correct: 0,
        }
    }
}

impl LearningStats {
    /// Percentage of correct attempts, rounded; 0 before the first attempt
    pub fn accuracy(&self) -> u8 {
        if self.total_attempts == 0 {
            return 0;
        }
        (self.correct_answers as f64 / self.total_attempts as f64 * 100.0).round() as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalSettings {
    pub auto_play: bool,
    pub show_pinyin: bool,
    pub show_meaning: bool,
}

impl Default for PersonalSettings {
    fn default() -> Self {
        Self {
            auto_play: false,
            show_pinyin: true,
            show_meaning: true,
        }
    }
}

/// A word on one user's study list.
///
/// `word_id` is a weak reference to the dictionary; the cached text fields
/// keep the entry usable after the dictionary entry is edited or removed.
/// `mastery_level` and `study_status` are only ever written by
/// [`crate::study::mastery::apply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalVocabularyEntry {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub word_id: Option<String>,
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: String,
    pub mastery_level: u8,
    pub study_status: StudyStatus,
    pub priority: Priority,
    #[serde(default)]
    pub learning_stats: LearningStats,
    #[serde(default)]
    pub study_history: Vec<StudyHistoryEntry>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub personal_settings: PersonalSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersonalVocabularyEntry {
    /// Fresh entry at mastery 1 / new, with its `added` history record
    pub fn new(
        user_id: &str,
        hanzi: &str,
        pinyin: &str,
        meaning: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self {
            id: super::new_id(),
            user_id: user_id.to_string(),
            word_id: None,
            hanzi: hanzi.to_string(),
            pinyin: pinyin.to_string(),
            meaning: meaning.to_string(),
            mastery_level: 1,
            study_status: StudyStatus::New,
            priority: Priority::Medium,
            learning_stats: LearningStats::default(),
            study_history: Vec::new(),
            tags: Vec::new(),
            notes: String::new(),
            personal_settings: PersonalSettings::default(),
            created_at: now,
            updated_at: now,
        };
        entry.push_history(StudyAction::Added, None, None, Some("Added to personal vocabulary"), now);
        entry
    }

    pub fn push_history(
        &mut self,
        action: StudyAction,
        score: Option<u8>,
        time_spent: Option<f64>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.study_history.push(StudyHistoryEntry {
            date: now,
            action,
            score,
            time_spent,
            notes: notes.map(str::to_string),
        });
        self.updated_at = now;
    }

    pub fn accuracy(&self) -> u8 {
        self.learning_stats.accuracy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_rounds_and_handles_zero() {
        let mut stats = LearningStats::default();
        assert_eq!(stats.accuracy(), 0);
        stats.total_attempts = 3;
        stats.correct_answers = 2;
        assert_eq!(stats.accuracy(), 67);
    }

    #[test]
    fn test_new_entry_starts_with_added_history() {
        let now = Utc::now();
        let entry = PersonalVocabularyEntry::new("u1", "你好", "nǐ hǎo", "hello", now);
        assert_eq!(entry.mastery_level, 1);
        assert_eq!(entry.study_status, StudyStatus::New);
        assert_eq!(entry.learning_stats.interval, 1);
        assert_eq!(entry.learning_stats.ease_factor, 2.5);
        assert_eq!(entry.study_history.len(), 1);
        assert_eq!(entry.study_history[0].action, StudyAction::Added);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!("Reviewing".parse::<StudyStatus>().unwrap(), StudyStatus::Reviewing);
    }
}
