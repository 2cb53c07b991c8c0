//! Gamified per-user progress record

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Difficulty;
use crate::progress::history::{BoundedHistory, Keyed};

pub const DAILY_HISTORY_CAPACITY: usize = 30;
pub const WEEKLY_HISTORY_CAPACITY: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyProgress {
    pub date: NaiveDate,
    pub words_studied: u32,
    pub exercises_completed: u32,
    /// Answered study questions; accuracy is `correct_answers / attempts`
    #[serde(default)]
    pub attempts: u32,
    pub correct_answers: u32,
    /// Seconds
    pub time_spent: f64,
    pub accuracy: u8,
}

impl DailyProgress {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            words_studied: 0,
            exercises_completed: 0,
            attempts: 0,
            correct_answers: 0,
            time_spent: 0.0,
            accuracy: 0,
        }
    }
}

impl Keyed for DailyProgress {
    type Key = NaiveDate;

    fn key(&self) -> &NaiveDate {
        &self.date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyProgress {
    /// ISO week key, "YYYY-WW"
    pub week: String,
    pub words_learned: u32,
    pub exercises_completed: u32,
    #[serde(default)]
    pub attempts: u32,
    pub correct_answers: u32,
    pub time_spent: f64,
    pub accuracy: u8,
}

impl WeeklyProgress {
    pub fn empty(week: &str) -> Self {
        Self {
            week: week.to_string(),
            words_learned: 0,
            exercises_completed: 0,
            attempts: 0,
            correct_answers: 0,
            time_spent: 0.0,
            accuracy: 0,
        }
    }
}

impl Keyed for WeeklyProgress {
    type Key = String;

    fn key(&self) -> &String {
        &self.week
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyStats {
    /// Seconds
    pub total_study_time: f64,
    pub total_sessions: u32,
    pub total_exercises: u32,
    pub correct_exercises: u32,
    pub best_accuracy: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySettings {
    /// Words per day
    pub daily_goal: u32,
    #[serde(default)]
    pub reminder_time: Option<String>,
    pub preferred_difficulty: Difficulty,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            daily_goal: 10,
            reminder_time: None,
            preferred_difficulty: Difficulty::Medium,
        }
    }
}

/// One per user. Mutated only through the ledger operations in
/// [`crate::progress::ledger`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub id: String,
    pub user_id: String,
    pub total_words: u32,
    pub mastered_words: u32,
    pub learning_streak: u32,
    pub longest_streak: u32,
    #[serde(default)]
    pub last_study_date: Option<DateTime<Utc>>,
    /// Calendar day the streak was last evaluated
    #[serde(default)]
    pub streak_updated_on: Option<NaiveDate>,
    pub current_level: u32,
    pub experience_points: u64,
    pub total_experience: u64,
    #[serde(default)]
    pub weekly_progress: BoundedHistory<WeeklyProgress, WEEKLY_HISTORY_CAPACITY>,
    #[serde(default)]
    pub daily_history: BoundedHistory<DailyProgress, DAILY_HISTORY_CAPACITY>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub study_stats: StudyStats,
    #[serde(default)]
    pub study_settings: StudySettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProgress {
    /// Level 1, no XP, holding only the `welcome` achievement
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: super::new_id(),
            user_id: user_id.to_string(),
            total_words: 0,
            mastered_words: 0,
            learning_streak: 0,
            longest_streak: 0,
            last_study_date: None,
            streak_updated_on: None,
            current_level: 1,
            experience_points: 0,
            total_experience: 0,
            weekly_progress: BoundedHistory::default(),
            daily_history: BoundedHistory::default(),
            achievements: vec![Achievement {
                id: "welcome".to_string(),
                name: "Welcome!".to_string(),
                description: "Started your Chinese learning journey".to_string(),
                icon: "🎉".to_string(),
                unlocked_at: now,
            }],
            study_stats: StudyStats::default(),
            study_settings: StudySettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.iter().any(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_progress_defaults() {
        let progress = UserProgress::new("u1", Utc::now());
        assert_eq!(progress.current_level, 1);
        assert_eq!(progress.experience_points, 0);
        assert!(progress.has_achievement("welcome"));
        assert_eq!(progress.achievements.len(), 1);
        assert!(progress.daily_history.is_empty());
    }

    #[test]
    fn test_progress_document_roundtrip_keeps_history() {
        let mut progress = UserProgress::new("u1", Utc::now());
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        progress.daily_history.upsert(DailyProgress::empty(day));
        progress.weekly_progress.upsert(WeeklyProgress::empty("2024-09"));

        let json = serde_json::to_string(&progress).unwrap();
        let back: UserProgress = serde_json::from_str(&json).unwrap();
        assert!(back.daily_history.get(&day).is_some());
        assert!(back.weekly_progress.get(&"2024-09".to_string()).is_some());
    }
}
