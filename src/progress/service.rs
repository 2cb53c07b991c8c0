//! Persistence-backed progress operations
//!
//! Every method is a read-modify-write of the user's single progress
//! document; concurrent writers for one user are last-writer-wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::ledger::Activity;
use super::week::iso_week_key;
use crate::config::RewardConfig;
use crate::error::{StudyError, StudyResult};
use crate::models::{Achievement, DailyProgress, StudySettings, UserProgress, WeeklyProgress};
use crate::store::Store;

/// One answered study question, as seen by the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct StudyEvent {
    pub is_correct: bool,
    pub time_spent_secs: f64,
    /// Whether the word was mastered before and after this answer
    pub mastered_before: bool,
    pub mastered_after: bool,
    pub at: DateTime<Utc>,
}

/// What a study event changed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub experience_gained: u64,
    pub levels_gained: u32,
    pub current_level: u32,
    pub experience_points: u64,
    pub learning_streak: u32,
    pub mastered_words: u32,
    pub new_achievements: Vec<Achievement>,
}

/// Progress document plus its derived figures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(flatten)]
    pub progress: UserProgress,
    pub xp_for_next_level: u64,
    pub level_progress: u8,
    pub completion_rate: u8,
}

impl From<UserProgress> for ProgressSnapshot {
    fn from(progress: UserProgress) -> Self {
        Self {
            xp_for_next_level: progress.xp_for_next_level(),
            level_progress: progress.level_progress(),
            completion_rate: progress.completion_rate(),
            progress,
        }
    }
}

pub struct ProgressService {
    store: Arc<dyn Store>,
    rewards: RewardConfig,
}

impl ProgressService {
    pub fn new(store: Arc<dyn Store>, rewards: RewardConfig) -> Self {
        Self { store, rewards }
    }

    async fn load_or_new(&self, user_id: &str, now: DateTime<Utc>) -> StudyResult<UserProgress> {
        if user_id.trim().is_empty() {
            return Err(StudyError::validation("user id is required"));
        }
        match self.store.get_progress(user_id).await? {
            Some(progress) => Ok(progress),
            None => {
                debug!("Creating progress record for user {}", user_id);
                Ok(UserProgress::new(user_id, now))
            }
        }
    }

    async fn save(&self, progress: &mut UserProgress, now: DateTime<Utc>) -> StudyResult<()> {
        progress.updated_at = now;
        self.store.save_progress(progress).await?;
        Ok(())
    }

    /// Find-or-create, reconciling word counts with the personal vocabulary
    pub async fn get_progress(&self, user_id: &str) -> StudyResult<ProgressSnapshot> {
        let now = Utc::now();
        let existed = self.store.get_progress(user_id).await?.is_some();
        let mut progress = self.load_or_new(user_id, now).await?;

        let stats = self.store.personal_stats(user_id).await?;
        let drifted =
            stats.total_words != progress.total_words || stats.mastered_words != progress.mastered_words;
        if drifted {
            progress.total_words = stats.total_words;
            progress.mastered_words = stats.mastered_words;
        }
        if drifted || !existed {
            self.save(&mut progress, now).await?;
        }
        Ok(progress.into())
    }

    pub async fn add_experience(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> StudyResult<ProgressSnapshot> {
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.add_experience(amount, reason, now)?;
        progress.check_achievements(now);
        self.save(&mut progress, now).await?;
        Ok(progress.into())
    }

    pub async fn update_streak(&self, user_id: &str) -> StudyResult<UserProgress> {
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.update_streak(now);
        progress.check_achievements(now);
        self.save(&mut progress, now).await?;
        Ok(progress)
    }

    pub async fn update_daily_progress(&self, user_id: &str, day: DailyProgress) -> StudyResult<()> {
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.update_daily_progress(day);
        self.save(&mut progress, now).await
    }

    pub async fn update_weekly_progress(&self, user_id: &str, week: WeeklyProgress) -> StudyResult<()> {
        if week.week.trim().is_empty() {
            return Err(StudyError::validation("week key is required"));
        }
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.update_weekly_progress(week);
        self.save(&mut progress, now).await
    }

    /// Run the achievement rules; returns every achievement the user holds
    pub async fn check_achievements(&self, user_id: &str) -> StudyResult<Vec<Achievement>> {
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        let unlocked = progress.check_achievements(now);
        if !unlocked.is_empty() {
            self.save(&mut progress, now).await?;
        }
        Ok(progress.achievements)
    }

    /// Fold one answered study question into the ledger
    pub async fn record_study_event(&self, user_id: &str, event: &StudyEvent) -> StudyResult<ProgressUpdate> {
        if !event.time_spent_secs.is_finite() || event.time_spent_secs < 0.0 {
            return Err(StudyError::validation("time spent must be a non-negative number"));
        }
        let now = event.at;
        let today = now.date_naive();
        let mut progress = self.load_or_new(user_id, now).await?;

        let xp = if event.is_correct {
            self.rewards.correct_answer_xp
        } else {
            self.rewards.incorrect_answer_xp
        };
        let levels_gained = if xp > 0 {
            let reason = if event.is_correct { "correct answer" } else { "study attempt" };
            progress.add_experience(xp as i64, reason, now)?
        } else {
            0
        };

        if progress.streak_updated_on != Some(today) {
            progress.update_streak(now);
        } else {
            progress.last_study_date = Some(now);
        }

        let activity = Activity::study(event.is_correct, event.time_spent_secs);
        let day_accuracy = progress.accumulate_daily(today, activity);
        progress.accumulate_weekly(&iso_week_key(today), activity);

        let stats = &mut progress.study_stats;
        stats.total_study_time += event.time_spent_secs;
        stats.total_exercises += 1;
        if event.is_correct {
            stats.correct_exercises += 1;
        }
        stats.best_accuracy = stats.best_accuracy.max(day_accuracy);

        match (event.mastered_before, event.mastered_after) {
            (false, true) => progress.mastered_words += 1,
            (true, false) => progress.mastered_words = progress.mastered_words.saturating_sub(1),
            _ => {}
        }

        let new_achievements = progress.check_achievements(now);
        self.save(&mut progress, now).await?;

        Ok(ProgressUpdate {
            experience_gained: xp,
            levels_gained,
            current_level: progress.current_level,
            experience_points: progress.experience_points,
            learning_streak: progress.learning_streak,
            mastered_words: progress.mastered_words,
            new_achievements,
        })
    }

    /// A word joined the user's personal list
    pub async fn word_added(&self, user_id: &str) -> StudyResult<()> {
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.total_words += 1;
        progress.check_achievements(now);
        self.save(&mut progress, now).await
    }

    /// A word left the user's personal list
    pub async fn word_removed(&self, user_id: &str, was_mastered: bool) -> StudyResult<()> {
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.total_words = progress.total_words.saturating_sub(1);
        if was_mastered {
            progress.mastered_words = progress.mastered_words.saturating_sub(1);
        }
        self.save(&mut progress, now).await
    }

    /// Ledger side of one auto-task run. `words_created` counts new personal
    /// entries rather than new dictionary entries, matching `get_progress`.
    pub async fn record_auto_task(
        &self,
        user_id: &str,
        words_created: u32,
        exercises_created: u32,
    ) -> StudyResult<()> {
        self.record_auto_task_at(user_id, words_created, exercises_created, Utc::now())
            .await
    }

    pub async fn record_auto_task_at(
        &self,
        user_id: &str,
        words_created: u32,
        exercises_created: u32,
        now: DateTime<Utc>,
    ) -> StudyResult<()> {
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.total_words += words_created;
        progress.last_study_date = Some(now);
        progress.study_stats.total_sessions += 1;
        progress.accumulate_weekly(
            &iso_week_key(now.date_naive()),
            Activity {
                words: words_created,
                exercises: exercises_created,
                ..Default::default()
            },
        );
        progress.check_achievements(now);
        self.save(&mut progress, now).await
    }

    /// Most recent first
    pub async fn weekly_history(&self, user_id: &str, weeks: usize) -> StudyResult<Vec<WeeklyProgress>> {
        let progress = self.load_or_new(user_id, Utc::now()).await?;
        Ok(progress.weekly_progress.latest(weeks).into_iter().cloned().collect())
    }

    /// Most recent first
    pub async fn daily_history(&self, user_id: &str, days: usize) -> StudyResult<Vec<DailyProgress>> {
        let progress = self.load_or_new(user_id, Utc::now()).await?;
        Ok(progress.daily_history.latest(days).into_iter().cloned().collect())
    }

    pub async fn update_settings(&self, user_id: &str, settings: StudySettings) -> StudyResult<UserProgress> {
        if settings.daily_goal == 0 {
            return Err(StudyError::validation("daily goal must be at least 1"));
        }
        let now = Utc::now();
        let mut progress = self.load_or_new(user_id, now).await?;
        progress.study_settings = settings;
        self.save(&mut progress, now).await?;
        Ok(progress)
    }

    /// Delete the user's progress record
    pub async fn reset(&self, user_id: &str) -> StudyResult<bool> {
        let removed = self.store.delete_progress(user_id).await?;
        if removed {
            info!("Reset progress for user {}", user_id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersonalVocabularyEntry;
    use crate::store::SqliteStore;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    async fn service() -> (ProgressService, Arc<dyn Store>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(dir.path().join("test.db")).await.unwrap());
        (ProgressService::new(store.clone(), RewardConfig::default()), store, dir)
    }

    fn event(is_correct: bool, at: DateTime<Utc>) -> StudyEvent {
        StudyEvent {
            is_correct,
            time_spent_secs: 12.0,
            mastered_before: false,
            mastered_after: false,
            at,
        }
    }

    #[tokio::test]
    async fn test_study_event_awards_xp_and_rollups() {
        let (service, _, _dir) = service().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();

        let update = service.record_study_event("u1", &event(true, at)).await.unwrap();
        assert_eq!(update.experience_gained, 10);
        assert_eq!(update.experience_points, 10);

        let update = service.record_study_event("u1", &event(false, at)).await.unwrap();
        assert_eq!(update.experience_points, 12);

        let days = service.daily_history("u1", 7).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].attempts, 2);
        assert_eq!(days[0].accuracy, 50);
        assert_eq!(days[0].time_spent, 24.0);

        let weeks = service.weekly_history("u1", 12).await.unwrap();
        assert_eq!(weeks[0].week, "2024-19");
    }

    #[tokio::test]
    async fn test_streak_runs_once_per_day() {
        let (service, _, _dir) = service().await;
        let day1 = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let day2 = day1 + Duration::days(1);

        service.record_study_event("u1", &event(true, day1)).await.unwrap();
        let first = service.record_study_event("u1", &event(true, day2)).await.unwrap();
        assert_eq!(first.learning_streak, 1);

        // later the same day: no second increment
        let later = service
            .record_study_event("u1", &event(true, day2 + Duration::hours(3)))
            .await
            .unwrap();
        assert_eq!(later.learning_streak, 1);
    }

    #[tokio::test]
    async fn test_auto_task_before_first_answer_keeps_streak() {
        let (service, _, _dir) = service().await;
        let yesterday = Utc.with_ymd_and_hms(2024, 5, 10, 20, 0, 0).unwrap();
        let today = yesterday + Duration::hours(14);

        service.record_study_event("u1", &event(true, yesterday)).await.unwrap();
        service
            .record_auto_task_at("u1", 2, 1, today - Duration::hours(1))
            .await
            .unwrap();
        let update = service.record_study_event("u1", &event(true, today)).await.unwrap();
        assert_eq!(update.learning_streak, 1);

        let progress = service.get_progress("u1").await.unwrap().progress;
        assert_eq!(progress.longest_streak, 1);
        assert_eq!(progress.streak_updated_on, Some(today.date_naive()));
    }

    #[tokio::test]
    async fn test_mastered_transitions_adjust_count() {
        let (service, _, _dir) = service().await;
        let now = Utc::now();
        let promote = StudyEvent {
            mastered_after: true,
            ..event(true, now)
        };
        let update = service.record_study_event("u1", &promote).await.unwrap();
        assert_eq!(update.mastered_words, 1);

        let demote = StudyEvent {
            mastered_before: true,
            ..event(false, now)
        };
        let update = service.record_study_event("u1", &demote).await.unwrap();
        assert_eq!(update.mastered_words, 0);
    }

    #[tokio::test]
    async fn test_get_progress_reconciles_with_personal_vocabulary() {
        let (service, store, _dir) = service().await;
        for hanzi in ["水", "火"] {
            let entry = PersonalVocabularyEntry::new("u1", hanzi, "x", "x", Utc::now());
            store.save_personal(&entry).await.unwrap();
        }

        let snapshot = service.get_progress("u1").await.unwrap();
        assert_eq!(snapshot.progress.total_words, 2);
        assert!(snapshot.progress.has_achievement("welcome"));
        assert!(store.get_progress("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_experience_validation_and_reset() {
        let (service, _, _dir) = service().await;
        let err = service.add_experience("u1", 0, "nothing").await.unwrap_err();
        assert!(matches!(err, StudyError::Validation(_)));

        let snapshot = service.add_experience("u1", 450, "bonus").await.unwrap();
        assert_eq!(snapshot.progress.current_level, 2);
        assert_eq!(snapshot.xp_for_next_level, 900);

        assert!(service.reset("u1").await.unwrap());
        assert!(!service.reset("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_auto_task_and_word_counts() {
        let (service, store, _dir) = service().await;
        service.record_auto_task("u1", 3, 2).await.unwrap();
        service.word_removed("u1", false).await.unwrap();

        let progress = store.get_progress("u1").await.unwrap().unwrap();
        assert_eq!(progress.total_words, 2);
        assert_eq!(progress.study_stats.total_sessions, 1);
        assert!(progress.has_achievement("first_word"));
        let week = progress.weekly_progress.latest(1)[0];
        assert_eq!(week.words_learned, 3);
        assert_eq!(week.exercises_completed, 2);
    }
}
