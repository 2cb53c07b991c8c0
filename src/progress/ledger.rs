//! XP, levels, streaks, rollups and achievements
//!
//! Pure operations on a [`UserProgress`] value; the caller persists it.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::{StudyError, StudyResult};
use crate::models::{Achievement, DailyProgress, UserProgress, WeeklyProgress};

/// XP needed to reach `level`
pub fn level_threshold(level: u32) -> u64 {
    let level = level as u64;
    level.saturating_mul(level).saturating_mul(100)
}

/// Largest level whose threshold `experience` reaches, never below 1
pub fn level_for_experience(experience: u64) -> u32 {
    let hundreds = experience / 100;
    let mut level = (hundreds as f64).sqrt() as u64;
    // correct for float rounding at large values
    while level > 0 && level * level > hundreds {
        level -= 1;
    }
    while (level + 1) * (level + 1) <= hundreds {
        level += 1;
    }
    level.max(1) as u32
}

struct AchievementRule {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    unlocked: fn(&UserProgress) -> bool,
}

const ACHIEVEMENT_RULES: &[AchievementRule] = &[
    AchievementRule {
        id: "first_word",
        name: "First Word",
        description: "Learned your first word",
        icon: "🌟",
        unlocked: |p| p.total_words >= 1,
    },
    AchievementRule {
        id: "word_master",
        name: "Word Master",
        description: "Mastered 10 words",
        icon: "👑",
        unlocked: |p| p.mastered_words >= 10,
    },
    AchievementRule {
        id: "streak_master",
        name: "Streak Master",
        description: "Studied 7 days in a row",
        icon: "🔥",
        unlocked: |p| p.learning_streak >= 7,
    },
    AchievementRule {
        id: "level_up",
        name: "Level Up",
        description: "Reached level 5",
        icon: "⭐",
        unlocked: |p| p.current_level >= 5,
    },
];

/// Increment applied to a daily or weekly rollup
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Activity {
    pub words: u32,
    pub exercises: u32,
    pub attempts: u32,
    pub correct: u32,
    /// Seconds
    pub seconds: f64,
}

impl Activity {
    /// One answered study question
    pub fn study(is_correct: bool, seconds: f64) -> Self {
        Self {
            words: 1,
            exercises: 1,
            attempts: 1,
            correct: u32::from(is_correct),
            seconds,
        }
    }
}

fn accuracy(correct: u32, attempts: u32) -> u8 {
    if attempts == 0 {
        return 0;
    }
    (correct as f64 / attempts as f64 * 100.0).round().min(100.0) as u8
}

impl UserProgress {
    /// Grant XP and raise the level as many times as the new total allows.
    /// Returns the number of levels gained.
    pub fn add_experience(&mut self, amount: i64, reason: &str, now: DateTime<Utc>) -> StudyResult<u32> {
        if amount <= 0 {
            return Err(StudyError::validation(format!(
                "experience amount must be positive, got {}",
                amount
            )));
        }

        let grant = amount as u64;
        let (Some(points), Some(total)) = (
            self.experience_points.checked_add(grant),
            self.total_experience.checked_add(grant),
        ) else {
            return Err(StudyError::validation(format!(
                "experience grant of {} would overflow the total",
                amount
            )));
        };
        self.experience_points = points;
        self.total_experience = total;

        let start = self.current_level;
        self.current_level = start.max(level_for_experience(self.experience_points));
        self.updated_at = now;

        let gained = self.current_level - start;
        if gained > 0 {
            info!(
                "User {} reached level {} (+{} XP: {})",
                self.user_id, self.current_level, amount, reason
            );
        } else {
            debug!("User {} +{} XP: {}", self.user_id, amount, reason);
        }
        Ok(gained)
    }

    /// Continue the streak if the calendar day before `now` has study time,
    /// otherwise reset it. `last_study_date` is always set to `now`.
    pub fn update_streak(&mut self, now: DateTime<Utc>) {
        self.streak_updated_on = Some(now.date_naive());
        let yesterday = now.date_naive().pred_opt();
        let studied_yesterday = yesterday
            .and_then(|d| self.daily_history.get(&d))
            .is_some_and(|d| d.time_spent > 0.0);

        if studied_yesterday {
            self.learning_streak += 1;
            if self.learning_streak > self.longest_streak {
                self.longest_streak = self.learning_streak;
            }
        } else {
            self.learning_streak = 0;
        }

        self.last_study_date = Some(now);
        self.updated_at = now;
    }

    /// Upsert one day's rollup by date
    pub fn update_daily_progress(&mut self, day: DailyProgress) {
        self.daily_history.upsert(day);
    }

    /// Upsert one week's rollup by ISO week key
    pub fn update_weekly_progress(&mut self, week: WeeklyProgress) {
        self.weekly_progress.upsert(week);
    }

    /// Add activity to the rollup for `date`, creating it if needed.
    /// Returns the day's accuracy afterwards.
    pub fn accumulate_daily(&mut self, date: NaiveDate, activity: Activity) -> u8 {
        let mut day_accuracy = 0;
        self.daily_history.update_or_insert(
            &date,
            || DailyProgress::empty(date),
            |d| {
                d.words_studied += activity.words;
                d.exercises_completed += activity.exercises;
                d.attempts += activity.attempts;
                d.correct_answers += activity.correct;
                d.time_spent += activity.seconds;
                d.accuracy = accuracy(d.correct_answers, d.attempts);
                day_accuracy = d.accuracy;
            },
        );
        day_accuracy
    }

    /// Add activity to the rollup for `week`, creating it if needed
    pub fn accumulate_weekly(&mut self, week: &str, activity: Activity) {
        self.weekly_progress.update_or_insert(
            &week.to_string(),
            || WeeklyProgress::empty(week),
            |w| {
                w.words_learned += activity.words;
                w.exercises_completed += activity.exercises;
                w.attempts += activity.attempts;
                w.correct_answers += activity.correct;
                w.time_spent += activity.seconds;
                w.accuracy = accuracy(w.correct_answers, w.attempts);
            },
        );
    }

    /// Unlock every rule that now holds and is not yet unlocked.
    /// Returns only the newly unlocked achievements.
    pub fn check_achievements(&mut self, now: DateTime<Utc>) -> Vec<Achievement> {
        let unlocked: Vec<Achievement> = ACHIEVEMENT_RULES
            .iter()
            .filter(|rule| !self.has_achievement(rule.id) && (rule.unlocked)(self))
            .map(|rule| Achievement {
                id: rule.id.to_string(),
                name: rule.name.to_string(),
                description: rule.description.to_string(),
                icon: rule.icon.to_string(),
                unlocked_at: now,
            })
            .collect();

        for achievement in &unlocked {
            info!("User {} unlocked achievement '{}'", self.user_id, achievement.id);
        }
        self.achievements.extend(unlocked.iter().cloned());
        unlocked
    }

    /// XP total at which the next level starts
    pub fn xp_for_next_level(&self) -> u64 {
        level_threshold(self.current_level + 1)
    }

    /// Percent through the current level, 0-100
    pub fn level_progress(&self) -> u8 {
        let floor = if self.current_level <= 1 {
            0
        } else {
            level_threshold(self.current_level)
        };
        let span = self.xp_for_next_level().saturating_sub(floor);
        if span == 0 {
            return 0;
        }
        let into = self.experience_points.saturating_sub(floor);
        ((into as f64 / span as f64) * 100.0).round().min(100.0) as u8
    }

    /// Mastered share of all words, 0-100
    pub fn completion_rate(&self) -> u8 {
        accuracy(self.mastered_words, self.total_words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn progress() -> UserProgress {
        UserProgress::new("u1", Utc::now())
    }

    #[test]
    fn test_level_threshold() {
        assert_eq!(level_threshold(1), 100);
        assert_eq!(level_threshold(2), 400);
        assert_eq!(level_threshold(3), 900);
    }

    #[test]
    fn test_add_experience_two_step_level_up() {
        let mut p = progress();
        let now = Utc::now();

        assert_eq!(p.add_experience(250, "quiz", now).unwrap(), 0);
        assert_eq!(p.current_level, 1);
        assert_eq!(p.experience_points, 250);

        assert_eq!(p.add_experience(200, "quiz", now).unwrap(), 1);
        assert_eq!(p.current_level, 2);
        assert_eq!(p.experience_points, 450);
        assert_eq!(p.total_experience, 450);
    }

    #[test]
    fn test_add_experience_multi_level_jump() {
        let mut p = progress();
        let gained = p.add_experience(2_500, "import", Utc::now()).unwrap();
        // 2500 >= 25 * 100 but < 36 * 100
        assert_eq!(p.current_level, 5);
        assert_eq!(gained, 4);
        assert!(level_threshold(p.current_level) <= p.experience_points);
        assert!(p.experience_points < level_threshold(p.current_level + 1));
    }

    #[test]
    fn test_level_for_experience_boundaries() {
        assert_eq!(level_for_experience(0), 1);
        assert_eq!(level_for_experience(399), 1);
        assert_eq!(level_for_experience(400), 2);
        assert_eq!(level_for_experience(899), 2);
        assert_eq!(level_for_experience(900), 3);
        let top = level_for_experience(u64::MAX);
        assert!(level_threshold(top) <= u64::MAX / 100 * 100);
        assert!(level_threshold(top + 1) > u64::MAX / 100 * 100);
    }

    #[test]
    fn test_huge_grants_saturate_into_validation_error() {
        let mut p = progress();
        let now = Utc::now();
        p.add_experience(i64::MAX, "import", now).unwrap();
        assert_eq!(p.current_level, level_for_experience(i64::MAX as u64));
        assert!(level_threshold(p.current_level) <= p.experience_points);

        p.add_experience(i64::MAX, "import", now).unwrap();
        let level = p.current_level;
        let points = p.experience_points;

        let err = p.add_experience(i64::MAX, "import", now).unwrap_err();
        assert!(matches!(err, StudyError::Validation(_)));
        assert_eq!(p.experience_points, points);
        assert_eq!(p.current_level, level);
        assert!(p.xp_for_next_level() > p.experience_points);
    }

    #[test]
    fn test_add_experience_rejects_non_positive() {
        let mut p = progress();
        let err = p.add_experience(0, "nothing", Utc::now()).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(p.add_experience(-5, "negative", Utc::now()).is_err());
        assert_eq!(p.experience_points, 0);
    }

    #[test]
    fn test_streak_continues_when_yesterday_has_time() {
        let mut p = progress();
        let today = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let yesterday = (today - Duration::days(1)).date_naive();
        p.accumulate_daily(yesterday, Activity::study(true, 30.0));
        p.learning_streak = 3;
        p.longest_streak = 3;

        p.update_streak(today);
        assert_eq!(p.learning_streak, 4);
        assert_eq!(p.longest_streak, 4);
        assert_eq!(p.last_study_date, Some(today));
    }

    #[test]
    fn test_streak_resets_without_yesterday_even_if_today_studied() {
        let mut p = progress();
        let today = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        p.accumulate_daily(today.date_naive(), Activity::study(true, 120.0));
        p.learning_streak = 5;
        p.longest_streak = 5;

        p.update_streak(today);
        assert_eq!(p.learning_streak, 0);
        assert_eq!(p.longest_streak, 5);
        assert_eq!(p.last_study_date, Some(today));
    }

    #[test]
    fn test_daily_history_keeps_most_recent_thirty() {
        let mut p = progress();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for offset in 0..35 {
            let mut day = DailyProgress::empty(start + Duration::days(offset));
            day.words_studied = offset as u32;
            p.update_daily_progress(day);
        }
        assert_eq!(p.daily_history.len(), 30);
        assert!(p.daily_history.get(&start).is_none());
        let newest = p.daily_history.latest(1)[0];
        assert_eq!(newest.words_studied, 34);
    }

    #[test]
    fn test_weekly_upsert_replaces_existing_week() {
        let mut p = progress();
        p.accumulate_weekly("2024-10", Activity::study(true, 60.0));
        p.accumulate_weekly("2024-10", Activity::study(false, 60.0));
        p.accumulate_weekly("2024-10", Activity { words: 3, exercises: 2, ..Default::default() });
        let week = p.weekly_progress.get(&"2024-10".to_string()).unwrap();
        assert_eq!(week.words_learned, 5);
        assert_eq!(week.exercises_completed, 4);
        // generated exercises do not dilute accuracy
        assert_eq!(week.accuracy, 50);

        let mut replacement = WeeklyProgress::empty("2024-10");
        replacement.words_learned = 9;
        p.update_weekly_progress(replacement);
        assert_eq!(p.weekly_progress.len(), 1);
        assert_eq!(p.weekly_progress.get(&"2024-10".to_string()).unwrap().words_learned, 9);
    }

    #[test]
    fn test_check_achievements_is_idempotent() {
        let mut p = progress();
        p.total_words = 1;
        p.learning_streak = 7;
        let now = Utc::now();

        let first = p.check_achievements(now);
        let ids: Vec<&str> = first.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["first_word", "streak_master"]);

        let second = p.check_achievements(now);
        assert!(second.is_empty());
        assert_eq!(p.achievements.len(), 3);
    }

    #[test]
    fn test_achievements_survive_stat_decay() {
        let mut p = progress();
        p.mastered_words = 10;
        p.check_achievements(Utc::now());
        p.mastered_words = 2;
        p.check_achievements(Utc::now());
        assert!(p.has_achievement("word_master"));
    }

    #[test]
    fn test_derived_accessors() {
        let mut p = progress();
        p.add_experience(450, "test", Utc::now()).unwrap();
        assert_eq!(p.xp_for_next_level(), 900);
        // 50 of the 500 XP between levels 2 and 3
        assert_eq!(p.level_progress(), 10);

        p.total_words = 8;
        p.mastered_words = 2;
        assert_eq!(p.completion_rate(), 25);
    }
}
