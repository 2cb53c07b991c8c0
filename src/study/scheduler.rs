//! Spaced-repetition engine (simplified SM-2)

use chrono::{DateTime, Duration, Utc};

use crate::models::{PersonalVocabularyEntry, StudyAction};

pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 2.5;

/// Apply one study outcome to the entry's scheduling state.
///
/// Touches only `learning_stats` and `study_history`; mastery is left to
/// the classifier and persistence to the caller.
pub fn record_study_outcome(
    entry: &mut PersonalVocabularyEntry,
    is_correct: bool,
    time_spent_secs: f64,
    now: DateTime<Utc>,
) {
    let stats = &mut entry.learning_stats;
    stats.total_attempts += 1;
    stats.review_count += 1;
    stats.last_reviewed = Some(now);

    if is_correct {
        stats.correct_answers += 1;
        stats.consecutive_correct += 1;
        stats.interval = match stats.consecutive_correct {
            1 => 1,
            2 => 6,
            _ => ((stats.interval as f64 * stats.ease_factor).round() as u32).max(1),
        };
        stats.ease_factor = (stats.ease_factor + 0.1).min(MAX_EASE);
    } else {
        stats.consecutive_correct = 0;
        stats.interval = 1;
        stats.ease_factor = (stats.ease_factor - 0.2).max(MIN_EASE);
    }

    stats.next_review = Some(now + Duration::days(stats.interval as i64));

    let (score, note) = if is_correct {
        (100, format!("Correct, next review in {} day(s)", stats.interval))
    } else {
        (0, "Incorrect, review again tomorrow".to_string())
    };
    entry.push_history(StudyAction::Reviewed, Some(score), Some(time_spent_secs), Some(&note), now);
}
