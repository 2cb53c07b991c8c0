//! Mastery classifier
//!
//! Maps (accuracy, consecutive correct answers) to a 1-5 tier and a study
//! status. The result always replaces the previous tier, so a bad run can
//! demote a mastered word.

use crate::models::{PersonalVocabularyEntry, StudyStatus};

/// (min accuracy, min consecutive correct, level, status), first match wins
const TIERS: &[(u8, u32, u8, StudyStatus)] = &[
    (90, 5, 5, StudyStatus::Mastered),
    (80, 3, 4, StudyStatus::Reviewing),
    (70, 2, 3, StudyStatus::Reviewing),
    (50, 0, 2, StudyStatus::Learning),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mastery {
    pub level: u8,
    pub status: StudyStatus,
}

pub fn classify(accuracy: u8, consecutive_correct: u32) -> Mastery {
    TIERS
        .iter()
        .find(|(min_acc, min_streak, _, _)| accuracy >= *min_acc && consecutive_correct >= *min_streak)
        .map(|&(_, _, level, status)| Mastery { level, status })
        .unwrap_or(Mastery {
            level: 1,
            status: StudyStatus::Learning,
        })
}

/// Recompute and store the entry's tier from its learning stats
pub fn apply(entry: &mut PersonalVocabularyEntry) -> Mastery {
    let mastery = classify(entry.learning_stats.accuracy(), entry.learning_stats.consecutive_correct);
    entry.mastery_level = mastery.level;
    entry.study_status = mastery.status;
    mastery
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table() {
        assert_eq!(classify(95, 5), Mastery { level: 5, status: StudyStatus::Mastered });
        assert_eq!(classify(95, 4), Mastery { level: 4, status: StudyStatus::Reviewing });
        assert_eq!(classify(80, 3), Mastery { level: 4, status: StudyStatus::Reviewing });
        assert_eq!(classify(75, 2), Mastery { level: 3, status: StudyStatus::Reviewing });
        assert_eq!(classify(100, 1), Mastery { level: 2, status: StudyStatus::Learning });
        assert_eq!(classify(50, 0), Mastery { level: 2, status: StudyStatus::Learning });
        assert_eq!(classify(49, 9), Mastery { level: 1, status: StudyStatus::Learning });
        assert_eq!(classify(0, 0), Mastery { level: 1, status: StudyStatus::Learning });
    }

    #[test]
    fn test_level_always_in_range() {
        for accuracy in 0..=100u8 {
            for streak in 0..12 {
                let m = classify(accuracy, streak);
                assert!((1..=5).contains(&m.level));
                assert_eq!(m, classify(accuracy, streak));
            }
        }
    }

    #[test]
    fn test_apply_can_demote() {
        let mut entry = PersonalVocabularyEntry::new("u1", "山", "shān", "mountain", chrono::Utc::now());
        entry.mastery_level = 5;
        entry.study_status = StudyStatus::Mastered;
        entry.learning_stats.total_attempts = 10;
        entry.learning_stats.correct_answers = 6;
        entry.learning_stats.consecutive_correct = 0;

        let mastery = apply(&mut entry);
        assert_eq!(mastery.level, 2);
        assert_eq!(entry.study_status, StudyStatus::Learning);
    }
}
