//! Personal vocabulary operations
//!
//! Owns the study path: spaced-repetition update, mastery reclassification,
//! persistence, dictionary statistics and the progress event.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{mastery, scheduler};
use crate::error::{StudyError, StudyResult};
use crate::models::{
    merge_tags, PersonalVocabularyEntry, Priority, StudyAction, StudyStatus,
};
use crate::progress::{ProgressService, ProgressUpdate, StudyEvent};
use crate::store::{PersonalVocabStats, Store};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddWordRequest {
    pub word_id: String,
    /// Cached copies default to the dictionary entry's text
    #[serde(default)]
    pub hanzi: Option<String>,
    #[serde(default)]
    pub pinyin: Option<String>,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Editable fields; mastery and scheduling state are not among them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordUpdate {
    #[serde(default)]
    pub hanzi: Option<String>,
    #[serde(default)]
    pub pinyin: Option<String>,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyOutcome {
    pub is_correct: bool,
    #[serde(default)]
    pub time_spent_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyResultSummary {
    pub entry: PersonalVocabularyEntry,
    pub accuracy: u8,
    /// Absent when the progress update failed; the study result still stands
    pub progress: Option<ProgressUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub mastery_level: Option<u8>,
    #[serde(default)]
    pub study_status: Option<StudyStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

impl Default for WordFilter {
    fn default() -> Self {
        Self {
            search: None,
            mastery_level: None,
            study_status: None,
            tags: Vec::new(),
            page: default_page(),
            limit: default_page_size(),
        }
    }
}

impl WordFilter {
    fn matches(&self, entry: &PersonalVocabularyEntry) -> bool {
        if let Some(search) = self.search.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty()) {
            let hit = [&entry.hanzi, &entry.pinyin, &entry.meaning]
                .iter()
                .any(|field| field.to_lowercase().contains(&search));
            if !hit {
                return false;
            }
        }
        if self.mastery_level.is_some_and(|level| level != entry.mastery_level) {
            return false;
        }
        if self.study_status.is_some_and(|status| status != entry.study_status) {
            return false;
        }
        self.tags.is_empty() || self.tags.iter().any(|t| entry.tags.contains(t))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordPage {
    pub words: Vec<PersonalVocabularyEntry>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSchedule {
    pub date: NaiveDate,
    pub words_to_review: Vec<PersonalVocabularyEntry>,
    pub new_words: Vec<PersonalVocabularyEntry>,
    pub mastery_words: Vec<PersonalVocabularyEntry>,
}

pub struct StudyService {
    store: Arc<dyn Store>,
    progress: Arc<ProgressService>,
}

impl StudyService {
    pub fn new(store: Arc<dyn Store>, progress: Arc<ProgressService>) -> Self {
        Self { store, progress }
    }

    /// Load an entry, treating another user's entry as absent
    async fn load_owned(&self, entry_id: &str, user_id: &str) -> StudyResult<PersonalVocabularyEntry> {
        match self.store.get_personal(entry_id).await? {
            Some(entry) if entry.user_id == user_id => Ok(entry),
            _ => Err(StudyError::not_found("personal vocabulary", entry_id)),
        }
    }

    pub async fn get_word(&self, entry_id: &str, user_id: &str) -> StudyResult<PersonalVocabularyEntry> {
        self.load_owned(entry_id, user_id).await
    }

    pub async fn add_word(&self, user_id: &str, request: AddWordRequest) -> StudyResult<PersonalVocabularyEntry> {
        if request.word_id.trim().is_empty() {
            return Err(StudyError::validation("wordId is required"));
        }
        if self.store.get_user(user_id).await?.is_none() {
            return Err(StudyError::not_found("user", user_id));
        }
        let word = self
            .store
            .get_vocabulary(&request.word_id)
            .await?
            .ok_or_else(|| StudyError::not_found("vocabulary", &request.word_id))?;
        if self.store.find_personal_by_word(user_id, &word.id).await?.is_some() {
            return Err(StudyError::Conflict(format!(
                "'{}' is already in the personal vocabulary",
                word.hanzi
            )));
        }

        let mut entry = PersonalVocabularyEntry::new(
            user_id,
            request.hanzi.as_deref().unwrap_or(&word.hanzi),
            request.pinyin.as_deref().unwrap_or(&word.pinyin),
            request.meaning.as_deref().unwrap_or(&word.meaning.primary),
            Utc::now(),
        );
        entry.word_id = Some(word.id.clone());
        entry.priority = request.priority.unwrap_or_default();
        merge_tags(&mut entry.tags, &request.tags);
        entry.notes = request.notes.unwrap_or_default();

        self.store.save_personal(&entry).await?;
        info!("User {} added '{}' to personal vocabulary", user_id, entry.hanzi);

        if let Err(e) = self.progress.word_added(user_id).await {
            warn!("Failed to count added word for user {}: {}", user_id, e);
        }
        Ok(entry)
    }

    pub async fn update_word(
        &self,
        entry_id: &str,
        user_id: &str,
        update: WordUpdate,
    ) -> StudyResult<PersonalVocabularyEntry> {
        let mut entry = self.load_owned(entry_id, user_id).await?;

        if let Some(hanzi) = update.hanzi.filter(|s| !s.trim().is_empty()) {
            entry.hanzi = hanzi.trim().to_string();
        }
        if let Some(pinyin) = update.pinyin {
            entry.pinyin = pinyin;
        }
        if let Some(meaning) = update.meaning {
            entry.meaning = meaning;
        }
        if let Some(notes) = update.notes {
            entry.notes = notes;
        }
        if let Some(tags) = update.tags {
            entry.tags.clear();
            merge_tags(&mut entry.tags, &tags);
        }
        if let Some(priority) = update.priority {
            entry.priority = priority;
        }
        entry.push_history(StudyAction::Updated, None, None, Some("Entry edited"), Utc::now());

        self.store.save_personal(&entry).await?;
        Ok(entry)
    }

    pub async fn remove_word(&self, entry_id: &str, user_id: &str) -> StudyResult<()> {
        let entry = self.load_owned(entry_id, user_id).await?;
        self.store.delete_personal(&entry.id).await?;
        info!("User {} removed '{}' from personal vocabulary", user_id, entry.hanzi);

        let was_mastered = entry.study_status == StudyStatus::Mastered;
        if let Err(e) = self.progress.word_removed(user_id, was_mastered).await {
            warn!("Failed to uncount removed word for user {}: {}", user_id, e);
        }
        Ok(())
    }

    /// Apply one study outcome end to end
    pub async fn record_study_result(
        &self,
        entry_id: &str,
        user_id: &str,
        outcome: StudyOutcome,
    ) -> StudyResult<StudyResultSummary> {
        self.record_study_result_at(entry_id, user_id, outcome, Utc::now()).await
    }

    pub async fn record_study_result_at(
        &self,
        entry_id: &str,
        user_id: &str,
        outcome: StudyOutcome,
        now: DateTime<Utc>,
    ) -> StudyResult<StudyResultSummary> {
        if !outcome.time_spent_seconds.is_finite() || outcome.time_spent_seconds < 0.0 {
            return Err(StudyError::validation("timeSpentSeconds must be a non-negative number"));
        }
        let mut entry = self.load_owned(entry_id, user_id).await?;
        let mastered_before = entry.study_status == StudyStatus::Mastered;

        scheduler::record_study_outcome(&mut entry, outcome.is_correct, outcome.time_spent_seconds, now);
        let tier = mastery::apply(&mut entry);
        let mastered_after = tier.status == StudyStatus::Mastered;
        if mastered_after && !mastered_before {
            entry.push_history(StudyAction::Mastered, None, None, Some("Reached mastery"), now);
        }

        self.store.save_personal(&entry).await?;
        debug!(
            "Study result for '{}': correct={} level={} interval={}d",
            entry.hanzi, outcome.is_correct, entry.mastery_level, entry.learning_stats.interval
        );

        self.record_dictionary_review(&entry, outcome.is_correct, now).await;

        let event = StudyEvent {
            is_correct: outcome.is_correct,
            time_spent_secs: outcome.time_spent_seconds,
            mastered_before,
            mastered_after,
            at: now,
        };
        let progress = match self.progress.record_study_event(user_id, &event).await {
            Ok(update) => Some(update),
            Err(e) => {
                warn!("Failed to record study event for user {}: {}", user_id, e);
                None
            }
        };

        Ok(StudyResultSummary {
            accuracy: entry.accuracy(),
            entry,
            progress,
        })
    }

    /// Population statistics on the dictionary entry; failures only logged
    async fn record_dictionary_review(&self, entry: &PersonalVocabularyEntry, is_correct: bool, now: DateTime<Utc>) {
        let lookup = match &entry.word_id {
            Some(id) => self.store.get_vocabulary(id).await,
            None => self.store.find_vocabulary_by_hanzi(&entry.hanzi).await,
        };
        let mut word = match lookup {
            Ok(Some(word)) => word,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to load dictionary entry for '{}': {:#}", entry.hanzi, e);
                return;
            }
        };
        word.statistics.record_review(if is_correct { 100.0 } else { 0.0 }, now);
        if let Err(e) = self.store.save_vocabulary(&word).await {
            warn!("Failed to update dictionary statistics for '{}': {:#}", word.hanzi, e);
        }
    }

    /// Due words not yet mastered, highest priority first, then earliest due
    pub async fn due_for_review(
        &self,
        user_id: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> StudyResult<Vec<PersonalVocabularyEntry>> {
        let mut due: Vec<_> = self
            .store
            .list_personal(user_id)
            .await?
            .into_iter()
            .filter(|e| e.study_status != StudyStatus::Mastered)
            .filter(|e| e.learning_stats.next_review.is_some_and(|next| next <= now))
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.learning_stats.next_review.cmp(&b.learning_stats.next_review))
        });
        due.truncate(limit);
        Ok(due)
    }

    /// Never-studied words, oldest first
    pub async fn new_words(&self, user_id: &str, limit: usize) -> StudyResult<Vec<PersonalVocabularyEntry>> {
        Ok(self
            .store
            .list_personal(user_id)
            .await?
            .into_iter()
            .filter(|e| e.study_status == StudyStatus::New)
            .take(limit)
            .collect())
    }

    pub async fn review_schedule(&self, user_id: &str, date: NaiveDate) -> StudyResult<ReviewSchedule> {
        let words = self.store.list_personal(user_id).await?;

        let words_to_review = words
            .iter()
            .filter(|e| e.study_status != StudyStatus::Mastered)
            .filter(|e| {
                e.learning_stats
                    .next_review
                    .is_some_and(|next| next.date_naive() == date)
            })
            .take(20)
            .cloned()
            .collect();
        let new_words = words
            .iter()
            .filter(|e| e.study_status == StudyStatus::New)
            .take(10)
            .cloned()
            .collect();
        let mastery_words = words
            .iter()
            .filter(|e| e.study_status == StudyStatus::Reviewing && (3..5).contains(&e.mastery_level))
            .take(15)
            .cloned()
            .collect();

        Ok(ReviewSchedule {
            date,
            words_to_review,
            new_words,
            mastery_words,
        })
    }

    /// Filtered, newest first, paginated
    pub async fn list_words(&self, user_id: &str, filter: &WordFilter) -> StudyResult<WordPage> {
        let page = filter.page.max(1);
        let limit = filter.limit.clamp(1, 100);

        let mut matching: Vec<_> = self
            .store
            .list_personal(user_id)
            .await?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        matching.reverse();

        let total = matching.len();
        let words = matching.into_iter().skip((page - 1).saturating_mul(limit)).take(limit).collect();
        Ok(WordPage {
            words,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    pub async fn vocabulary_stats(&self, user_id: &str) -> StudyResult<PersonalVocabStats> {
        Ok(self.store.personal_stats(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewardConfig;
    use crate::models::{User, VocabularyEntry};
    use crate::store::SqliteStore;
    use chrono::Duration;
    use tempfile::tempdir;

    struct Fixture {
        service: StudyService,
        store: Arc<dyn Store>,
        user: User,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(dir.path().join("test.db")).await.unwrap());
        let progress = Arc::new(ProgressService::new(store.clone(), RewardConfig::default()));
        let user = User::new("learner");
        store.create_user(&user).await.unwrap();
        Fixture {
            service: StudyService::new(store.clone(), progress),
            store,
            user,
            _dir: dir,
        }
    }

    async fn add(f: &Fixture, hanzi: &str, meaning: &str) -> PersonalVocabularyEntry {
        let word = VocabularyEntry::new(hanzi, "pinyin", meaning);
        f.store.save_vocabulary(&word).await.unwrap();
        f.service
            .add_word(
                &f.user.id,
                AddWordRequest {
                    word_id: word.id,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    fn correct() -> StudyOutcome {
        StudyOutcome {
            is_correct: true,
            time_spent_seconds: 4.0,
        }
    }

    #[tokio::test]
    async fn test_add_word_caches_dictionary_text_and_rejects_duplicates() {
        let f = fixture().await;
        let entry = add(&f, "茶", "tea").await;
        assert_eq!(entry.meaning, "tea");
        assert_eq!(entry.study_status, StudyStatus::New);

        let err = f
            .service
            .add_word(
                &f.user.id,
                AddWordRequest {
                    word_id: entry.word_id.clone().unwrap(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StudyError::Conflict(_)));

        let progress = f.store.get_progress(&f.user.id).await.unwrap().unwrap();
        assert_eq!(progress.total_words, 1);
    }

    #[tokio::test]
    async fn test_add_word_requires_user_and_word() {
        let f = fixture().await;
        let missing_word = f
            .service
            .add_word(&f.user.id, AddWordRequest { word_id: "nope".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(missing_word.status_code(), 404);

        let missing_user = f
            .service
            .add_word("ghost", AddWordRequest { word_id: "nope".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(missing_user.to_string(), "user not found: ghost");
    }

    #[tokio::test]
    async fn test_first_correct_answer_gives_level_two() {
        let f = fixture().await;
        let entry = add(&f, "水", "water").await;

        let result = f.service.record_study_result(&entry.id, &f.user.id, correct()).await.unwrap();
        assert_eq!(result.accuracy, 100);
        assert_eq!(result.entry.learning_stats.consecutive_correct, 1);
        assert_eq!(result.entry.mastery_level, 2);
        assert_eq!(result.entry.study_status, StudyStatus::Learning);
        assert_eq!(result.progress.unwrap().experience_gained, 10);

        let word = f.store.get_vocabulary(entry.word_id.as_ref().unwrap()).await.unwrap().unwrap();
        assert_eq!(word.statistics.total_reviews, 1);
        assert_eq!(word.statistics.mastery_level, 100);
    }

    #[tokio::test]
    async fn test_five_correct_answers_master_the_word() {
        let f = fixture().await;
        let entry = add(&f, "火", "fire").await;
        let mut last = None;
        for _ in 0..5 {
            last = Some(f.service.record_study_result(&entry.id, &f.user.id, correct()).await.unwrap());
        }
        let last = last.unwrap();
        assert_eq!(last.entry.mastery_level, 5);
        assert_eq!(last.entry.study_status, StudyStatus::Mastered);
        assert_eq!(last.entry.study_history.last().unwrap().action, StudyAction::Mastered);
        assert_eq!(last.progress.unwrap().mastered_words, 1);
    }

    #[tokio::test]
    async fn test_study_result_validation_and_ownership() {
        let f = fixture().await;
        let entry = add(&f, "土", "earth").await;

        let bad_time = StudyOutcome { is_correct: true, time_spent_seconds: -1.0 };
        let err = f.service.record_study_result(&entry.id, &f.user.id, bad_time).await.unwrap_err();
        assert!(matches!(err, StudyError::Validation(_)));

        let err = f.service.record_study_result(&entry.id, "someone-else", correct()).await.unwrap_err();
        assert!(matches!(err, StudyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_due_for_review_orders_by_priority_then_due_date() {
        let f = fixture().await;
        let low = add(&f, "一", "one").await;
        let high = add(&f, "二", "two").await;
        f.service
            .update_word(&high.id, &f.user.id, WordUpdate { priority: Some(Priority::High), ..Default::default() })
            .await
            .unwrap();

        let past = Utc::now() - Duration::days(3);
        for id in [&low.id, &high.id] {
            f.service.record_study_result_at(id, &f.user.id, correct(), past).await.unwrap();
        }

        let due = f.service.due_for_review(&f.user.id, 10, Utc::now()).await.unwrap();
        let order: Vec<&str> = due.iter().map(|e| e.hanzi.as_str()).collect();
        assert_eq!(order, vec!["二", "一"]);

        assert!(f.service.due_for_review(&f.user.id, 10, past).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_words_filters_and_paginates() {
        let f = fixture().await;
        for (hanzi, meaning) in [("猫", "cat"), ("狗", "dog"), ("猫头鹰", "owl (cat-head eagle)")] {
            add(&f, hanzi, meaning).await;
        }

        let filter = WordFilter {
            search: Some("CAT".into()),
            limit: 1,
            ..Default::default()
        };
        let page = f.service.list_words(&f.user.id, &filter).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.words.len(), 1);
        assert_eq!(page.words[0].hanzi, "猫头鹰");

        let schedule = f.service.review_schedule(&f.user.id, Utc::now().date_naive()).await.unwrap();
        assert_eq!(schedule.new_words.len(), 3);
    }

    #[tokio::test]
    async fn test_list_words_page_past_the_end_is_empty() {
        let f = fixture().await;
        add(&f, "猫", "cat").await;

        let filter = WordFilter {
            page: usize::MAX,
            limit: 100,
            ..Default::default()
        };
        let page = f.service.list_words(&f.user.id, &filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(page.words.is_empty());
        assert_eq!(page.page, usize::MAX);
    }

    #[tokio::test]
    async fn test_remove_word_decrements_total() {
        let f = fixture().await;
        let entry = add(&f, "木", "wood").await;
        f.service.remove_word(&entry.id, &f.user.id).await.unwrap();

        assert!(f.store.get_personal(&entry.id).await.unwrap().is_none());
        let progress = f.store.get_progress(&f.user.id).await.unwrap().unwrap();
        assert_eq!(progress.total_words, 0);
        assert_eq!(f.service.vocabulary_stats(&f.user.id).await.unwrap().total_words, 0);
    }
}
