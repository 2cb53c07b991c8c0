//! Global dictionary entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Difficulty;

/// A word in the shared dictionary, unique by `hanzi`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntry {
    pub id: String,
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: Meaning,
    #[serde(default)]
    pub grammar: GrammarInfo,
    #[serde(default)]
    pub examples: Vec<ExampleSentence>,
    #[serde(default)]
    pub related: Related,
    #[serde(default)]
    pub hsk_level: Option<u8>,
    pub category: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_active: bool,
    /// Where the entry came from, e.g. "AI Generated"
    pub source: String,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub statistics: VocabStatistics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meaning {
    pub primary: String,
    #[serde(default)]
    pub secondary: Vec<String>,
    #[serde(default)]
    pub part_of_speech: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarInfo {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub frequency: Option<f64>,
    #[serde(default)]
    pub formality: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExampleSentence {
    #[serde(default)]
    pub chinese: Option<String>,
    #[serde(default)]
    pub pinyin: Option<String>,
    #[serde(default, alias = "vietnamese")]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Related {
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
    #[serde(default)]
    pub compounds: Vec<String>,
}

/// Population-level review statistics (0-100 scale, not per user)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabStatistics {
    pub total_reviews: u64,
    pub mastery_level: u8,
    pub average_score: f64,
    pub last_reviewed: Option<DateTime<Utc>>,
}

impl VocabStatistics {
    /// Fold one review score (0-100) into the running figures
    pub fn record_review(&mut self, score: f64, now: DateTime<Utc>) {
        let previous_total = self.average_score * self.total_reviews as f64;
        self.total_reviews += 1;
        self.average_score = (previous_total + score.clamp(0.0, 100.0)) / self.total_reviews as f64;
        self.mastery_level = self.average_score.round().clamp(0.0, 100.0) as u8;
        self.last_reviewed = Some(now);
    }
}

impl VocabularyEntry {
    pub fn new(hanzi: &str, pinyin: &str, meaning: &str) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            hanzi: hanzi.trim().to_string(),
            pinyin: pinyin.trim().to_string(),
            meaning: Meaning {
                primary: meaning.trim().to_string(),
                ..Default::default()
            },
            grammar: GrammarInfo::default(),
            examples: Vec::new(),
            related: Related::default(),
            hsk_level: None,
            category: "Common".to_string(),
            difficulty: Difficulty::Medium,
            tags: Vec::new(),
            is_active: true,
            source: "Manual".to_string(),
            ai_model: None,
            session_id: None,
            statistics: VocabStatistics::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_review_running_average() {
        let mut stats = VocabStatistics::default();
        let now = Utc::now();
        stats.record_review(100.0, now);
        stats.record_review(0.0, now);
        stats.record_review(100.0, now);

        assert_eq!(stats.total_reviews, 3);
        assert!((stats.average_score - 66.666).abs() < 0.01);
        assert_eq!(stats.mastery_level, 67);
        assert_eq!(stats.last_reviewed, Some(now));
    }

    #[test]
    fn test_example_accepts_legacy_translation_key() {
        let example: ExampleSentence =
            serde_json::from_str(r#"{"chinese":"我爱你","vietnamese":"Anh yêu em"}"#).unwrap();
        assert_eq!(example.translation.as_deref(), Some("Anh yêu em"));
    }
}
