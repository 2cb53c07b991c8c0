//! Generated and manual exercises

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Difficulty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExerciseType {
    MultipleChoice,
    SelectPinyin,
    FindTheMistake,
    FillInTheBlank,
    SentenceBuilding,
    Pronunciation,
    Grammar,
}

impl std::str::FromStr for ExerciseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown exercise type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExerciseCategory {
    #[default]
    Vocabulary,
    Grammar,
    Reading,
    Listening,
    Writing,
    Speaking,
    Mixed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordSource {
    #[serde(rename = "AI Generated")]
    AiGenerated,
    #[default]
    Manual,
    Imported,
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordSource::AiGenerated => write!(f, "AI Generated"),
            RecordSource::Manual => write!(f, "Manual"),
            RecordSource::Imported => write!(f, "Imported"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabSnippet {
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarPoint {
    pub point: String,
    pub explanation: String,
    #[serde(default)]
    pub example: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub times_used: u32,
    pub correct_answers: u32,
    pub average_score: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl UsageStats {
    pub fn record(&mut self, is_correct: bool, score: f64, now: DateTime<Utc>) {
        let previous_total = self.average_score * self.times_used as f64;
        self.times_used += 1;
        if is_correct {
            self.correct_answers += 1;
        }
        self.average_score = (previous_total + score) / self.times_used as f64;
        self.last_used = Some(now);
    }

    pub fn accuracy(&self) -> u8 {
        if self.times_used == 0 {
            return 0;
        }
        (self.correct_answers as f64 / self.times_used as f64 * 100.0).round() as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub exercise_type: ExerciseType,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub vocabulary: Vec<VocabSnippet>,
    #[serde(default)]
    pub grammar: Vec<GrammarPoint>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub hsk_level: Option<u8>,
    pub category: ExerciseCategory,
    pub source: RecordSource,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub usage_stats: UsageStats,
    pub is_active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Exercise {
    pub fn new(
        title: impl Into<String>,
        exercise_type: ExerciseType,
        question: impl Into<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            title: title.into(),
            exercise_type,
            question: question.into(),
            options: Vec::new(),
            correct_answer: correct_answer.into(),
            explanation: None,
            vocabulary: Vec::new(),
            grammar: Vec::new(),
            difficulty: Difficulty::Medium,
            hsk_level: None,
            category: ExerciseCategory::Vocabulary,
            source: RecordSource::Manual,
            ai_model: None,
            session_id: None,
            user_id: None,
            usage_stats: UsageStats::default(),
            is_active: true,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
