//! Normalized content objects produced by the AI client
//!
//! Every field the model may omit is optional here; validation happens per
//! item in the pipeline so one bad item never rejects the whole result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    Difficulty, ExampleSentence, GrammarInfo, GrammarPoint, Related, VocabSnippet,
};
use crate::models::interaction::AiEndpoint;

fn non_empty(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabItem {
    #[serde(default)]
    pub hanzi: Option<String>,
    #[serde(default)]
    pub pinyin: Option<String>,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub examples: Vec<ExampleSentence>,
}

impl VocabItem {
    pub fn new(hanzi: &str, pinyin: &str, meaning: &str) -> Self {
        Self {
            hanzi: Some(hanzi.to_string()),
            pinyin: Some(pinyin.to_string()),
            meaning: Some(meaning.to_string()),
            ..Default::default()
        }
    }

    /// The three required fields, or the name of the first missing one
    pub fn snippet(&self) -> Result<VocabSnippet, &'static str> {
        Ok(VocabSnippet {
            hanzi: non_empty(&self.hanzi).ok_or("hanzi")?,
            pinyin: non_empty(&self.pinyin).ok_or("pinyin")?,
            meaning: non_empty(&self.meaning).ok_or("meaning")?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrammarItem {
    #[serde(default)]
    pub point: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
}

impl GrammarItem {
    pub fn to_point(&self) -> Option<GrammarPoint> {
        Some(GrammarPoint {
            point: non_empty(&self.point)?,
            explanation: non_empty(&self.explanation)?,
            example: non_empty(&self.example),
        })
    }
}

/// Result of `analyzeImage`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    #[serde(default)]
    pub vocabulary: Vec<VocabItem>,
    #[serde(default)]
    pub grammar: Vec<GrammarItem>,
    #[serde(default)]
    pub example_paragraph: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
}

/// One exercise as returned by `generateExercises`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedExercise {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub exercise_type: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub suggested_answer: Option<String>,
    #[serde(default)]
    pub vocabulary: Vec<VocabItem>,
    #[serde(default)]
    pub grammar: Vec<GrammarItem>,
}

impl GeneratedExercise {
    pub fn question(&self) -> Option<String> {
        non_empty(&self.question)
    }

    pub fn answer(&self) -> Option<String> {
        non_empty(&self.answer)
    }
}

/// `generateExercises` returns its list under either key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExerciseSet {
    #[serde(default, alias = "questions")]
    pub exercises: Vec<GeneratedExercise>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDetailFields {
    #[serde(default)]
    pub grammar: Option<GrammarInfo>,
    #[serde(default)]
    pub examples: Option<Vec<ExampleSentence>>,
    #[serde(default)]
    pub related: Option<Related>,
    #[serde(default)]
    pub hsk_level: Option<u8>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

/// Result of `analyzeWordDetails`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDetails {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub pinyin: Option<String>,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub details: Option<WordDetailFields>,
    #[serde(default)]
    pub examples: Vec<ExampleSentence>,
}

impl WordDetails {
    pub fn word(&self) -> Option<String> {
        non_empty(&self.word)
    }
}

/// Parsed content, one variant per AI endpoint
#[derive(Debug, Clone)]
pub enum AiContent {
    ImageAnalysis(ImageAnalysis),
    Exercises(ExerciseSet),
    WordDetails(WordDetails),
    /// Logged only; no auto-task consumes it
    Pronunciation(Value),
}

impl AiContent {
    /// Interpret a raw JSON result for the given endpoint
    pub fn parse(endpoint: AiEndpoint, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match endpoint {
            AiEndpoint::AnalyzeImage => AiContent::ImageAnalysis(serde_json::from_value(value)?),
            AiEndpoint::GenerateExercises => {
                // A bare array is accepted as the exercise list
                if value.is_array() {
                    AiContent::Exercises(ExerciseSet {
                        exercises: serde_json::from_value(value)?,
                    })
                } else {
                    AiContent::Exercises(serde_json::from_value(value)?)
                }
            }
            AiEndpoint::AnalyzeWordDetails => AiContent::WordDetails(serde_json::from_value(value)?),
            AiEndpoint::AnalyzePronunciation => AiContent::Pronunciation(value),
        })
    }

    pub fn endpoint(&self) -> AiEndpoint {
        match self {
            AiContent::ImageAnalysis(_) => AiEndpoint::AnalyzeImage,
            AiContent::Exercises(_) => AiEndpoint::GenerateExercises,
            AiContent::WordDetails(_) => AiEndpoint::AnalyzeWordDetails,
            AiContent::Pronunciation(_) => AiEndpoint::AnalyzePronunciation,
        }
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            AiContent::ImageAnalysis(c) => serde_json::to_value(c),
            AiContent::Exercises(c) => serde_json::to_value(c),
            AiContent::WordDetails(c) => serde_json::to_value(c),
            AiContent::Pronunciation(v) => return v.clone(),
        };
        value.unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vocab_snippet_reports_missing_field() {
        let item = VocabItem {
            hanzi: Some("书".into()),
            pinyin: Some("shū".into()),
            meaning: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(item.snippet().unwrap_err(), "meaning");
        assert!(VocabItem::new("书", "shū", "book").snippet().is_ok());
    }

    #[test]
    fn test_parse_image_analysis() {
        let content = AiContent::parse(
            AiEndpoint::AnalyzeImage,
            json!({
                "vocabulary": [{"hanzi": "猫", "pinyin": "māo", "meaning": "cat"}],
                "grammar": [{"point": "了", "explanation": "completed action"}],
                "exampleParagraph": "我有一只猫。"
            }),
        )
        .unwrap();
        match content {
            AiContent::ImageAnalysis(a) => {
                assert_eq!(a.vocabulary.len(), 1);
                assert_eq!(a.example_paragraph.as_deref(), Some("我有一只猫。"));
                assert!(a.grammar[0].to_point().is_some());
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_parse_exercises_accepts_questions_key_and_bare_array() {
        let keyed = AiContent::parse(
            AiEndpoint::GenerateExercises,
            json!({"questions": [{"question": "q", "answer": "a"}]}),
        )
        .unwrap();
        let bare = AiContent::parse(
            AiEndpoint::GenerateExercises,
            json!([{"question": "q", "answer": "a"}, {"question": "q2"}]),
        )
        .unwrap();
        match (keyed, bare) {
            (AiContent::Exercises(k), AiContent::Exercises(b)) => {
                assert_eq!(k.exercises.len(), 1);
                assert_eq!(b.exercises.len(), 2);
                assert!(b.exercises[1].answer().is_none());
            }
            _ => panic!("expected exercise sets"),
        }
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err = AiContent::parse(AiEndpoint::AnalyzeImage, json!({"vocabulary": "not a list"}));
        assert!(err.is_err());
    }
}
