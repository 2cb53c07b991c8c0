//! Exercise derivation from AI content
//!
//! Pure builders; persistence and counting stay in the pipeline. Builders
//! that pick a random target take the RNG as a parameter.

use rand::seq::SliceRandom;
use rand::Rng;

use super::PipelineMetadata;
use crate::ai::content::GeneratedExercise;
use crate::models::{
    merge_tags, ExampleSentence, Exercise, ExerciseCategory, ExerciseType, GrammarPoint,
    RecordSource, VocabSnippet,
};

pub const BLANK: &str = "_____";
const MAX_OPTIONS: usize = 4;

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

/// Provenance shared by every pipeline-created exercise
fn stamp(mut exercise: Exercise, meta: &PipelineMetadata, category: ExerciseCategory, extra_tags: &[String]) -> Exercise {
    exercise.category = category;
    exercise.difficulty = meta.difficulty;
    exercise.hsk_level = meta.hsk_level;
    exercise.source = RecordSource::AiGenerated;
    exercise.ai_model = Some(meta.ai_model.clone());
    exercise.session_id = Some(meta.session_id.clone());
    exercise.user_id = meta.user_id.clone();
    merge_tags(&mut exercise.tags, extra_tags);
    exercise
}

pub fn grammar_exercise(point: &GrammarPoint, meta: &PipelineMetadata) -> Exercise {
    let mut exercise = Exercise::new(
        format!("Grammar: {}", point.point),
        ExerciseType::Grammar,
        format!("Explain the grammar point: {}", point.point),
        point.explanation.clone(),
    );
    exercise.explanation = Some(point.explanation.clone());
    exercise.grammar = vec![point.clone()];
    stamp(
        exercise,
        meta,
        ExerciseCategory::Grammar,
        &tags(&["grammar", "AI Generated", "Image Analysis"]),
    )
}

/// Meaning question over one random word; needs at least two words
pub fn multiple_choice<R: Rng>(
    vocabulary: &[VocabSnippet],
    meta: &PipelineMetadata,
    rng: &mut R,
) -> Option<Exercise> {
    if vocabulary.len() < 2 {
        return None;
    }
    let target = &vocabulary[rng.random_range(0..vocabulary.len())];

    let mut others: Vec<&VocabSnippet> = vocabulary.iter().filter(|v| v.hanzi != target.hanzi).collect();
    others.shuffle(rng);

    let mut options = vec![target.meaning.clone()];
    for other in others {
        if options.len() == MAX_OPTIONS {
            break;
        }
        if !options.contains(&other.meaning) {
            options.push(other.meaning.clone());
        }
    }
    options.shuffle(rng);

    let mut exercise = Exercise::new(
        format!("Vocabulary: {}", target.hanzi),
        ExerciseType::MultipleChoice,
        format!("What does \"{}\" ({}) mean?", target.hanzi, target.pinyin),
        target.meaning.clone(),
    );
    exercise.options = options;
    exercise.explanation = Some(format!("\"{}\" means \"{}\"", target.hanzi, target.meaning));
    exercise.vocabulary = vec![target.clone()];
    Some(stamp(
        exercise,
        meta,
        ExerciseCategory::Vocabulary,
        &tags(&["vocabulary", "multiple-choice", "AI Generated", "Image Analysis"]),
    ))
}

/// Blank out every occurrence of one random word in the paragraph
pub fn fill_in_blank<R: Rng>(
    paragraph: &str,
    vocabulary: &[VocabSnippet],
    meta: &PipelineMetadata,
    rng: &mut R,
) -> Option<Exercise> {
    let paragraph = paragraph.trim();
    if paragraph.is_empty() || vocabulary.is_empty() {
        return None;
    }
    let target = &vocabulary[rng.random_range(0..vocabulary.len())];
    let blanked = paragraph.replace(target.hanzi.as_str(), BLANK);

    let mut exercise = Exercise::new(
        format!("Fill in the blank: {}", target.hanzi),
        ExerciseType::FillInTheBlank,
        format!("Fill in the missing word:\n\n{}", blanked),
        target.hanzi.clone(),
    );
    exercise.explanation = Some(format!(
        "The missing word is \"{}\", meaning \"{}\"",
        target.hanzi, target.meaning
    ));
    exercise.vocabulary = vec![target.clone()];
    Some(stamp(
        exercise,
        meta,
        ExerciseCategory::Reading,
        &tags(&["fill-blank", "reading", "AI Generated", "Image Analysis"]),
    ))
}

/// Persistable form of a model-generated exercise, None without question and answer
pub fn generated_exercise(item: &GeneratedExercise, meta: &PipelineMetadata) -> Option<Exercise> {
    let question = item.question()?;
    let answer = item.answer()?;

    let title = item
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let head: String = question.chars().take(50).collect();
            format!("Exercise: {}...", head)
        });
    let exercise_type = item
        .exercise_type
        .as_deref()
        .and_then(|t| t.parse::<ExerciseType>().ok())
        .unwrap_or(ExerciseType::MultipleChoice);

    let mut exercise = Exercise::new(title, exercise_type, question, answer);
    exercise.options = item.options.clone();
    exercise.explanation = item
        .explanation
        .clone()
        .or_else(|| item.suggested_answer.clone())
        .filter(|e| !e.trim().is_empty());
    exercise.vocabulary = item.vocabulary.iter().filter_map(|v| v.snippet().ok()).collect();
    exercise.grammar = item.grammar.iter().filter_map(|g| g.to_point()).collect();

    let category = meta.exercise_category().unwrap_or(ExerciseCategory::Mixed);
    let mut extra = meta.tags.clone();
    extra.extend(tags(&["AI Generated", "Exercise Generation"]));
    Some(stamp(exercise, meta, category, &extra))
}

/// Translation exercise for one example sentence of an analysed word
pub fn sentence_exercise(word: &VocabSnippet, example: &ExampleSentence, meta: &PipelineMetadata) -> Option<Exercise> {
    let chinese = example.chinese.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let translation = example.translation.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

    let mut exercise = Exercise::new(
        format!("Usage example: {}", word.hanzi),
        ExerciseType::SentenceBuilding,
        format!("Translate the sentence:\n\n{}", chinese),
        translation,
    );
    exercise.explanation = Some(format!("The sentence means: \"{}\"", translation));
    exercise.vocabulary = vec![word.clone()];
    Some(stamp(
        exercise,
        meta,
        ExerciseCategory::Reading,
        &tags(&["sentence-building", "reading", "AI Generated", "Word Details"]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::content::{GeneratedExercise, VocabItem};
    use crate::models::AiEndpoint;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn meta() -> PipelineMetadata {
        PipelineMetadata::for_endpoint(AiEndpoint::AnalyzeImage, "s1", "gemini-2.5-flash", Some("u1".into()))
    }

    fn words() -> Vec<VocabSnippet> {
        [("猫", "māo", "cat"), ("狗", "gǒu", "dog"), ("鸟", "niǎo", "bird"), ("鱼", "yú", "fish"), ("马", "mǎ", "horse")]
            .iter()
            .map(|(h, p, m)| VocabItem::new(h, p, m).snippet().unwrap())
            .collect()
    }

    #[test]
    fn test_multiple_choice_options() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let exercise = multiple_choice(&words(), &meta(), &mut rng).unwrap();
            assert_eq!(exercise.options.len(), 4);
            assert!(exercise.options.contains(&exercise.correct_answer));
            let mut unique = exercise.options.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 4);
            assert_eq!(exercise.category, ExerciseCategory::Vocabulary);
            assert_eq!(exercise.source, RecordSource::AiGenerated);
        }
        assert!(multiple_choice(&words()[..1], &meta(), &mut rng).is_none());
    }

    #[test]
    fn test_multiple_choice_with_few_words() {
        let mut rng = StdRng::seed_from_u64(1);
        let exercise = multiple_choice(&words()[..2], &meta(), &mut rng).unwrap();
        assert_eq!(exercise.options.len(), 2);
    }

    #[test]
    fn test_fill_in_blank_replaces_every_occurrence() {
        let mut rng = StdRng::seed_from_u64(3);
        let vocab = vec![VocabItem::new("猫", "māo", "cat").snippet().unwrap()];
        let exercise = fill_in_blank("我的猫很小，猫喜欢鱼。", &vocab, &meta(), &mut rng).unwrap();
        assert!(exercise.question.ends_with("我的_____很小，_____喜欢鱼。"));
        assert_eq!(exercise.correct_answer, "猫");
        assert_eq!(exercise.exercise_type, ExerciseType::FillInTheBlank);
        assert_eq!(exercise.category, ExerciseCategory::Reading);

        assert!(fill_in_blank("  ", &vocab, &meta(), &mut rng).is_none());
        assert!(fill_in_blank("我的猫", &[], &meta(), &mut rng).is_none());
    }

    #[test]
    fn test_generated_exercise_defaults() {
        let item = GeneratedExercise {
            question: Some("用\"因为\"造句".into()),
            answer: Some("因为下雨，我没去。".into()),
            suggested_answer: Some("Use 因为 ... 所以".into()),
            exercise_type: Some("not-a-type".into()),
            ..Default::default()
        };
        let mut meta = PipelineMetadata::for_endpoint(AiEndpoint::GenerateExercises, "s1", "m", None);
        meta.tags.push("unit-4".into());

        let exercise = generated_exercise(&item, &meta).unwrap();
        assert_eq!(exercise.title, "Exercise: 用\"因为\"造句...");
        assert_eq!(exercise.exercise_type, ExerciseType::MultipleChoice);
        assert_eq!(exercise.explanation.as_deref(), Some("Use 因为 ... 所以"));
        assert_eq!(exercise.category, ExerciseCategory::Mixed);
        assert!(exercise.tags.contains(&"unit-4".to_string()));
        assert!(exercise.tags.contains(&"Exercise Generation".to_string()));

        let missing = GeneratedExercise {
            question: Some("?".into()),
            ..Default::default()
        };
        assert!(generated_exercise(&missing, &meta).is_none());
    }

    #[test]
    fn test_sentence_exercise_requires_both_sides() {
        let word = VocabItem::new("学习", "xuéxí", "to study").snippet().unwrap();
        let full = ExampleSentence {
            chinese: Some("我每天学习中文。".into()),
            pinyin: None,
            translation: Some("I study Chinese every day.".into()),
        };
        let exercise = sentence_exercise(&word, &full, &meta()).unwrap();
        assert_eq!(exercise.exercise_type, ExerciseType::SentenceBuilding);
        assert_eq!(exercise.correct_answer, "I study Chinese every day.");
        assert_eq!(exercise.vocabulary[0].hanzi, "学习");

        let half = ExampleSentence {
            translation: None,
            ..full
        };
        assert!(sentence_exercise(&word, &half, &meta()).is_none());
    }
}
