//! Auto-Task Pipeline
//!
//! Fans one AI result out into dictionary upserts, personal vocabulary,
//! exercises and a progress update. Every item is persisted on its own;
//! failures are counted and logged, never returned.

pub mod exercises;
pub mod worker;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::ai::content::{AiContent, ExerciseSet, ImageAnalysis, VocabItem, WordDetails};
use crate::models::{
    merge_tags, AiEndpoint, Difficulty, Exercise, ExerciseCategory, PersonalVocabularyEntry,
    RecordSource, VocabSnippet, VocabularyEntry,
};
use crate::progress::ProgressService;
use crate::store::Store;

pub use worker::{AutoTask, BackgroundJob, BackgroundWorker, WorkerHandle, WorkerStats};

/// Context attached to every record the pipeline creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetadata {
    #[serde(default)]
    pub user_id: Option<String>,
    pub session_id: String,
    pub ai_model: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub hsk_level: Option<u8>,
}

fn default_category() -> String {
    "Common".to_string()
}

impl PipelineMetadata {
    /// Tags and category each endpoint stamps on its records
    pub fn for_endpoint(
        endpoint: AiEndpoint,
        session_id: &str,
        ai_model: &str,
        user_id: Option<String>,
    ) -> Self {
        let (tags, category): (&[&str], &str) = match endpoint {
            AiEndpoint::AnalyzeImage => (&["AI Generated", "Image Analysis"], "Common"),
            AiEndpoint::GenerateExercises => (&["AI Generated", "Exercise Generation"], "Mixed"),
            AiEndpoint::AnalyzeWordDetails => (&["AI Generated", "Word Details Analysis"], "Vocabulary"),
            AiEndpoint::AnalyzePronunciation => (&["AI Generated", "Pronunciation"], "Speaking"),
        };
        Self {
            user_id,
            session_id: session_id.to_string(),
            ai_model: ai_model.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: category.to_string(),
            difficulty: Difficulty::Medium,
            hsk_level: None,
        }
    }

    /// The category as an exercise category, when it names one
    pub fn exercise_category(&self) -> Option<ExerciseCategory> {
        serde_json::from_value(Value::String(self.category.clone())).ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub created: u32,
    pub updated: u32,
    pub errors: u32,
}

impl ItemCounts {
    /// `Some(created)` on success, `None` on failure
    fn record(&mut self, outcome: Option<bool>) {
        match outcome {
            Some(true) => self.created += 1,
            Some(false) => self.updated += 1,
            None => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResults {
    pub vocabulary: ItemCounts,
    pub exercises: ItemCounts,
    pub personal_vocabulary: ItemCounts,
    pub user_progress: ItemCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTaskSummary {
    pub success: bool,
    pub endpoint: AiEndpoint,
    pub results: PipelineResults,
    /// Milliseconds
    pub processing_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct AutoTaskPipeline {
    store: Arc<dyn Store>,
    progress: Arc<ProgressService>,
}

impl AutoTaskPipeline {
    pub fn new(store: Arc<dyn Store>, progress: Arc<ProgressService>) -> Self {
        Self { store, progress }
    }

    /// Deserialize a raw AI result and process it; a shape mismatch is the
    /// only way the whole run fails
    pub async fn process_raw(&self, endpoint: AiEndpoint, value: Value, meta: &PipelineMetadata) -> AutoTaskSummary {
        match AiContent::parse(endpoint, value) {
            Ok(content) => self.process(&content, meta).await,
            Err(e) => {
                warn!("Auto-task input for {} has the wrong shape: {}", endpoint, e);
                AutoTaskSummary {
                    success: false,
                    endpoint,
                    results: PipelineResults::default(),
                    processing_time: 0,
                    error: Some(format!("invalid {} result: {}", endpoint, e)),
                }
            }
        }
    }

    pub async fn process(&self, content: &AiContent, meta: &PipelineMetadata) -> AutoTaskSummary {
        let started = Instant::now();
        let endpoint = content.endpoint();
        let outcome = match content {
            AiContent::ImageAnalysis(analysis) => Ok(self.process_image_analysis(analysis, meta).await),
            AiContent::Exercises(set) => Ok(self.process_generated_exercises(set, meta).await),
            AiContent::WordDetails(details) => self.process_word_details(details, meta).await,
            AiContent::Pronunciation(_) => Ok(PipelineResults::default()),
        };
        let processing_time = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(results) => {
                info!(
                    "Auto-task for {} finished in {}ms: vocabulary {:?}, exercises {:?}, personal {:?}",
                    endpoint, processing_time, results.vocabulary, results.exercises, results.personal_vocabulary
                );
                AutoTaskSummary {
                    success: true,
                    endpoint,
                    results,
                    processing_time,
                    error: None,
                }
            }
            Err(message) => {
                warn!("Auto-task for {} failed: {}", endpoint, message);
                AutoTaskSummary {
                    success: false,
                    endpoint,
                    results: PipelineResults::default(),
                    processing_time,
                    error: Some(message),
                }
            }
        }
    }

    pub async fn process_image_analysis(&self, analysis: &ImageAnalysis, meta: &PipelineMetadata) -> PipelineResults {
        let mut results = PipelineResults::default();
        let mut accepted: Vec<VocabSnippet> = Vec::new();

        for (index, item) in analysis.vocabulary.iter().enumerate() {
            let snippet = match item.snippet() {
                Ok(snippet) => snippet,
                Err(field) => {
                    warn!("Vocabulary item {} is missing {}, skipped", index + 1, field);
                    results.vocabulary.errors += 1;
                    continue;
                }
            };

            let global = self.upsert_vocabulary(&snippet, item, meta).await;
            if let Err(e) = &global {
                warn!("Failed to save vocabulary '{}': {:#}", snippet.hanzi, e);
            }
            results.vocabulary.record(global.as_ref().ok().map(|(_, created)| *created));

            if let Some(user_id) = &meta.user_id {
                let word_id = global.as_ref().ok().map(|(id, _)| id.as_str());
                let personal = self.upsert_personal(user_id, word_id, &snippet, meta).await;
                if let Err(e) = &personal {
                    warn!("Failed to save personal vocabulary '{}' for {}: {:#}", snippet.hanzi, user_id, e);
                }
                results.personal_vocabulary.record(personal.as_ref().ok().copied());
            }

            accepted.push(snippet);
        }

        for point in analysis.grammar.iter().filter_map(|g| g.to_point()) {
            let exercise = exercises::grammar_exercise(&point, meta);
            self.save_exercise(&exercise, &mut results.exercises).await;
        }

        let derived: Vec<Exercise> = {
            let mut rng = rand::rng();
            let choice = exercises::multiple_choice(&accepted, meta, &mut rng);
            let blank = analysis
                .example_paragraph
                .as_deref()
                .and_then(|p| exercises::fill_in_blank(p, &accepted, meta, &mut rng));
            choice.into_iter().chain(blank).collect()
        };
        for exercise in &derived {
            self.save_exercise(exercise, &mut results.exercises).await;
        }

        if let Some(user_id) = &meta.user_id {
            let update = self
                .progress
                .record_auto_task(user_id, results.personal_vocabulary.created, results.exercises.created)
                .await;
            match update {
                Ok(()) => results.user_progress.updated += 1,
                Err(e) => {
                    warn!("Failed to update progress for {} after auto-task: {}", user_id, e);
                    results.user_progress.errors += 1;
                }
            }
        }

        results
    }

    pub async fn process_generated_exercises(&self, set: &ExerciseSet, meta: &PipelineMetadata) -> PipelineResults {
        let mut results = PipelineResults::default();
        for (index, item) in set.exercises.iter().enumerate() {
            match exercises::generated_exercise(item, meta) {
                Some(exercise) => self.save_exercise(&exercise, &mut results.exercises).await,
                None => debug!("Generated exercise {} has no question or answer, skipped", index + 1),
            }
        }
        results
    }

    /// Enrich an existing dictionary entry and add one translation exercise per example
    pub async fn process_word_details(
        &self,
        details: &WordDetails,
        meta: &PipelineMetadata,
    ) -> std::result::Result<PipelineResults, String> {
        let word = details
            .word()
            .ok_or_else(|| "word details result has no word".to_string())?;
        let mut results = PipelineResults::default();

        if let Some(fields) = &details.details {
            match self.store.find_vocabulary_by_hanzi(&word).await {
                Ok(Some(mut entry)) => {
                    if let Some(grammar) = &fields.grammar {
                        entry.grammar = grammar.clone();
                    }
                    if let Some(examples) = &fields.examples {
                        entry.examples = examples.clone();
                    }
                    if let Some(related) = &fields.related {
                        entry.related = related.clone();
                    }
                    if fields.hsk_level.is_some() {
                        entry.hsk_level = fields.hsk_level;
                    }
                    if let Some(difficulty) = fields.difficulty {
                        entry.difficulty = difficulty;
                    }
                    entry.updated_at = Utc::now();
                    match self.store.save_vocabulary(&entry).await {
                        Ok(()) => results.vocabulary.updated += 1,
                        Err(e) => {
                            warn!("Failed to save details for '{}': {:#}", word, e);
                            results.vocabulary.errors += 1;
                        }
                    }
                }
                Ok(None) => {
                    warn!("No dictionary entry for '{}', details not stored", word);
                    results.vocabulary.errors += 1;
                }
                Err(e) => {
                    warn!("Failed to look up '{}': {:#}", word, e);
                    results.vocabulary.errors += 1;
                }
            }
        }

        let snippet = VocabSnippet {
            hanzi: word.clone(),
            pinyin: details.pinyin.clone().unwrap_or_default(),
            meaning: details.meaning.clone().unwrap_or_default(),
        };
        for example in &details.examples {
            if let Some(exercise) = exercises::sentence_exercise(&snippet, example, meta) {
                self.save_exercise(&exercise, &mut results.exercises).await;
            }
        }

        Ok(results)
    }

    async fn save_exercise(&self, exercise: &Exercise, counts: &mut ItemCounts) {
        match self.store.save_exercise(exercise).await {
            Ok(()) => counts.created += 1,
            Err(e) => {
                warn!("Failed to save exercise '{}': {:#}", exercise.title, e);
                counts.errors += 1;
            }
        }
    }

    /// Returns the entry id and whether it was created
    async fn upsert_vocabulary(
        &self,
        snippet: &VocabSnippet,
        item: &VocabItem,
        meta: &PipelineMetadata,
    ) -> Result<(String, bool)> {
        if let Some(mut entry) = self.store.find_vocabulary_by_hanzi(&snippet.hanzi).await? {
            entry.pinyin = snippet.pinyin.clone();
            entry.meaning.primary = snippet.meaning.clone();
            merge_tags(&mut entry.tags, &meta.tags);
            entry.updated_at = Utc::now();
            self.store.save_vocabulary(&entry).await?;
            return Ok((entry.id, false));
        }

        let mut entry = VocabularyEntry::new(&snippet.hanzi, &snippet.pinyin, &snippet.meaning);
        entry.meaning.part_of_speech = item.part_of_speech.clone();
        entry.examples = item.examples.clone();
        entry.category = meta.category.clone();
        entry.difficulty = meta.difficulty;
        entry.hsk_level = meta.hsk_level;
        if meta.tags.is_empty() {
            entry.tags = vec![RecordSource::AiGenerated.to_string()];
        } else {
            merge_tags(&mut entry.tags, &meta.tags);
        }
        entry.source = RecordSource::AiGenerated.to_string();
        entry.ai_model = Some(meta.ai_model.clone());
        entry.session_id = Some(meta.session_id.clone());
        self.store.save_vocabulary(&entry).await?;
        Ok((entry.id, true))
    }

    /// Keyed by (user, hanzi); true when created
    async fn upsert_personal(
        &self,
        user_id: &str,
        word_id: Option<&str>,
        snippet: &VocabSnippet,
        meta: &PipelineMetadata,
    ) -> Result<bool> {
        let now = Utc::now();
        if let Some(mut entry) = self.store.find_personal_by_hanzi(user_id, &snippet.hanzi).await? {
            entry.pinyin = snippet.pinyin.clone();
            entry.meaning = snippet.meaning.clone();
            merge_tags(&mut entry.tags, &meta.tags);
            if entry.word_id.is_none() {
                entry.word_id = word_id.map(str::to_string);
            }
            entry.updated_at = now;
            self.store.save_personal(&entry).await?;
            return Ok(false);
        }

        let mut entry = PersonalVocabularyEntry::new(user_id, &snippet.hanzi, &snippet.pinyin, &snippet.meaning, now);
        entry.word_id = word_id.map(str::to_string);
        merge_tags(&mut entry.tags, &meta.tags);
        entry.notes = format!("Added automatically from session {} on {}", meta.session_id, now.format("%Y-%m-%d"));
        self.store.save_personal(&entry).await?;
        Ok(true)
    }
}
