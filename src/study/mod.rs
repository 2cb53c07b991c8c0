//! Spaced repetition and mastery for personal vocabulary

pub mod mastery;
pub mod scheduler;
pub mod service;

pub use mastery::{classify, Mastery};
pub use scheduler::record_study_outcome;
pub use service::{
    AddWordRequest, ReviewSchedule, StudyOutcome, StudyResultSummary, StudyService, WordFilter,
    WordPage, WordUpdate,
};
