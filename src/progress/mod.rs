//! Progress Ledger
//!
//! XP and levels, learning streaks, bounded daily/weekly rollups and
//! one-way achievement unlocks for each user.

pub mod history;
pub mod ledger;
pub mod service;
pub mod week;

pub use ledger::{level_threshold, Activity};
pub use service::{ProgressService, ProgressSnapshot, ProgressUpdate, StudyEvent};
pub use week::iso_week_key;
