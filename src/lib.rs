//! Hanzi Tutor - Chinese vocabulary study backend
//!
//! Provides:
//! - Personal vocabulary with spaced-repetition scheduling and mastery tiers
//! - A per-user progress ledger (experience, levels, streaks, achievements)
//! - An auto-task pipeline that turns AI results into dictionary entries and exercises
//! - Logging of every generative-AI call
//!
//! # Example
//!
//! ```ignore
//! use hanzi_tutor::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     hanzi_tutor::start_server(config).await
//! }
//! ```

pub mod models;
pub mod error;
pub mod config;
pub mod store;
pub mod progress;
pub mod study;
pub mod ai;
pub mod pipeline;
pub mod server;
pub mod cli;

pub use config::Config;
pub use error::{StudyError, StudyResult};
pub use store::{SqliteStore, Store};
pub use study::StudyService;
pub use progress::ProgressService;
pub use pipeline::AutoTaskPipeline;
pub use ai::{AiGateway, InteractionLogger};
pub use server::{AppState, router, start as start_server};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Chinese vocabulary study backend", NAME, VERSION)
}
