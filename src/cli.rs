//! CLI interface for hanzi-tutor

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::ai::InteractionLogger;
use crate::config::{self, Config};
use crate::models::{AiEndpoint, User};
use crate::pipeline::{AutoTaskPipeline, PipelineMetadata};
use crate::progress::ProgressService;
use crate::store::{InteractionFilter, SqliteStore, Store};
use crate::study::StudyService;

#[derive(Parser)]
#[command(name = "hanzi-tutor")]
#[command(about = "Chinese vocabulary study backend with spaced repetition and AI-assisted content", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
    },
    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write a default config file
        #[arg(long)]
        init: bool,
        /// Overwrite an existing file with --init
        #[arg(long)]
        force: bool,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Show a user's progress
    Progress {
        /// User ID
        user: String,
    },
    /// Show words due for review and today's schedule
    Review {
        /// User ID
        user: String,
        /// Maximum due words to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Run the auto-task pipeline on a saved AI result (JSON file)
    Import {
        /// AI endpoint the result came from (analyzeImage, generateExercises, analyzeWordDetails)
        endpoint: String,
        /// Path to the JSON result
        file: PathBuf,
        /// Session ID recorded on created items
        #[arg(short, long, default_value = "cli")]
        session: String,
        /// User whose personal vocabulary receives new words
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List logged AI interactions
    Interactions {
        /// Filter by session
        #[arg(long)]
        session: Option<String>,
        /// Filter by user
        #[arg(long)]
        user: Option<String>,
        /// Maximum entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Show aggregate statistics instead of entries
        #[arg(long)]
        stats: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Create {
        /// Unique username
        username: String,
    },
    /// List users
    List {
        /// Maximum users to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            crate::server::start(config).await?;
        }
        Commands::Config { show, init, force } => {
            let path = match cli.config {
                Some(path) => path,
                None => config::config_path()?,
            };
            if init {
                if path.exists() && !force {
                    println!("Config already exists at {} (use --force to overwrite)", path.display());
                } else {
                    Config::default().save_to(&path)?;
                    println!("✓ Wrote default config to {}", path.display());
                }
            } else if show {
                println!("# {}", path.display());
                println!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            } else {
                println!("Configuration options:");
                println!("  --show          Display current configuration");
                println!("  --init          Write a default config file");
                println!();
                println!("Defaults:");
                println!("{}", config::default_config_toml());
            }
        }
        Commands::User { command } => {
            let store = open_store(&config).await?;
            match command {
                UserCommands::Create { username } => {
                    let username = username.trim();
                    if store.find_user_by_username(username).await?.is_some() {
                        anyhow::bail!("username '{}' is taken", username);
                    }
                    let user = User::new(username);
                    store.create_user(&user).await?;
                    println!("✓ Created user {} ({})", user.username, user.id);
                }
                UserCommands::List { limit } => {
                    let users = store.list_users(limit).await?;
                    if users.is_empty() {
                        println!("No users yet.");
                    }
                    for user in users {
                        println!("{}  {}  (since {})", user.id, user.username, user.created_at.format("%Y-%m-%d"));
                    }
                }
            }
        }
        Commands::Progress { user } => {
            let store = open_store(&config).await?;
            let progress = ProgressService::new(store, config.rewards.clone());
            let snapshot = progress.get_progress(&user).await?;
            let p = &snapshot.progress;
            println!("Progress for {}", user);
            println!("  Level:        {} ({}% to next, {} XP needed)", p.current_level, snapshot.level_progress, snapshot.xp_for_next_level);
            println!("  Experience:   {} ({} total)", p.experience_points, p.total_experience);
            println!("  Words:        {} ({} mastered, {}%)", p.total_words, p.mastered_words, snapshot.completion_rate);
            println!("  Streak:       {} days (longest {})", p.learning_streak, p.longest_streak);
            println!("  Achievements: {}", p.achievements.len());
            for achievement in &p.achievements {
                println!("    {} {}", achievement.icon, achievement.name);
            }
        }
        Commands::Review { user, limit } => {
            let store = open_store(&config).await?;
            let progress = Arc::new(ProgressService::new(store.clone(), config.rewards.clone()));
            let study = StudyService::new(store, progress);

            let now = Utc::now();
            let due = study.due_for_review(&user, limit, now).await?;
            println!("Due for review: {}", due.len());
            for entry in &due {
                println!(
                    "  {}  {}  {}  (level {}, {:?} priority)",
                    entry.hanzi, entry.pinyin, entry.meaning, entry.mastery_level, entry.priority
                );
            }

            let schedule = study.review_schedule(&user, now.date_naive()).await?;
            println!();
            println!("Schedule for {}:", schedule.date);
            println!("  To review:    {}", schedule.words_to_review.len());
            println!("  New:          {}", schedule.new_words.len());
            println!("  Near mastery: {}", schedule.mastery_words.len());
        }
        Commands::Import { endpoint, file, session, user } => {
            let endpoint: AiEndpoint = endpoint.parse().map_err(anyhow::Error::msg)?;
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let value = crate::ai::backend::parse_model_json(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;

            let store = open_store(&config).await?;
            let progress = Arc::new(ProgressService::new(store.clone(), config.rewards.clone()));
            let pipeline = AutoTaskPipeline::new(store, progress);
            let meta = PipelineMetadata::for_endpoint(endpoint, &session, &config.ai.model, user);

            let summary = pipeline.process_raw(endpoint, value, &meta).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.success {
                anyhow::bail!(summary.error.unwrap_or_else(|| "auto-task failed".to_string()));
            }
        }
        Commands::Interactions { session, user, limit, stats } => {
            let store = open_store(&config).await?;
            let logger = InteractionLogger::new(store);
            let filter = InteractionFilter {
                session_id: session,
                user_id: user,
                ..Default::default()
            };
            if stats {
                let stats = logger.stats(&filter).await?;
                println!("Calls:    {} ({} ok, {} failed)", stats.total_calls, stats.success_calls, stats.error_calls);
                println!("Average:  {:.0}ms", stats.avg_response_time);
            } else {
                for log in logger.list(&filter, limit).await? {
                    println!(
                        "{}  {}  {:<22} {:<8} {}ms  session={}",
                        log.request_timestamp.format("%Y-%m-%d %H:%M:%S"),
                        log.id,
                        log.endpoint.as_str(),
                        log.status.as_str(),
                        log.response_time,
                        log.session_id
                    );
                }
            }
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let store = SqliteStore::new(&config.database.path).await?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import_command() {
        let cli = Cli::try_parse_from(["hanzi-tutor", "import", "analyzeImage", "result.json", "--user", "u1"]).unwrap();
        match cli.command {
            Commands::Import { endpoint, session, user, .. } => {
                assert_eq!(endpoint, "analyzeImage");
                assert_eq!(session, "cli");
                assert_eq!(user.as_deref(), Some("u1"));
            }
            _ => panic!("expected import"),
        }
    }
}
