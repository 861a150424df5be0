//! CLI command definitions and dispatch.

pub mod migrate;
pub mod search;
pub mod seed;

use clap::{Parser, Subcommand};

use blogdata_core::config::{AppConfig, StoreDriver};
use blogdata_core::error::AppError;
use blogdata_database::DatabasePool;

use crate::output::OutputFormat;

/// BlogData: specification-driven data access for a blog
#[derive(Debug, Parser)]
#[command(name = "blogdata", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (extension optional)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay, loaded from `config/{env}`
    #[arg(short, long)]
    pub env: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Insert demo users, tags, posts and comments
    Seed(seed::SeedArgs),
    /// Search and page one entity table
    Search(search::SearchArgs),
}

impl Cli {
    /// Load configuration named by `--config` and `--env`.
    pub fn load_config(&self) -> Result<AppConfig, AppError> {
        AppConfig::load(&self.config, self.env.as_deref())
    }

    /// Execute the CLI command
    pub async fn execute(&self, config: &AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, config, self.format).await,
            Commands::Seed(args) => seed::execute(args, config, self.format).await,
            Commands::Search(args) => search::execute(args, config, self.format).await,
        }
    }
}

/// Helper: connect to PostgreSQL, rejecting the memory driver.
pub async fn connect_postgres(config: &AppConfig) -> Result<DatabasePool, AppError> {
    if config.database.driver != StoreDriver::Postgres {
        return Err(AppError::configuration(
            "This command needs database.driver = \"postgres\"",
        ));
    }
    DatabasePool::connect(&config.database).await
}
