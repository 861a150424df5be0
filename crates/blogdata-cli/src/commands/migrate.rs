//! Database migration management commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use blogdata_core::config::AppConfig;
use blogdata_core::error::AppError;
use blogdata_database::migration;

use crate::output::{self, OutputFormat};

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Show applied migrations
    Status,
    /// Drop the document store and re-run every migration
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct MigrationRow {
    version: i64,
    description: String,
    success: bool,
}

/// Execute migration commands
pub async fn execute(
    args: &MigrateArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::connect_postgres(config).await?;

    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            migration::run_migrations(db.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Status => {
            let rows: Vec<MigrationRow> = migration::applied_migrations(db.pool())
                .await?
                .into_iter()
                .map(|m| MigrationRow {
                    version: m.version,
                    description: m.description,
                    success: m.success,
                })
                .collect();
            let health = db.health_check().await?;
            match format {
                OutputFormat::Table => {
                    output::print_kv("Schema ready", &health.schema_ready.to_string());
                    output::print_kv("Pool connections", &format!("{} ({} idle)", health.size, health.idle));
                    output::print_list(&rows, format);
                }
                OutputFormat::Json => {
                    let status = serde_json::json!({ "health": health.to_json(), "migrations": rows });
                    println!("{}", serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string()));
                }
            }
        }
        MigrateCommand::Reset { force } => {
            if !force {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt("This will DROP every stored document and re-run migrations. Continue?")
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::configuration(format!("Input error: {e}")))?;

                if !confirm {
                    println!("Cancelled.");
                    db.close().await;
                    return Ok(());
                }
            }

            println!("Resetting database...");
            migration::reset_database(db.pool()).await?;
            output::print_success("Database reset complete.");
        }
    }

    db.close().await;
    Ok(())
}
