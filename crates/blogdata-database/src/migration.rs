//! Database migration runner.

use sqlx::PgPool;
use tracing::{info, warn};

use blogdata_core::error::{AppError, ErrorKind};

/// Run all pending database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    info!("Running document store migrations...");

    let migrator = sqlx::migrate!("../../migrations");
    let known = migrator.iter().count();
    migrator.run(pool).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Storage,
            format!("Failed to run migrations: {e}"),
            e,
        )
        .in_operation("migrate")
    })?;

    info!(migrations = known, "Document store migrations completed");
    Ok(())
}

/// Drop the document store tables and the migration history, then run
/// every migration again. All stored documents are lost.
pub async fn reset_database(pool: &PgPool) -> Result<(), AppError> {
    warn!("Dropping document store tables");

    sqlx::raw_sql(
        "DROP TABLE IF EXISTS entity_references, entity_unique_keys, entity_records CASCADE; \
         DROP SEQUENCE IF EXISTS entity_id_seq; \
         DROP TABLE IF EXISTS _sqlx_migrations;",
    )
    .execute(pool)
    .await
    .map_err(|e| {
        AppError::with_source(
            ErrorKind::Storage,
            format!("Failed to drop document store tables: {e}"),
            e,
        )
        .in_operation("reset")
    })?;

    run_migrations(pool).await
}

/// One applied migration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    /// Migration version.
    pub version: i64,
    /// Migration description.
    pub description: String,
    /// Whether the migration completed.
    pub success: bool,
}

/// List applied migrations, oldest first.
pub async fn applied_migrations(pool: &PgPool) -> Result<Vec<AppliedMigration>, AppError> {
    sqlx::query_as::<_, AppliedMigration>(
        "SELECT version, description, success FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        AppError::with_source(ErrorKind::Storage, "Failed to read migration history", e)
            .in_operation("migrate_status")
    })
}
