//! PostgreSQL pool for the document store.
//!
//! Every pooled connection is tagged with the application name and, when
//! `database.query_timeout_seconds` is non-zero, a server-side
//! `statement_timeout` so a runaway scan is cut off by PostgreSQL as well as
//! by the unit of work's own deadline.

use std::time::Duration;

use serde_json::json;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use tracing::{debug, info};

use blogdata_core::config::DatabaseConfig;
use blogdata_core::error::{AppError, ErrorKind};
use blogdata_core::result::AppResult;

const APPLICATION_NAME: &str = "blogdata";

/// Snapshot returned by [`DatabasePool::health_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    /// `entity_records` exists, i.e. migrations have run.
    pub schema_ready: bool,
    /// Open connections.
    pub size: u32,
    /// Idle connections.
    pub idle: usize,
}

impl PoolHealth {
    /// Render as a JSON object for status output.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "schemaReady": self.schema_ready, "size": self.size, "idle": self.idle })
    }
}

/// Shared pool backing [`PgStore`](crate::PgStore) sessions and migrations.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open a pool sized and timed by `config`.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        if config.url.is_empty() {
            return Err(AppError::configuration(
                "database.url is required to open a PostgreSQL pool",
            ));
        }

        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            query_timeout_seconds = config.query_timeout_seconds,
            "Opening document store pool"
        );

        let statement_timeout = statement_timeout(config);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .after_connect(move |conn, _meta| {
                let timeout = statement_timeout.clone();
                Box::pin(async move { prepare_connection(conn, timeout.as_deref()).await })
            })
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to open document store pool: {e}"),
                    e,
                )
                .in_operation("connect")
            })?;

        Ok(Self { pool })
    }

    /// The underlying sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check connectivity and whether the document schema is in place.
    pub async fn health_check(&self) -> AppResult<PoolHealth> {
        let schema_ready: bool =
            sqlx::query_scalar("SELECT to_regclass('entity_records') IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Storage, "Health check failed", e)
                        .in_operation("health_check")
                })?;
        Ok(PoolHealth {
            schema_ready,
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        })
    }

    /// Close every connection; outstanding sessions finish first.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Document store pool closed");
    }
}

/// `statement_timeout` value for `config`, or `None` when disabled.
fn statement_timeout(config: &DatabaseConfig) -> Option<String> {
    (config.query_timeout_seconds > 0).then(|| format!("{}s", config.query_timeout_seconds))
}

async fn prepare_connection(
    conn: &mut PgConnection,
    statement_timeout: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config('application_name', $1, false)")
        .bind(APPLICATION_NAME)
        .execute(&mut *conn)
        .await?;
    if let Some(timeout) = statement_timeout {
        sqlx::query("SELECT set_config('statement_timeout', $1, false)")
            .bind(timeout)
            .execute(&mut *conn)
            .await?;
    }
    debug!(statement_timeout, "Pooled connection prepared");
    Ok(())
}

/// Hide the password of a connection URL before it is logged.
pub(crate) fn mask_password(url: &str) -> String {
    let Some(at) = url.rfind('@') else {
        return url.to_string();
    };
    let user_start = url.find("://").map_or(0, |p| p + 3);
    match url[user_start..at].find(':') {
        Some(colon) => format!("{}:****{}", &url[..user_start + colon], &url[at..]),
        None => url.to_string(),
    }
}
