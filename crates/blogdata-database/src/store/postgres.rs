//! PostgreSQL document store.
//!
//! Documents live in `entity_records` as JSONB. Unique keys and references
//! are mirrored into `entity_unique_keys` and `entity_references` so the
//! database enforces them inside the commit transaction.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::{Connection, Postgres};
use tracing::{debug, warn};

use blogdata_core::error::{AppError, ErrorKind};
use blogdata_core::result::AppResult;
use blogdata_core::traits::store::{
    Change, RecordPayload, Store, StoreSession, StoredRecord, UniqueKey,
};
use blogdata_core::types::id::EntityId;

use crate::connection::DatabasePool;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL-backed [`Store`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a store sharing the pool of `db`.
    pub fn from_database(db: &DatabasePool) -> Self {
        Self::new(db.pool().clone())
    }
}

#[async_trait]
impl Store for PgStore {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    async fn open_session(&self) -> AppResult<Box<dyn StoreSession>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| storage_error("open_session", e))?;
        Ok(Box::new(PgSession { conn: Some(conn) }))
    }
}

struct PgSession {
    conn: Option<PoolConnection<Postgres>>,
}

impl PgSession {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| AppError::disposed("PostgreSQL session is closed"))
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn load_all(&mut self, entity_type: &str) -> AppResult<Vec<StoredRecord>> {
        let rows: Vec<(i64, serde_json::Value)> = sqlx::query_as(
            "SELECT id, body FROM entity_records WHERE entity_type = $1 ORDER BY id",
        )
        .bind(entity_type)
        .fetch_all(self.conn()?)
        .await
        .map_err(|e| storage_error("load_all", e).for_entity_type(entity_type))?;

        Ok(rows
            .into_iter()
            .map(|(id, body)| StoredRecord {
                id: EntityId(id),
                body,
            })
            .collect())
    }

    async fn load_by_id(
        &mut self,
        entity_type: &str,
        id: EntityId,
    ) -> AppResult<Option<StoredRecord>> {
        let row: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT body FROM entity_records WHERE entity_type = $1 AND id = $2",
        )
        .bind(entity_type)
        .bind(id.0)
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| {
            storage_error("load_by_id", e)
                .for_entity_type(entity_type)
                .for_entity(id)
        })?;

        Ok(row.map(|body| StoredRecord { id, body }))
    }

    async fn next_id(&mut self, entity_type: &str) -> AppResult<EntityId> {
        sqlx::query_scalar::<_, i64>("SELECT nextval('entity_id_seq')")
            .fetch_one(self.conn()?)
            .await
            .map(EntityId)
            .map_err(|e| storage_error("next_id", e).for_entity_type(entity_type))
    }

    async fn commit(&mut self, changes: &[Change]) -> AppResult<()> {
        let conn = self.conn()?;
        let mut tx = conn.begin().await.map_err(|e| storage_error("commit", e))?;

        let outcome = match apply_changes(&mut tx, changes).await {
            Ok(()) => check_references(&mut tx).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                tx.commit().await.map_err(commit_error)?;
                debug!(changes = changes.len(), "PostgreSQL commit applied");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback after failed commit also failed");
                }
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        // Dropping the connection hands it back to the pool.
        self.conn.take();
        Ok(())
    }
}

async fn apply_changes(conn: &mut PgConnection, changes: &[Change]) -> AppResult<()> {
    for change in changes {
        match change {
            Change::Insert {
                entity_type,
                record,
            } => {
                sqlx::query(
                    "INSERT INTO entity_records (entity_type, id, body) VALUES ($1, $2, $3)",
                )
                .bind(entity_type)
                .bind(record.id.0)
                .bind(&record.body)
                .execute(&mut *conn)
                .await
                .map_err(|e| change_error(change, e))?;

                write_constraints(conn, change, record).await?;
            }
            Change::Update {
                entity_type,
                record,
            } => {
                let result = sqlx::query(
                    "UPDATE entity_records SET body = $3, updated_at = NOW() \
                     WHERE entity_type = $1 AND id = $2",
                )
                .bind(entity_type)
                .bind(record.id.0)
                .bind(&record.body)
                .execute(&mut *conn)
                .await
                .map_err(|e| change_error(change, e))?;
                if result.rows_affected() == 0 {
                    return Err(missing(change));
                }

                for table in ["entity_unique_keys", "entity_references"] {
                    sqlx::query(&format!(
                        "DELETE FROM {table} WHERE entity_type = $1 AND entity_id = $2"
                    ))
                    .bind(entity_type)
                    .bind(record.id.0)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| change_error(change, e))?;
                }

                write_constraints(conn, change, record).await?;
            }
            Change::Delete { entity_type, id } => {
                let result =
                    sqlx::query("DELETE FROM entity_records WHERE entity_type = $1 AND id = $2")
                        .bind(entity_type)
                        .bind(id.0)
                        .execute(&mut *conn)
                        .await
                        .map_err(|e| change_error(change, e))?;
                if result.rows_affected() == 0 {
                    return Err(missing(change));
                }
            }
        }
    }
    Ok(())
}

async fn write_constraints(
    conn: &mut PgConnection,
    change: &Change,
    record: &RecordPayload,
) -> AppResult<()> {
    let entity_type = change.entity_type();
    for key in &record.unique_keys {
        sqlx::query(
            "INSERT INTO entity_unique_keys (entity_type, key_name, key_value, entity_id) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entity_type)
        .bind(&key.name)
        .bind(&key.value)
        .bind(record.id.0)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_error(change, key, e))?;
    }

    for reference in &record.references {
        sqlx::query(
            "INSERT INTO entity_references (entity_type, entity_id, target_type, target_id) \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(entity_type)
        .bind(record.id.0)
        .bind(&reference.entity_type)
        .bind(reference.id.0)
        .execute(&mut *conn)
        .await
        .map_err(|e| change_error(change, e))?;
    }
    Ok(())
}

/// Find a reference whose target is gone, so the error can name the
/// referencing record instead of surfacing a bare deferred FK failure.
async fn check_references(conn: &mut PgConnection) -> AppResult<()> {
    let dangling: Option<(String, i64, String, i64)> = sqlx::query_as(
        "SELECT r.entity_type, r.entity_id, r.target_type, r.target_id \
         FROM entity_references r \
         LEFT JOIN entity_records t ON t.entity_type = r.target_type AND t.id = r.target_id \
         WHERE t.id IS NULL \
         ORDER BY r.entity_type, r.entity_id \
         LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| storage_error("commit", e))?;

    match dangling {
        Some((entity_type, entity_id, target_type, target_id)) => {
            Err(AppError::constraint_violation(
                &entity_type,
                EntityId(entity_id),
                format!("{entity_type} {entity_id} references missing {target_type} {target_id}"),
            )
            .in_operation("commit"))
        }
        None => Ok(()),
    }
}

fn storage_error(operation: &'static str, err: sqlx::Error) -> AppError {
    AppError::with_source(
        ErrorKind::Storage,
        format!("Document store {operation} failed: {err}"),
        err,
    )
    .in_operation(operation)
}

fn violation_code(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
        .filter(|code| code == UNIQUE_VIOLATION || code == FOREIGN_KEY_VIOLATION)
}

fn missing(change: &Change) -> AppError {
    AppError::not_found(format!(
        "{} {} does not exist",
        change.entity_type(),
        change.id()
    ))
    .for_entity_type(change.entity_type())
    .for_entity(change.id())
    .in_operation(change.op_name())
}

fn change_error(change: &Change, err: sqlx::Error) -> AppError {
    let kind = match violation_code(&err) {
        Some(_) => ErrorKind::ConstraintViolation,
        None => ErrorKind::Storage,
    };
    AppError::with_source(
        kind,
        format!(
            "Failed to {} {} {}: {err}",
            change.op_name(),
            change.entity_type(),
            change.id()
        ),
        err,
    )
    .for_entity_type(change.entity_type())
    .for_entity(change.id())
    .in_operation(change.op_name())
}

fn unique_error(change: &Change, key: &UniqueKey, err: sqlx::Error) -> AppError {
    if violation_code(&err).as_deref() == Some(UNIQUE_VIOLATION) {
        AppError::with_source(
            ErrorKind::ConstraintViolation,
            format!(
                "{} '{}' is already used by another {}",
                key.name,
                key.value,
                change.entity_type()
            ),
            err,
        )
        .for_entity_type(change.entity_type())
        .for_entity(change.id())
        .in_operation(change.op_name())
    } else {
        change_error(change, err)
    }
}

fn commit_error(err: sqlx::Error) -> AppError {
    match violation_code(&err) {
        Some(_) => AppError::with_source(
            ErrorKind::ConstraintViolation,
            format!("Commit rejected by a deferred constraint: {err}"),
            err,
        )
        .in_operation("commit"),
        None => storage_error("commit", err),
    }
}
