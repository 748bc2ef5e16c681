//! PostgreSQL store using sqlx.
//!
//! Each record lives in its own table (see `migrations/`). Rows are read back
//! as `to_jsonb(t)` documents and deserialized into the record type, so the
//! column tables generated by `impl_record!` are the only mapping.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! fleet-rs = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Natural keys
//!
//! Every natural key is a partial unique index `WHERE status <> 'DELETE'`
//! named as [`Record::constraint_name`] returns. A violation surfaces as
//! [`StoreError::Conflict`] carrying the index name.

use crate::core::condition::{Changes, Condition, SqlArgs};
use crate::core::entity::{Column, Entity, Record, Status};
use crate::core::error::{AppError, Result, StoreError};
use crate::core::field::{FieldKind, FieldValue};
use crate::core::specification::SelectQuery;
use crate::core::store::{Repository, Store, UnitOfWork};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

const BACKEND: &str = "postgres";

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Store backed by a PostgreSQL pool
///
/// # Example
///
/// ```rust,ignore
/// let store = PgStore::connect(&config.database_url(), 10, Duration::from_secs(30)).await?;
/// store.migrate().await?;
/// ```
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .map_err(|e| AppError::from(StoreError::backend(BACKEND, e)))?;
        tracing::info!(max_connections, "connected to postgres");
        Ok(Self::new(pool, timeout))
    }

    /// Apply the bundled migrations (idempotent)
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::from(StoreError::backend(BACKEND, e)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Session = PgSession;
    type Tx = PgTx;

    async fn session(&self) -> Result<PgSession> {
        let conn = timed(self.timeout, async {
            self.pool.acquire().await.map_err(backend_error)
        })
        .await?;
        Ok(PgSession {
            conn,
            timeout: self.timeout,
        })
    }

    async fn begin(&self) -> Result<PgTx> {
        let tx = timed(self.timeout, async {
            self.pool.begin().await.map_err(backend_error)
        })
        .await?;
        Ok(PgTx {
            tx,
            timeout: self.timeout,
        })
    }
}

/// Autocommit connection
pub struct PgSession {
    conn: PoolConnection<Postgres>,
    timeout: Duration,
}

impl PgSession {
    fn connection(&mut self) -> (&mut PgConnection, Duration) {
        (&mut *self.conn, self.timeout)
    }
}

/// Open database transaction; dropping it rolls back
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
    timeout: Duration,
}

impl PgTx {
    fn connection(&mut self) -> (&mut PgConnection, Duration) {
        (&mut *self.tx, self.timeout)
    }
}

#[async_trait]
impl UnitOfWork for PgTx {
    async fn commit(self) -> Result<()> {
        let Self { tx, timeout } = self;
        timed(timeout, async move { tx.commit().await.map_err(backend_error) }).await
    }

    async fn rollback(self) -> Result<()> {
        let Self { tx, timeout } = self;
        timed(timeout, async move { tx.rollback().await.map_err(backend_error) }).await
    }
}

macro_rules! pg_repository {
    ($handle:ty) => {
        #[async_trait]
        impl Repository for $handle {
            async fn find<E: Record>(&mut self, conditions: &[Condition<E::Column>]) -> Result<E> {
                let (conn, timeout) = self.connection();
                timed(timeout, find_one::<E>(conn, conditions)).await
            }

            async fn list<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<Vec<E>> {
                let (conn, timeout) = self.connection();
                timed(timeout, select::<E>(conn, query)).await
            }

            async fn count<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<u64> {
                let (conn, timeout) = self.connection();
                timed(timeout, count::<E>(conn, query)).await
            }

            async fn insert<E: Record>(&mut self, record: &mut E) -> Result<()> {
                let (conn, timeout) = self.connection();
                timed(timeout, insert::<E>(conn, std::slice::from_mut(record))).await
            }

            async fn insert_batch<E: Record>(&mut self, records: &mut [E]) -> Result<()> {
                if records.is_empty() {
                    return Ok(());
                }
                let (conn, timeout) = self.connection();
                timed(timeout, insert::<E>(conn, records)).await
            }

            async fn update<E: Record>(
                &mut self,
                id: Uuid,
                changes: &Changes<E::Column>,
            ) -> Result<E> {
                let (conn, timeout) = self.connection();
                timed(timeout, update::<E>(conn, id, changes)).await
            }

            async fn soft_delete<E: Record>(&mut self, id: Uuid, updated_by: &str) -> Result<()> {
                let changes = Changes::new()
                    .set(E::Column::STATUS, Status::Delete)
                    .set(E::Column::UPDATED_BY, updated_by);
                let (conn, timeout) = self.connection();
                timed(timeout, update::<E>(conn, id, &changes)).await.map(|_| ())
            }

            async fn delete_where<E: Record>(
                &mut self,
                conditions: &[Condition<E::Column>],
            ) -> Result<u64> {
                let (conn, timeout) = self.connection();
                timed(timeout, delete_where::<E>(conn, conditions)).await
            }
        }
    };
}

pg_repository!(PgSession);
pg_repository!(PgTx);

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

async fn find_one<E: Record>(
    conn: &mut PgConnection,
    conditions: &[Condition<E::Column>],
) -> Result<E> {
    let query = SelectQuery::with_conditions(conditions.to_vec()).paginate(1, 0);
    select::<E>(conn, &query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_exist(E::ENTITY_NAME))
}

async fn select<E: Record>(conn: &mut PgConnection, query: &SelectQuery<E::Column>) -> Result<Vec<E>> {
    let mut args = SqlArgs::new();
    let sql = query.select_sql(E::TABLE, &mut args);
    tracing::debug!(%sql, params = args.len(), "select");

    let rows = bind_all(sqlx::query(&sql), args)
        .fetch_all(&mut *conn)
        .await
        .map_err(backend_error)?;

    rows.iter()
        .map(|row| {
            let doc: serde_json::Value = row.try_get("doc").map_err(backend_error)?;
            serde_json::from_value(doc).map_err(|e| {
                AppError::from(StoreError::Serialization {
                    entity: E::ENTITY_NAME,
                    message: e.to_string(),
                })
            })
        })
        .collect()
}

async fn count<E: Record>(conn: &mut PgConnection, query: &SelectQuery<E::Column>) -> Result<u64> {
    let mut args = SqlArgs::new();
    let sql = query.count_sql(E::TABLE, &mut args);
    tracing::debug!(%sql, params = args.len(), "count");

    let row = bind_all(sqlx::query(&sql), args)
        .fetch_one(&mut *conn)
        .await
        .map_err(backend_error)?;
    let total: i64 = row.try_get(0).map_err(backend_error)?;
    Ok(u64::try_from(total).unwrap_or(0))
}

/// One multi-row `INSERT`; ids and timestamps are filled in first
async fn insert<E: Record>(conn: &mut PgConnection, records: &mut [E]) -> Result<()> {
    let now = Utc::now();
    for record in records.iter_mut() {
        if record.id().is_nil() {
            record.set_value(E::Column::ID, Uuid::new_v4().into());
        }
        record.set_value(E::Column::CREATED_AT, now.into());
        record.set_value(E::Column::UPDATED_AT, now.into());
    }

    let columns = E::Column::ALL;
    let mut args = SqlArgs::new();
    let tuples: Vec<String> = records
        .iter()
        .map(|record| {
            let placeholders: Vec<String> = columns
                .iter()
                .map(|column| args.push(record.value_of(*column), column.kind()))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();
    let names: Vec<&str> = columns.iter().map(|column| column.name()).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        E::TABLE,
        names.join(", "),
        tuples.join(", ")
    );
    tracing::debug!(table = E::TABLE, rows = records.len(), "insert");

    bind_all(sqlx::query(&sql), args)
        .execute(&mut *conn)
        .await
        .map_err(write_error::<E>)?;
    Ok(())
}

async fn update<E: Record>(
    conn: &mut PgConnection,
    id: Uuid,
    changes: &Changes<E::Column>,
) -> Result<E> {
    let mut args = SqlArgs::new();
    let mut assignments: Vec<String> = changes
        .iter()
        .filter(|(column, _)| *column != E::Column::UPDATED_AT)
        .map(|(column, value)| {
            format!("{} = {}", column.name(), args.push(value.clone(), column.kind()))
        })
        .collect();
    assignments.push(format!(
        "{} = {}",
        E::Column::UPDATED_AT.name(),
        args.push(Utc::now().into(), FieldKind::Timestamp)
    ));
    let id_placeholder = args.push(id.into(), FieldKind::Uuid);
    let deleted_placeholder = args.push(Status::Delete.into(), FieldKind::Status);
    let sql = format!(
        "UPDATE {table} t SET {assignments} WHERE t.id = {id} AND t.status <> {deleted} RETURNING to_jsonb(t) AS doc",
        table = E::TABLE,
        assignments = assignments.join(", "),
        id = id_placeholder,
        deleted = deleted_placeholder,
    );
    tracing::debug!(%sql, "update");

    let row = bind_all(sqlx::query(&sql), args)
        .fetch_optional(&mut *conn)
        .await
        .map_err(write_error::<E>)?
        .ok_or_else(|| AppError::not_exist(E::ENTITY_NAME))?;
    let doc: serde_json::Value = row.try_get("doc").map_err(backend_error)?;
    serde_json::from_value(doc).map_err(|e| {
        AppError::from(StoreError::Serialization {
            entity: E::ENTITY_NAME,
            message: e.to_string(),
        })
    })
}

async fn delete_where<E: Record>(
    conn: &mut PgConnection,
    conditions: &[Condition<E::Column>],
) -> Result<u64> {
    let mut args = SqlArgs::new();
    let query = SelectQuery::with_conditions(conditions.to_vec());
    let sql = match query.where_sql(&mut args) {
        Some(clause) => format!("DELETE FROM {} WHERE {}", E::TABLE, clause),
        None => format!("DELETE FROM {}", E::TABLE),
    };
    tracing::debug!(%sql, "delete");

    let done = bind_all(sqlx::query(&sql), args)
        .execute(&mut *conn)
        .await
        .map_err(backend_error)?;
    Ok(done.rows_affected())
}

// ---------------------------------------------------------------------------
// Binding and errors
// ---------------------------------------------------------------------------

fn bind_all(query: PgQuery<'_>, args: SqlArgs) -> PgQuery<'_> {
    args.into_values()
        .into_iter()
        .fold(query, |query, (value, kind)| bind(query, value, kind))
}

fn bind(query: PgQuery<'_>, value: FieldValue, kind: FieldKind) -> PgQuery<'_> {
    match value {
        FieldValue::String(s) => query.bind(s),
        FieldValue::Integer(i) => query.bind(i),
        FieldValue::Boolean(b) => query.bind(b),
        FieldValue::Uuid(u) => query.bind(u),
        FieldValue::DateTime(dt) => query.bind(dt),
        FieldValue::List(items) => query.bind(items),
        FieldValue::Null => match kind {
            FieldKind::Uuid => query.bind(None::<Uuid>),
            FieldKind::Integer => query.bind(None::<i64>),
            FieldKind::Boolean => query.bind(None::<bool>),
            FieldKind::Timestamp => query.bind(None::<DateTime<Utc>>),
            FieldKind::TextList => query.bind(None::<Vec<String>>),
            FieldKind::Text | FieldKind::Status => query.bind(None::<String>),
        },
    }
}

async fn timed<T>(after: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(after, call).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!(?after, "postgres call timed out");
            Err(StoreError::Timeout { after }.into())
        }
    }
}

fn backend_error(err: sqlx::Error) -> AppError {
    tracing::error!(error = %err, "postgres call failed");
    StoreError::backend(BACKEND, err).into()
}

/// Unique violations become `Conflict`, anything else a backend error
fn write_error<E: Record>(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict {
                entity: E::ENTITY_NAME,
                constraint: db.constraint().unwrap_or_default().to_string(),
            }
            .into();
        }
    }
    backend_error(err)
}
