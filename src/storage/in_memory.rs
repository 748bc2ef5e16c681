//! In-memory store for testing and development
//!
//! Rows are kept as JSON documents per table, in insertion order. Units of
//! work are serialized: `begin` takes the single writer slot, works on a
//! private copy of every table and swaps it in on commit. Dropping the unit
//! of work releases the slot and discards the copy.

use crate::core::condition::{Changes, Condition, all_match};
use crate::core::entity::{Column, Record, Status};
use crate::core::error::{AppError, Result, StoreError};
use crate::core::specification::SelectQuery;
use crate::core::store::{Repository, Store, UnitOfWork};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

const BACKEND: &str = "in-memory";

type Table = IndexMap<Uuid, serde_json::Value>;

/// Every table, keyed by name
#[derive(Debug, Clone, Default)]
struct Tables(HashMap<&'static str, Table>);

impl Tables {
    fn rows<E: Record>(&self) -> Result<Vec<E>> {
        self.0
            .get(E::TABLE)
            .map(|table| table.values().map(decode::<E>).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn table_mut<E: Record>(&mut self) -> &mut Table {
        self.0.entry(E::TABLE).or_default()
    }

    fn find<E: Record>(&self, conditions: &[Condition<E::Column>]) -> Result<E> {
        self.rows::<E>()?
            .into_iter()
            .find(|row| all_match(conditions, row))
            .ok_or_else(|| AppError::not_exist(E::ENTITY_NAME))
    }

    fn list<E: Record>(&self, query: &SelectQuery<E::Column>) -> Result<Vec<E>> {
        let mut rows: Vec<E> = self
            .rows::<E>()?
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        query.sort(&mut rows);
        Ok(query.window(rows))
    }

    fn count<E: Record>(&self, query: &SelectQuery<E::Column>) -> Result<u64> {
        let rows = self.rows::<E>()?;
        Ok(rows.iter().filter(|row| query.matches(*row)).count() as u64)
    }

    /// Reject `record` when a live row other than itself shares a natural key
    fn check_unique<E: Record>(&self, record: &E) -> Result<()> {
        if record.is_deleted() {
            return Ok(());
        }
        let rows = self.rows::<E>()?;
        for key in E::UNIQUE {
            let clash = rows.iter().any(|row| {
                row.id() != record.id()
                    && !row.is_deleted()
                    && key
                        .iter()
                        .all(|column| row.value_of(*column) == record.value_of(*column))
            });
            if clash {
                return Err(StoreError::Conflict {
                    entity: E::ENTITY_NAME,
                    constraint: E::constraint_name(key),
                }
                .into());
            }
        }
        Ok(())
    }

    fn insert<E: Record>(&mut self, record: &mut E) -> Result<()> {
        if record.id().is_nil() {
            record.set_value(E::Column::ID, Uuid::new_v4().into());
        }
        let now = Utc::now();
        record.set_value(E::Column::CREATED_AT, now.into());
        record.set_value(E::Column::UPDATED_AT, now.into());

        if self.0.get(E::TABLE).is_some_and(|table| table.contains_key(&record.id())) {
            return Err(StoreError::Conflict {
                entity: E::ENTITY_NAME,
                constraint: format!("{}_pkey", E::TABLE),
            }
            .into());
        }
        self.check_unique(record)?;

        let document = encode(record)?;
        self.table_mut::<E>().insert(record.id(), document);
        Ok(())
    }

    fn live<E: Record>(&self, id: Uuid) -> Result<E> {
        let row = self
            .0
            .get(E::TABLE)
            .and_then(|table| table.get(&id))
            .ok_or_else(|| AppError::not_exist(E::ENTITY_NAME))?;
        let record = decode::<E>(row)?;
        if record.is_deleted() {
            return Err(AppError::not_exist(E::ENTITY_NAME));
        }
        Ok(record)
    }

    fn update<E: Record>(&mut self, id: Uuid, changes: &Changes<E::Column>) -> Result<E> {
        let mut record = self.live::<E>(id)?;
        for (column, value) in changes.iter() {
            if !record.set_value(*column, value.clone()) {
                return Err(AppError::invalid(
                    column.name(),
                    format!("invalid value for {}", column.name()),
                ));
            }
        }
        record.set_value(E::Column::UPDATED_AT, Utc::now().into());
        self.check_unique(&record)?;

        let document = encode(&record)?;
        self.table_mut::<E>().insert(id, document);
        Ok(record)
    }

    fn soft_delete<E: Record>(&mut self, id: Uuid, updated_by: &str) -> Result<()> {
        let changes = Changes::new()
            .set(E::Column::STATUS, Status::Delete)
            .set(E::Column::UPDATED_BY, updated_by);
        self.update::<E>(id, &changes).map(|_| ())
    }

    fn delete_where<E: Record>(&mut self, conditions: &[Condition<E::Column>]) -> Result<u64> {
        let doomed: Vec<Uuid> = self
            .rows::<E>()?
            .iter()
            .filter(|row| all_match(conditions, *row))
            .map(|row| row.id())
            .collect();
        let table = self.table_mut::<E>();
        for id in &doomed {
            table.shift_remove(id);
        }
        Ok(doomed.len() as u64)
    }
}

fn encode<E: Record>(record: &E) -> Result<serde_json::Value> {
    serde_json::to_value(record).map_err(|e| {
        StoreError::Serialization {
            entity: E::ENTITY_NAME,
            message: e.to_string(),
        }
        .into()
    })
}

fn decode<E: Record>(document: &serde_json::Value) -> Result<E> {
    serde_json::from_value(document.clone()).map_err(|e| {
        StoreError::Serialization {
            entity: E::ENTITY_NAME,
            message: e.to_string(),
        }
        .into()
    })
}

fn poisoned(e: impl std::fmt::Display) -> AppError {
    StoreError::backend(BACKEND, format!("failed to acquire lock: {}", e)).into()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Transactional in-memory store
///
/// Cloning shares the underlying tables.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    timeout: Duration,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Bound how long a call may wait for the writer slot
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(Tables::default())),
            writer: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    async fn acquire_writer(
        writer: &Arc<Mutex<()>>,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>> {
        tokio::time::timeout(timeout, writer.clone().lock_owned())
            .await
            .map_err(|_| StoreError::Timeout { after: timeout }.into())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Session = InMemorySession;
    type Tx = InMemoryTx;

    async fn session(&self) -> Result<InMemorySession> {
        Ok(InMemorySession {
            state: self.state.clone(),
            writer: self.writer.clone(),
            timeout: self.timeout,
        })
    }

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = Self::acquire_writer(&self.writer, self.timeout).await?;
        let working = self.state.read().map_err(poisoned)?.clone();
        tracing::debug!(backend = BACKEND, "unit of work started");
        Ok(InMemoryTx {
            state: self.state.clone(),
            working,
            _guard: guard,
        })
    }
}

/// Autocommit handle: reads see committed state, each write commits alone
pub struct InMemorySession {
    state: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    timeout: Duration,
}

impl InMemorySession {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        let tables = self.state.read().map_err(poisoned)?;
        f(&tables)
    }

    async fn write<T>(&mut self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let _guard = InMemoryStore::acquire_writer(&self.writer, self.timeout).await?;
        let mut tables = self.state.write().map_err(poisoned)?;
        // Apply to a copy so a failing write leaves the tables untouched
        let mut working = tables.clone();
        let value = f(&mut working)?;
        *tables = working;
        Ok(value)
    }
}

/// Unit of work holding the writer slot and a private copy of the tables
#[derive(Debug)]
pub struct InMemoryTx {
    state: Arc<RwLock<Tables>>,
    working: Tables,
    _guard: OwnedMutexGuard<()>,
}

impl InMemoryTx {
    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        f(&self.working)
    }

    async fn write<T>(&mut self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        f(&mut self.working)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryTx {
    async fn commit(self) -> Result<()> {
        let mut tables = self.state.write().map_err(poisoned)?;
        *tables = self.working;
        tracing::debug!(backend = BACKEND, "unit of work committed");
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        tracing::debug!(backend = BACKEND, "unit of work rolled back");
        Ok(())
    }
}

macro_rules! in_memory_repository {
    ($handle:ty) => {
        #[async_trait]
        impl Repository for $handle {
            async fn find<E: Record>(&mut self, conditions: &[Condition<E::Column>]) -> Result<E> {
                self.read(|tables| tables.find::<E>(conditions))
            }

            async fn list<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<Vec<E>> {
                self.read(|tables| tables.list::<E>(query))
            }

            async fn count<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<u64> {
                self.read(|tables| tables.count::<E>(query))
            }

            async fn insert<E: Record>(&mut self, record: &mut E) -> Result<()> {
                self.write(|tables| tables.insert(record)).await
            }

            async fn insert_batch<E: Record>(&mut self, records: &mut [E]) -> Result<()> {
                self.write(|tables| {
                    for record in records.iter_mut() {
                        tables.insert(record)?;
                    }
                    Ok(())
                })
                .await
            }

            async fn update<E: Record>(
                &mut self,
                id: Uuid,
                changes: &Changes<E::Column>,
            ) -> Result<E> {
                self.write(|tables| tables.update::<E>(id, changes)).await
            }

            async fn soft_delete<E: Record>(&mut self, id: Uuid, updated_by: &str) -> Result<()> {
                self.write(|tables| tables.soft_delete::<E>(id, updated_by)).await
            }

            async fn delete_where<E: Record>(
                &mut self,
                conditions: &[Condition<E::Column>],
            ) -> Result<u64> {
                self.write(|tables| tables.delete_where::<E>(conditions)).await
            }
        }
    };
}

in_memory_repository!(InMemorySession);
in_memory_repository!(InMemoryTx);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Model, ModelColumn};

    fn model(name: &str) -> Model {
        Model::new(name, "acme", "acme", "tester")
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamps() {
        let store = InMemoryStore::new();
        let mut session = store.session().await.unwrap();
        let mut record = model("ax3000");

        session.insert(&mut record).await.unwrap();

        assert!(!record.id.is_nil());
        assert_eq!(record.created_at, record.updated_at);
        let found: Model = session
            .find(&[Condition::eq(ModelColumn::Id, record.id)])
            .await
            .unwrap();
        assert_eq!(found.name, "ax3000");
    }

    #[tokio::test]
    async fn test_dropped_tx_discards_writes() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&mut model("ax3000")).await.unwrap();
        }
        let mut session = store.session().await.unwrap();
        let total = session.count::<Model>(&SelectQuery::new()).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_tx_is_isolated_until_commit() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&mut model("ax3000")).await.unwrap();

        let mut session = store.session().await.unwrap();
        assert_eq!(session.count::<Model>(&SelectQuery::new()).await.unwrap(), 0);

        tx.commit().await.unwrap();
        assert_eq!(session.count::<Model>(&SelectQuery::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_ignores_deleted_rows() {
        let store = InMemoryStore::new();
        let mut session = store.session().await.unwrap();
        let mut first = model("ax3000");
        session.insert(&mut first).await.unwrap();

        let err = session.insert(&mut model("ax3000")).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::EntityAlreadyExists { ref constraint, .. } if constraint == "models_name_idx"
        ));

        session.soft_delete::<Model>(first.id, "tester").await.unwrap();
        session.insert(&mut model("ax3000")).await.unwrap();
    }

    #[tokio::test]
    async fn test_begin_times_out_while_writer_busy() {
        let store = InMemoryStore::with_timeout(Duration::from_millis(20));
        let _held = store.begin().await.unwrap();

        let err = store.begin().await.unwrap_err();
        assert!(matches!(err, AppError::Db(StoreError::Timeout { .. })));
    }
}
