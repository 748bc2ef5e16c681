//! Store traits: repositories, units of work and the store that opens them
//!
//! Every storage call takes the repository it runs against by `&mut`, so a
//! multi-step write threads one explicit unit of work through all of its
//! steps:
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let outcome = create_steps(&mut tx, input).await;
//! transaction::finish(tx, outcome).await
//! ```
//!
//! Reads that need no atomicity use an autocommit [`Store::Session`].

use crate::core::condition::{Changes, Condition};
use crate::core::entity::Record;
use crate::core::error::{AppError, Result};
use crate::core::specification::SelectQuery;
use async_trait::async_trait;
use uuid::Uuid;

/// Record-level operations shared by sessions and units of work
#[async_trait]
pub trait Repository: Send {
    /// First row matching every condition
    ///
    /// Deleted rows are not filtered out; callers that only want live rows
    /// add [`Condition::listable`].
    async fn find<E: Record>(&mut self, conditions: &[Condition<E::Column>]) -> Result<E>;

    /// Like [`find`](Repository::find) but absence is `None`
    async fn find_optional<E: Record>(
        &mut self,
        conditions: &[Condition<E::Column>],
    ) -> Result<Option<E>> {
        match self.find::<E>(conditions).await {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_exist() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Rows matching a built query, ordered and windowed
    async fn list<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<Vec<E>>;

    /// Number of rows matching the query's predicates; ordering and window are ignored
    async fn count<E: Record>(&mut self, query: &SelectQuery<E::Column>) -> Result<u64>;

    /// Insert one row, assigning its id and timestamps
    async fn insert<E: Record>(&mut self, record: &mut E) -> Result<()>;

    /// Insert several rows in one round trip
    async fn insert_batch<E: Record>(&mut self, records: &mut [E]) -> Result<()>;

    /// Apply `changes` to a live row and return it
    ///
    /// Missing and soft-deleted rows both yield `EntityNotExist`.
    async fn update<E: Record>(&mut self, id: Uuid, changes: &Changes<E::Column>) -> Result<E>;

    /// Move a live row to `DELETE`, recording the actor
    async fn soft_delete<E: Record>(&mut self, id: Uuid, updated_by: &str) -> Result<()>;

    /// Physically remove every matching row, returning how many went
    async fn delete_where<E: Record>(&mut self, conditions: &[Condition<E::Column>])
    -> Result<u64>;
}

/// A repository whose writes become visible together or not at all
///
/// Dropping an unfinished unit of work discards its writes.
#[async_trait]
pub trait UnitOfWork: Repository {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// A storage backend
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Session: Repository;
    type Tx: UnitOfWork;

    /// Autocommit handle for reads
    async fn session(&self) -> Result<Self::Session>;

    /// Open a unit of work
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Look up a live row by id
pub async fn find_live<E: Record, R: Repository>(repo: &mut R, id: Uuid) -> Result<E> {
    use crate::core::entity::Column;

    repo.find::<E>(&[
        Condition::eq(E::Column::ID, id),
        Condition::listable(),
    ])
    .await
}

/// Look up a live parent row, reporting absence against the referencing field
pub async fn require_parent<E: Record, R: Repository>(
    repo: &mut R,
    id: Uuid,
    field: &str,
) -> Result<E> {
    find_live::<E, R>(repo, id).await.map_err(|err| {
        if err.is_not_exist() {
            AppError::invalid(field, format!("{} does not exist: {}", field, id))
        } else {
            err
        }
    })
}
