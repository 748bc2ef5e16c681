//! Management usecases
//!
//! [`ManagementService`] is the entry point for every read and write over
//! models, firmware, groups, devices, parameters and profiles. Writes follow
//! one shape:
//!
//! ```rust,ignore
//! let mut tx = self.store.begin().await?;
//! let outcome = create_group_steps(&mut tx, group).await;
//! transaction::finish(tx, outcome).await
//! ```
//!
//! The steps are free functions generic over [`Repository`], so every lookup,
//! check and mutation of one operation goes through the same unit of work.
//! Reads and lists use an autocommit session.

mod devices;
mod export;
mod firmwares;
mod groups;
mod import;
mod models;
mod parameters;
mod profiles;

pub use export::Table;
pub use import::{DEVICE_HEADER, PARAMETER_HEADER, PROFILE_HEADER};

use crate::core::condition::Condition;
use crate::core::entity::{Column, Record, Status};
use crate::core::error::{AppError, Result};
use crate::core::object_store::ObjectStore;
use crate::core::query::{Direction, ListRequest, Page, PageMeta};
use crate::core::query_builder::EntityQueryBuilder;
use crate::core::specification::SelectQuery;
use crate::core::store::{Repository, Store, find_live};
use crate::entities::Model;
use chrono::{FixedOffset, Offset, Utc};
use uuid::Uuid;

/// Tunables of the management usecases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Rows buffered by imports before each flush
    pub batch_size: usize,
    /// Offset applied to timestamps in exports
    pub export_offset: FixedOffset,
}

impl ServiceSettings {
    /// UTC+7
    pub fn default_export_offset() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix())
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            export_offset: Self::default_export_offset(),
        }
    }
}

/// Orchestrates management reads and writes over a store and an object store
///
/// # Example
///
/// ```rust,ignore
/// use fleet::prelude::*;
///
/// let service = ManagementService::new(InMemoryStore::new(), InMemoryObjectStore::default());
/// let model = service
///     .create_model(Model::new("AX3000", "Wifi 6", "CIG", "admin"))
///     .await?;
/// let page = service
///     .list_models(&ListRequest::new(20, 0).with_filter("name like 'AX'"))
///     .await?;
/// ```
pub struct ManagementService<S: Store, O: ObjectStore> {
    store: S,
    objects: O,
    settings: ServiceSettings,
}

impl<S: Store, O: ObjectStore> ManagementService<S, O> {
    pub fn new(store: S, objects: O) -> Self {
        Self::with_settings(store, objects, ServiceSettings::default())
    }

    pub fn with_settings(store: S, objects: O, settings: ServiceSettings) -> Self {
        Self {
            store,
            objects,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn objects(&self) -> &O {
        &self.objects
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Run a built list query and count its unpaged total
    async fn page<E: Record>(&self, builder: EntityQueryBuilder<E::Column>) -> Result<Page<E>> {
        let query = builder.build()?;
        let mut session = self.store.session().await?;
        let data = session.list::<E>(&query).await?;
        let total = session.count::<E>(&query.unpaged()).await?;
        Ok(Page {
            data,
            pagination: PageMeta::new(query.limit().unwrap_or_default(), query.offset(), total),
        })
    }

    /// Live rows matching `conditions`, newest first
    async fn all_live<E: Record>(&self, conditions: Vec<Condition<E::Column>>) -> Result<Vec<E>> {
        let query = SelectQuery::with_conditions(conditions)
            .where_condition(Condition::listable())
            .order_by(E::Column::UPDATED_AT, Direction::Desc);
        let mut session = self.store.session().await?;
        session.list::<E>(&query).await
    }

    /// Number of live rows, optionally scoped
    async fn count_live<E: Record>(&self, conditions: Vec<Condition<E::Column>>) -> Result<u64> {
        let query = SelectQuery::with_conditions(conditions).where_condition(Condition::listable());
        let mut session = self.store.session().await?;
        session.count::<E>(&query).await
    }

    /// Rows in `status` within `scope`; `DELETE` is countable here
    async fn count_status<E: Record>(
        &self,
        status: Status,
        mut scope: Vec<Condition<E::Column>>,
    ) -> Result<u64> {
        scope.push(Condition::eq(E::Column::STATUS, status));
        let mut session = self.store.session().await?;
        session.count::<E>(&SelectQuery::with_conditions(scope)).await
    }

    /// Session lookup of the model scoping a read
    async fn scope_model(&self, model_id: Uuid) -> Result<Model> {
        let mut session = self.store.session().await?;
        require_model(&mut session, model_id).await
    }
}

/// Apply caller list options to a builder
fn with_request<C: Column>(
    builder: EntityQueryBuilder<C>,
    request: &ListRequest,
) -> Result<EntityQueryBuilder<C>> {
    Ok(builder.with_options(request.to_options()?))
}

/// The live model a row refers to; absence is a bad `model_id`
async fn require_model<R: Repository>(repo: &mut R, model_id: Uuid) -> Result<Model> {
    find_live::<Model, R>(repo, model_id).await.map_err(|err| {
        if err.is_not_exist() {
            AppError::invalid("model_id", format!("model not found with id: {}", model_id))
        } else {
            err
        }
    })
}

/// Fail when a live row other than `except` matches `conditions`
async fn ensure_free<E: Record, R: Repository>(
    repo: &mut R,
    mut conditions: Vec<Condition<E::Column>>,
    except: Option<Uuid>,
    field: &str,
    message: impl FnOnce() -> String,
) -> Result<()> {
    conditions.push(Condition::listable());
    match repo.find_optional::<E>(&conditions).await? {
        Some(existing) if Some(existing.id()) != except => {
            tracing::warn!(entity = E::ENTITY_NAME, field, "natural key already taken");
            Err(AppError::invalid(field, message()))
        }
        _ => Ok(()),
    }
}
