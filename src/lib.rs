//! # fleet
//!
//! Filtered queries and transactional writes for a device fleet management
//! API: hardware models, firmware, device groups, devices, parameters and
//! profiles.
//!
//! ## Features
//!
//! - **Filter language**: `name like 'ax' and (status eq ENABLE or status eq DISABLE)`
//!   parsed into typed predicates over a per-entity column allow-list
//! - **Order language**: `name ASC, created_at DESC`
//! - **Soft delete**: `DELETE` rows are hidden from every default read
//! - **Units of work**: each write threads one explicit transaction through its steps
//! - **Imports and exports**: batched record imports, tabular exports
//! - **Backends**: in-memory (default) and PostgreSQL (`postgres` feature)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fleet::prelude::*;
//!
//! let service = ManagementService::new(InMemoryStore::new(), InMemoryObjectStore::default());
//!
//! let model = service
//!     .create_model(Model::new("AX3000", "Wifi 6", "CIG", "admin"))
//!     .await?;
//! let group = service
//!     .create_group(Group::new(model.id, "lab", "admin"))
//!     .await?;
//! service
//!     .create_device(Device::new("a0:b1:c2:d3:e4:f5", model.id, Some(group.id), "admin"))
//!     .await?;
//!
//! let page = service
//!     .list_devices(model.id, &ListRequest::new(20, 0).with_filter("status eq ENABLE"))
//!     .await?;
//! assert_eq!(page.pagination.total, 1);
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod management;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        AppError, Changes, Column, Condition, Entity, EntityQueryBuilder, FieldValue, ListRequest,
        ObjectStore, Page, PageMeta, Record, Repository, Result, SelectQuery, Status, Store,
        StoreError, UnitOfWork,
        object_store::{FIRMWARE_BUCKET, TRASH_BUCKET},
        transaction,
    };

    // === Macros ===
    pub use crate::impl_record;

    // === Entities ===
    pub use crate::entities::{
        Device, DeviceUpdate, Firmware, FirmwareUpdate, Group, GroupUpdate, Model, ModelUpdate,
        Parameter, ParameterSpec, ParameterUpdate, Profile, ProfileParameter, ProfileUpdate,
    };

    // === Management ===
    pub use crate::management::{ManagementService, ServiceSettings, Table};

    // === Storage ===
    pub use crate::storage::{InMemoryObjectStore, InMemoryStore};
    #[cfg(feature = "postgres")]
    pub use crate::storage::PgStore;

    // === Config ===
    pub use crate::config::{AppConfig, init_tracing};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;
}
