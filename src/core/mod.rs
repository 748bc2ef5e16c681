//! Core module containing the query engine, store contract and error types

pub mod condition;
pub mod entity;
pub mod error;
pub mod field;
pub mod object_store;
pub mod parser;
pub mod query;
pub mod query_builder;
pub mod specification;
pub mod store;
pub mod transaction;

pub use condition::{Changes, Comparison, Condition};
pub use entity::{Column, Entity, Record, Status};
pub use error::{AppError, ErrorResponse, Result, StoreError};
pub use field::{FieldFormat, FieldKind, FieldValue};
pub use object_store::ObjectStore;
pub use query::{Direction, FilterExpr, Join, ListRequest, Operator, OrderExpr, Page, PageMeta, QueryOptions};
pub use query_builder::{AllowList, EntityQueryBuilder};
pub use specification::{SelectQuery, Specification};
pub use store::{Repository, Store, UnitOfWork};
