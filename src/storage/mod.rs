//! Storage implementations for different backends

pub mod in_memory;
pub mod objects;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::{InMemorySession, InMemoryStore, InMemoryTx};
pub use objects::InMemoryObjectStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgSession, PgStore, PgTx};
