//! Shared test harness for storage backend testing
//!
//! Provides record builders, assertion helpers and the
//! [`store_contract_tests!`] macro, which runs the same `Store` contract
//! against any backend.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//!
//! store_contract_tests!(InMemoryStore::new());
//! ```

#![allow(dead_code)]

#[macro_use]
mod store_contract_tests;

use fleet::core::error::AppError;
use fleet::core::store::Repository;
use fleet::entities::{Model, Parameter};

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

pub fn model(name: &str) -> Model {
    Model::new(name, "Wifi 6", "CIG", "tester")
}

pub fn parameter(path: &str, data_type: &str) -> Parameter {
    Parameter::new(path, data_type, "tester")
}

/// Insert one parameter per path, in order
pub async fn seed_parameters<R: Repository>(repo: &mut R, paths: &[&str]) -> Vec<Parameter> {
    let mut inserted = Vec::with_capacity(paths.len());
    for path in paths {
        let mut record = parameter(path, "string");
        repo.insert(&mut record).await.unwrap();
        inserted.push(record);
    }
    inserted
}

// ---------------------------------------------------------------------------
// Assertions
// ---------------------------------------------------------------------------

/// Assert an `InvalidRequest` naming `field`
pub fn assert_invalid(err: &AppError, field: &str) {
    match err {
        AppError::InvalidRequest { field: Some(f), .. } => assert_eq!(f, field),
        other => panic!("Expected InvalidRequest on '{}', got {:?}", field, other),
    }
}

pub fn assert_not_exist(err: &AppError) {
    assert!(err.is_not_exist(), "Expected EntityNotExist, got {:?}", err);
}

pub fn paths(parameters: &[Parameter]) -> Vec<&str> {
    parameters.iter().map(|p| p.path.as_str()).collect()
}
