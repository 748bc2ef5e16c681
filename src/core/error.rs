//! Typed error handling for the management core
//!
//! Every failure surfaced by the query engine, the stores and the management
//! usecases is an [`AppError`]. Each variant carries a stable key for
//! programmatic handling and a human message; storage failures are reported
//! with a deliberately generic message so backend details never leak.
//!
//! # Error Categories
//!
//! - [`AppError::InvalidRequest`]: bad filter/order syntax, disallowed column,
//!   out-of-range pagination, duplicate natural key, missing parent reference
//! - [`AppError::EntityNotExist`]: lookup found nothing
//! - [`AppError::EntityAlreadyExists`]: the store itself detected a conflict
//! - [`AppError::Db`]: unexpected storage failure ([`StoreError`])
//! - [`AppError::Internal`]: orchestration invariant violated
//!
//! # Example
//!
//! ```rust,ignore
//! use fleet::prelude::*;
//!
//! match service.find_model(id).await {
//!     Ok(model) => println!("found {}", model.name),
//!     Err(AppError::EntityNotExist { entity }) => println!("{} is gone", entity),
//!     Err(e) => eprintln!("{} ({})", e, e.error_key()),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// The error type shared by every layer of the crate
#[derive(Debug)]
pub enum AppError {
    /// The caller supplied something unusable
    InvalidRequest {
        message: String,
        /// Offending input field, when one can be named
        field: Option<String>,
    },

    /// No row matched a lookup
    EntityNotExist { entity: &'static str },

    /// A unique constraint rejected the write
    EntityAlreadyExists {
        entity: &'static str,
        constraint: String,
    },

    /// Storage backend failure
    Db(StoreError),

    /// Orchestration invariant violated
    Internal(String),
}

/// Specialized result for management operations
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Build an invalid-request error naming the offending field
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::InvalidRequest {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Build an invalid-request error that concerns the request as a whole
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::InvalidRequest {
            message: message.into(),
            field: None,
        }
    }

    pub fn not_exist(entity: &'static str) -> Self {
        AppError::EntityNotExist { entity }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::EntityNotExist { .. } => StatusCode::NOT_FOUND,
            AppError::EntityAlreadyExists { .. } => StatusCode::CONFLICT,
            AppError::Db(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable key for programmatic handling
    pub fn error_key(&self) -> &'static str {
        match self {
            AppError::InvalidRequest { .. } => "ErrInvalidRequest",
            AppError::EntityNotExist { .. } => "ErrEntityNotExist",
            AppError::EntityAlreadyExists { .. } => "ErrEntityAlreadyExists",
            AppError::Db(_) => "ErrDB",
            AppError::Internal(_) => "ErrInternal",
        }
    }

    /// The message shown to callers
    ///
    /// Storage and internal failures are reported generically; the full
    /// error is available through `Display` for logging.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidRequest { message, .. } => message.clone(),
            AppError::EntityNotExist { entity } => format!("{} not found", entity),
            AppError::EntityAlreadyExists { entity, .. } => format!("{} already exists", entity),
            AppError::Db(_) => "The server is currently unavailable".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn is_not_exist(&self) -> bool {
        matches!(self, AppError::EntityNotExist { .. })
    }

    /// Turn a store-detected conflict into a validation error on `field`
    ///
    /// Racing writers that lose on a unique index end up here, so the
    /// caller sees the same error as the orchestration pre-check produces.
    pub fn conflict_as_invalid(self, field: &str, message: impl Into<String>) -> Self {
        match self {
            AppError::EntityAlreadyExists { .. } => AppError::invalid(field, message),
            other => other,
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            key: self.error_key().to_string(),
            message: self.public_message(),
            field: match self {
                AppError::InvalidRequest { field, .. } => field.clone(),
                _ => None,
            },
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidRequest {
                message,
                field: Some(field),
            } => write!(f, "Invalid request ({}): {}", field, message),
            AppError::InvalidRequest { message, .. } => write!(f, "Invalid request: {}", message),
            AppError::EntityNotExist { entity } => write!(f, "{} not found", entity),
            AppError::EntityAlreadyExists { entity, constraint } => {
                write!(f, "{} already exists (constraint '{}')", entity, constraint)
            }
            AppError::Db(e) => write!(f, "Storage error: {}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Db(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error key for programmatic handling
    pub key: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Db(_) | AppError::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Failures raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique index rejected the write
    #[error("unique constraint '{constraint}' violated on {entity}")]
    Conflict {
        entity: &'static str,
        constraint: String,
    },

    /// The per-call time bound elapsed
    #[error("store call timed out after {after:?}")]
    Timeout { after: Duration },

    /// Backend reported an error
    #[error("{backend} error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    /// A row could not be converted to or from its record type
    #[error("failed to (de)serialize {entity}: {message}")]
    Serialization {
        entity: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn backend(backend: &'static str, err: impl fmt::Display) -> Self {
        StoreError::Backend {
            backend,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { entity, constraint } => {
                AppError::EntityAlreadyExists { entity, constraint }
            }
            other => AppError::Db(other),
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        fields.sort();
        match fields.first() {
            Some(field) => AppError::invalid(field.clone(), format!("invalid value for {}", field)),
            None => AppError::bad_request(errors.to_string()),
        }
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::bad_request(format!("invalid UUID: {}", err))
    }
}

// =============================================================================
// Tests
// =============================================================================
