//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Errors return correct HTTP status codes and stable keys
//! - Error responses are properly formatted and never leak backend details
//! - Error conversions work correctly
//! - Management operations surface the variant callers match on

use axum::http::StatusCode;
use axum::response::IntoResponse;
use fleet::prelude::*;
use std::time::Duration;

fn service() -> ManagementService<InMemoryStore, InMemoryObjectStore> {
    ManagementService::new(InMemoryStore::new(), InMemoryObjectStore::default())
}

// =============================================================================
// HTTP Status Code Tests
// =============================================================================

mod status_code_tests {
    use super::*;

    #[test]
    fn test_invalid_request_returns_400() {
        let err = AppError::invalid("name", "model already exists with name: AX3000");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_entity_not_exist_returns_404() {
        assert_eq!(AppError::not_exist("Model").status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_entity_already_exists_returns_409() {
        let err = AppError::EntityAlreadyExists {
            entity: "Model",
            constraint: "models_name_idx".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_failures_return_503() {
        let err = AppError::from(StoreError::Timeout {
            after: Duration::from_secs(30),
        });
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_internal_returns_500() {
        let err = AppError::Internal("unit of work finished twice".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

// =============================================================================
// Error Key Tests
// =============================================================================

mod error_key_tests {
    use super::*;

    #[test]
    fn test_keys_are_stable() {
        let cases = [
            (AppError::bad_request("no fields to update"), "ErrInvalidRequest"),
            (AppError::not_exist("Device"), "ErrEntityNotExist"),
            (
                AppError::EntityAlreadyExists {
                    entity: "Device",
                    constraint: "devices_mac_address_idx".to_string(),
                },
                "ErrEntityAlreadyExists",
            ),
            (AppError::from(StoreError::backend("postgres", "boom")), "ErrDB"),
            (AppError::Internal("x".to_string()), "ErrInternal"),
        ];
        for (err, key) in cases {
            assert_eq!(err.error_key(), key, "wrong key for {:?}", err);
        }
    }
}

// =============================================================================
// Error Response Format Tests
// =============================================================================

mod error_response_tests {
    use super::*;

    #[test]
    fn test_response_names_the_field() {
        let response = AppError::invalid("mac_address", "invalid mac address").to_response();
        assert_eq!(response.key, "ErrInvalidRequest");
        assert_eq!(response.message, "invalid mac address");
        assert_eq!(response.field.as_deref(), Some("mac_address"));
    }

    #[test]
    fn test_response_without_field_omits_it() {
        let response = AppError::not_exist("Profile").to_response();
        assert_eq!(response.message, "Profile not found");
        assert!(response.field.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("field").is_none());
        assert_eq!(json["key"], "ErrEntityNotExist");
    }

    #[test]
    fn test_backend_details_stay_out_of_the_response() {
        let err = AppError::from(StoreError::backend(
            "postgres",
            "password authentication failed for user \"usp\"",
        ));
        let response = err.to_response();
        assert_eq!(response.message, "The server is currently unavailable");
        assert!(err.to_string().contains("password authentication failed"));
    }
}

// =============================================================================
// Error Conversion Tests
// =============================================================================

mod error_conversion_tests {
    use super::*;

    #[test]
    fn test_store_conflict_becomes_already_exists() {
        let err = AppError::from(StoreError::Conflict {
            entity: "Parameter",
            constraint: "parameters_path_idx".to_string(),
        });
        assert!(matches!(
            err,
            AppError::EntityAlreadyExists { entity: "Parameter", ref constraint }
                if constraint == "parameters_path_idx"
        ));
    }

    #[test]
    fn test_conflict_as_invalid_only_rewrites_conflicts() {
        let conflict = AppError::EntityAlreadyExists {
            entity: "Model",
            constraint: "models_name_idx".to_string(),
        };
        let err = conflict.conflict_as_invalid("name", "model already exists with name: AX3000");
        assert_eq!(err.to_response().field.as_deref(), Some("name"));

        let missing = AppError::not_exist("Model").conflict_as_invalid("name", "ignored");
        assert!(missing.is_not_exist());
    }

    #[test]
    fn test_uuid_error_is_bad_request() {
        let err = AppError::from(Uuid::parse_str("not-a-uuid").unwrap_err());
        assert!(matches!(err, AppError::InvalidRequest { field: None, .. }));
        assert!(err.public_message().starts_with("invalid UUID"));
    }
}

// =============================================================================
// Error Matching Tests (through the management operations)
// =============================================================================

mod error_matching_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_target_is_not_exist() {
        let err = service().find_model(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::EntityNotExist { entity: "Model" }));
    }

    #[tokio::test]
    async fn test_validation_failure_names_the_field() {
        let err = service()
            .create_model(Model::new("", "Wifi 6", "CIG", "tester"))
            .await
            .unwrap_err();
        assert_eq!(err.to_response().field.as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn test_listing_deleted_rows_is_rejected() {
        let err = service()
            .list_models(&ListRequest::default().with_filter("status eq DELETE"))
            .await
            .unwrap_err();
        assert_eq!(err.to_response().field.as_deref(), Some("status"));
        assert_eq!(err.public_message(), "cannot list items with DELETE status");
    }

    #[tokio::test]
    async fn test_unknown_filter_field_is_rejected() {
        let err = service()
            .list_models(&ListRequest::default().with_filter("secret eq 1"))
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "invalid filter field: secret");
    }
}

// =============================================================================
// IntoResponse Tests
// =============================================================================

mod into_response_tests {
    use super::*;

    #[tokio::test]
    async fn test_into_response_status_and_body() {
        let response = AppError::invalid("limit", "limit must be between 1 and 100").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["key"], "ErrInvalidRequest");
        assert_eq!(body["field"], "limit");
        assert_eq!(body["message"], "limit must be between 1 and 100");
    }

    #[test]
    fn test_not_exist_into_response_status() {
        let response = AppError::not_exist("Group").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
