//! Typed error handling for the JSON:API hook and repository layer
//!
//! This module provides the error hierarchy used across the crate so that
//! callers can react to specific failures instead of matching on strings.
//!
//! # Error Categories
//!
//! - [`QueryError`]: Client input errors (bad include chains, unknown relationships)
//! - [`ResourceError`]: Missing or conflicting resources
//! - [`HookError`]: Hook contract violations (programmer errors)
//! - [`ConfigError`]: Setup errors (resource graph, hook containers)
//! - [`StorageError`]: Errors raised by a persistence session
//!
//! Errors returned by user hook implementations are never wrapped: they travel
//! through `anyhow::Error` untouched and can be recovered with
//! `anyhow::Error::downcast_ref`.
//!
//! # Example
//!
//! ```rust,ignore
//! use jsonapi::core::error::{JsonApiError, QueryError};
//!
//! match registry.parse_includes("articles", "author..comments") {
//!     Err(JsonApiError::Query(QueryError::EmptyIncludeSegment { chain, .. })) => {
//!         println!("bad chain {}", chain);
//!     }
//!     _ => {}
//! }
//! ```

use crate::core::pipeline::ResourcePipeline;
use crate::hooks::definition::ResourceHook;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The main error type for the JSON:API layer
#[derive(Debug, Error)]
pub enum JsonApiError {
    /// Client input errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Resource lookup errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Hook contract violations
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Configuration and setup errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persistence errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// HTTP status as a string, following the JSON:API error object
    pub status: String,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub title: String,
    /// Optional detail naming the offending resource or relationship
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JsonApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            JsonApiError::Query(_) => StatusCode::BAD_REQUEST,
            JsonApiError::Resource(e) => e.status_code(),
            JsonApiError::Hook(_) => StatusCode::INTERNAL_SERVER_ERROR,
            JsonApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            JsonApiError::Storage(e) => e.status_code(),
            JsonApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            JsonApiError::Query(e) => e.error_code(),
            JsonApiError::Resource(e) => e.error_code(),
            JsonApiError::Hook(_) => "HOOK_CONTRACT_VIOLATION",
            JsonApiError::Config(_) => "CONFIG_ERROR",
            JsonApiError::Storage(e) => e.error_code(),
            JsonApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: self.status_code().as_u16().to_string(),
            code: self.error_code().to_string(),
            title: self.to_string(),
            detail: self.detail(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            JsonApiError::Query(QueryError::InvalidRelationship {
                resource,
                relationship,
            }) => Some(format!(
                "{} does not have a relationship named {}",
                resource, relationship
            )),
            JsonApiError::Query(QueryError::EmptyIncludeSegment { chain, position }) => Some(
                format!("Segment {} of include chain '{}' is empty", position, chain),
            ),
            _ => None,
        }
    }

    /// Recover a typed error from an `anyhow::Error` produced by this crate
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&JsonApiError> {
        err.downcast_ref::<JsonApiError>()
    }
}

impl IntoResponse for JsonApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "errors": [self.to_response()] }));
        (status, body).into_response()
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Client input errors raised while resolving relationship paths
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The include parameter was provided but empty
    #[error("Include parameter must not be empty if provided")]
    EmptyInclude,

    /// One segment of an include chain is empty (e.g. `author..comments`)
    #[error("Include chain '{chain}' contains an empty relationship name")]
    EmptyIncludeSegment { chain: String, position: usize },

    /// No relationship with this public name exists on the resource
    #[error("Invalid relationship {relationship} on {resource}")]
    InvalidRelationship {
        resource: String,
        relationship: String,
    },

    /// The relationship exists but is marked as non-includable
    #[error("Including the relationship {relationship} on {resource} is not allowed")]
    RelationshipNotIncludable {
        resource: String,
        relationship: String,
    },

    /// The resource type is not part of the resource graph
    #[error("Unknown resource type: {resource_type}")]
    UnknownResourceType { resource_type: String },
}

impl QueryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::EmptyInclude => "EMPTY_INCLUDE",
            QueryError::EmptyIncludeSegment { .. } => "EMPTY_INCLUDE_SEGMENT",
            QueryError::InvalidRelationship { .. } => "INVALID_RELATIONSHIP",
            QueryError::RelationshipNotIncludable { .. } => "RELATIONSHIP_NOT_INCLUDABLE",
            QueryError::UnknownResourceType { .. } => "UNKNOWN_RESOURCE_TYPE",
        }
    }
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Errors related to resource lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Resource was not found
    #[error("{resource_type} with id '{id}' not found")]
    NotFound { resource_type: String, id: String },

    /// The parent of a relationship request was not found
    #[error("Relationship '{relationship}' not found on {resource_type} with id '{id}'")]
    RelationshipNotFound {
        resource_type: String,
        id: String,
        relationship: String,
    },

    /// Resource already exists in storage
    #[error("{resource_type} with id '{id}' already exists")]
    AlreadyExists { resource_type: String, id: String },
}

impl ResourceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResourceError::RelationshipNotFound { .. } => StatusCode::NOT_FOUND,
            ResourceError::AlreadyExists { .. } => StatusCode::CONFLICT,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ResourceError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            ResourceError::RelationshipNotFound { .. } => "RELATIONSHIP_NOT_FOUND",
            ResourceError::AlreadyExists { .. } => "RESOURCE_ALREADY_EXISTS",
        }
    }
}

// =============================================================================
// Hook Errors
// =============================================================================

/// Hook contract violations. These are programmer errors and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// A hook returned a result that its calling pipeline does not allow
    #[error(
        "The returned collection from hook {hook} may contain at most one item in the case of the {pipeline} pipeline"
    )]
    TooManyResults {
        hook: ResourceHook,
        pipeline: ResourcePipeline,
        count: usize,
    },

    /// A before hook dropped the single resource a create or update works on
    #[error("Hook {hook} removed the primary resource of the {pipeline} pipeline")]
    PrimaryResourceExcluded {
        hook: ResourceHook,
        pipeline: ResourcePipeline,
    },
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration and setup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Failed to parse configuration
    #[error("Failed to parse config{}: {message}", .file.as_ref().map(|f| format!(" file '{}'", f)).unwrap_or_default())]
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// A resource type is declared twice
    #[error("Resource type '{resource_type}' is declared more than once")]
    DuplicateResource { resource_type: String },

    /// A relationship points to an undeclared resource type
    #[error("Relationship '{relationship}' on '{resource}' targets unknown resource '{target}'")]
    UnknownRelationshipTarget {
        resource: String,
        relationship: String,
        target: String,
    },

    /// An inverse navigation does not exist on the dependent type
    #[error("Relationship '{relationship}' on '{resource}' declares unknown inverse '{inverse}'")]
    InvalidInverse {
        resource: String,
        relationship: String,
        inverse: String,
    },

    /// A many-to-many relationship is missing its join description
    #[error("Relationship '{relationship}' on '{resource}' is invalid: {message}")]
    InvalidThrough {
        resource: String,
        relationship: String,
        message: String,
    },

    /// More than one hook container was registered for a resource type
    #[error("Cannot define multiple resource definitions for '{resource_type}'")]
    AmbiguousHookContainer { resource_type: String },

    /// A hook container was registered for a type outside the resource graph
    #[error("Resource definition registered for unknown resource type '{resource_type}'")]
    UnknownResourceDefinition { resource_type: String },

    /// A database values override was placed on a hook that cannot use it
    #[error("Database values option cannot be used on hook {hook} in resource definition for '{resource_type}'")]
    DatabaseValuesNotAllowed {
        resource_type: String,
        hook: ResourceHook,
    },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors raised by persistence sessions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Attaching a second instance of an identity that is already tracked
    #[error("Another instance of {resource_type} with id '{id}' is already being tracked")]
    IdentityConflict { resource_type: String, id: String },

    /// Operation on an identity the session does not track
    #[error("{resource_type} with id '{id}' is not tracked by this session")]
    NotTracked { resource_type: String, id: String },

    /// A relationship references a row that does not exist
    #[error("{resource_type} with id '{id}' referenced by '{relationship}' does not exist")]
    MissingReference {
        resource_type: String,
        id: String,
        relationship: String,
    },

    /// Transaction error
    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    /// The unit of work was cancelled before it committed
    #[error("Operation cancelled before changes were saved")]
    Cancelled,

    /// A lock guarding shared storage was poisoned
    #[error("Storage lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl StorageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StorageError::IdentityConflict { .. } => StatusCode::CONFLICT,
            StorageError::MissingReference { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::IdentityConflict { .. } => "IDENTITY_CONFLICT",
            StorageError::NotTracked { .. } => "NOT_TRACKED",
            StorageError::MissingReference { .. } => "MISSING_REFERENCE",
            StorageError::TransactionError { .. } => "TRANSACTION_ERROR",
            StorageError::Cancelled => "CANCELLED",
            StorageError::LockPoisoned { .. } => "STORAGE_ERROR",
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for JsonApiError {
    fn from(err: serde_yaml::Error) -> Self {
        JsonApiError::Config(err.into())
    }
}

/// A specialized Result type for operations that only fail with crate errors
pub type JsonApiResult<T> = Result<T, JsonApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_errors_are_bad_requests() {
        let err: JsonApiError = QueryError::InvalidRelationship {
            resource: "articles".to_string(),
            relationship: "writer".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "INVALID_RELATIONSHIP");
        assert!(err.to_string().contains("writer"));
        assert!(err.to_string().contains("articles"));
    }

    #[test]
    fn test_not_includable_message() {
        let err = QueryError::RelationshipNotIncludable {
            resource: "people".to_string(),
            relationship: "secrets".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Including the relationship secrets on people is not allowed"
        );
    }

    #[test]
    fn test_resource_error_status_code() {
        let err = ResourceError::NotFound {
            resource_type: "people".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ResourceError::AlreadyExists {
            resource_type: "people".to_string(),
            id: "1".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_hook_error_names_pipeline() {
        let err = HookError::TooManyResults {
            hook: ResourceHook::OnReturn,
            pipeline: ResourcePipeline::GetSingle,
            count: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("OnReturn"));
        assert!(msg.contains("GetSingle"));
    }

    #[test]
    fn test_error_response_detail() {
        let err = JsonApiError::Query(QueryError::InvalidRelationship {
            resource: "articles".to_string(),
            relationship: "writer".to_string(),
        });
        let response = err.to_response();
        assert_eq!(response.status, "400");
        assert_eq!(
            response.detail.as_deref(),
            Some("articles does not have a relationship named writer")
        );
    }

    #[test]
    fn test_config_parse_error_mentions_file() {
        let err = ConfigError::ParseError {
            file: Some("resources.yaml".to_string()),
            message: "bad indent".to_string(),
        };
        assert!(err.to_string().contains("resources.yaml"));

        let err = ConfigError::ParseError {
            file: None,
            message: "bad indent".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to parse config: bad indent");
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = JsonApiError::from(StorageError::Cancelled).into();
        let typed = JsonApiError::from_anyhow(&err).unwrap();
        assert!(matches!(typed, JsonApiError::Storage(StorageError::Cancelled)));
    }
}
