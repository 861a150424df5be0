//! Unified application error types for BlogData.
//!
//! Every crate maps its internal errors into [`AppError`] for consistent
//! propagation through the `?` operator. Construction-time kinds
//! ([`ErrorKind::FieldNotFound`], [`ErrorKind::Configuration`]) are raised
//! before the store is touched; runtime kinds carry an [`ErrorContext`]
//! naming the operation and entity involved.

use std::fmt;

use thiserror::Error;

use crate::types::id::EntityId;

/// Top-level error kind categorization used across the data-access core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A record addressed by a staged update or delete no longer exists.
    NotFound,
    /// An ordering, include, or search field name did not resolve.
    FieldNotFound,
    /// A uniqueness or reference rule was violated at the storage layer.
    ConstraintViolation,
    /// Invalid paging parameters, lifecycle misuse, or bad configuration.
    Configuration,
    /// A lower-level storage driver failure.
    Storage,
    /// An entity could not be converted to or from its stored document.
    Serialization,
    /// The unit of work or repository was used after disposal.
    Disposed,
    /// The operation was cancelled by its caller.
    Cancelled,
    /// The operation exceeded its deadline.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::FieldNotFound => write!(f, "FIELD_NOT_FOUND"),
            Self::ConstraintViolation => write!(f, "CONSTRAINT_VIOLATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Storage => write!(f, "STORAGE"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Disposed => write!(f, "DISPOSED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Where an error happened: the repository operation and the entity it touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Operation name, e.g. `"commit"` or `"load_all"`.
    pub operation: Option<String>,
    /// Entity type name, e.g. `"post"`.
    pub entity_type: Option<String>,
    /// Identifier of the offending entity, when known.
    pub entity_id: Option<EntityId>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(op) = &self.operation {
            parts.push(format!("operation={op}"));
        }
        if let Some(entity_type) = &self.entity_type {
            parts.push(format!("entity_type={entity_type}"));
        }
        if let Some(id) = self.entity_id {
            parts.push(format!("entity_id={id}"));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// The unified application error used throughout BlogData.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Operation and entity the error relates to.
    pub context: Option<ErrorContext>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
            source: Some(Box::new(source)),
        }
    }

    /// Attach the operation name, merging with any existing context.
    pub fn in_operation(mut self, operation: impl Into<String>) -> Self {
        self.context.get_or_insert_with(ErrorContext::default).operation = Some(operation.into());
        self
    }

    /// Attach the entity type name, keeping one that is already set.
    pub fn for_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        if ctx.entity_type.is_none() {
            ctx.entity_type = Some(entity_type.into());
        }
        self
    }

    /// Attach the offending entity identifier.
    pub fn for_entity(mut self, entity_id: EntityId) -> Self {
        self.context.get_or_insert_with(ErrorContext::default).entity_id = Some(entity_id);
        self
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a field-not-found error for `field` on `entity_type`.
    pub fn field_not_found(entity_type: &str, field: &str) -> Self {
        Self::new(
            ErrorKind::FieldNotFound,
            format!("Field '{field}' does not resolve on entity '{entity_type}'"),
        )
        .for_entity_type(entity_type)
    }

    /// Create a constraint violation error for the given entity.
    pub fn constraint_violation(
        entity_type: &str,
        entity_id: EntityId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::ConstraintViolation, message)
            .for_entity_type(entity_type)
            .for_entity(entity_id)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create a disposed error.
    pub fn disposed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disposed, message)
    }

    /// Create a cancelled error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Whether the failure may succeed on a retry of the whole operation.
    ///
    /// This layer never retries on its own; callers decide based on their
    /// own idempotency guarantees.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Storage | ErrorKind::Timeout)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_carries_context() {
        let err = AppError::constraint_violation("user", EntityId(7), "duplicate username");
        assert_eq!(err.kind, ErrorKind::ConstraintViolation);
        let ctx = err.context.expect("context");
        assert_eq!(ctx.entity_type.as_deref(), Some("user"));
        assert_eq!(ctx.entity_id, Some(EntityId(7)));
    }

    #[test]
    fn test_context_builders_merge() {
        let err = AppError::storage("connection reset")
            .for_entity_type("post")
            .in_operation("load_all")
            .for_entity_type("comment");
        let ctx = err.context.clone().expect("context");
        assert_eq!(ctx.operation.as_deref(), Some("load_all"));
        assert_eq!(ctx.entity_type.as_deref(), Some("post"));
        assert_eq!(ctx.to_string(), "operation=load_all entity_type=post");
    }

    #[test]
    fn test_display_and_retryable() {
        let err = AppError::timeout("full scan exceeded 30s");
        assert_eq!(err.to_string(), "TIMEOUT: full scan exceeded 30s");
        assert!(err.is_retryable());
        assert!(!AppError::configuration("bad page size").is_retryable());
    }

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let err: AppError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::Serialization);
        assert!(std::error::Error::source(&err).is_some());
    }
}
