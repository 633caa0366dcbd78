//! Session error types
//!
//! Structured errors raised by [`Session`](super::Session) implementations.
//! The resource layer never catches these: they travel to the HTTP boundary
//! where they are rendered through [`IntoResponse`].
//!
//! # Example
//!
//! ```rust
//! use acton_resources::session::{SessionError, SessionErrorKind, SessionOperation};
//!
//! let error = SessionError::constraint_violation(SessionOperation::Commit, "duplicate email");
//! assert!(matches!(error.kind, SessionErrorKind::ConstraintViolation));
//! assert!(!error.is_retriable());
//! ```

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ErrorResponse;

/// Operation being performed when the session error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOperation {
    /// Fetching a single entity by primary key
    Get,
    /// Lightweight existence probe
    Exists,
    /// Running a filtered query
    Query,
    /// Staging an entity for insert or update
    Add,
    /// Staging an entity for deletion
    Delete,
    /// Checking relation membership
    Membership,
    /// Appending a child to a relation collection
    Append,
    /// Flushing staged work
    Flush,
    /// Committing the unit of work
    Commit,
    /// Discarding the unit of work
    Rollback,
}

impl fmt::Display for SessionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Exists => write!(f, "exists"),
            Self::Query => write!(f, "query"),
            Self::Add => write!(f, "add"),
            Self::Delete => write!(f, "delete"),
            Self::Membership => write!(f, "membership"),
            Self::Append => write!(f, "append"),
            Self::Flush => write!(f, "flush"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Category of session error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionErrorKind {
    /// Entity was not found where one was required
    NotFound,
    /// Entity already exists (duplicate key)
    AlreadyExists,
    /// Store constraint violation
    ConstraintViolation,
    /// Failed to reach the store
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying store error
    DatabaseError,
    /// Stored data could not be converted to or from an entity
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl SessionErrorKind {
    /// HTTP status used when this error reaches the boundary
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists | Self::ConstraintViolation => StatusCode::CONFLICT,
            Self::ConnectionFailed | Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError | Self::SerializationError | Self::Other => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Structured session error with operation context
///
/// # Example
///
/// ```rust
/// use acton_resources::session::SessionError;
///
/// let error = SessionError::not_found("user", "42");
/// assert_eq!(
///     error.to_string(),
///     "Session not_found error during get: Entity not found [user: 42]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    /// The operation being performed when the error occurred
    pub operation: SessionOperation,
    /// The category of error
    pub kind: SessionErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The entity type involved (e.g., "user")
    pub entity_type: Option<String>,
    /// The primary key involved
    pub entity_id: Option<String>,
}

impl SessionError {
    /// Create a new session error
    pub fn new(
        operation: SessionOperation,
        kind: SessionErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(SessionOperation::Get, SessionErrorKind::NotFound, "Entity not found")
            .with_entity(entity_type, entity_id)
    }

    /// Create an "already exists" error with entity context
    pub fn already_exists(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            SessionOperation::Commit,
            SessionErrorKind::AlreadyExists,
            "Entity already exists",
        )
        .with_entity(entity_type, entity_id)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(operation: SessionOperation, message: impl Into<String>) -> Self {
        Self::new(operation, SessionErrorKind::ConstraintViolation, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            SessionOperation::Commit,
            SessionErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: SessionOperation, message: impl Into<String>) -> Self {
        Self::new(operation, SessionErrorKind::Timeout, message)
    }

    /// Create a store error
    pub fn database_error(operation: SessionOperation, message: impl Into<String>) -> Self {
        Self::new(operation, SessionErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: SessionOperation, message: impl Into<String>) -> Self {
        Self::new(operation, SessionErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: SessionOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is transient
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            SessionErrorKind::ConnectionFailed | SessionErrorKind::Timeout
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(entity_type), Some(entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for SessionError {}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = self.kind.status_code();

        tracing::error!(
            operation = %self.operation,
            kind = %self.kind,
            entity_type = ?self.entity_type,
            entity_id = ?self.entity_id,
            retriable = self.is_retriable(),
            "Session error: {}", self.message
        );

        // Don't expose store internals
        let message = match self.kind {
            SessionErrorKind::ConnectionFailed | SessionErrorKind::Timeout => {
                "Service temporarily unavailable".to_string()
            }
            SessionErrorKind::DatabaseError
            | SessionErrorKind::SerializationError
            | SessionErrorKind::Other => "An internal error occurred".to_string(),
            _ => self.message,
        };
        let code = format!("SESSION_{}", self.kind.to_string().to_uppercase());

        (status, Json(ErrorResponse::with_code(status, code, message))).into_response()
    }
}
