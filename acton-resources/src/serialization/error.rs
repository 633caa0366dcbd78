//! Wire conversion errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::error::ErrorResponse;

/// Result type for serializer operations
pub type SerializationResult<T> = std::result::Result<T, SerializationError>;

/// Failure converting between wire documents and native values
///
/// All variants describe bad client input and surface as 400.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// A datetime string did not match the accepted pattern
    #[error("Could not parse DateTime: '{0}'")]
    MalformedDateTime(String),

    /// A field held a value of the wrong wire type
    #[error("Invalid value for field '{field}': {message}")]
    InvalidField {
        /// Field name
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// The document as a whole could not be turned into an entity
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl SerializationError {
    /// Create an invalid-field error
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::MalformedDateTime(_) => "MALFORMED_DATETIME",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::InvalidDocument(_) => "INVALID_DOCUMENT",
        }
    }
}

impl IntoResponse for SerializationError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "Rejected request document");
        let status = StatusCode::BAD_REQUEST;
        (
            status,
            Json(ErrorResponse::with_code(status, self.code(), self.to_string())),
        )
            .into_response()
    }
}
