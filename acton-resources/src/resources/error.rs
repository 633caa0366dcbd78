//! Resource layer errors
//!
//! Missing entities and rejected verbs are ordinary responses, not errors.
//! What ends up here is configuration mistakes, undecodable input and
//! persistence failures, all of which are rendered by [`IntoResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::error::ErrorResponse;
use crate::serialization::SerializationError;
use crate::session::SessionError;

/// Result type for resource operations
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;

/// Errors raised while building or running a resource
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A resource was built without a serializer or session provider
    #[error("Serializer configuration error: {0}")]
    SerializerConfiguration(String),

    /// Wire conversion failed
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The session reported a failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The request could not be interpreted (body encoding, query string)
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ResourceError {
    fn into_response(self) -> Response {
        match self {
            Self::Serialization(e) => e.into_response(),
            Self::Session(e) => e.into_response(),
            Self::BadRequest(message) => {
                tracing::debug!(%message, "Rejected request");
                let status = StatusCode::BAD_REQUEST;
                (
                    status,
                    Json(ErrorResponse::with_code(status, "BAD_REQUEST", message)),
                )
                    .into_response()
            }
            Self::SerializerConfiguration(message) => {
                tracing::error!(%message, "Resource misconfigured");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (
                    status,
                    Json(ErrorResponse::with_code(
                        status,
                        "SERIALIZER_CONFIGURATION",
                        "Internal server error",
                    )),
                )
                    .into_response()
            }
        }
    }
}
