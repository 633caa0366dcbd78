//! Resource responses
//!
//! Every resource verb produces a [`ResourceResponse`]: a JSON body (or no
//! body), a status code and headers. [`unpack`] normalizes the shorthand
//! forms handlers return:
//!
//! - a bare body: status 200, no headers
//! - `(body, status)`: no headers
//! - `(body, status, headers)`: passed through
//!
//! Listings use [`ListResponse`] with [`PaginationMeta`].
//!
//! # Example
//!
//! ```rust
//! use acton_resources::resources::{unpack, NOT_FOUND_ERROR};
//! use axum::http::StatusCode;
//!
//! let response = unpack((NOT_FOUND_ERROR, StatusCode::NOT_FOUND));
//! assert_eq!(response.status, StatusCode::NOT_FOUND);
//! assert!(response.headers.is_empty());
//! ```

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serialization::Document;

/// Body returned when an entity or association does not exist
pub const NOT_FOUND_ERROR: &str = "Resource not found in the database!";

/// Body returned when creating through a property collection
pub const PROPERTY_POST_NOT_ALLOWED: &str = "POST not allowed for property resources";

/// Body returned for verbs a resource shape does not support
pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";

/// A normalized resource response
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResponse {
    /// JSON body; `None` sends no body at all
    pub body: Option<Value>,
    /// Status code
    pub status: StatusCode,
    /// Extra response headers
    pub headers: HeaderMap,
}

impl ResourceResponse {
    /// A response with a JSON body and status
    pub fn new(body: impl Into<Value>, status: StatusCode) -> Self {
        Self {
            body: Some(body.into()),
            status,
            headers: HeaderMap::new(),
        }
    }

    /// 200 with a JSON body
    pub fn ok(body: impl Into<Value>) -> Self {
        Self::new(body, StatusCode::OK)
    }

    /// 201 with the created document
    pub fn created(document: Document) -> Self {
        Self::new(document, StatusCode::CREATED)
    }

    /// 204 with no body
    pub fn no_content() -> Self {
        Self {
            body: None,
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
        }
    }

    /// 404 with the fixed not-found body
    pub fn not_found() -> Self {
        Self::new(NOT_FOUND_ERROR, StatusCode::NOT_FOUND)
    }

    /// 405 with a fixed message
    pub fn method_not_allowed(message: &'static str) -> Self {
        Self::new(message, StatusCode::METHOD_NOT_ALLOWED)
    }

    /// Add headers
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}

impl IntoResponse for ResourceResponse {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, self.headers, Json(body)).into_response(),
            None => (self.status, self.headers).into_response(),
        }
    }
}

/// Values that normalize into a [`ResourceResponse`]
pub trait IntoResourceResponse {
    /// Perform the normalization
    fn into_resource_response(self) -> ResourceResponse;
}

impl IntoResourceResponse for ResourceResponse {
    fn into_resource_response(self) -> ResourceResponse {
        self
    }
}

macro_rules! impl_into_resource_response {
    ($($body:ty),* $(,)?) => {
        $(
            impl IntoResourceResponse for $body {
                fn into_resource_response(self) -> ResourceResponse {
                    ResourceResponse::new(body_value(self), StatusCode::OK)
                }
            }

            impl IntoResourceResponse for ($body, StatusCode) {
                fn into_resource_response(self) -> ResourceResponse {
                    ResourceResponse::new(body_value(self.0), self.1)
                }
            }

            impl IntoResourceResponse for ($body, StatusCode, HeaderMap) {
                fn into_resource_response(self) -> ResourceResponse {
                    ResourceResponse::new(body_value(self.0), self.1).with_headers(self.2)
                }
            }
        )*
    };
}

impl_into_resource_response!(Value, Document, String, &'static str, ListResponse<Document>);

fn body_value<T: Serialize>(body: T) -> Value {
    serde_json::to_value(body).unwrap_or(Value::Null)
}

/// Normalize a handler result into (body, status, headers)
pub fn unpack(value: impl IntoResourceResponse) -> ResourceResponse {
    value.into_resource_response()
}

/// Pagination metadata for list responses
///
/// ```rust
/// use acton_resources::resources::PaginationMeta;
///
/// let pagination = PaginationMeta::new(2, 20, 50);
/// assert_eq!(pagination.total_pages, 3);
/// assert!(pagination.has_next);
/// assert!(pagination.has_prev);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationMeta {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: u64,
    /// Total number of pages
    pub total_pages: u32,
    /// Whether there is a next page
    pub has_next: bool,
    /// Whether there is a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    /// Create new pagination metadata
    ///
    /// Automatically calculates `total_pages`, `has_next`, and `has_prev`.
    #[must_use]
    pub fn new(page: u32, per_page: u32, total: u64) -> Self {
        let per_page = if per_page == 0 { 1 } else { per_page };
        let total_pages = calculate_total_pages(total, per_page);
        let has_next = page < total_pages;
        let has_prev = page > 1;

        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next,
            has_prev,
        }
    }

    /// Create pagination for an empty result set
    #[must_use]
    pub fn empty(per_page: u32) -> Self {
        Self::new(1, per_page, 0)
    }
}

/// Calculate total pages, rounding up
fn calculate_total_pages(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page);
    let pages = total.saturating_add(per_page).saturating_sub(1) / per_page;
    pages.min(u64::from(u32::MAX)) as u32
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResponse<T> {
    /// The items on this page
    pub data: Vec<T>,
    /// Pagination metadata
    pub pagination: PaginationMeta,
}

impl<T> ListResponse<T> {
    /// Create a new list response
    pub fn new(data: Vec<T>, pagination: PaginationMeta) -> Self {
        Self { data, pagination }
    }

    /// Create an empty list response
    pub fn empty(per_page: u32) -> Self {
        Self {
            data: Vec::new(),
            pagination: PaginationMeta::empty(per_page),
        }
    }

    /// Map each item in the list to a new type
    pub fn map<U, F>(self, f: F) -> ListResponse<U>
    where
        F: FnMut(T) -> U,
    {
        ListResponse {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}
