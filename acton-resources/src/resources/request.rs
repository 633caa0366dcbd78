//! Request context handed to resources

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use serde_json::Value;

use super::error::{ResourceError, ResourceResult};
use super::query::ListLimits;
use crate::serialization::Document;

/// One HTTP call as seen by a resource
///
/// Built by [`Api`](crate::api::Api) from the incoming request, or by hand in
/// tests.
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    /// HTTP verb
    pub method: Method,
    /// Parent key from the path, for relation and property resources
    pub relation_id: Option<String>,
    /// Entity key from the path
    pub id: Option<String>,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    /// Request headers
    pub headers: HeaderMap,
    /// Raw request body
    pub body: Bytes,
    /// Page size limits for listings
    pub limits: ListLimits,
}

impl ResourceRequest {
    /// Create a request for `method` with no parameters and no body
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Set the entity key path parameter
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the parent key path parameter
    #[must_use]
    pub fn with_relation_id(mut self, relation_id: impl Into<String>) -> Self {
        self.relation_id = Some(relation_id.into());
        self
    }

    /// Set the raw query string
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set a JSON body
    #[must_use]
    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Set a form-encoded body
    #[must_use]
    pub fn with_form(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self
    }

    /// Set the listing limits
    #[must_use]
    pub fn with_limits(mut self, limits: ListLimits) -> Self {
        self.limits = limits;
        self
    }

    fn is_form(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
    }

    /// Read the body as a wire document
    ///
    /// A non-empty body is parsed as a JSON object unless the request declares
    /// form encoding, in which case the form pairs become string fields. An
    /// empty body yields an empty document.
    pub fn load_request_data(&self) -> ResourceResult<Document> {
        if self.body.is_empty() {
            return Ok(Document::new());
        }

        if self.is_form() {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&self.body)
                .map_err(|e| ResourceError::BadRequest(format!("Invalid form body: {}", e)))?;
            return Ok(pairs
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect());
        }

        match serde_json::from_slice(&self.body) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(other) => Err(ResourceError::BadRequest(format!(
                "Expected a JSON object, found {}",
                json_type(&other)
            ))),
            Err(e) => Err(ResourceError::BadRequest(format!("Invalid JSON body: {}", e))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
