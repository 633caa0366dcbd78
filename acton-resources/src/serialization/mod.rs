//! Wire documents and the serializers that produce them
//!
//! - [`Serializer`]: one native value to one wire value and back
//! - [`EntitySerializer`]: a whole entity to a [`Document`] and back, plus
//!   commit hooks
//! - [`ModelSerializer`]: the serde-driven entity serializer
//! - [`DateTimeSerializer`]: ISO-8601 datetimes with optional offsets

mod coerce;
mod error;
mod model;
mod serializer;

pub use error::{SerializationError, SerializationResult};
pub use model::{EntitySerializer, ModelSerializer, SaveMethod};
pub use serializer::{DateTimeSerializer, FieldSerializer, Serializer, WireDateTime};

/// A wire document: field name to JSON value
pub type Document = serde_json::Map<String, serde_json::Value>;
