//! Entity and session trait definitions
//!
//! A [`Session`] is the request-scoped unit of work the resource layer talks
//! to: it fetches, queries, stages adds and deletes, appends children to
//! relation collections and finally commits. Resources never hold a session
//! across requests; they obtain a fresh one from a [`SessionGetter`] at the
//! start of every verb.
//!
//! Like the rest of the crate, the traits use RPITIT
//! (Return Position Impl Trait In Traits) so implementations can be written
//! with plain `async fn`.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::error::SessionError;
use super::query::{EntityQuery, RelationScope};

/// Result type for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Deferred session resolution, invoked once per request
pub type SessionGetter<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// A primary key type
///
/// Keys travel as text in URL paths and as JSON values in documents, so both
/// conversions are required. `generate` is used by stores that allocate keys
/// from a sequence.
pub trait PrimaryKey:
    Clone + Eq + Hash + fmt::Display + FromStr + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Produce the key for the `sequence`-th row of a table
    fn generate(sequence: u64) -> Self;

    /// Parse a key from a path segment
    fn from_path(segment: &str) -> Option<Self> {
        segment.parse().ok()
    }

    /// Read a key embedded in a wire document
    ///
    /// Strings are parsed like path segments so `"7"` and `7` name the same
    /// row. `null` is treated as absent.
    fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::from_path(s),
            other => serde_json::from_value(other.clone()).ok(),
        }
    }
}

impl PrimaryKey for i64 {
    fn generate(sequence: u64) -> Self {
        i64::try_from(sequence).unwrap_or(i64::MAX)
    }
}

impl PrimaryKey for u64 {
    fn generate(sequence: u64) -> Self {
        sequence
    }
}

impl PrimaryKey for String {
    fn generate(sequence: u64) -> Self {
        sequence.to_string()
    }
}

impl PrimaryKey for uuid::Uuid {
    fn generate(_sequence: u64) -> Self {
        uuid::Uuid::now_v7()
    }
}

/// A persisted record type
///
/// # Example
///
/// ```rust
/// use acton_resources::session::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct User {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl Entity for User {
///     type Key = i64;
///     const NAME: &'static str = "user";
///
///     fn key(&self) -> Option<i64> {
///         self.id
///     }
///
///     fn set_key(&mut self, key: i64) {
///         self.id = Some(key);
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Primary key type
    type Key: PrimaryKey;

    /// Table / collection name
    const NAME: &'static str;

    /// Document field holding the primary key
    const KEY_FIELD: &'static str = "id";

    /// The primary key, if one has been assigned
    fn key(&self) -> Option<Self::Key>;

    /// Assign the primary key
    fn set_key(&mut self, key: Self::Key);
}

/// One page of query results plus the unpaginated total
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage<E> {
    /// The rows on this page
    pub items: Vec<E>,
    /// Number of rows matching the query before pagination
    pub total: u64,
}

impl<E> QueryPage<E> {
    /// Create a page
    pub fn new(items: Vec<E>, total: u64) -> Self {
        Self { items, total }
    }
}

/// A transactional unit of work
///
/// Staged work (`add`, `delete`, `append`) becomes durable only on
/// [`commit`](Session::commit). Reads observe staged work of the same session.
pub trait Session: Send {
    /// Fetch an entity by primary key
    fn get<E: Entity>(
        &mut self,
        key: &E::Key,
    ) -> impl Future<Output = SessionResult<Option<E>>> + Send;

    /// Lightweight existence probe that loads only the key
    fn exists<E: Entity>(&mut self, key: &E::Key) -> impl Future<Output = SessionResult<bool>> + Send;

    /// Run a filtered, optionally relation-scoped query
    fn query<E: Entity>(
        &mut self,
        query: &EntityQuery,
    ) -> impl Future<Output = SessionResult<QueryPage<E>>> + Send;

    /// Stage an insert or update, assigning a primary key if the entity has none
    fn add<E: Entity>(&mut self, entity: &mut E) -> impl Future<Output = SessionResult<()>> + Send;

    /// Stage a deletion
    fn delete<E: Entity>(&mut self, entity: &E) -> impl Future<Output = SessionResult<()>> + Send;

    /// True when the scope's parent exists and `key` is in its relation collection
    fn is_member<C: Entity>(
        &mut self,
        scope: &RelationScope,
        key: &C::Key,
    ) -> impl Future<Output = SessionResult<bool>> + Send;

    /// Stage appending `child` to the scope's relation collection
    fn append<C: Entity>(
        &mut self,
        scope: &RelationScope,
        child: &C,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    /// Push staged work to the store without ending the unit of work
    fn flush(&mut self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Make staged work durable
    fn commit(&mut self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Discard staged work
    fn rollback(&mut self) -> impl Future<Output = SessionResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_key_from_wire() {
        assert_eq!(i64::from_wire(&json!(7)), Some(7));
        assert_eq!(i64::from_wire(&json!("7")), Some(7));
        assert_eq!(i64::from_wire(&json!(null)), None);
        assert_eq!(i64::from_wire(&json!("seven")), None);
        assert_eq!(i64::from_wire(&json!({"id": 7})), None);
    }

    #[test]
    fn test_string_key_from_wire() {
        assert_eq!(String::from_wire(&json!("abc")), Some("abc".to_string()));
        assert_eq!(String::from_wire(&json!(null)), None);
    }

    #[test]
    fn test_key_generation() {
        assert_eq!(i64::generate(3), 3);
        assert_eq!(u64::generate(9), 9);
        assert_eq!(String::generate(12), "12");
        assert_ne!(uuid::Uuid::generate(1), uuid::Uuid::generate(1));
    }

    #[test]
    fn test_key_from_path() {
        assert_eq!(i64::from_path("42"), Some(42));
        assert_eq!(i64::from_path("4x2"), None);
        assert!(uuid::Uuid::from_path("not-a-uuid").is_none());
    }

    #[test]
    fn test_query_page() {
        let page = QueryPage::new(vec![1, 2], 10);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 10);
    }
}
