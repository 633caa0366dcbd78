//! Persistence sessions
//!
//! The resource layer never talks to a store directly. It asks a
//! [`SessionGetter`] for a request-scoped [`Session`] (a unit of work) and
//! drives it through fetches, queries, staged writes and a final commit.
//!
//! # Features
//!
//! - **Entities**: [`Entity`] and [`PrimaryKey`] describe persisted record types
//! - **Unit of work**: [`Session`] stages adds, deletes and relation appends until commit
//! - **Filtering**: [`FilterCondition`] and [`EntityQuery`] for list queries
//! - **Relations**: [`RelationScope`] restricts a query to one parent's collection
//! - **In-memory store**: [`MemoryStore`] for tests and prototypes
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_resources::session::{MemoryStore, Session};
//!
//! let store = MemoryStore::new();
//! let mut session = store.session();
//! let mut user = User { id: None, name: "Alice".into() };
//! session.add(&mut user).await?;
//! session.commit().await?;
//! assert_eq!(user.id, Some(1));
//! ```

mod error;
mod memory;
mod query;
mod traits;

pub use error::{SessionError, SessionErrorKind, SessionOperation};
pub use memory::{MemorySession, MemoryStore};
pub use query::{
    order_values, EntityQuery, FilterCondition, FilterOperator, FilterValue, OrderDirection,
    Pagination, RelationScope,
};
pub use traits::{Entity, PrimaryKey, QueryPage, Session, SessionGetter, SessionResult};
