//! # acton-resources
//!
//! REST resources over persisted entities: HTTP verbs mapped onto a
//! unit-of-work session, with pluggable serializers and request decorators.
//!
//! ## Features
//!
//! - **Resource shapes**: single entities, to-many relations of a parent, and
//!   collections derived from a parent's properties
//! - **Membership checks**: a child is only reachable through a parent it belongs to
//! - **Serializers**: serde-driven entity serializers with per-field converters
//!   (ISO-8601 datetimes with offsets) and commit hooks
//! - **Listings**: filter, sort and paginate from the query string
//! - **Sessions**: a [`Session`](session::Session) trait plus an in-memory store
//! - **Server**: axum router, tower-http middleware, graceful shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_resources::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Employee {
//!     id: Option<i64>,
//!     name: String,
//!     admission: Option<WireDateTime>,
//! }
//!
//! impl Entity for Employee {
//!     type Key = i64;
//!     const NAME: &'static str = "employee";
//!
//!     fn key(&self) -> Option<i64> {
//!         self.id
//!     }
//!
//!     fn set_key(&mut self, key: i64) {
//!         self.id = Some(key);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let store = MemoryStore::new();
//!     let employees = ModelResource::<Employee, MemorySession>::builder()
//!         .serializer(ModelSerializer::<Employee>::new().field("admission", DateTimeSerializer))
//!         .session(store.session_getter())
//!         .build()?;
//!
//!     let api = Api::from_config(&config).add_model("/employees", employees)?;
//!
//!     Server::new(config).serve(api.into_router()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod resources;
pub mod serialization;
pub mod server;
pub mod session;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::Api;
    pub use crate::config::{Config, ResourcesConfig, ServiceConfig};
    pub use crate::error::{Error, ErrorResponse, Result};
    pub use crate::observability::init_tracing;
    pub use crate::resources::{
        unpack, CollectionPropertyResource, CommitHook, Dispatch, ListLimits, ListQuery, ListResponse,
        ModelResource, PaginationMeta, PropertyCollection, RelationValue, RequestDecorator,
        Resource, ResourceError, ResourceRequest, ResourceResponse, ResourceResult,
        SortOrder, ToManyRelation, ToManyRelationResource, NOT_FOUND_ERROR,
        PROPERTY_POST_NOT_ALLOWED,
    };
    pub use crate::serialization::{
        DateTimeSerializer, Document, EntitySerializer, ModelSerializer, SaveMethod,
        SerializationError, Serializer, WireDateTime,
    };
    pub use crate::server::Server;
    pub use crate::session::{
        Entity, EntityQuery, FilterCondition, FilterOperator, FilterValue, MemorySession,
        MemoryStore, OrderDirection, Pagination, PrimaryKey, RelationScope, Session,
        SessionError, SessionGetter,
    };

    pub use axum::Router;
}
