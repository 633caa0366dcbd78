//! REST resources over persisted entities
//!
//! Three resource shapes map HTTP verbs onto a [`Session`](crate::session::Session):
//!
//! - [`ModelResource`]: one entity type as a collection
//! - [`ToManyRelationResource`]: the children of a parent through a declared relation
//! - [`CollectionPropertyResource`]: a read-mostly collection derived from the parent
//!
//! Each shape is built with a [`ResourceBuilder`] and registered on an
//! [`Api`](crate::api::Api), which routes requests to
//! [`Resource::handle`] through the resource's decorators.

mod base;
mod error;
mod model;
mod query;
mod relation;
mod request;
mod response;

pub use base::{
    compose, BaseResource, CommitHook, Dispatch, RequestDecorator, Resource, ResourceBuilder,
};
pub use error::{ResourceError, ResourceResult};
pub use model::ModelResource;
pub use query::{
    parse_filter, query_from_request, ListLimits, ListQuery, SortOrder, DEFAULT_PER_PAGE,
    MAX_PER_PAGE,
};
pub use relation::{
    CollectionPropertyResource, CollectionSource, PropertyCollection, RelatedCollection,
    RelationLoading, RelationValue, ToManyRelation, ToManyRelationResource,
};
pub use request::ResourceRequest;
pub use response::{
    unpack, IntoResourceResponse, ListResponse, PaginationMeta, ResourceResponse,
    METHOD_NOT_ALLOWED, NOT_FOUND_ERROR, PROPERTY_POST_NOT_ALLOWED,
};
