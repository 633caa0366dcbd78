//! Single-entity resource
//!
//! Serves one entity type as a collection:
//!
//! | verb | path | answer |
//! |---|---|---|
//! | `GET` | `/collection` | filtered, paginated listing |
//! | `GET` | `/collection/{id}` | the entity, or 404 |
//! | `POST` | `/collection` | 201 with the created entity |
//! | `PUT` | `/collection/{id}` | partial update (merge then reload), or 404 |
//! | `DELETE` | `/collection/{id}` | 204, or 404 |

use std::marker::PhantomData;

use axum::http::{Method, StatusCode};

use super::base::{parse_key, BaseResource, RequestDecorator, Resource, ResourceBuilder};
use super::error::ResourceResult;
use super::query::query_from_request;
use super::request::ResourceRequest;
use super::response::{unpack, ResourceResponse, METHOD_NOT_ALLOWED};
use crate::session::{Entity, Session};

/// REST resource over one entity type
pub struct ModelResource<E: Entity, S> {
    base: BaseResource<E, S>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: Session + 'static> ModelResource<E, S> {
    /// Start building a model resource
    pub fn builder() -> ResourceBuilder<E, S, Self> {
        ResourceBuilder::new(|base| Self {
            base,
            _entity: PhantomData,
        })
    }

    /// The shared resource machinery
    pub fn base(&self) -> &BaseResource<E, S> {
        &self.base
    }

    /// `GET`: one entity by key, or the filtered listing
    pub async fn get(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        let mut session = self.base.session();

        if request.id.is_none() {
            let list = query_from_request(&mut session, self.base.serializer(), request, None).await?;
            return Ok(unpack(list));
        }

        match self.fetch(&mut session, request).await? {
            Some(entity) => Ok(ResourceResponse::ok(self.base.dump(&entity)?)),
            None => Ok(ResourceResponse::not_found()),
        }
    }

    /// `PUT`: merge the request document over the stored entity and save
    pub async fn put(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        let changes = request.load_request_data()?;
        let mut session = self.base.session();

        let Some(existing) = self.fetch(&mut session, request).await? else {
            return Ok(ResourceResponse::not_found());
        };
        let saved = self.base.merge_and_save(&mut session, existing, changes).await?;
        Ok(ResourceResponse::ok(saved))
    }

    /// `DELETE`: remove the entity
    pub async fn delete(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        let mut session = self.base.session();

        let Some(existing) = self.fetch(&mut session, request).await? else {
            return Ok(ResourceResponse::not_found());
        };
        self.base.delete_entity(&mut session, &existing).await
    }

    /// `POST`: create from the request document
    pub async fn post(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        let document = request.load_request_data()?;
        let mut session = self.base.session();

        let saved = self.base.save_serialized(&mut session, document, None).await?;
        Ok(ResourceResponse::created(saved))
    }

    async fn fetch(&self, session: &mut S, request: &ResourceRequest) -> ResourceResult<Option<E>> {
        let Some(key) = parse_key::<E::Key>(request.id.as_deref()) else {
            tracing::debug!(entity = E::NAME, id = ?request.id, "Unparseable key");
            return Ok(None);
        };
        let entity = session.get::<E>(&key).await?;
        tracing::debug!(entity = E::NAME, id = %key, found = entity.is_some(), "Fetched entity");
        Ok(entity)
    }
}

impl<E: Entity, S: Session + 'static> Resource for ModelResource<E, S> {
    async fn handle(&self, request: ResourceRequest) -> ResourceResult<ResourceResponse> {
        match (&request.method, request.id.is_some()) {
            (&Method::GET, _) => self.get(&request).await,
            (&Method::POST, false) => self.post(&request).await,
            (&Method::PUT, true) => self.put(&request).await,
            (&Method::DELETE, true) => self.delete(&request).await,
            _ => Ok(ResourceResponse::new(METHOD_NOT_ALLOWED, StatusCode::METHOD_NOT_ALLOWED)),
        }
    }

    fn decorators(&self) -> &[RequestDecorator] {
        self.base.decorators()
    }
}
