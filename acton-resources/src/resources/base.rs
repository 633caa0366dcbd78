//! Shared resource machinery
//!
//! [`BaseResource`] owns what every resource shape needs: the entity
//! serializer, the session getter, the request decorators and the save/commit
//! protocol. The shapes ([`ModelResource`](super::ModelResource),
//! [`ToManyRelationResource`](super::ToManyRelationResource),
//! [`CollectionPropertyResource`](super::CollectionPropertyResource)) wrap one
//! and implement [`Resource::handle`].
//!
//! # Decorators
//!
//! A [`RequestDecorator`] receives the next [`Dispatch`] in the chain and
//! returns a new one. Decorators are applied in the order supplied, with the
//! first one outermost:
//!
//! ```rust,ignore
//! let users = ModelResource::<User, MemorySession>::builder()
//!     .serializer(ModelSerializer::new())
//!     .session(store.session_getter())
//!     .decorator(require_api_key)   // runs first
//!     .decorator(log_requests)      // runs second, then the resource
//!     .build()?;
//! ```
//!
//! # Saving
//!
//! [`BaseResource::save_model`] stages the entity first, so it already has
//! its key when the serializer's pre-commit hook runs. Any [`CommitHook`]s
//! run next with the open session. The entity is staged again to pick up
//! changes made by the hooks, then committed, then the serializer's
//! post-commit hook runs.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::error::{ResourceError, ResourceResult};
use super::request::ResourceRequest;
use super::response::ResourceResponse;
use crate::serialization::{Document, EntitySerializer, SaveMethod, SerializationError};
use crate::session::{Entity, PrimaryKey, Session, SessionGetter};

/// A resource's request handler, after decoration
pub type Dispatch =
    Arc<dyn Fn(ResourceRequest) -> BoxFuture<'static, ResourceResult<ResourceResponse>> + Send + Sync>;

/// Wraps a [`Dispatch`] with extra behavior (authentication, logging, ...)
pub type RequestDecorator = Arc<dyn Fn(Dispatch) -> Dispatch + Send + Sync>;

/// A resource shape that can answer requests
pub trait Resource: Send + Sync + 'static {
    /// Answer one request, selecting behavior by verb and path parameters
    fn handle(
        &self,
        request: ResourceRequest,
    ) -> impl Future<Output = ResourceResult<ResourceResponse>> + Send;

    /// Decorators to wrap around [`handle`](Resource::handle)
    fn decorators(&self) -> &[RequestDecorator];
}

/// Build the decorated dispatch chain for a resource
pub fn compose<R: Resource>(resource: Arc<R>) -> Dispatch {
    let decorators = resource.decorators().to_vec();
    let core: Dispatch = Arc::new(move |request: ResourceRequest| {
        let resource = Arc::clone(&resource);
        async move { resource.handle(request).await }.boxed()
    });
    decorators
        .into_iter()
        .rev()
        .fold(core, |next, decorator| decorator(next))
}

/// A pre-commit step that needs the open session
///
/// Runs after the serializer's pre-commit hook, with the entity staged. It may
/// read through the session and modify the entity; an error aborts the save
/// before anything is committed.
///
/// ```rust,ignore
/// struct UniqueEmail;
///
/// impl CommitHook<User, MemorySession> for UniqueEmail {
///     async fn before_commit(
///         &self,
///         session: &mut MemorySession,
///         user: &mut User,
///         _method: SaveMethod,
///     ) -> ResourceResult<()> {
///         let taken = session
///             .query::<User>(&EntityQuery::new().filter(FilterCondition::eq("email", user.email.clone())))
///             .await?;
///         if taken.items.iter().any(|other| other.id != user.id) {
///             return Err(ResourceError::BadRequest("email already registered".into()));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait CommitHook<E: Entity, S: Session>: Send + Sync + 'static {
    /// Inspect or adjust `entity` before it is committed
    fn before_commit(
        &self,
        session: &mut S,
        entity: &mut E,
        method: SaveMethod,
    ) -> impl Future<Output = ResourceResult<()>> + Send;
}

trait ErasedCommitHook<E, S>: Send + Sync {
    fn run<'a>(
        &'a self,
        session: &'a mut S,
        entity: &'a mut E,
        method: SaveMethod,
    ) -> BoxFuture<'a, ResourceResult<()>>;
}

impl<E: Entity, S: Session, H: CommitHook<E, S>> ErasedCommitHook<E, S> for H {
    fn run<'a>(
        &'a self,
        session: &'a mut S,
        entity: &'a mut E,
        method: SaveMethod,
    ) -> BoxFuture<'a, ResourceResult<()>> {
        self.before_commit(session, entity, method).boxed()
    }
}

/// Parse a path parameter into a key; unparseable keys name nothing
pub(crate) fn parse_key<K: PrimaryKey>(raw: Option<&str>) -> Option<K> {
    raw.and_then(K::from_path)
}

/// Serializer, session getter and save protocol shared by all resource shapes
pub struct BaseResource<E: Entity, S> {
    serializer: Arc<dyn EntitySerializer<E>>,
    session_getter: SessionGetter<S>,
    decorators: Vec<RequestDecorator>,
    commit_hooks: Vec<Arc<dyn ErasedCommitHook<E, S>>>,
}

impl<E: Entity, S> fmt::Debug for BaseResource<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseResource")
            .field("entity", &E::NAME)
            .field("decorators", &self.decorators.len())
            .field("commit_hooks", &self.commit_hooks.len())
            .finish()
    }
}

impl<E: Entity, S: Session> BaseResource<E, S> {
    /// Open the session for this request
    pub fn session(&self) -> S {
        (self.session_getter)()
    }

    /// The entity serializer
    pub fn serializer(&self) -> &dyn EntitySerializer<E> {
        self.serializer.as_ref()
    }

    /// Request decorators, outermost first
    pub fn decorators(&self) -> &[RequestDecorator] {
        &self.decorators
    }

    /// Dump an entity
    pub fn dump(&self, entity: &E) -> ResourceResult<Document> {
        Ok(self.serializer.dump(entity)?)
    }

    /// Create an entity from the request body
    ///
    /// `extra` fields are written over the loaded entity directly, bypassing
    /// the serializer's read-only rules; this is how a parent's foreign key is
    /// injected. One commit, no lifecycle hooks.
    pub async fn save_from_request(
        &self,
        session: &mut S,
        request: &ResourceRequest,
        extra: Document,
    ) -> ResourceResult<Document> {
        let mut entity = self.serializer.load(request.load_request_data()?, None)?;
        if !extra.is_empty() {
            entity = override_fields(&entity, extra)?;
        }
        session.add(&mut entity).await?;
        session.commit().await?;
        tracing::info!(entity = E::NAME, "Created entity from request");
        self.dump(&entity)
    }

    /// Persist an entity with the hooks for `method` around the commit
    ///
    /// Order: stage, serializer pre-commit hook, [`CommitHook`]s, stage
    /// again, commit, serializer post-commit hook.
    pub async fn save_model(
        &self,
        session: &mut S,
        entity: &mut E,
        method: SaveMethod,
    ) -> ResourceResult<()> {
        session.add(entity).await?;
        self.serializer.before_commit(entity, method);
        for hook in &self.commit_hooks {
            hook.run(session, entity, method).await?;
        }
        // Hooks may have changed the staged entity
        session.add(entity).await?;
        session.commit().await?;
        self.serializer.after_commit(entity, method);

        tracing::info!(
            entity = E::NAME,
            id = ?entity.key().map(|k| k.to_string()),
            %method,
            "Committed entity"
        );
        Ok(())
    }

    /// Load `document` (into `existing` when updating) and save it
    ///
    /// The save is an update exactly when `existing` is given.
    pub async fn save_serialized(
        &self,
        session: &mut S,
        document: Document,
        existing: Option<E>,
    ) -> ResourceResult<Document> {
        let method = if existing.is_some() {
            SaveMethod::Update
        } else {
            SaveMethod::Create
        };
        let mut entity = self.serializer.load(document, existing)?;
        self.save_model(session, &mut entity, method).await?;
        self.dump(&entity)
    }

    /// Partial update: dump `existing`, overlay `changes`, reload and save
    pub async fn merge_and_save(
        &self,
        session: &mut S,
        existing: E,
        changes: Document,
    ) -> ResourceResult<Document> {
        let mut document = self.dump(&existing)?;
        document.extend(changes);
        self.save_serialized(session, document, Some(existing)).await
    }

    /// Delete, flush and commit; answers 204
    pub async fn delete_entity(&self, session: &mut S, entity: &E) -> ResourceResult<ResourceResponse> {
        session.delete(entity).await?;
        session.flush().await?;
        session.commit().await?;
        tracing::info!(
            entity = E::NAME,
            id = ?entity.key().map(|k| k.to_string()),
            "Deleted entity"
        );
        Ok(ResourceResponse::no_content())
    }
}

fn override_fields<E: Entity>(entity: &E, extra: Document) -> ResourceResult<E> {
    let mut value = serde_json::to_value(entity)
        .map_err(|e| SerializationError::InvalidDocument(e.to_string()))?;
    if let Value::Object(fields) = &mut value {
        fields.extend(extra);
    }
    Ok(serde_json::from_value(value).map_err(|e| SerializationError::InvalidDocument(e.to_string()))?)
}

/// Builder for resources
///
/// Obtained from a resource shape's `builder()`. Both a serializer and a
/// session getter are required; [`build`](ResourceBuilder::build) fails with
/// [`ResourceError::SerializerConfiguration`] otherwise.
pub struct ResourceBuilder<E: Entity, S, R> {
    serializer: Option<Arc<dyn EntitySerializer<E>>>,
    session_getter: Option<SessionGetter<S>>,
    decorators: Vec<RequestDecorator>,
    commit_hooks: Vec<Arc<dyn ErasedCommitHook<E, S>>>,
    assemble: Box<dyn FnOnce(BaseResource<E, S>) -> R + Send>,
}

impl<E: Entity, S: Session, R> ResourceBuilder<E, S, R> {
    pub(crate) fn new(assemble: impl FnOnce(BaseResource<E, S>) -> R + Send + 'static) -> Self {
        Self {
            serializer: None,
            session_getter: None,
            decorators: Vec::new(),
            commit_hooks: Vec::new(),
            assemble: Box::new(assemble),
        }
    }

    /// Set the entity serializer
    #[must_use]
    pub fn serializer(mut self, serializer: impl EntitySerializer<E>) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    /// Set a serializer shared with other resources
    #[must_use]
    pub fn shared_serializer(mut self, serializer: Arc<dyn EntitySerializer<E>>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Set the session getter, invoked once per request
    #[must_use]
    pub fn session(mut self, getter: SessionGetter<S>) -> Self {
        self.session_getter = Some(getter);
        self
    }

    /// Set the session getter from a closure
    #[must_use]
    pub fn session_fn(self, getter: impl Fn() -> S + Send + Sync + 'static) -> Self {
        self.session(Arc::new(getter))
    }

    /// Append a request decorator
    #[must_use]
    pub fn decorator(mut self, decorator: impl Fn(Dispatch) -> Dispatch + Send + Sync + 'static) -> Self {
        self.decorators.push(Arc::new(decorator));
        self
    }

    /// Append a session-aware pre-commit step, run in the order added
    #[must_use]
    pub fn commit_hook(mut self, hook: impl CommitHook<E, S>) -> Self {
        self.commit_hooks.push(Arc::new(hook));
        self
    }

    /// Finish the resource
    pub fn build(self) -> ResourceResult<R> {
        let serializer = self.serializer.ok_or_else(|| {
            ResourceError::SerializerConfiguration(format!(
                "no entity serializer configured for {}",
                E::NAME
            ))
        })?;
        let session_getter = self.session_getter.ok_or_else(|| {
            ResourceError::SerializerConfiguration(format!(
                "no session getter configured for {}",
                E::NAME
            ))
        })?;
        Ok((self.assemble)(BaseResource {
            serializer,
            session_getter,
            decorators: self.decorators,
            commit_hooks: self.commit_hooks,
        }))
    }
}
