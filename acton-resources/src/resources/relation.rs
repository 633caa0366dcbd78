//! Relation and property collection resources
//!
//! Both resources serve children of one parent entity under
//! `/parent/{relation_id}/children[/{id}]`. They differ in where the child
//! collection comes from, which is captured by a [`CollectionSource`]:
//!
//! - [`ToManyRelation`]: a declared relation whose membership the session
//!   tracks (children can be created in and attached to it)
//! - [`PropertyCollection`]: any function of the parent yielding children;
//!   read-only for creation
//!
//! Every lookup of a single child goes through the source's membership
//! check: a child that exists but does not belong to the named parent is
//! answered with 404.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Once};

use axum::http::{Method, StatusCode};
use serde_json::Value;

use super::base::{parse_key, BaseResource, RequestDecorator, Resource, ResourceBuilder};
use super::error::ResourceResult;
use super::query::query_from_request;
use super::request::ResourceRequest;
use super::response::{unpack, ResourceResponse, METHOD_NOT_ALLOWED, PROPERTY_POST_NOT_ALLOWED};
use crate::serialization::SaveMethod;
use crate::session::{
    Entity, EntityQuery, FilterCondition, FilterOperator, FilterValue, PrimaryKey, RelationScope,
    Session, SessionResult,
};

/// The value of a relation on one parent
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue<C> {
    /// Already loaded; cannot be filtered or paginated by the store
    Materialized(Vec<C>),
    /// A query the session can filter and paginate
    Query(EntityQuery),
}

/// Where a parent's child collection comes from
pub trait CollectionSource<P: Entity, C: Entity>: Send + Sync + 'static {
    /// Human-readable name used in log messages
    fn describe(&self) -> String;

    /// Hint logged when the collection had to be dumped unfiltered
    fn materialized_hint(&self) -> String;

    /// The parent's collection, or `None` when the parent does not exist
    fn collection<S: Session>(
        &self,
        session: &mut S,
        parent_key: &P::Key,
    ) -> impl Future<Output = SessionResult<Option<RelationValue<C>>>> + Send;

    /// Whether the parent exists and `key` is in its collection
    fn contains<S: Session>(
        &self,
        session: &mut S,
        parent_key: &P::Key,
        key: &C::Key,
    ) -> impl Future<Output = SessionResult<bool>> + Send;
}

/// How a [`ToManyRelation`] yields its collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationLoading {
    /// As a query; listings are filtered and paginated by the session
    #[default]
    Dynamic,
    /// As a loaded list; listings dump every member
    Eager,
}

/// A declared to-many relation from `P` to `C`
pub struct ToManyRelation<P, C> {
    name: &'static str,
    loading: RelationLoading,
    _types: PhantomData<fn() -> (P, C)>,
}

impl<P: Entity, C: Entity> ToManyRelation<P, C> {
    /// The relation `name` on `P`, loaded dynamically
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            loading: RelationLoading::Dynamic,
            _types: PhantomData,
        }
    }

    /// Load the relation eagerly
    #[must_use]
    pub fn eager(mut self) -> Self {
        self.loading = RelationLoading::Eager;
        self
    }

    /// Relation name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The membership scope for one parent
    pub fn scope(&self, parent_key: &P::Key) -> RelationScope {
        RelationScope::new(P::NAME, self.name, parent_key.to_string())
    }
}

impl<P, C> fmt::Debug for ToManyRelation<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToManyRelation")
            .field("name", &self.name)
            .field("loading", &self.loading)
            .finish()
    }
}

impl<P: Entity, C: Entity> CollectionSource<P, C> for ToManyRelation<P, C> {
    fn describe(&self) -> String {
        format!("{}.{}", P::NAME, self.name)
    }

    fn materialized_hint(&self) -> String {
        format!(
            "relationship {} does not support pagination nor filter; load it dynamically",
            self.describe()
        )
    }

    async fn collection<S: Session>(
        &self,
        session: &mut S,
        parent_key: &P::Key,
    ) -> SessionResult<Option<RelationValue<C>>> {
        if !session.exists::<P>(parent_key).await? {
            return Ok(None);
        }
        let query = EntityQuery::new().within(self.scope(parent_key));
        match self.loading {
            RelationLoading::Dynamic => Ok(Some(RelationValue::Query(query))),
            RelationLoading::Eager => {
                let page = session.query::<C>(&query).await?;
                Ok(Some(RelationValue::Materialized(page.items)))
            }
        }
    }

    async fn contains<S: Session>(
        &self,
        session: &mut S,
        parent_key: &P::Key,
        key: &C::Key,
    ) -> SessionResult<bool> {
        session.is_member::<C>(&self.scope(parent_key), key).await
    }
}

type PropertyFn<P, C> = Arc<dyn Fn(&P) -> RelationValue<C> + Send + Sync>;

/// A collection derived from an arbitrary property of the parent
///
/// ```rust,ignore
/// let active = PropertyCollection::<Department, Employee>::new("active_employees", |dept| {
///     RelationValue::Query(
///         EntityQuery::new()
///             .filter(FilterCondition::eq("department_id", dept.id.unwrap_or_default()))
///             .filter(FilterCondition::is_null("left_at")),
///     )
/// });
/// ```
pub struct PropertyCollection<P, C> {
    name: &'static str,
    property: PropertyFn<P, C>,
}

impl<P: Entity, C: Entity> PropertyCollection<P, C> {
    /// A property called `name` computed by `property`
    pub fn new(
        name: &'static str,
        property: impl Fn(&P) -> RelationValue<C> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            property: Arc::new(property),
        }
    }

    /// Property name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<P, C> fmt::Debug for PropertyCollection<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCollection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Equality condition on `C`'s key field
fn key_condition<C: Entity>(key: &C::Key) -> FilterCondition {
    let value = match serde_json::to_value(key) {
        Ok(Value::Number(n)) => match n.as_i64() {
            Some(i) => FilterValue::Integer(i),
            None => FilterValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Ok(Value::String(s)) => FilterValue::String(s),
        _ => FilterValue::String(key.to_string()),
    };
    FilterCondition::new(C::KEY_FIELD, FilterOperator::Equal, value)
}

impl<P: Entity, C: Entity> CollectionSource<P, C> for PropertyCollection<P, C> {
    fn describe(&self) -> String {
        format!("{}.{}", P::NAME, self.name)
    }

    fn materialized_hint(&self) -> String {
        format!(
            "property {} does not support pagination nor filter; make it return a query",
            self.describe()
        )
    }

    async fn collection<S: Session>(
        &self,
        session: &mut S,
        parent_key: &P::Key,
    ) -> SessionResult<Option<RelationValue<C>>> {
        Ok(session
            .get::<P>(parent_key)
            .await?
            .map(|parent| (self.property)(&parent)))
    }

    async fn contains<S: Session>(
        &self,
        session: &mut S,
        parent_key: &P::Key,
        key: &C::Key,
    ) -> SessionResult<bool> {
        let Some(parent) = session.get::<P>(parent_key).await? else {
            return Ok(false);
        };
        match (self.property)(&parent) {
            RelationValue::Materialized(items) => {
                Ok(items.iter().any(|item| item.key().as_ref() == Some(key)))
            }
            RelationValue::Query(query) => {
                let page = session
                    .query::<C>(&query.filter(key_condition::<C>(key)))
                    .await?;
                Ok(page.total > 0)
            }
        }
    }
}

/// Membership-checked access to a parent's child collection
///
/// Shared by both relation-shaped resources; holds the one-time warning
/// state for unfiltered listings.
pub struct RelatedCollection<P, C, Src> {
    source: Src,
    materialized_warning: Once,
    _types: PhantomData<fn() -> (P, C)>,
}

impl<P: Entity, C: Entity, Src: CollectionSource<P, C>> RelatedCollection<P, C, Src> {
    /// Wrap a collection source
    pub fn new(source: Src) -> Self {
        Self {
            source,
            materialized_warning: Once::new(),
            _types: PhantomData,
        }
    }

    /// The collection source
    pub fn source(&self) -> &Src {
        &self.source
    }

    /// The child `id` if it belongs to parent `relation_id`
    ///
    /// `None` when either key is unparseable, the parent does not exist or
    /// the child is not a member of the parent's collection.
    pub async fn resolve_related<S: Session>(
        &self,
        session: &mut S,
        relation_id: Option<&str>,
        id: Option<&str>,
    ) -> ResourceResult<Option<C>> {
        let (Some(parent_key), Some(key)) = (
            parse_key::<P::Key>(relation_id),
            parse_key::<C::Key>(id),
        ) else {
            return Ok(None);
        };
        if !self.source.contains(session, &parent_key, &key).await? {
            tracing::debug!(
                relation = %self.source.describe(),
                parent = %parent_key,
                id = %key,
                "Child is not a member of the parent's collection"
            );
            return Ok(None);
        }
        let child = session.get::<C>(&key).await?;
        tracing::debug!(relation = %self.source.describe(), id = %key, "Membership confirmed");
        Ok(child)
    }

    /// List the parent's collection, or `None` when the parent does not exist
    pub async fn list<S: Session>(
        &self,
        base: &BaseResource<C, S>,
        session: &mut S,
        request: &ResourceRequest,
    ) -> ResourceResult<Option<ResourceResponse>> {
        let Some(parent_key) = parse_key::<P::Key>(request.relation_id.as_deref()) else {
            return Ok(None);
        };
        let Some(value) = self.source.collection(session, &parent_key).await? else {
            return Ok(None);
        };

        match value {
            RelationValue::Materialized(items) => {
                self.materialized_warning.call_once(|| {
                    tracing::warn!(
                        relation = %self.source.describe(),
                        "{}",
                        self.source.materialized_hint()
                    );
                });
                let documents = items
                    .iter()
                    .map(|item| base.dump(item).map(Value::Object))
                    .collect::<ResourceResult<Vec<_>>>()?;
                Ok(Some(unpack(Value::Array(documents))))
            }
            RelationValue::Query(query) => {
                let list =
                    query_from_request(session, base.serializer(), request, Some(query)).await?;
                Ok(Some(unpack(list)))
            }
        }
    }

    /// `GET` with or without a child id
    pub async fn get<S: Session>(
        &self,
        base: &BaseResource<C, S>,
        request: &ResourceRequest,
    ) -> ResourceResult<ResourceResponse> {
        let mut session = base.session();

        if request.id.is_none() {
            return Ok(self
                .list(base, &mut session, request)
                .await?
                .unwrap_or_else(ResourceResponse::not_found));
        }

        match self
            .resolve_related(&mut session, request.relation_id.as_deref(), request.id.as_deref())
            .await?
        {
            Some(child) => Ok(unpack((base.dump(&child)?, StatusCode::OK))),
            None => Ok(ResourceResponse::not_found()),
        }
    }

    /// `PUT`: merge-then-reload on a member child
    pub async fn put<S: Session>(
        &self,
        base: &BaseResource<C, S>,
        request: &ResourceRequest,
    ) -> ResourceResult<ResourceResponse> {
        let changes = request.load_request_data()?;
        let mut session = base.session();

        let Some(existing) = self
            .resolve_related(&mut session, request.relation_id.as_deref(), request.id.as_deref())
            .await?
        else {
            return Ok(ResourceResponse::not_found());
        };
        let saved = base.merge_and_save(&mut session, existing, changes).await?;
        Ok(unpack((saved, StatusCode::OK)))
    }

    /// `DELETE` on a member child
    pub async fn delete<S: Session>(
        &self,
        base: &BaseResource<C, S>,
        request: &ResourceRequest,
    ) -> ResourceResult<ResourceResponse> {
        let mut session = base.session();

        let Some(existing) = self
            .resolve_related(&mut session, request.relation_id.as_deref(), request.id.as_deref())
            .await?
        else {
            return Ok(ResourceResponse::not_found());
        };
        base.delete_entity(&mut session, &existing).await
    }
}

/// REST resource over the children of a [`ToManyRelation`]
///
/// `POST` either creates a child in the collection (201, create hooks run)
/// or, when the document carries the key of an existing child, attaches that
/// child (200, no hooks).
pub struct ToManyRelationResource<P: Entity, C: Entity, S> {
    base: BaseResource<C, S>,
    related: RelatedCollection<P, C, ToManyRelation<P, C>>,
}

impl<P: Entity, C: Entity, S: Session + 'static> ToManyRelationResource<P, C, S> {
    /// Start building a resource over `relation`
    pub fn builder(relation: ToManyRelation<P, C>) -> ResourceBuilder<C, S, Self> {
        ResourceBuilder::new(move |base| Self {
            base,
            related: RelatedCollection::new(relation),
        })
    }

    /// The shared resource machinery
    pub fn base(&self) -> &BaseResource<C, S> {
        &self.base
    }

    /// `POST`: create a child in, or attach an existing child to, the collection
    pub async fn post(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        let mut session = self.base.session();

        let Some(parent_key) = parse_key::<P::Key>(request.relation_id.as_deref()) else {
            return Ok(ResourceResponse::not_found());
        };
        if !session.exists::<P>(&parent_key).await? {
            return Ok(ResourceResponse::not_found());
        }
        let scope = self.related.source().scope(&parent_key);
        let document = request.load_request_data()?;

        if let Some(reference) = document.get(C::KEY_FIELD).filter(|v| !v.is_null()) {
            return self
                .append_existing(&mut session, &scope, C::Key::from_wire(reference))
                .await;
        }

        let mut child = self.base.serializer().load(document, None)?;
        session.add(&mut child).await?;
        session.append(&scope, &child).await?;
        self.base
            .save_model(&mut session, &mut child, SaveMethod::Create)
            .await?;
        Ok(unpack((self.base.dump(&child)?, StatusCode::CREATED)))
    }

    /// Attach an existing child by key; 404 if there is no such child
    pub async fn append_existing(
        &self,
        session: &mut S,
        scope: &RelationScope,
        key: Option<C::Key>,
    ) -> ResourceResult<ResourceResponse> {
        let child = match key {
            Some(key) => session.get::<C>(&key).await?,
            None => None,
        };
        let Some(child) = child else {
            return Ok(ResourceResponse::not_found());
        };
        session.append(scope, &child).await?;
        session.commit().await?;
        tracing::info!(
            relation = %scope,
            id = ?child.key().map(|k| k.to_string()),
            "Attached existing entity"
        );
        Ok(unpack((self.base.dump(&child)?, StatusCode::OK)))
    }
}

impl<P: Entity, C: Entity, S: Session + 'static> Resource for ToManyRelationResource<P, C, S> {
    async fn handle(&self, request: ResourceRequest) -> ResourceResult<ResourceResponse> {
        match (&request.method, request.id.is_some()) {
            (&Method::GET, _) => self.related.get(&self.base, &request).await,
            (&Method::POST, false) => self.post(&request).await,
            (&Method::PUT, true) => self.related.put(&self.base, &request).await,
            (&Method::DELETE, true) => self.related.delete(&self.base, &request).await,
            _ => Ok(ResourceResponse::method_not_allowed(METHOD_NOT_ALLOWED)),
        }
    }

    fn decorators(&self) -> &[RequestDecorator] {
        self.base.decorators()
    }
}

/// REST resource over a [`PropertyCollection`]
///
/// Reads, updates and deletes go through the property's membership; `POST`
/// is always answered with 405.
pub struct CollectionPropertyResource<P: Entity, C: Entity, S> {
    base: BaseResource<C, S>,
    related: RelatedCollection<P, C, PropertyCollection<P, C>>,
}

impl<P: Entity, C: Entity, S: Session + 'static> CollectionPropertyResource<P, C, S> {
    /// Start building a resource over `property`
    pub fn builder(property: PropertyCollection<P, C>) -> ResourceBuilder<C, S, Self> {
        ResourceBuilder::new(move |base| Self {
            base,
            related: RelatedCollection::new(property),
        })
    }

    /// The shared resource machinery
    pub fn base(&self) -> &BaseResource<C, S> {
        &self.base
    }

    /// `POST` is not supported on derived collections
    pub fn post(&self) -> ResourceResponse {
        ResourceResponse::method_not_allowed(PROPERTY_POST_NOT_ALLOWED)
    }
}

impl<P: Entity, C: Entity, S: Session + 'static> Resource for CollectionPropertyResource<P, C, S> {
    async fn handle(&self, request: ResourceRequest) -> ResourceResult<ResourceResponse> {
        match (&request.method, request.id.is_some()) {
            (&Method::GET, _) => self.related.get(&self.base, &request).await,
            (&Method::POST, _) => Ok(self.post()),
            (&Method::PUT, true) => self.related.put(&self.base, &request).await,
            (&Method::DELETE, true) => self.related.delete(&self.base, &request).await,
            _ => Ok(ResourceResponse::method_not_allowed(METHOD_NOT_ALLOWED)),
        }
    }

    fn decorators(&self) -> &[RequestDecorator] {
        self.base.decorators()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{Document, EntitySerializer, ModelSerializer, SerializationResult};
    use crate::session::{MemorySession, MemoryStore};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Company {
        id: Option<i64>,
        name: String,
    }

    impl Entity for Company {
        type Key = i64;
        const NAME: &'static str = "company";

        fn key(&self) -> Option<i64> {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = Some(key);
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Employee {
        id: Option<i64>,
        name: String,
        #[serde(default)]
        company_id: Option<i64>,
        #[serde(default)]
        active: bool,
    }

    impl Entity for Employee {
        type Key = i64;
        const NAME: &'static str = "employee";

        fn key(&self) -> Option<i64> {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = Some(key);
        }
    }

    #[derive(Default)]
    struct CountingSerializer {
        inner: ModelSerializer<Employee>,
        creates: AtomicUsize,
    }

    impl EntitySerializer<Employee> for CountingSerializer {
        fn dump(&self, entity: &Employee) -> SerializationResult<Document> {
            self.inner.dump(entity)
        }

        fn load(&self, document: Document, existing: Option<Employee>) -> SerializationResult<Employee> {
            self.inner.load(document, existing)
        }

        fn after_create_commit(&self, _entity: &Employee) {
            self.creates.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        store: MemoryStore,
        acme: Company,
        alice: Employee,
        bob: Employee,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let acme = store
            .insert(Company {
                id: None,
                name: "Acme".into(),
            })
            .await
            .unwrap();
        let alice = store
            .insert(Employee {
                id: None,
                name: "Alice".into(),
                company_id: acme.id,
                active: true,
            })
            .await
            .unwrap();
        let bob = store
            .insert(Employee {
                id: None,
                name: "Bob".into(),
                company_id: None,
                active: true,
            })
            .await
            .unwrap();
        let relation = ToManyRelation::<Company, Employee>::new("employees");
        store
            .link(&relation.scope(&acme.id.unwrap()), &alice)
            .await
            .unwrap();
        Fixture {
            store,
            acme,
            alice,
            bob,
        }
    }

    fn relation_resource(
        store: &MemoryStore,
        serializer: Arc<CountingSerializer>,
        relation: ToManyRelation<Company, Employee>,
    ) -> ToManyRelationResource<Company, Employee, MemorySession> {
        ToManyRelationResource::builder(relation)
            .shared_serializer(serializer)
            .session(store.session_getter())
            .build()
            .unwrap()
    }

    fn request(method: Method, relation_id: &str) -> ResourceRequest {
        ResourceRequest::new(method).with_relation_id(relation_id)
    }

    #[tokio::test]
    async fn test_membership_is_enforced() {
        let f = fixture().await;
        let resource = relation_resource(
            &f.store,
            Arc::default(),
            ToManyRelation::new("employees"),
        );
        let acme = f.acme.id.unwrap().to_string();

        let own = resource
            .handle(request(Method::GET, &acme).with_id(f.alice.id.unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(own.status, StatusCode::OK);
        assert_eq!(own.body.unwrap()["name"], json!("Alice"));

        let stranger = resource
            .handle(request(Method::GET, &acme).with_id(f.bob.id.unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(stranger, ResourceResponse::not_found());

        let no_parent = resource
            .handle(request(Method::GET, "42").with_id(f.alice.id.unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(no_parent.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dynamic_listing_is_paginated() {
        let f = fixture().await;
        let resource = relation_resource(&f.store, Arc::default(), ToManyRelation::new("employees"));
        let response = resource.handle(request(Method::GET, "1")).await.unwrap();
        let body = response.body.unwrap();
        assert_eq!(body["pagination"]["total"], json!(1));
        assert_eq!(body["data"][0]["name"], json!("Alice"));

        let missing = resource.handle(request(Method::GET, "9")).await.unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_eager_listing_dumps_members() {
        let f = fixture().await;
        let resource = relation_resource(
            &f.store,
            Arc::default(),
            ToManyRelation::new("employees").eager(),
        );
        for _ in 0..2 {
            let response = resource.handle(request(Method::GET, "1")).await.unwrap();
            assert_eq!(response.status, StatusCode::OK);
            let body = response.body.unwrap();
            assert_eq!(body.as_array().map(Vec::len), Some(1));
            assert_eq!(body[0]["name"], json!("Alice"));
        }
        assert!(resource.related.materialized_warning.is_completed());
    }

    #[tokio::test]
    async fn test_post_attach_does_not_create_or_run_hooks() {
        let f = fixture().await;
        let serializer = Arc::new(CountingSerializer::default());
        let resource = relation_resource(&f.store, Arc::clone(&serializer), ToManyRelation::new("employees"));

        let response = resource
            .handle(request(Method::POST, "1").with_json(&json!({"id": f.bob.id})))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.unwrap()["name"], json!("Bob"));
        assert_eq!(f.store.count::<Employee>().unwrap(), 2);
        assert_eq!(serializer.creates.load(Ordering::SeqCst), 0);

        let bob = resource
            .handle(request(Method::GET, "1").with_id(f.bob.id.unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(bob.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_attach_missing_child() {
        let f = fixture().await;
        let resource = relation_resource(&f.store, Arc::default(), ToManyRelation::new("employees"));
        for reference in [json!(77), json!("not-a-key")] {
            let response = resource
                .handle(request(Method::POST, "1").with_json(&json!({ "id": reference })))
                .await
                .unwrap();
            assert_eq!(response.status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_post_create_runs_hooks_once() {
        let f = fixture().await;
        let serializer = Arc::new(CountingSerializer::default());
        let resource = relation_resource(&f.store, Arc::clone(&serializer), ToManyRelation::new("employees"));

        let response = resource
            .handle(request(Method::POST, "1").with_json(&json!({"name": "Carol", "active": true})))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        let carol = response.body.unwrap();
        assert_eq!(carol["id"], json!(3));
        assert_eq!(f.store.count::<Employee>().unwrap(), 3);
        assert_eq!(serializer.creates.load(Ordering::SeqCst), 1);

        let listed = resource.handle(request(Method::GET, "1")).await.unwrap();
        assert_eq!(listed.body.unwrap()["pagination"]["total"], json!(2));
    }

    #[tokio::test]
    async fn test_post_to_missing_parent() {
        let f = fixture().await;
        let resource = relation_resource(&f.store, Arc::default(), ToManyRelation::new("employees"));
        let response = resource
            .handle(request(Method::POST, "5").with_json(&json!({"name": "Nobody"})))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(f.store.count::<Employee>().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_and_delete_require_membership() {
        let f = fixture().await;
        let resource = relation_resource(&f.store, Arc::default(), ToManyRelation::new("employees"));
        let bob_id = f.bob.id.unwrap().to_string();
        let alice_id = f.alice.id.unwrap().to_string();

        let put = resource
            .handle(request(Method::PUT, "1").with_id(&bob_id).with_json(&json!({"name": "Robert"})))
            .await
            .unwrap();
        assert_eq!(put.status, StatusCode::NOT_FOUND);

        let put = resource
            .handle(request(Method::PUT, "1").with_id(&alice_id).with_json(&json!({"active": false})))
            .await
            .unwrap();
        assert_eq!(put.status, StatusCode::OK);
        let body = put.body.unwrap();
        assert_eq!(body["name"], json!("Alice"));
        assert_eq!(body["active"], json!(false));

        let delete = resource
            .handle(request(Method::DELETE, "1").with_id(&bob_id))
            .await
            .unwrap();
        assert_eq!(delete.status, StatusCode::NOT_FOUND);

        let delete = resource
            .handle(request(Method::DELETE, "1").with_id(&alice_id))
            .await
            .unwrap();
        assert_eq!(delete.status, StatusCode::NO_CONTENT);
        assert_eq!(f.store.count::<Employee>().unwrap(), 1);
    }

    fn active_staff() -> PropertyCollection<Company, Employee> {
        PropertyCollection::new("active_staff", |company: &Company| {
            RelationValue::Query(
                EntityQuery::new()
                    .filter(FilterCondition::eq("company_id", company.id.unwrap_or_default()))
                    .filter(FilterCondition::eq("active", true)),
            )
        })
    }

    fn property_resource(
        store: &MemoryStore,
        property: PropertyCollection<Company, Employee>,
    ) -> CollectionPropertyResource<Company, Employee, MemorySession> {
        CollectionPropertyResource::builder(property)
            .serializer(ModelSerializer::<Employee>::new())
            .session(store.session_getter())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_property_listing_and_lookup() {
        let f = fixture().await;
        let resource = property_resource(&f.store, active_staff());

        let listed = resource.handle(request(Method::GET, "1")).await.unwrap();
        let body = listed.body.unwrap();
        assert_eq!(body["pagination"]["total"], json!(1));
        assert_eq!(body["data"][0]["name"], json!("Alice"));

        let alice = resource
            .handle(request(Method::GET, "1").with_id(f.alice.id.unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(alice.status, StatusCode::OK);

        let bob = resource
            .handle(request(Method::GET, "1").with_id(f.bob.id.unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(bob.status, StatusCode::NOT_FOUND);

        let missing_parent = resource.handle(request(Method::GET, "3")).await.unwrap();
        assert_eq!(missing_parent.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_property_post_is_rejected() {
        let f = fixture().await;
        let resource = property_resource(&f.store, active_staff());
        for req in [
            request(Method::POST, "1").with_json(&json!({"name": "New"})),
            request(Method::POST, "1").with_json(&json!({"id": f.bob.id})),
            request(Method::POST, "404"),
        ] {
            let response = resource.handle(req).await.unwrap();
            assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(response.body, Some(json!("POST not allowed for property resources")));
        }
        assert_eq!(f.store.count::<Employee>().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_materialized_property() {
        let f = fixture().await;
        let founders = PropertyCollection::new("founders", |_company: &Company| {
            RelationValue::Materialized(vec![Employee {
                id: Some(2),
                name: "Bob".into(),
                company_id: None,
                active: true,
            }])
        });
        let resource = property_resource(&f.store, founders);

        let listed = resource.handle(request(Method::GET, "1")).await.unwrap();
        assert_eq!(listed.body.unwrap()[0]["name"], json!("Bob"));

        let bob = resource
            .handle(request(Method::DELETE, "1").with_id(f.bob.id.unwrap().to_string()))
            .await
            .unwrap();
        assert_eq!(bob.status, StatusCode::NO_CONTENT);
        assert_eq!(f.store.count::<Employee>().unwrap(), 1);
    }
}
