//! Registering resources on an axum router
//!
//! ```rust,ignore
//! let store = MemoryStore::new();
//!
//! let api = Api::from_config(&config)
//!     .add_model("/users", ModelResource::<User, _>::builder()
//!         .serializer(ModelSerializer::new())
//!         .session(store.session_getter())
//!         .build()?)?
//!     .add_relation("/users/{relation_id}/addresses", ToManyRelationResource::builder(
//!             ToManyRelation::<User, Address>::new("addresses"))
//!         .serializer(ModelSerializer::new())
//!         .session(store.session_getter())
//!         .build()?)?;
//!
//! Server::new(config).serve(api.into_router()).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::resources::{compose, Dispatch, ListLimits, Resource, ResourceRequest};

const ID_PARAM: &str = "{id}";
const RELATION_PARAM: &str = "{relation_id}";

/// A set of resources served from one router
#[derive(Debug, Clone, Default)]
pub struct Api {
    router: Router,
    limits: ListLimits,
}

impl Api {
    /// An empty API with default listing limits
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty API using the listing limits from `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new().with_limits(config.list_limits())
    }

    /// Set the listing limits applied to resources registered after this call
    #[must_use]
    pub fn with_limits(mut self, limits: ListLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Register a single-entity resource at `path` and `path/{id}`
    pub fn add_model<R: Resource>(self, path: &str, resource: R) -> Result<Self> {
        let path = normalize(path)?;
        if path.contains(RELATION_PARAM) {
            return Err(Error::Route {
                path,
                reason: format!("model resources cannot use {RELATION_PARAM}"),
            });
        }
        Ok(self.register(&path, resource))
    }

    /// Register a to-many relation resource
    ///
    /// `path` must contain `{relation_id}`, the parent's key.
    pub fn add_relation<R: Resource>(self, path: &str, resource: R) -> Result<Self> {
        let path = scoped_path(path)?;
        Ok(self.register(&path, resource))
    }

    /// Register a derived collection resource
    ///
    /// `path` must contain `{relation_id}`, the parent's key.
    pub fn add_property<R: Resource>(self, path: &str, resource: R) -> Result<Self> {
        let path = scoped_path(path)?;
        Ok(self.register(&path, resource))
    }

    /// The router with every registered resource
    pub fn into_router(self) -> Router {
        self.router
    }

    fn register<R: Resource>(mut self, path: &str, resource: R) -> Self {
        let dispatch = compose(Arc::new(resource));
        let limits = self.limits;
        let handler = move |method: Method,
                            params: Option<Path<HashMap<String, String>>>,
                            RawQuery(query): RawQuery,
                            headers: HeaderMap,
                            body: Bytes| {
            let dispatch = Arc::clone(&dispatch);
            async move {
                let params = params.map(|Path(p)| p).unwrap_or_default();
                let request = into_resource_request(method, params, query, headers, body, limits);
                run(dispatch, request).await
            }
        };

        let item_path = format!("{path}/{ID_PARAM}");
        tracing::debug!(%path, %item_path, "Registered resource");
        self.router = self
            .router
            .route(path, any(handler.clone()))
            .route(&item_path, any(handler));
        self
    }
}

fn into_resource_request(
    method: Method,
    mut params: HashMap<String, String>,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    limits: ListLimits,
) -> ResourceRequest {
    ResourceRequest {
        method,
        relation_id: params.remove("relation_id"),
        id: params.remove("id"),
        query,
        headers,
        body,
        limits,
    }
}

async fn run(dispatch: Dispatch, request: ResourceRequest) -> Response {
    let method = request.method.clone();
    match dispatch(request).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!(%method, error = %e, "Resource request failed");
            e.into_response()
        }
    }
}

fn normalize(path: &str) -> Result<String> {
    let trimmed = path.trim_end_matches('/');
    if !trimmed.starts_with('/') || trimmed.len() < 2 {
        return Err(Error::Route {
            path: path.to_string(),
            reason: "must start with '/' and name a collection".to_string(),
        });
    }
    if trimmed.contains(ID_PARAM) {
        return Err(Error::Route {
            path: path.to_string(),
            reason: format!("{ID_PARAM} is appended automatically"),
        });
    }
    Ok(trimmed.to_string())
}

fn scoped_path(path: &str) -> Result<String> {
    let path = normalize(path)?;
    if !path.contains(RELATION_PARAM) {
        return Err(Error::Route {
            path,
            reason: format!("relation paths must contain {RELATION_PARAM}"),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{
        CollectionPropertyResource, ModelResource, PropertyCollection, RelationValue,
        ToManyRelation, ToManyRelationResource,
    };
    use crate::serialization::{
        DateTimeSerializer, Document, EntitySerializer, ModelSerializer, SerializationResult,
        WireDateTime,
    };
    use crate::session::{Entity, EntityQuery, FilterCondition, MemorySession, MemoryStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

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
        firstname: String,
        #[serde(default)]
        lastname: Option<String>,
        #[serde(default)]
        company_id: Option<i64>,
        #[serde(default)]
        admission: Option<WireDateTime>,
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
    struct HookCounter {
        inner: ModelSerializer<Employee>,
        before_create: AtomicUsize,
        after_create: AtomicUsize,
        after_update: AtomicUsize,
    }

    impl EntitySerializer<Employee> for HookCounter {
        fn dump(&self, entity: &Employee) -> SerializationResult<Document> {
            self.inner.dump(entity)
        }

        fn load(&self, document: Document, existing: Option<Employee>) -> SerializationResult<Employee> {
            self.inner.load(document, existing)
        }

        fn before_create_commit(&self, _entity: &mut Employee) {
            self.before_create.fetch_add(1, Ordering::SeqCst);
        }

        fn after_create_commit(&self, _entity: &Employee) {
            self.after_create.fetch_add(1, Ordering::SeqCst);
        }

        fn after_update_commit(&self, _entity: &Employee) {
            self.after_update.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestApi {
        store: MemoryStore,
        hooks: Arc<HookCounter>,
        router: Router,
    }

    async fn test_api() -> TestApi {
        let store = MemoryStore::new();
        let hooks = Arc::new(HookCounter {
            inner: ModelSerializer::<Employee>::new().field("admission", DateTimeSerializer),
            ..HookCounter::default()
        });

        let acme = store
            .insert(Company {
                id: None,
                name: "Acme".into(),
            })
            .await
            .unwrap();
        store
            .insert(Company {
                id: None,
                name: "Globex".into(),
            })
            .await
            .unwrap();
        let employees = ToManyRelation::<Company, Employee>::new("employees");
        for (firstname, company_id) in [("Ada", acme.id), ("Alan", None)] {
            let employee = store
                .insert(Employee {
                    id: None,
                    firstname: firstname.into(),
                    lastname: None,
                    company_id,
                    admission: None,
                    active: false,
                })
                .await
                .unwrap();
            if company_id.is_some() {
                store
                    .link(&employees.scope(&acme.id.unwrap()), &employee)
                    .await
                    .unwrap();
            }
        }

        let staff = PropertyCollection::<Company, Employee>::new("staff", |company: &Company| {
            RelationValue::Query(
                EntityQuery::new().filter(FilterCondition::eq("company_id", company.id.unwrap_or_default())),
            )
        });

        let router = Api::new()
            .add_model(
                "/companies",
                ModelResource::<Company, MemorySession>::builder()
                    .serializer(ModelSerializer::<Company>::new())
                    .session(store.session_getter())
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .add_model(
                "/employees",
                ModelResource::<Employee, MemorySession>::builder()
                    .shared_serializer(hooks.clone())
                    .session(store.session_getter())
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .add_relation(
                "/companies/{relation_id}/employees",
                ToManyRelationResource::builder(employees)
                    .shared_serializer(hooks.clone())
                    .session(store.session_getter())
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .add_property(
                "/companies/{relation_id}/staff",
                CollectionPropertyResource::builder(staff)
                    .shared_serializer(hooks.clone())
                    .session(store.session_getter())
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .into_router();

        TestApi {
            store,
            hooks,
            router,
        }
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Option<Value>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&bytes).unwrap())
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_model_crud_over_http() {
        let api = test_api().await;

        let (status, body) = call(&api.router, Method::POST, "/employees", Some(json!({"firstname": "Grace"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.unwrap()["id"], json!(3));
        assert_eq!(api.hooks.before_create.load(Ordering::SeqCst), 1);
        assert_eq!(api.hooks.after_create.load(Ordering::SeqCst), 1);

        let (status, body) = call(&api.router, Method::PUT, "/employees/3", Some(json!({"lastname": "Hopper"}))).await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body["firstname"], json!("Grace"));
        assert_eq!(body["lastname"], json!("Hopper"));
        assert_eq!(api.hooks.after_update.load(Ordering::SeqCst), 1);

        let (status, body) = call(&api.router, Method::DELETE, "/employees/3", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, None);

        let (status, body) = call(&api.router, Method::DELETE, "/employees/3", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, Some(json!("Resource not found in the database!")));
    }

    #[tokio::test]
    async fn test_listing_with_query_string() {
        let api = test_api().await;
        let (status, body) = call(&api.router, Method::GET, "/employees?sort=firstname&order=desc&per_page=1", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body["data"][0]["firstname"], json!("Alan"));
        assert_eq!(body["pagination"]["total"], json!(2));
        assert_eq!(body["pagination"]["total_pages"], json!(2));

        let (status, _) = call(&api.router, Method::GET, "/employees?filter=age__between%3D1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsupported_verb_shapes() {
        let api = test_api().await;
        for (method, uri) in [
            (Method::PUT, "/employees"),
            (Method::DELETE, "/employees"),
            (Method::POST, "/employees/1"),
            (Method::PATCH, "/employees/1"),
        ] {
            let (status, _) = call(&api.router, method, uri, Some(json!({}))).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_relation_membership_over_http() {
        let api = test_api().await;

        let (status, body) = call(&api.router, Method::GET, "/companies/1/employees/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["firstname"], json!("Ada"));

        // exists, but not a member
        let (status, _) = call(&api.router, Method::GET, "/companies/1/employees/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&api.router, Method::GET, "/companies/2/employees/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&api.router, Method::PUT, "/companies/2/employees/1", Some(json!({"lastname": "X"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&api.router, Method::DELETE, "/companies/2/employees/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(api.store.count::<Employee>().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_relation_attach_versus_create() {
        let api = test_api().await;

        let (status, body) = call(&api.router, Method::POST, "/companies/2/employees", Some(json!({"id": 2}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["firstname"], json!("Alan"));
        assert_eq!(api.store.count::<Employee>().unwrap(), 2);
        assert_eq!(api.hooks.after_create.load(Ordering::SeqCst), 0);

        let (status, body) = call(&api.router, Method::POST, "/companies/2/employees", Some(json!({"firstname": "Linus"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.unwrap()["id"], json!(3));
        assert_eq!(api.store.count::<Employee>().unwrap(), 3);
        assert_eq!(api.hooks.before_create.load(Ordering::SeqCst), 1);
        assert_eq!(api.hooks.after_create.load(Ordering::SeqCst), 1);

        let (_, body) = call(&api.router, Method::GET, "/companies/2/employees", None).await;
        let body = body.unwrap();
        assert_eq!(body["pagination"]["total"], json!(2));
        let names: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["firstname"].clone())
            .collect();
        assert_eq!(names, vec![json!("Alan"), json!("Linus")]);

        let (status, _) = call(&api.router, Method::POST, "/companies/2/employees", Some(json!({"id": 99}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&api.router, Method::GET, "/companies/9/employees", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_property_collection_over_http() {
        let api = test_api().await;

        let (status, body) = call(&api.router, Method::GET, "/companies/1/staff", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["data"][0]["firstname"], json!("Ada"));

        let (status, _) = call(&api.router, Method::GET, "/companies/1/staff/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&api.router, Method::POST, "/companies/1/staff", Some(json!({"firstname": "New"}))).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, Some(json!("POST not allowed for property resources")));
        assert_eq!(api.store.count::<Employee>().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_datetime_round_trip() {
        let api = test_api().await;

        let (status, body) = call(
            &api.router,
            Method::POST,
            "/employees",
            Some(json!({"firstname": "Kay", "admission": "2019-06-01T08:30:00.25+05:30"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.unwrap()["admission"], json!("2019-06-01T08:30:00.250+05:30"));

        let (_, body) = call(
            &api.router,
            Method::PUT,
            "/employees/3",
            Some(json!({"admission": "2019-06-01 08:30z"})),
        )
        .await;
        assert_eq!(body.unwrap()["admission"], json!("2019-06-01T08:30:00Z"));

        let (status, body) = call(
            &api.router,
            Method::PUT,
            "/employees/3",
            Some(json!({"admission": "01/06/2019"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.unwrap()["error"].as_str().unwrap().contains("01/06/2019"));
    }

    #[tokio::test]
    async fn test_form_bodies_are_accepted() {
        let api = test_api().await;
        let request = Request::post("/companies")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("name=Initech"))
            .unwrap();
        let response = api.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(api.store.count::<Company>().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_form_fields_load_as_typed_values() {
        let api = test_api().await;
        let request = Request::post("/employees")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("firstname=Grace&company_id=2&active=true"))
            .unwrap();
        let response = api.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["company_id"], json!(2));
        assert_eq!(body["active"], json!(true));

        let request = Request::put("/employees/3")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("active=false&company_id=x"))
            .unwrap();
        let response = api.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (status, body) = call(&api.router, Method::GET, "/employees/3", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["active"], json!(true));
    }

    #[test]
    fn test_route_validation() {
        let resource = || {
            ModelResource::<Company, MemorySession>::builder()
                .serializer(ModelSerializer::<Company>::new())
                .session(MemoryStore::new().session_getter())
                .build()
                .unwrap()
        };
        assert!(Api::new().add_model("companies", resource()).is_err());
        assert!(Api::new().add_model("/companies/{id}", resource()).is_err());
        assert!(Api::new().add_relation("/companies/employees", resource()).is_err());
        assert!(Api::new().add_model("/companies/{relation_id}/x", resource()).is_err());
        assert!(Api::new().add_model("/companies/", resource()).is_ok());
    }
}
