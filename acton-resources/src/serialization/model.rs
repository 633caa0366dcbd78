//! Entity serializers
//!
//! An [`EntitySerializer`] turns wire documents into entities and back, and
//! receives lifecycle callbacks around the commit that persists an entity.
//! [`ModelSerializer`] is the serde-driven implementation used by most
//! resources.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::coerce::Coercing;
use super::error::{SerializationError, SerializationResult};
use super::serializer::FieldSerializer;
use super::Document;
use crate::session::Entity;

/// Which kind of save is being committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveMethod {
    /// A new entity is being inserted
    Create,
    /// An existing entity is being updated
    Update,
}

impl fmt::Display for SaveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Converts entities of type `E` to and from wire documents
///
/// The commit hooks default to no-ops. `before_commit` and `after_commit`
/// route to the method-specific hooks; override those rather than the
/// routing methods.
///
/// # Example
///
/// ```rust,ignore
/// struct UserSerializer {
///     inner: ModelSerializer<User>,
/// }
///
/// impl EntitySerializer<User> for UserSerializer {
///     fn dump(&self, user: &User) -> SerializationResult<Document> {
///         self.inner.dump(user)
///     }
///
///     fn load(&self, document: Document, existing: Option<User>) -> SerializationResult<User> {
///         self.inner.load(document, existing)
///     }
///
///     fn before_create_commit(&self, user: &mut User) {
///         user.password = hash(&user.password);
///     }
/// }
/// ```
pub trait EntitySerializer<E: Entity>: Send + Sync + 'static {
    /// Dump an entity to a wire document
    fn dump(&self, entity: &E) -> SerializationResult<Document>;

    /// Load a wire document into a new entity, or merge it into `existing`
    fn load(&self, document: Document, existing: Option<E>) -> SerializationResult<E>;

    /// Called before a create is committed; may modify the entity
    fn before_create_commit(&self, _entity: &mut E) {}

    /// Called after a create has been committed
    fn after_create_commit(&self, _entity: &E) {}

    /// Called before an update is committed; may modify the entity
    fn before_update_commit(&self, _entity: &mut E) {}

    /// Called after an update has been committed
    fn after_update_commit(&self, _entity: &E) {}

    /// Run the pre-commit hook for `method`
    fn before_commit(&self, entity: &mut E, method: SaveMethod) {
        match method {
            SaveMethod::Create => self.before_create_commit(entity),
            SaveMethod::Update => self.before_update_commit(entity),
        }
    }

    /// Run the post-commit hook for `method`
    fn after_commit(&self, entity: &E, method: SaveMethod) {
        match method {
            SaveMethod::Create => self.after_create_commit(entity),
            SaveMethod::Update => self.after_update_commit(entity),
        }
    }
}

impl<E: Entity, S: EntitySerializer<E> + ?Sized> EntitySerializer<E> for Arc<S> {
    fn dump(&self, entity: &E) -> SerializationResult<Document> {
        (**self).dump(entity)
    }

    fn load(&self, document: Document, existing: Option<E>) -> SerializationResult<E> {
        (**self).load(document, existing)
    }

    fn before_commit(&self, entity: &mut E, method: SaveMethod) {
        (**self).before_commit(entity, method)
    }

    fn after_commit(&self, entity: &E, method: SaveMethod) {
        (**self).after_commit(entity, method)
    }
}

/// serde-driven [`EntitySerializer`]
///
/// Dumping serializes the entity with serde and passes customised fields
/// through their [`FieldSerializer`]. Loading merges the incoming document
/// over the existing entity (if any) and deserializes the result. Text values
/// are parsed when the entity field is a number or a boolean, so form bodies
/// load like JSON ones. Read-only fields, which include the primary key
/// field, are ignored on load.
///
/// ```rust,ignore
/// let serializer = ModelSerializer::<Event>::new()
///     .field("starts_at", DateTimeSerializer)
///     .read_only("created_by");
/// ```
pub struct ModelSerializer<E> {
    fields: HashMap<String, Arc<dyn FieldSerializer>>,
    read_only: HashSet<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ModelSerializer<E> {
    /// Serializer with no customised fields; only the key field is read-only
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            read_only: HashSet::from([E::KEY_FIELD.to_string()]),
            _entity: PhantomData,
        }
    }

    /// Route `name` through a field serializer
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, serializer: impl FieldSerializer) -> Self {
        self.fields.insert(name.into(), Arc::new(serializer));
        self
    }

    /// Ignore `name` when loading documents
    #[must_use]
    pub fn read_only(mut self, name: impl Into<String>) -> Self {
        self.read_only.insert(name.into());
        self
    }

    /// Allow clients to set `name`, including the key field
    #[must_use]
    pub fn writable(mut self, name: &str) -> Self {
        self.read_only.remove(name);
        self
    }

    fn native_document(entity: &E) -> SerializationResult<Document> {
        match serde_json::to_value(entity) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(other) => Err(SerializationError::InvalidDocument(format!(
                "{} serialized to {} instead of an object",
                E::NAME,
                other
            ))),
            Err(e) => Err(SerializationError::InvalidDocument(e.to_string())),
        }
    }
}

impl<E: Entity> Default for ModelSerializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ModelSerializer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSerializer")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl<E: Entity> EntitySerializer<E> for ModelSerializer<E> {
    fn dump(&self, entity: &E) -> SerializationResult<Document> {
        let mut document = Self::native_document(entity)?;
        for (name, serializer) in &self.fields {
            if let Some(value) = document.get_mut(name) {
                if !value.is_null() {
                    *value = serializer.to_wire(value.take())?;
                }
            }
        }
        Ok(document)
    }

    fn load(&self, document: Document, existing: Option<E>) -> SerializationResult<E> {
        let mut merged = match &existing {
            Some(entity) => Self::native_document(entity)?,
            None => Document::new(),
        };

        for (name, value) in document {
            if self.read_only.contains(&name) {
                continue;
            }
            let value = match self.fields.get(&name) {
                Some(serializer) if !value.is_null() => serializer
                    .from_wire(&value)
                    .map_err(|e| match e {
                        SerializationError::InvalidDocument(message) => {
                            SerializationError::invalid_field(&name, message)
                        }
                        other => other,
                    })?,
                _ => value,
            };
            merged.insert(name, value);
        }

        E::deserialize(Coercing(Value::Object(merged)))
            .map_err(|e| SerializationError::InvalidDocument(e.to_string()))
    }
}
