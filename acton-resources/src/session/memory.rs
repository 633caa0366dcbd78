//! In-memory transactional store
//!
//! [`MemoryStore`] keeps every table as a map of primary key to dumped
//! document and every relation as a set of (parent key, child key) pairs.
//! Each request gets its own [`MemorySession`]; the session stages work and
//! applies it to the store atomically on commit. A session dropped without
//! committing leaves the store untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = MemoryStore::new();
//! let users = ModelResource::<User, _, _>::builder()
//!     .serializer(ModelSerializer::new())
//!     .session(store.session_getter())
//!     .build()?;
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use super::error::{SessionError, SessionErrorKind, SessionOperation};
use super::query::{order_values, EntityQuery, OrderDirection, RelationScope};
use super::traits::{Entity, PrimaryKey, QueryPage, Session, SessionGetter, SessionResult};
use crate::serialization::Document;

type Table = BTreeMap<String, Document>;
type RelationKey = (&'static str, &'static str);

#[derive(Debug, Default)]
struct RelationRows {
    child: &'static str,
    members: BTreeSet<(String, String)>,
}

#[derive(Debug, Default)]
struct StoreState {
    tables: HashMap<&'static str, Table>,
    relations: HashMap<RelationKey, RelationRows>,
    sequences: HashMap<&'static str, u64>,
}

impl StoreState {
    fn remove_row(&mut self, table: &'static str, key: &str) {
        if let Some(rows) = self.tables.get_mut(table) {
            rows.remove(key);
        }
        for ((parent, _), rows) in self.relations.iter_mut() {
            let parent_matches = *parent == table;
            let child_matches = rows.child == table;
            rows.members.retain(|(p, c)| {
                !(parent_matches && p == key) && !(child_matches && c == key)
            });
        }
    }
}

/// Shared in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new unit of work
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            pending: Vec::new(),
        }
    }

    /// A getter handing out one fresh session per call
    pub fn session_getter(&self) -> SessionGetter<MemorySession> {
        let store = self.clone();
        Arc::new(move || store.session())
    }

    /// Insert an entity in its own committed unit of work
    pub async fn insert<E: Entity>(&self, mut entity: E) -> SessionResult<E> {
        let mut session = self.session();
        session.add(&mut entity).await?;
        session.commit().await?;
        Ok(entity)
    }

    /// Append `child` to a relation collection in its own committed unit of work
    pub async fn link<C: Entity>(&self, scope: &RelationScope, child: &C) -> SessionResult<()> {
        let mut session = self.session();
        session.append(scope, child).await?;
        session.commit().await
    }

    /// Number of committed rows in `E`'s table
    pub fn count<E: Entity>(&self) -> SessionResult<usize> {
        Ok(self
            .read(SessionOperation::Query)?
            .tables
            .get(E::NAME)
            .map_or(0, BTreeMap::len))
    }

    fn read(&self, operation: SessionOperation) -> SessionResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| SessionError::database_error(operation, "store lock poisoned"))
    }

    fn write(&self, operation: SessionOperation) -> SessionResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| SessionError::database_error(operation, "store lock poisoned"))
    }
}

#[derive(Debug, Clone)]
enum Pending {
    Upsert {
        table: &'static str,
        key: String,
        document: Document,
    },
    Delete {
        table: &'static str,
        key: String,
    },
    Append {
        scope: RelationScope,
        child: &'static str,
        key: String,
    },
}

/// Request-scoped unit of work over a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    pending: Vec<Pending>,
}

impl MemorySession {
    /// Number of staged operations not yet committed
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Committed rows of `table` with this session's staged work applied
    fn rows(&self, state: &StoreState, table: &'static str) -> Table {
        let mut rows = state.tables.get(table).cloned().unwrap_or_default();
        for op in &self.pending {
            match op {
                Pending::Upsert {
                    table: t,
                    key,
                    document,
                } if *t == table => {
                    rows.insert(key.clone(), document.clone());
                }
                Pending::Delete { table: t, key } if *t == table => {
                    rows.remove(key);
                }
                _ => {}
            }
        }
        rows
    }

    fn row(&self, state: &StoreState, table: &'static str, key: &str) -> Option<Document> {
        let mut row = state.tables.get(table).and_then(|rows| rows.get(key)).cloned();
        for op in &self.pending {
            match op {
                Pending::Upsert {
                    table: t,
                    key: k,
                    document,
                } if *t == table && k == key => row = Some(document.clone()),
                Pending::Delete { table: t, key: k } if *t == table && k == key => row = None,
                _ => {}
            }
        }
        row
    }

    /// Child keys of a relation collection with staged work applied
    ///
    /// Keys of deleted children may remain; callers intersect with live rows.
    fn members(&self, state: &StoreState, scope: &RelationScope) -> BTreeSet<String> {
        if self.row(state, scope.parent, &scope.parent_key).is_none() {
            return BTreeSet::new();
        }
        let mut members: BTreeSet<String> = state
            .relations
            .get(&(scope.parent, scope.relation))
            .map(|rows| {
                rows.members
                    .iter()
                    .filter(|(parent, _)| *parent == scope.parent_key)
                    .map(|(_, child)| child.clone())
                    .collect()
            })
            .unwrap_or_default();
        for op in &self.pending {
            if let Pending::Append { scope: s, key, .. } = op {
                if s == scope {
                    members.insert(key.clone());
                }
            }
        }
        members
    }

    /// Reject staged work that would leave dangling relation rows
    fn validate(&self, state: &StoreState, operation: SessionOperation) -> SessionResult<()> {
        for op in &self.pending {
            if let Pending::Append { scope, child, key } = op {
                if self.row(state, scope.parent, &scope.parent_key).is_none() {
                    return Err(SessionError::constraint_violation(
                        operation,
                        format!("relation {} has no parent row", scope),
                    )
                    .with_entity(scope.parent, scope.parent_key.clone()));
                }
                if self.row(state, child, key).is_none() {
                    return Err(SessionError::constraint_violation(
                        operation,
                        format!("relation {} references a missing child", scope),
                    )
                    .with_entity(*child, key.clone()));
                }
                if let Some(rows) = state.relations.get(&(scope.parent, scope.relation)) {
                    if rows.child != *child {
                        return Err(SessionError::constraint_violation(
                            operation,
                            format!("relation {} holds {} rows, not {}", scope, rows.child, child),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn to_document<E: Entity>(entity: &E, operation: SessionOperation) -> SessionResult<Document> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(SessionError::serialization_error(
            operation,
            format!("{} does not serialize to an object", E::NAME),
        )),
        Err(e) => Err(SessionError::serialization_error(operation, e.to_string())),
    }
}

fn from_document<E: Entity>(document: Document, operation: SessionOperation) -> SessionResult<E> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| SessionError::serialization_error(operation, e.to_string()))
}

impl Session for MemorySession {
    async fn get<E: Entity>(&mut self, key: &E::Key) -> SessionResult<Option<E>> {
        let state = self.store.read(SessionOperation::Get)?;
        self.row(&state, E::NAME, &key.to_string())
            .map(|document| from_document(document, SessionOperation::Get))
            .transpose()
    }

    async fn exists<E: Entity>(&mut self, key: &E::Key) -> SessionResult<bool> {
        let state = self.store.read(SessionOperation::Exists)?;
        Ok(self.row(&state, E::NAME, &key.to_string()).is_some())
    }

    async fn query<E: Entity>(&mut self, query: &EntityQuery) -> SessionResult<QueryPage<E>> {
        let state = self.store.read(SessionOperation::Query)?;
        let members = query.scope.as_ref().map(|scope| self.members(&state, scope));

        let mut rows: Vec<Document> = self
            .rows(&state, E::NAME)
            .into_iter()
            .filter(|(key, _)| members.as_ref().map_or(true, |m| m.contains(key)))
            .map(|(_, document)| document)
            .filter(|document| query.matches(document))
            .collect();
        drop(state);

        let (field, direction) = query
            .order_by
            .clone()
            .unwrap_or_else(|| (E::KEY_FIELD.to_string(), OrderDirection::Ascending));
        rows.sort_by(|a, b| {
            let ordering = order_values(a.get(&field), b.get(&field));
            match direction {
                OrderDirection::Ascending => ordering,
                OrderDirection::Descending => ordering.reverse(),
            }
        });

        let total = rows.len() as u64;
        let page: Vec<Document> = match query.pagination {
            Some(p) => rows
                .into_iter()
                .skip(usize::try_from(p.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(p.limit).unwrap_or(usize::MAX))
                .collect(),
            None => rows,
        };

        let items = page
            .into_iter()
            .map(|document| from_document(document, SessionOperation::Query))
            .collect::<SessionResult<Vec<E>>>()?;
        Ok(QueryPage::new(items, total))
    }

    async fn add<E: Entity>(&mut self, entity: &mut E) -> SessionResult<()> {
        if entity.key().is_none() {
            let mut state = self.store.write(SessionOperation::Add)?;
            let sequence = state.sequences.entry(E::NAME).or_insert(0);
            *sequence += 1;
            entity.set_key(E::Key::generate(*sequence));
        }
        let key = entity
            .key()
            .map(|k| k.to_string())
            .ok_or_else(|| SessionError::new(SessionOperation::Add, SessionErrorKind::Other, "entity has no key"))?;
        let document = to_document(entity, SessionOperation::Add)?;

        tracing::debug!(entity = E::NAME, id = %key, "Staged entity");
        self.pending.push(Pending::Upsert {
            table: E::NAME,
            key,
            document,
        });
        Ok(())
    }

    async fn delete<E: Entity>(&mut self, entity: &E) -> SessionResult<()> {
        let key = entity.key().map(|k| k.to_string()).ok_or_else(|| {
            SessionError::new(
                SessionOperation::Delete,
                SessionErrorKind::NotFound,
                "cannot delete an entity without a key",
            )
        })?;
        tracing::debug!(entity = E::NAME, id = %key, "Staged deletion");
        self.pending.push(Pending::Delete {
            table: E::NAME,
            key,
        });
        Ok(())
    }

    async fn is_member<C: Entity>(&mut self, scope: &RelationScope, key: &C::Key) -> SessionResult<bool> {
        let state = self.store.read(SessionOperation::Membership)?;
        if self.row(&state, scope.parent, &scope.parent_key).is_none() {
            return Ok(false);
        }
        let key = key.to_string();
        Ok(self.members(&state, scope).contains(&key) && self.row(&state, C::NAME, &key).is_some())
    }

    async fn append<C: Entity>(&mut self, scope: &RelationScope, child: &C) -> SessionResult<()> {
        let key = child.key().map(|k| k.to_string()).ok_or_else(|| {
            SessionError::constraint_violation(
                SessionOperation::Append,
                "cannot append an entity without a key",
            )
        })?;
        self.pending.push(Pending::Append {
            scope: scope.clone(),
            child: C::NAME,
            key,
        });
        Ok(())
    }

    async fn flush(&mut self) -> SessionResult<()> {
        let state = self.store.read(SessionOperation::Flush)?;
        self.validate(&state, SessionOperation::Flush)
    }

    async fn commit(&mut self) -> SessionResult<()> {
        let mut state = self.store.write(SessionOperation::Commit)?;
        self.validate(&state, SessionOperation::Commit)?;

        let pending = std::mem::take(&mut self.pending);
        let applied = pending.len();
        for op in pending {
            match op {
                Pending::Upsert {
                    table,
                    key,
                    document,
                } => {
                    state.tables.entry(table).or_default().insert(key, document);
                }
                Pending::Delete { table, key } => state.remove_row(table, &key),
                Pending::Append { scope, child, key } => {
                    let rows = state
                        .relations
                        .entry((scope.parent, scope.relation))
                        .or_insert_with(|| RelationRows {
                            child,
                            members: BTreeSet::new(),
                        });
                    rows.members.insert((scope.parent_key, key));
                }
            }
        }
        tracing::debug!(operations = applied, "Committed unit of work");
        Ok(())
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FilterCondition, Pagination};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Author {
        id: Option<i64>,
        name: String,
    }

    impl Entity for Author {
        type Key = i64;
        const NAME: &'static str = "author";

        fn key(&self) -> Option<i64> {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = Some(key);
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        id: Option<i64>,
        title: String,
        pages: i64,
    }

    impl Entity for Book {
        type Key = i64;
        const NAME: &'static str = "book";

        fn key(&self) -> Option<i64> {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = Some(key);
        }
    }

    fn author(name: &str) -> Author {
        Author {
            id: None,
            name: name.to_string(),
        }
    }

    fn book(title: &str, pages: i64) -> Book {
        Book {
            id: None,
            title: title.to_string(),
            pages,
        }
    }

    fn books_of(author: &Author) -> RelationScope {
        RelationScope::new(Author::NAME, "books", author.id.unwrap_or_default().to_string())
    }

    #[tokio::test]
    async fn test_add_assigns_sequential_keys() {
        let store = MemoryStore::new();
        let a = store.insert(author("Ursula")).await.unwrap();
        let b = store.insert(author("Iain")).await.unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
        assert_eq!(store.count::<Author>().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_discarded() {
        let store = MemoryStore::new();
        {
            let mut session = store.session();
            let mut a = author("Ghost");
            session.add(&mut a).await.unwrap();
            assert_eq!(session.pending_len(), 1);
            // staged rows are visible to the same session
            assert!(session.exists::<Author>(&1).await.unwrap());
        }
        assert_eq!(store.count::<Author>().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rollback_clears_pending() {
        let store = MemoryStore::new();
        let mut session = store.session();
        let mut a = author("Temp");
        session.add(&mut a).await.unwrap();
        session.rollback().await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(store.count::<Author>().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = MemoryStore::new();
        let a = store.insert(author("Octavia")).await.unwrap();

        let mut session = store.session();
        let fetched: Author = session.get(&1).await.unwrap().unwrap();
        assert_eq!(fetched, a);

        session.delete(&fetched).await.unwrap();
        assert!(session.get::<Author>(&1).await.unwrap().is_none());
        session.flush().await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(store.count::<Author>().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_paginates() {
        let store = MemoryStore::new();
        for (title, pages) in [("Dune", 412), ("Solaris", 204), ("Ubik", 202), ("Hyperion", 482)] {
            store.insert(book(title, pages)).await.unwrap();
        }

        let mut session = store.session();
        let query = EntityQuery::new()
            .filter(FilterCondition::gt("pages", 203))
            .order_by("pages", OrderDirection::Descending)
            .paginate(Pagination::new(0, 2));
        let page: QueryPage<Book> = session.query(&query).await.unwrap();
        assert_eq!(page.total, 3);
        let titles: Vec<_> = page.items.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Hyperion", "Dune"]);
    }

    #[tokio::test]
    async fn test_default_order_is_numeric_by_key() {
        let store = MemoryStore::new();
        for i in 0..11 {
            store.insert(book(&format!("b{}", i), i)).await.unwrap();
        }
        let mut session = store.session();
        let page: QueryPage<Book> = session.query(&EntityQuery::new()).await.unwrap();
        let ids: Vec<_> = page.items.iter().filter_map(|b| b.id).collect();
        assert_eq!(ids, (1..=11).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_relation_membership() {
        let store = MemoryStore::new();
        let a = store.insert(author("Le Guin")).await.unwrap();
        let own = store.insert(book("Earthsea", 200)).await.unwrap();
        let other = store.insert(book("Neuromancer", 271)).await.unwrap();
        store.link(&books_of(&a), &own).await.unwrap();

        let mut session = store.session();
        let scope = books_of(&a);
        assert!(session.is_member::<Book>(&scope, &own.id.unwrap()).await.unwrap());
        assert!(!session.is_member::<Book>(&scope, &other.id.unwrap()).await.unwrap());

        let missing_parent = RelationScope::new(Author::NAME, "books", "99");
        assert!(!session.is_member::<Book>(&missing_parent, &own.id.unwrap()).await.unwrap());

        let page: QueryPage<Book> = session.query(&EntityQuery::new().within(scope)).await.unwrap();
        assert_eq!(page.items, vec![own]);
    }

    #[tokio::test]
    async fn test_deleting_child_removes_membership() {
        let store = MemoryStore::new();
        let a = store.insert(author("Banks")).await.unwrap();
        let b = store.insert(book("Excession", 451)).await.unwrap();
        store.link(&books_of(&a), &b).await.unwrap();

        let mut session = store.session();
        session.delete(&b).await.unwrap();
        session.commit().await.unwrap();

        let mut session = store.session();
        let page: QueryPage<Book> = session
            .query(&EntityQuery::new().within(books_of(&a)))
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_append_requires_existing_parent() {
        let store = MemoryStore::new();
        let b = store.insert(book("Orphan", 10)).await.unwrap();
        let mut session = store.session();
        session
            .append(&RelationScope::new(Author::NAME, "books", "5"), &b)
            .await
            .unwrap();
        let err = session.commit().await.unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::ConstraintViolation);
        assert_eq!(store.count::<Book>().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_then_commit_in_one_unit() {
        let store = MemoryStore::new();
        let a = store.insert(author("Chiang")).await.unwrap();

        let mut session = store.session();
        let mut b = book("Exhalation", 350);
        session.add(&mut b).await.unwrap();
        session.append(&books_of(&a), &b).await.unwrap();
        session.commit().await.unwrap();

        let mut session = store.session();
        assert!(session.is_member::<Book>(&books_of(&a), &b.id.unwrap()).await.unwrap());
    }
}
