//! In-memory [`EntityStore`] with optimistic transactions.
//!
//! Every entity carries a version drawn from a store-wide counter. A
//! transaction remembers the version of each entity the first time it reads or
//! writes it; commit takes the store lock, re-checks those versions and then
//! applies every buffered write, so concurrent transactions observe either all
//! of another transaction's writes or none of them.
//!
//! Query evaluation follows datastore semantics: list properties match a filter
//! when any element does, entities lacking a filtered or ordered property are
//! skipped, and unordered results come back in key order.

use conference_core::entity_store::{
    Direction, Document, EntityStore, EntityStoreError, FilterOp, PropertyFilter, Query,
    SortOrder, StoreFuture, Transaction, TransactionOptions,
};
use conference_core::key::Key;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Properties = serde_json::Map<String, Value>;

#[derive(Debug, Clone)]
struct Stored {
    version: u64,
    properties: Properties,
}

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<Key, Stored>,
    last_ids: HashMap<(Option<Key>, String), i64>,
    clock: u64,
}

impl State {
    fn version_of(&self, key: &Key) -> u64 {
        self.entities.get(key).map_or(0, |stored| stored.version)
    }

    fn write(&mut self, document: Document) {
        self.clock += 1;
        self.entities.insert(
            document.key,
            Stored {
                version: self.clock,
                properties: document.properties,
            },
        );
    }

    fn document(&self, key: &Key) -> Option<Document> {
        self.entities.get(key).map(|stored| Document {
            key: key.clone(),
            properties: stored.properties.clone(),
        })
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<State>,
    forced_conflicts: AtomicUsize,
    commits: AtomicUsize,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, State>, EntityStoreError> {
        self.state
            .read()
            .map_err(|_| EntityStoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, EntityStoreError> {
        self.state
            .write()
            .map_err(|_| EntityStoreError::Backend("store lock poisoned".to_string()))
    }
}

/// Process-local entity store.
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    shared: Arc<Shared>,
}

impl InMemoryEntityStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` transaction commits fail with
    /// [`EntityStoreError::Conflict`] without applying anything.
    pub fn fail_next_commits(&self, count: usize) {
        self.shared.forced_conflicts.store(count, AtomicOrdering::SeqCst);
    }

    /// Number of successfully committed transactions.
    #[must_use]
    pub fn committed_transactions(&self) -> usize {
        self.shared.commits.load(AtomicOrdering::SeqCst)
    }

    /// Number of stored entities of `kind`.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.shared
            .read()
            .map(|state| state.entities.keys().filter(|k| k.kind() == kind).count())
            .unwrap_or(0)
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get<'a>(&'a self, key: &'a Key) -> StoreFuture<'a, Option<Document>> {
        Box::pin(async move { Ok(self.shared.read()?.document(key)) })
    }

    fn get_multi<'a>(&'a self, keys: &'a [Key]) -> StoreFuture<'a, Vec<Option<Document>>> {
        Box::pin(async move {
            let state = self.shared.read()?;
            Ok(keys.iter().map(|key| state.document(key)).collect())
        })
    }

    fn put(&self, document: Document) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.shared.write()?.write(document);
            Ok(())
        })
    }

    fn allocate_ids<'a>(
        &'a self,
        kind: &'a str,
        parent: Option<&'a Key>,
        count: usize,
    ) -> StoreFuture<'a, Vec<i64>> {
        Box::pin(async move {
            let mut state = self.shared.write()?;
            let last = state
                .last_ids
                .entry((parent.cloned(), kind.to_string()))
                .or_insert(0);
            let ids = (0..count)
                .map(|_| {
                    *last += 1;
                    *last
                })
                .collect();
            Ok(ids)
        })
    }

    fn query<'a>(&'a self, query: &'a Query) -> StoreFuture<'a, Vec<Document>> {
        Box::pin(async move {
            query.validate()?;
            let state = self.shared.read()?;
            Ok(run_query(&state, query))
        })
    }

    fn begin(&self, options: TransactionOptions) -> StoreFuture<'_, Box<dyn Transaction>> {
        let transaction = InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            options,
            group: None,
            observed: HashMap::new(),
            writes: BTreeMap::new(),
        };
        Box::pin(async move { Ok(Box::new(transaction) as Box<dyn Transaction>) })
    }
}

struct InMemoryTransaction {
    shared: Arc<Shared>,
    options: TransactionOptions,
    group: Option<Key>,
    observed: HashMap<Key, u64>,
    writes: BTreeMap<Key, Document>,
}

impl InMemoryTransaction {
    fn enlist(&mut self, key: &Key) -> Result<(), EntityStoreError> {
        let group = key.group();
        match &self.group {
            None => self.group = Some(group),
            Some(first) if !self.options.cross_group && *first != group => {
                return Err(EntityStoreError::CrossGroupNotEnabled {
                    first: first.clone(),
                    second: group,
                });
            }
            Some(_) => {}
        }

        if !self.observed.contains_key(key) {
            let version = self.shared.read()?.version_of(key);
            self.observed.insert(key.clone(), version);
        }
        Ok(())
    }
}

impl Transaction for InMemoryTransaction {
    fn get<'a>(&'a mut self, key: &'a Key) -> StoreFuture<'a, Option<Document>> {
        Box::pin(async move {
            if let Some(pending) = self.writes.get(key) {
                return Ok(Some(pending.clone()));
            }
            self.enlist(key)?;

            let state = self.shared.read()?;
            let expected = self.observed.get(key).copied().unwrap_or(0);
            if state.version_of(key) != expected {
                // Changed since first observed: this transaction cannot commit.
                return Err(EntityStoreError::Conflict { key: key.clone() });
            }
            Ok(state.document(key))
        })
    }

    fn put(&mut self, document: Document) -> Result<(), EntityStoreError> {
        self.enlist(&document.key)?;
        self.writes.insert(document.key.clone(), document);
        Ok(())
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            let this = *self;
            let mut state = this.shared.write()?;

            let forced = this.shared.forced_conflicts.load(AtomicOrdering::SeqCst);
            if forced > 0 {
                this.shared
                    .forced_conflicts
                    .store(forced - 1, AtomicOrdering::SeqCst);
                let key = this
                    .observed
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| Key::named("Transaction", "forced"));
                return Err(EntityStoreError::Conflict { key });
            }

            for (key, version) in &this.observed {
                if state.version_of(key) != *version {
                    return Err(EntityStoreError::Conflict { key: key.clone() });
                }
            }

            for document in this.writes.into_values() {
                state.write(document);
            }
            this.shared.commits.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        })
    }
}

fn run_query(state: &State, query: &Query) -> Vec<Document> {
    let mut matches: Vec<Document> = state
        .entities
        .iter()
        .filter(|(key, _)| key.kind() == query.kind)
        .filter(|(key, _)| {
            query
                .ancestor
                .as_ref()
                .is_none_or(|ancestor| key.is_descendant_of(ancestor))
        })
        .filter(|(_, stored)| {
            query
                .filters
                .iter()
                .all(|filter| matches_filter(&stored.properties, filter))
        })
        .filter(|(_, stored)| {
            query
                .orders
                .iter()
                .all(|order| stored.properties.contains_key(&order.property))
        })
        .map(|(key, stored)| Document {
            key: key.clone(),
            properties: stored.properties.clone(),
        })
        .collect();

    if !query.orders.is_empty() {
        // Stable sort keeps key order among ties.
        matches.sort_by(|a, b| compare_documents(a, b, &query.orders));
    }
    matches
}

fn matches_filter(properties: &Properties, filter: &PropertyFilter) -> bool {
    let Some(value) = properties.get(&filter.property) else {
        return false;
    };
    match value {
        Value::Array(items) => items.iter().any(|item| compare_op(item, filter)),
        scalar => compare_op(scalar, filter),
    }
}

fn compare_op(value: &Value, filter: &PropertyFilter) -> bool {
    let ordering = compare_values(value, &filter.value);
    match filter.op {
        FilterOp::Equal => ordering == Ordering::Equal,
        FilterOp::NotEqual => ordering != Ordering::Equal,
        FilterOp::LessThan => ordering == Ordering::Less,
        FilterOp::LessThanOrEqual => ordering != Ordering::Greater,
        FilterOp::GreaterThan => ordering == Ordering::Greater,
        FilterOp::GreaterThanOrEqual => ordering != Ordering::Less,
    }
}

fn compare_documents(a: &Document, b: &Document, orders: &[SortOrder]) -> Ordering {
    for order in orders {
        let left = sort_value(a, order);
        let right = sort_value(b, order);
        let ordering = match (left, right) {
            (Some(l), Some(r)) => compare_values(l, r),
            (l, r) => l.is_some().cmp(&r.is_some()),
        };
        let ordering = match order.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Lists sort by their smallest element ascending and largest descending.
fn sort_value<'a>(document: &'a Document, order: &SortOrder) -> Option<&'a Value> {
    match document.property(&order.property)? {
        Value::Array(items) => match order.direction {
            Direction::Ascending => items.iter().min_by(|a, b| compare_values(a, b)),
            Direction::Descending => items.iter().max_by(|a, b| compare_values(a, b)),
        },
        scalar => Some(scalar),
    }
}

const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order across JSON values: by type first, then by value.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(key: Key, properties: Value) -> Document {
        let Value::Object(properties) = properties else {
            unreachable!("test documents are objects")
        };
        Document { key, properties }
    }

    async fn seed(store: &InMemoryEntityStore) {
        let organizer = Key::named("Profile", "org");
        for (id, name, month, city) in [
            (1, "RustConf", 9, "Portland"),
            (2, "EuroRust", 10, "Paris"),
            (3, "Oxidize", 3, "Berlin"),
            (4, "Alpha", 10, "Paris"),
        ] {
            store
                .put(doc(
                    Key::with_parent(&organizer, "Conference", id),
                    json!({ "name": name, "month": month, "city": city, "topics": ["rust", city] }),
                ))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn filters_and_orders_like_a_datastore() {
        let store = InMemoryEntityStore::new();
        seed(&store).await;

        let query = Query::new("Conference")
            .filter("month", FilterOp::GreaterThan, 3)
            .order_by("month")
            .order_by("name");
        let names: Vec<_> = store
            .query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.properties["name"].clone())
            .collect();

        assert_eq!(names, vec![json!("RustConf"), json!("Alpha"), json!("EuroRust")]);
    }

    #[tokio::test]
    async fn list_properties_match_any_element() {
        let store = InMemoryEntityStore::new();
        seed(&store).await;

        let query = Query::new("Conference").filter("topics", FilterOp::Equal, "Berlin");
        let found = store.query(&query).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].properties["name"], json!("Oxidize"));
    }

    #[tokio::test]
    async fn rejects_queries_the_store_cannot_serve() {
        let store = InMemoryEntityStore::new();
        let query = Query::new("Conference")
            .filter("month", FilterOp::GreaterThan, 3)
            .filter("max_attendees", FilterOp::LessThan, 100);

        assert!(matches!(
            store.query(&query).await,
            Err(EntityStoreError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn ancestor_queries_only_return_descendants() {
        let store = InMemoryEntityStore::new();
        seed(&store).await;
        let other = Key::named("Profile", "someone-else");
        store
            .put(doc(Key::with_parent(&other, "Conference", 1), json!({ "name": "Elsewhere" })))
            .await
            .unwrap();

        let mine = store
            .query(&Query::new("Conference").ancestor(Key::named("Profile", "org")))
            .await
            .unwrap();

        assert_eq!(mine.len(), 4);
        assert_eq!(store.count("Conference"), 5);
    }

    #[tokio::test]
    async fn allocated_ids_are_increasing_per_parent_and_kind() {
        let store = InMemoryEntityStore::new();
        let parent = Key::named("Profile", "org");

        assert_eq!(store.allocate_ids("Conference", Some(&parent), 2).await.unwrap(), vec![1, 2]);
        assert_eq!(store.allocate_ids("Conference", Some(&parent), 1).await.unwrap(), vec![3]);
        assert_eq!(store.allocate_ids("Conference", None, 1).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn concurrent_writer_makes_commit_conflict() {
        let store = InMemoryEntityStore::new();
        let key = Key::named("Counter", "seats");
        store.put(doc(key.clone(), json!({ "value": 1 }))).await.unwrap();

        let mut txn = store.begin(TransactionOptions::default()).await.unwrap();
        txn.get(&key).await.unwrap();
        store.put(doc(key.clone(), json!({ "value": 5 }))).await.unwrap();
        txn.put(doc(key.clone(), json!({ "value": 0 }))).unwrap();

        assert!(matches!(
            txn.commit().await,
            Err(EntityStoreError::Conflict { .. })
        ));
        let current = store.get(&key).await.unwrap().unwrap();
        assert_eq!(current.properties["value"], json!(5));
        assert_eq!(store.committed_transactions(), 0);
    }

    #[tokio::test]
    async fn single_group_transactions_reject_a_second_group() {
        let store = InMemoryEntityStore::new();
        let mut txn = store.begin(TransactionOptions::default()).await.unwrap();
        txn.get(&Key::named("Profile", "a")).await.unwrap();

        let err = txn.get(&Key::named("Profile", "b")).await.unwrap_err();
        assert!(matches!(err, EntityStoreError::CrossGroupNotEnabled { .. }));

        let mut xg = store.begin(TransactionOptions::cross_group()).await.unwrap();
        xg.get(&Key::named("Profile", "a")).await.unwrap();
        xg.put(doc(Key::named("Profile", "b"), json!({}))).unwrap();
        xg.commit().await.unwrap();
        assert_eq!(store.count("Profile"), 1);
    }

    #[tokio::test]
    async fn forced_conflicts_apply_nothing() {
        let store = InMemoryEntityStore::new();
        store.fail_next_commits(1);

        let mut txn = store.begin(TransactionOptions::default()).await.unwrap();
        txn.put(doc(Key::named("Profile", "a"), json!({}))).unwrap();
        assert!(txn.commit().await.is_err());
        assert_eq!(store.count("Profile"), 0);

        let mut txn = store.begin(TransactionOptions::default()).await.unwrap();
        txn.put(doc(Key::named("Profile", "a"), json!({}))).unwrap();
        txn.commit().await.unwrap();
        assert_eq!(store.count("Profile"), 1);
    }
}
