//! Entity store abstraction: documents, queries and transactions.
//!
//! The store is a key/document database with ancestor-scoped keys. It offers
//! point reads and writes, id allocation under a parent, single-kind queries
//! with conjunctive property filters and ordering, and optimistic
//! transactions.
//!
//! # Query restrictions
//!
//! Like the datastores this models, a query may carry range (inequality)
//! filters on **at most one property**, and when the query is ordered the
//! first sort order must be on that property. [`Query::validate`] checks both
//! rules and every backend must reject violating queries with
//! [`EntityStoreError::InvalidQuery`].
//!
//! # Transactions
//!
//! A [`Transaction`] buffers writes and records the version of every entity it
//! reads. [`Transaction::commit`] applies all writes atomically or fails with
//! [`EntityStoreError::Conflict`] when another writer changed one of those
//! entities in the meantime. Callers retry conflicted transactions from the
//! beginning.
//!
//! Transactions are limited to a single entity group unless opened with
//! [`TransactionOptions::cross_group`].
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! store can be shared as `Arc<dyn EntityStore>`.

use crate::key::Key;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EntityStoreError>> + Send + 'a>>;

/// Errors that can occur during entity store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityStoreError {
    /// Optimistic concurrency conflict at commit time.
    ///
    /// Transient: the whole transaction should be retried.
    #[error("Transaction conflict on {key}")]
    Conflict {
        /// First entity found modified by a concurrent writer.
        key: Key,
    },

    /// A single-group transaction touched a second entity group.
    #[error("Transaction touches entity groups {first} and {second} without cross-group support")]
    CrossGroupNotEnabled {
        /// Group touched first.
        first: Key,
        /// Group that was rejected.
        second: Key,
    },

    /// The query violates the store's query restrictions.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A document could not be converted to or from an entity.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend failure (connection, storage, poisoned lock...).
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl EntityStoreError {
    /// True for errors a caller may resolve by retrying the transaction.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// A stored entity: its key plus a JSON object of properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Entity key.
    pub key: Key,
    /// Property map. Always a JSON object.
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Build a document from a typed entity.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Serialization`] if the entity does not
    /// serialize to a JSON object.
    pub fn from_entity<E: Entity>(entity: &E) -> Result<Self, EntityStoreError> {
        match serde_json::to_value(entity) {
            Ok(serde_json::Value::Object(properties)) => Ok(Self {
                key: entity.key().clone(),
                properties,
            }),
            Ok(other) => Err(EntityStoreError::Serialization(format!(
                "{} did not serialize to an object: {other}",
                E::KIND
            ))),
            Err(e) => Err(EntityStoreError::Serialization(e.to_string())),
        }
    }

    /// Decode the document into a typed entity.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Serialization`] when the kind does not match
    /// or the properties do not deserialize.
    pub fn into_entity<E: Entity>(self) -> Result<E, EntityStoreError> {
        if self.key.kind() != E::KIND {
            return Err(EntityStoreError::Serialization(format!(
                "expected kind {}, found {}",
                E::KIND,
                self.key.kind()
            )));
        }
        serde_json::from_value(serde_json::Value::Object(self.properties))
            .map_err(|e| EntityStoreError::Serialization(format!("{}: {e}", E::KIND)))
    }

    /// Property lookup.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }
}

/// Typed entity persisted as a [`Document`].
///
/// The entity's own key is expected to be one of its serialized fields so a
/// decoded entity always knows its identity.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Kind name used in keys and queries.
    const KIND: &'static str;

    /// The entity's key.
    fn key(&self) -> &Key;
}

/// Comparison operator of a property filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl FilterOp {
    /// Every operator except `=` is a range (inequality) operator.
    #[must_use]
    pub const fn is_inequality(self) -> bool {
        !matches!(self, Self::Equal)
    }

    /// Symbol as it appears in query plans and logs.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

/// `property <op> value` predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyFilter {
    /// Property name.
    pub property: String,
    /// Operator.
    pub op: FilterOp,
    /// Right-hand side.
    pub value: serde_json::Value,
}

impl fmt::Display for PropertyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.op.symbol(), self.value)
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortOrder {
    /// Property name.
    pub property: String,
    /// Direction.
    pub direction: Direction,
}

/// Single-kind query.
///
/// ```
/// use conference_core::entity_store::{FilterOp, Query};
///
/// let query = Query::new("Conference")
///     .filter("month", FilterOp::GreaterThan, 3)
///     .filter("city", FilterOp::Equal, "Paris")
///     .order_by("month")
///     .order_by("name");
///
/// assert_eq!(query.inequality_property(), Some("month"));
/// assert!(query.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Kind to scan.
    pub kind: String,
    /// Restrict results to descendants of this key.
    pub ancestor: Option<Key>,
    /// Conjunctive predicates.
    pub filters: Vec<PropertyFilter>,
    /// Sort keys, most significant first.
    pub orders: Vec<SortOrder>,
}

impl Query {
    /// Unfiltered, unordered query over `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestor: None,
            filters: Vec::new(),
            orders: Vec::new(),
        }
    }

    /// Restrict to descendants of `ancestor`.
    #[must_use]
    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    /// Add a predicate.
    #[must_use]
    pub fn filter(
        mut self,
        property: impl Into<String>,
        op: FilterOp,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.filters.push(PropertyFilter {
            property: property.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Add an ascending sort key.
    #[must_use]
    pub fn order_by(self, property: impl Into<String>) -> Self {
        self.order(property, Direction::Ascending)
    }

    /// Add a sort key with explicit direction.
    #[must_use]
    pub fn order(mut self, property: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(SortOrder {
            property: property.into(),
            direction,
        });
        self
    }

    /// Property carrying the query's inequality filters, if any.
    #[must_use]
    pub fn inequality_property(&self) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.op.is_inequality())
            .map(|f| f.property.as_str())
    }

    /// Check the store's query restrictions.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::InvalidQuery`] when inequality filters span
    /// more than one property, or when the query is ordered and the first sort
    /// key is not the inequality property.
    pub fn validate(&self) -> Result<(), EntityStoreError> {
        let Some(inequality) = self.inequality_property() else {
            return Ok(());
        };

        if let Some(other) = self
            .filters
            .iter()
            .find(|f| f.op.is_inequality() && f.property != inequality)
        {
            return Err(EntityStoreError::InvalidQuery(format!(
                "inequality filters on both '{inequality}' and '{}'",
                other.property
            )));
        }

        match self.orders.first() {
            Some(first) if first.property != inequality => Err(EntityStoreError::InvalidQuery(
                format!(
                    "first sort order must be on inequality property '{inequality}', found '{}'",
                    first.property
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// Options for [`EntityStore::begin`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Allow the transaction to span several entity groups.
    pub cross_group: bool,
}

impl TransactionOptions {
    /// Options for a transaction spanning several entity groups.
    #[must_use]
    pub const fn cross_group() -> Self {
        Self { cross_group: true }
    }
}

/// Transactional key/document store.
pub trait EntityStore: Send + Sync {
    /// Read one entity. Missing keys yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Backend`] on storage failure.
    fn get<'a>(&'a self, key: &'a Key) -> StoreFuture<'a, Option<Document>>;

    /// Read several entities; the result is positionally aligned with `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Backend`] on storage failure.
    fn get_multi<'a>(&'a self, keys: &'a [Key]) -> StoreFuture<'a, Vec<Option<Document>>>;

    /// Insert or replace an entity outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Backend`] on storage failure.
    fn put(&self, document: Document) -> StoreFuture<'_, ()>;

    /// Reserve `count` fresh integer ids for `kind` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Backend`] on storage failure.
    fn allocate_ids<'a>(
        &'a self,
        kind: &'a str,
        parent: Option<&'a Key>,
        count: usize,
    ) -> StoreFuture<'a, Vec<i64>>;

    /// Run a query.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::InvalidQuery`] when [`Query::validate`]
    /// fails, or [`EntityStoreError::Backend`] on storage failure.
    fn query<'a>(&'a self, query: &'a Query) -> StoreFuture<'a, Vec<Document>>;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Backend`] on storage failure.
    fn begin(&self, options: TransactionOptions) -> StoreFuture<'_, Box<dyn Transaction>>;
}

/// Open optimistic transaction. Dropping it without committing discards all
/// buffered writes.
pub trait Transaction: Send {
    /// Transactional read; records the entity version for commit-time checks.
    /// Reads observe the transaction's own buffered writes.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::CrossGroupNotEnabled`] when the key falls
    /// in a second entity group of a single-group transaction.
    fn get<'a>(&'a mut self, key: &'a Key) -> StoreFuture<'a, Option<Document>>;

    /// Buffer a write.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::CrossGroupNotEnabled`] as for
    /// [`Transaction::get`].
    fn put(&mut self, document: Document) -> Result<(), EntityStoreError>;

    /// Apply every buffered write atomically.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Conflict`] when an entity read or written by
    /// this transaction changed since it was first observed.
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;
}
