//! Typed access to the entity store.

use crate::error::{ConferenceError, Result};
use conference_core::entity_store::{Document, Entity, EntityStore, EntityStoreError, Query};
use conference_core::key::Key;

/// Load one entity; `None` when the key does not resolve.
///
/// A key of another kind never resolves.
pub async fn fetch<E: Entity>(store: &dyn EntityStore, key: &Key) -> Result<Option<E>> {
    if key.kind() != E::KIND {
        return Ok(None);
    }
    Ok(store
        .get(key)
        .await?
        .map(Document::into_entity)
        .transpose()?)
}

/// Load one entity or fail with [`ConferenceError::NotFound`].
pub async fn require<E: Entity>(store: &dyn EntityStore, key: &Key) -> Result<E> {
    fetch(store, key)
        .await?
        .ok_or_else(|| ConferenceError::not_found(E::KIND, key))
}

/// Load several entities, skipping keys that do not resolve.
pub async fn fetch_existing<E: Entity>(store: &dyn EntityStore, keys: &[Key]) -> Result<Vec<E>> {
    let documents = store.get_multi(keys).await?;
    let mut entities = Vec::with_capacity(documents.len());
    for (key, document) in keys.iter().zip(documents) {
        match document {
            Some(document) if key.kind() == E::KIND => entities.push(document.into_entity()?),
            _ => tracing::warn!(key = %key, kind = E::KIND, "Dangling reference skipped"),
        }
    }
    Ok(entities)
}

/// Write one entity outside any transaction.
pub async fn save<E: Entity>(store: &dyn EntityStore, entity: &E) -> Result<()> {
    store.put(Document::from_entity(entity)?).await?;
    Ok(())
}

/// Run a query over `E::KIND` and decode the results.
pub async fn query<E: Entity>(store: &dyn EntityStore, query: &Query) -> Result<Vec<E>> {
    debug_assert_eq!(query.kind, E::KIND);
    store
        .query(query)
        .await?
        .into_iter()
        .map(|document| document.into_entity().map_err(ConferenceError::from))
        .collect()
}

/// Allocate one id for `kind` under `parent`.
pub async fn allocate_id(store: &dyn EntityStore, kind: &str, parent: Option<&Key>) -> Result<i64> {
    store
        .allocate_ids(kind, parent, 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ConferenceError::Store(EntityStoreError::Backend(format!("no id allocated for {kind}")))
        })
}
