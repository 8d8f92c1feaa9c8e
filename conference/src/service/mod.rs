//! Service operations over conferences, profiles, sessions and speakers.
//!
//! [`ConferenceService`] is the single entry point an outer layer (HTTP,
//! RPC, CLI) talks to. Every operation takes the acting `user_id`
//! explicitly; authentication happens before the call.
//!
//! Writes that touch entities registration also touches (profiles,
//! conferences, sessions) run as read-modify-write transactions retried on
//! conflict with the same policy as the inventory manager. Triggers are
//! dispatched after the write committed.

mod conferences;
mod profiles;
mod sessions;
mod wishlist;

pub use conferences::{ConferenceDraft, ConferenceUpdate};
pub use profiles::ProfileUpdate;
pub use sessions::{SessionDraft, SpeakerDraft};

use crate::config::Config;
use crate::derived::DerivedCache;
use crate::error::{ConferenceError, Result};
use crate::inventory::{InventoryManager, RegisterOutcome, UnregisterOutcome};
use crate::models::Conference;
use crate::triggers::{Notifier, Trigger, TriggerDispatcher, TriggerHandler};
use conference_core::cache::Cache;
use conference_core::entity_store::{Document, Entity, EntityStore, TransactionOptions};
use conference_core::key::Key;
use conference_core::task_queue::TaskQueue;
use conference_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::sync::Arc;

/// Conference application service.
#[derive(Clone)]
pub struct ConferenceService {
    store: Arc<dyn EntityStore>,
    inventory: InventoryManager,
    derived: Arc<DerivedCache>,
    dispatcher: TriggerDispatcher,
    retry: RetryPolicy,
}

impl ConferenceService {
    /// Wire the service over its three backends.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: Arc<dyn Cache>,
        queue: Arc<dyn TaskQueue>,
        config: &Config,
    ) -> Self {
        let retry = config.transaction.retry_policy();
        Self {
            inventory: InventoryManager::new(Arc::clone(&store), retry.clone()),
            derived: Arc::new(DerivedCache::new(
                Arc::clone(&store),
                cache,
                config.cache.clone(),
            )),
            dispatcher: TriggerDispatcher::new(queue, config.queue.trigger_queue.clone()),
            store,
            retry,
        }
    }

    /// Handler for the trigger worker, sharing this service's caches.
    #[must_use]
    pub fn handler(&self, notifier: Arc<dyn Notifier>) -> TriggerHandler {
        TriggerHandler::new(Arc::clone(&self.derived), notifier)
    }

    /// Dispatcher used for triggers.
    #[must_use]
    pub const fn dispatcher(&self) -> &TriggerDispatcher {
        &self.dispatcher
    }

    /// Derived-cache manager.
    #[must_use]
    pub const fn derived(&self) -> &Arc<DerivedCache> {
        &self.derived
    }

    /// Register `user_id` for a conference and queue an announcement
    /// recomputation.
    ///
    /// # Errors
    ///
    /// See [`InventoryManager::register`].
    pub async fn register(&self, user_id: &str, conference_key: &Key) -> Result<RegisterOutcome> {
        let outcome = self.inventory.register(user_id, conference_key).await?;
        self.dispatcher.dispatch(Trigger::RecomputeAnnouncement).await;
        Ok(outcome)
    }

    /// Unregister `user_id` from a conference. A returned seat queues an
    /// announcement recomputation.
    ///
    /// # Errors
    ///
    /// See [`InventoryManager::unregister`].
    pub async fn unregister(
        &self,
        user_id: &str,
        conference_key: &Key,
    ) -> Result<UnregisterOutcome> {
        let outcome = self.inventory.unregister(user_id, conference_key).await?;
        if outcome.changed {
            self.dispatcher.dispatch(Trigger::RecomputeAnnouncement).await;
        }
        Ok(outcome)
    }

    /// Current nearly-sold-out announcement; empty when there is none.
    pub async fn announcement(&self) -> String {
        self.derived.announcement().await
    }

    /// Current featured-speaker message; empty when there is none.
    pub async fn featured_speaker(&self) -> String {
        self.derived.featured_speaker().await
    }

    fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    /// Transactionally apply `update` to the entity at `key`, retrying on
    /// conflict. `missing` supplies the entity when the key does not
    /// resolve, or fails.
    async fn mutate<E, D, F>(&self, key: &Key, missing: D, update: F) -> Result<E>
    where
        E: Entity,
        D: Fn() -> Result<E> + Sync,
        F: Fn(&mut E) -> Result<()> + Sync,
    {
        let (missing, update) = (&missing, &update);
        retry_with_predicate(
            &self.retry,
            move || self.try_mutate(key, missing, update),
            ConferenceError::is_retryable,
        )
        .await
    }

    async fn try_mutate<E, D, F>(&self, key: &Key, missing: &D, update: &F) -> Result<E>
    where
        E: Entity,
        D: Fn() -> Result<E> + Sync,
        F: Fn(&mut E) -> Result<()> + Sync,
    {
        if key.kind() != E::KIND {
            return Err(ConferenceError::not_found(E::KIND, key));
        }

        let mut txn = self.store.begin(TransactionOptions::default()).await?;
        let mut entity = match txn.get(key).await? {
            Some(document) => document.into_entity()?,
            None => missing()?,
        };
        update(&mut entity)?;
        txn.put(Document::from_entity(&entity)?)?;
        txn.commit().await?;
        Ok(entity)
    }

    /// Fail with `Forbidden` unless `user_id` organizes `conference`.
    fn ensure_organizer(user_id: &str, conference: &Conference) -> Result<()> {
        if conference.organizer_user_id == user_id {
            Ok(())
        } else {
            Err(ConferenceError::Forbidden(format!(
                "only the organizer of '{}' may change it",
                conference.name
            )))
        }
    }
}

/// `Err(InvalidInput)` naming `field` when `value` is blank.
fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ConferenceError::InvalidInput(format!("'{field}' field required")))
    } else {
        Ok(trimmed.to_string())
    }
}
