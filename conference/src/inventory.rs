//! Seat inventory: registration and unregistration.
//!
//! A registration moves one seat from a conference to an attendee. The
//! conference and the attendee profile live in different entity groups, so
//! each call runs as one cross-group transaction:
//!
//! ```text
//! begin(cross_group)
//!   ├─ get Profile:{user}        (created in memory if absent)
//!   ├─ get conference            (NotFound if absent)
//!   ├─ check rules               (AlreadyRegistered / SeatsUnavailable)
//!   ├─ put profile + conference  (attendance list and seat count together)
//! commit ── Conflict ──► back off, start over (bounded)
//! ```
//!
//! Either both writes land or neither does. A conflicted commit is retried
//! from the beginning with the configured [`RetryPolicy`]; once the policy is
//! exhausted the caller gets [`ConferenceError::TransactionConflict`].

use crate::error::{ConferenceError, Result};
use crate::metrics;
use crate::models::{Conference, Profile};
use conference_core::entity_store::{Document, Entity, EntityStore, TransactionOptions};
use conference_core::key::Key;
use conference_runtime::retry::{RetryPolicy, retry_with_predicate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`InventoryManager::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOutcome {
    /// Always `true`; failures are errors.
    pub registered: bool,
}

/// Result of [`InventoryManager::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterOutcome {
    /// `false` when the user was not registered.
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeatChange {
    Take,
    Release,
}

impl SeatChange {
    const fn operation(self) -> &'static str {
        match self {
            Self::Take => "register",
            Self::Release => "unregister",
        }
    }
}

/// Transactional seat bookkeeping.
#[derive(Clone)]
pub struct InventoryManager {
    store: Arc<dyn EntityStore>,
    retry: RetryPolicy,
}

impl InventoryManager {
    /// Create a manager retrying conflicts according to `retry`.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Register `user_id` for the conference, taking one seat.
    ///
    /// # Errors
    ///
    /// - [`ConferenceError::NotFound`] if the conference does not exist
    /// - [`ConferenceError::AlreadyRegistered`] if the user already attends
    /// - [`ConferenceError::SeatsUnavailable`] if no seat is left
    /// - [`ConferenceError::TransactionConflict`] once retries are exhausted
    #[tracing::instrument(skip(self, conference_key), fields(conference = %conference_key))]
    pub async fn register(&self, user_id: &str, conference_key: &Key) -> Result<RegisterOutcome> {
        let registered = self.run(user_id, conference_key, SeatChange::Take).await?;
        Ok(RegisterOutcome { registered })
    }

    /// Unregister `user_id` from the conference, returning the seat.
    ///
    /// Not being registered is not an error: nothing changes and the outcome
    /// reports `changed: false`.
    ///
    /// # Errors
    ///
    /// - [`ConferenceError::NotFound`] if the conference does not exist
    /// - [`ConferenceError::TransactionConflict`] once retries are exhausted
    #[tracing::instrument(skip(self, conference_key), fields(conference = %conference_key))]
    pub async fn unregister(
        &self,
        user_id: &str,
        conference_key: &Key,
    ) -> Result<UnregisterOutcome> {
        let changed = self
            .run(user_id, conference_key, SeatChange::Release)
            .await?;
        Ok(UnregisterOutcome { changed })
    }

    async fn run(&self, user_id: &str, conference_key: &Key, change: SeatChange) -> Result<bool> {
        let result = retry_with_predicate(
            &self.retry,
            move || self.attempt(user_id, conference_key, change),
            |err: &ConferenceError| {
                let retryable = err.is_retryable();
                if retryable {
                    metrics::record_transaction_conflict();
                }
                retryable
            },
        )
        .await;

        let outcome = match &result {
            Ok(true) if change == SeatChange::Take => "registered",
            Ok(true) => "unregistered",
            Ok(false) => "not_registered",
            Err(ConferenceError::AlreadyRegistered) => "already_registered",
            Err(ConferenceError::SeatsUnavailable) => "sold_out",
            Err(ConferenceError::NotFound { .. }) => "not_found",
            Err(ConferenceError::TransactionConflict(_)) => "conflict",
            Err(_) => "error",
        };
        metrics::record_registration(change.operation(), outcome);

        match &result {
            Ok(true) => info!(user_id, operation = change.operation(), "Seat inventory updated"),
            Ok(false) => debug!(user_id, "Not registered, nothing to release"),
            Err(e) if e.is_retryable() => {
                warn!(user_id, error = %e, "Seat transaction abandoned after retries");
            }
            Err(e) => debug!(user_id, error = %e, "Seat change rejected"),
        }
        result
    }

    async fn attempt(&self, user_id: &str, conference_key: &Key, change: SeatChange) -> Result<bool> {
        if conference_key.kind() != Conference::KIND {
            return Err(ConferenceError::not_found(Conference::KIND, conference_key));
        }

        let mut txn = self.store.begin(TransactionOptions::cross_group()).await?;

        let profile_key = Profile::key_for(user_id);
        let mut profile = match txn.get(&profile_key).await? {
            Some(document) => document.into_entity::<Profile>()?,
            None => Profile::new(user_id),
        };
        let mut conference: Conference = txn
            .get(conference_key)
            .await?
            .ok_or_else(|| ConferenceError::not_found(Conference::KIND, conference_key))?
            .into_entity()?;

        match change {
            SeatChange::Take => {
                if profile.attends(conference_key) {
                    return Err(ConferenceError::AlreadyRegistered);
                }
                if conference.seats_available <= 0 {
                    return Err(ConferenceError::SeatsUnavailable);
                }
                profile.conference_keys_to_attend.push(conference_key.clone());
                conference.seats_available -= 1;
            }
            SeatChange::Release => {
                let Some(position) = profile
                    .conference_keys_to_attend
                    .iter()
                    .position(|k| k == conference_key)
                else {
                    return Ok(false);
                };
                profile.conference_keys_to_attend.remove(position);
                conference.seats_available += 1;
            }
        }

        txn.put(Document::from_entity(&profile)?)?;
        txn.put(Document::from_entity(&conference)?)?;
        txn.commit().await?;

        debug!(
            user_id,
            seats_available = conference.seats_available,
            "Seat transaction committed"
        );
        Ok(true)
    }
}
