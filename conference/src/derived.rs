//! Derived caches: the nearly-sold-out announcement and the featured-speaker
//! message.
//!
//! Both follow the same pattern: recompute the whole value from the store
//! and overwrite the cache entry. Nothing is merged with a previous value,
//! so running a recomputation twice is harmless and at-least-once trigger
//! delivery needs no deduplication.
//!
//! Readers ([`DerivedCache::announcement`], [`DerivedCache::featured_speaker`])
//! only look at the cache. A miss reads as the empty string and never
//! triggers a recomputation; the cache may lag behind the store.
//!
//! Cache failures are logged and swallowed on both paths: the write that
//! caused the recomputation already succeeded, and an unreachable cache just
//! means "no announcement" for a while.

use crate::config::CacheConfig;
use crate::error::{ConferenceError, Result};
use crate::models::{Conference, Session, Speaker};
use crate::repository;
use conference_core::cache::Cache;
use conference_core::entity_store::{Entity, EntityStore, FilterOp, Query};
use conference_core::key::Key;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of the announcement; conference names follow, comma separated.
pub const ANNOUNCEMENT_PREFIX: &str =
    "Last chance to attend! The following conferences are nearly sold out: ";

/// Recomputes and serves the derived cache entries.
#[derive(Clone)]
pub struct DerivedCache {
    store: Arc<dyn EntityStore>,
    cache: Arc<dyn Cache>,
    config: CacheConfig,
}

impl DerivedCache {
    /// Create a manager over `store` and `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, cache: Arc<dyn Cache>, config: CacheConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Recompute the announcement listing every conference with
    /// `0 < seats_available <= threshold`.
    ///
    /// When at least one conference qualifies the entry is set; otherwise it
    /// is deleted, absence being the "no announcement" state. Returns the
    /// announcement, `None` when nothing qualifies.
    ///
    /// # Errors
    ///
    /// Store failures. Cache failures are logged only.
    #[tracing::instrument(skip(self))]
    pub async fn recompute_announcement(&self) -> Result<Option<String>> {
        let query = Query::new(Conference::KIND)
            .filter(
                Conference::SEATS_AVAILABLE,
                FilterOp::LessThanOrEqual,
                self.config.nearly_sold_out_threshold,
            )
            .filter(Conference::SEATS_AVAILABLE, FilterOp::GreaterThan, 0);
        let conferences: Vec<Conference> = repository::query(self.store.as_ref(), &query).await?;

        let key = self.config.announcement_key.as_str();
        if conferences.is_empty() {
            if let Err(e) = self.cache.delete(key).await {
                warn!(error = %e, cache_key = key, "Failed to clear announcement");
            }
            debug!("No conference is nearly sold out");
            return Ok(None);
        }

        let names: Vec<&str> = conferences.iter().map(|c| c.name.as_str()).collect();
        let announcement = format!("{ANNOUNCEMENT_PREFIX}{}", names.join(", "));
        if let Err(e) = self.cache.set(key, announcement.clone()).await {
            warn!(error = %e, cache_key = key, "Failed to store announcement");
        }
        info!(conferences = names.len(), "Announcement recomputed");
        Ok(Some(announcement))
    }

    /// Recompute the featured-speaker message for the conference of
    /// `session_key`.
    ///
    /// Every speaker of the triggering session contributes one line. A speaker
    /// appearing in two or more sessions of the conference (the triggering
    /// one included) gets
    /// `Speaker First Last (Institution) is featured in the following sessions: A, B`;
    /// every line, even an empty one, ends with `".\n"`. The entry is always
    /// overwritten with the result.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] when the session does not resolve, and
    /// store failures. Cache failures are logged only.
    #[tracing::instrument(skip(self, session_key), fields(session = %session_key))]
    pub async fn recompute_featured_speaker(&self, session_key: &Key) -> Result<String> {
        let session: Session = repository::require(self.store.as_ref(), session_key).await?;
        let conference_key = session
            .conference_key()
            .ok_or_else(|| ConferenceError::not_found(Conference::KIND, session_key))?;
        let sessions: Vec<Session> = repository::query(
            self.store.as_ref(),
            &Query::new(Session::KIND).ancestor(conference_key),
        )
        .await?;

        let mut message = String::new();
        for speaker_key in &session.speakers {
            let featured_in: Vec<&str> = sessions
                .iter()
                .filter(|s| s.speakers.contains(speaker_key))
                .map(|s| s.name.as_str())
                .collect();

            if featured_in.len() > 1 {
                match repository::fetch::<Speaker>(self.store.as_ref(), speaker_key).await? {
                    Some(speaker) => {
                        message.push_str("Speaker ");
                        message.push_str(&speaker.full_name());
                        message.push_str(" is featured in the following sessions: ");
                        message.push_str(&featured_in.join(", "));
                    }
                    None => warn!(speaker = %speaker_key, "Session references a missing speaker"),
                }
            }
            message.push_str(".\n");
        }

        let key = self.config.featured_speaker_key.as_str();
        if let Err(e) = self.cache.set(key, message.clone()).await {
            warn!(error = %e, cache_key = key, "Failed to store featured speaker message");
        }
        info!(speakers = session.speakers.len(), "Featured speaker message recomputed");
        Ok(message)
    }

    /// Cached announcement, empty when absent or unreadable.
    pub async fn announcement(&self) -> String {
        self.read(&self.config.announcement_key).await
    }

    /// Cached featured-speaker message, empty when absent or unreadable.
    pub async fn featured_speaker(&self) -> String {
        self.read(&self.config.featured_speaker_key).await
    }

    async fn read(&self, key: &str) -> String {
        match self.cache.get(key).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, cache_key = key, "Cache read failed, serving empty value");
                String::new()
            }
        }
    }
}
