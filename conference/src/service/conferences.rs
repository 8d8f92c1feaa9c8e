use super::{ConferenceService, required};
use crate::error::{ConferenceError, Result};
use crate::models::{Conference, Profile};
use crate::query::{self, ConferenceFilter};
use crate::repository;
use crate::triggers::Trigger;
use chrono::{Datelike, NaiveDate};
use conference_core::entity_store::{Entity, Query};
use conference_core::key::Key;
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_CITY: &str = "Default City";
const DEFAULT_TOPICS: [&str; 2] = ["Default", "Topic"];

/// Fields of a new conference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceDraft {
    /// Name; required.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Topics; defaults to `["Default", "Topic"]`.
    pub topics: Vec<String>,
    /// City; defaults to `"Default City"`.
    pub city: Option<String>,
    /// First day.
    pub start_date: Option<NaiveDate>,
    /// Last day.
    pub end_date: Option<NaiveDate>,
    /// Capacity; defaults to 0.
    pub max_attendees: Option<i64>,
}

/// Partial update of a conference; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceUpdate {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New topics.
    pub topics: Option<Vec<String>>,
    /// New city.
    pub city: Option<String>,
    /// New first day; also updates the month.
    pub start_date: Option<NaiveDate>,
    /// New last day.
    pub end_date: Option<NaiveDate>,
    /// New capacity.
    pub max_attendees: Option<i64>,
    /// Direct write of the seat count, bypassing registration accounting.
    pub seats_available: Option<i64>,
}

fn check_capacity(max_attendees: i64) -> Result<()> {
    if max_attendees < 0 {
        return Err(ConferenceError::InvalidInput(
            "'max_attendees' must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn month_of(date: Option<NaiveDate>) -> u32 {
    date.map_or(0, |d| d.month())
}

impl ConferenceService {
    /// Create a conference organized by `user_id`.
    ///
    /// The key is allocated under the organizer's profile. A confirmation
    /// email is queued when the organizer has an email address, and the
    /// announcement is queued for recomputation.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::InvalidInput`] for a missing name or a negative
    /// capacity; store failures.
    pub async fn create_conference(&self, user_id: &str, draft: ConferenceDraft) -> Result<Conference> {
        let name = required(&draft.name, "name")?;
        let max_attendees = draft.max_attendees.unwrap_or(0);
        check_capacity(max_attendees)?;

        let profile = self.profile(user_id).await?;
        let id =
            repository::allocate_id(self.store(), Conference::KIND, Some(&profile.key)).await?;

        let conference = Conference {
            key: Key::with_parent(&profile.key, Conference::KIND, id),
            name,
            description: draft.description,
            organizer_user_id: user_id.to_string(),
            topics: if draft.topics.is_empty() {
                DEFAULT_TOPICS.iter().map(ToString::to_string).collect()
            } else {
                draft.topics
            },
            city: draft.city.unwrap_or_else(|| DEFAULT_CITY.to_string()),
            start_date: draft.start_date,
            month: month_of(draft.start_date),
            end_date: draft.end_date,
            max_attendees,
            seats_available: max_attendees.max(0),
        };
        repository::save(self.store(), &conference).await?;
        info!(user_id, conference = %conference.key, "Conference created");

        if let Some(email) = profile.main_email {
            self.dispatcher
                .dispatch(Trigger::SendConfirmationEmail {
                    email,
                    conference_name: conference.name.clone(),
                })
                .await;
        }
        self.dispatcher.dispatch(Trigger::RecomputeAnnouncement).await;

        Ok(conference)
    }

    /// Update the conference at `key`. Only its organizer may.
    ///
    /// Setting `seats_available` writes the count as given, without looking
    /// at the registrations.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`], [`ConferenceError::Forbidden`],
    /// [`ConferenceError::InvalidInput`] for a blank name or a negative
    /// capacity; [`ConferenceError::TransactionConflict`] once retries are exhausted.
    pub async fn update_conference(
        &self,
        user_id: &str,
        key: &Key,
        update: ConferenceUpdate,
    ) -> Result<Conference> {
        let name = update
            .name
            .as_deref()
            .map(|name| required(name, "name"))
            .transpose()?;
        if let Some(max_attendees) = update.max_attendees {
            check_capacity(max_attendees)?;
        }

        let conference = self
            .mutate(
                key,
                || Err(ConferenceError::not_found(Conference::KIND, key)),
                |conference: &mut Conference| {
                    Self::ensure_organizer(user_id, conference)?;
                    if let Some(name) = &name {
                        conference.name.clone_from(name);
                    }
                    if let Some(description) = &update.description {
                        conference.description = Some(description.clone());
                    }
                    if let Some(topics) = &update.topics {
                        conference.topics.clone_from(topics);
                    }
                    if let Some(city) = &update.city {
                        conference.city.clone_from(city);
                    }
                    if let Some(start_date) = update.start_date {
                        conference.start_date = Some(start_date);
                        conference.month = month_of(Some(start_date));
                    }
                    if let Some(end_date) = update.end_date {
                        conference.end_date = Some(end_date);
                    }
                    if let Some(max_attendees) = update.max_attendees {
                        conference.max_attendees = max_attendees;
                    }
                    if let Some(seats_available) = update.seats_available {
                        conference.seats_available = seats_available;
                    }
                    Ok(())
                },
            )
            .await?;

        info!(user_id, conference = %conference.key, "Conference updated");
        if update.seats_available.is_some() {
            self.dispatcher.dispatch(Trigger::RecomputeAnnouncement).await;
        }
        Ok(conference)
    }

    /// Load one conference.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`]; store failures.
    pub async fn conference(&self, key: &Key) -> Result<Conference> {
        repository::require(self.store(), key).await
    }

    /// Conferences matching `filters`, ordered by the inequality field (if
    /// any) and then by name.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::InvalidFilter`] and
    /// [`ConferenceError::MultipleInequalityFields`] from compilation; store
    /// failures.
    pub async fn query_conferences(&self, filters: &[ConferenceFilter]) -> Result<Vec<Conference>> {
        let query = query::compile(filters)?;
        repository::query(self.store(), &query).await
    }

    /// Conferences organized by `user_id`, by name.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn conferences_created(&self, user_id: &str) -> Result<Vec<Conference>> {
        let query = Query::new(Conference::KIND)
            .ancestor(Profile::key_for(user_id))
            .order_by(Conference::NAME);
        repository::query(self.store(), &query).await
    }

    /// Conferences `user_id` is registered for, in registration order.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn conferences_to_attend(&self, user_id: &str) -> Result<Vec<Conference>> {
        let Some(profile) = repository::fetch::<Profile>(self.store(), &Profile::key_for(user_id)).await?
        else {
            return Ok(Vec::new());
        };
        repository::fetch_existing(self.store(), &profile.conference_keys_to_attend).await
    }

    /// Conferences with fewer than 5% of their seats left.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn successful_conferences(&self) -> Result<Vec<Conference>> {
        let all: Vec<Conference> = repository::query(
            self.store(),
            &Query::new(Conference::KIND).order_by(Conference::NAME),
        )
        .await?;
        Ok(all
            .into_iter()
            .filter(|c| {
                c.seats_available
                    .checked_mul(20)
                    .is_some_and(|scaled| scaled < c.max_attendees)
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::config::Config;
    use crate::error::ConferenceError;
    use crate::query::ConferenceFilter;
    use crate::service::{ConferenceDraft, ConferenceService, ConferenceUpdate, ProfileUpdate};
    use crate::triggers::Trigger;
    use chrono::NaiveDate;
    use conference_testing::{InMemoryCache, InMemoryEntityStore, InMemoryTaskQueue};
    use std::sync::Arc;

    fn service() -> (ConferenceService, InMemoryTaskQueue) {
        let queue = InMemoryTaskQueue::new();
        let service = ConferenceService::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(queue.clone()),
            &Config::default(),
        );
        (service, queue)
    }

    fn draft(name: &str, city: &str, max_attendees: i64) -> ConferenceDraft {
        ConferenceDraft {
            name: name.into(),
            city: Some(city.into()),
            max_attendees: Some(max_attendees),
            ..ConferenceDraft::default()
        }
    }

    fn queued(service: &ConferenceService, queue: &InMemoryTaskQueue) -> Vec<Trigger> {
        queue
            .drain(service.dispatcher().queue_name())
            .iter()
            .map(|payload| Trigger::decode(payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let (service, _) = service();

        let conference = service
            .create_conference(
                "org",
                ConferenceDraft {
                    name: "RustConf".into(),
                    start_date: NaiveDate::from_ymd_opt(2026, 9, 10),
                    ..ConferenceDraft::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(conference.city, "Default City");
        assert_eq!(conference.topics, vec!["Default", "Topic"]);
        assert_eq!(conference.month, 9);
        assert_eq!(conference.max_attendees, 0);
        assert_eq!(conference.seats_available, 0);
        assert_eq!(conference.organizer_user_id, "org");
        assert_eq!(conference.key.parent().unwrap().id().to_string(), "org");
    }

    #[tokio::test]
    async fn create_requires_a_name() {
        let (service, _) = service();

        let err = service
            .create_conference("org", draft("  ", "Paris", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::InvalidInput(_)));

        let err = service
            .create_conference("org", draft("Neg", "Paris", -1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_queues_email_only_with_an_address() {
        let (service, queue) = service();

        service.create_conference("org", draft("A", "Paris", 10)).await.unwrap();
        assert_eq!(queued(&service, &queue), vec![Trigger::RecomputeAnnouncement]);

        service
            .save_profile(
                "org",
                ProfileUpdate {
                    main_email: Some("org@example.com".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        service.create_conference("org", draft("B", "Paris", 10)).await.unwrap();

        assert_eq!(
            queued(&service, &queue),
            vec![
                Trigger::SendConfirmationEmail {
                    email: "org@example.com".into(),
                    conference_name: "B".into(),
                },
                Trigger::RecomputeAnnouncement,
            ]
        );
    }

    #[tokio::test]
    async fn only_the_organizer_may_update() {
        let (service, _) = service();
        let conference = service
            .create_conference("org", draft("RustConf", "Paris", 10))
            .await
            .unwrap();

        let err = service
            .update_conference("mallory", &conference.key, ConferenceUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::Forbidden(_)));

        let updated = service
            .update_conference(
                "org",
                &conference.key,
                ConferenceUpdate {
                    city: Some("Berlin".into()),
                    start_date: NaiveDate::from_ymd_opt(2026, 3, 1),
                    ..ConferenceUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.city, "Berlin");
        assert_eq!(updated.month, 3);
        assert_eq!(updated.name, "RustConf");
    }

    #[tokio::test]
    async fn filters_select_and_order_conferences() {
        let (service, _) = service();
        service.create_conference("org", draft("Zeta", "London", 50)).await.unwrap();
        service.create_conference("org", draft("Alpha", "London", 50)).await.unwrap();
        service.create_conference("org", draft("Tiny", "London", 5)).await.unwrap();
        service.create_conference("org", draft("Far", "Tokyo", 100)).await.unwrap();

        let found = service
            .query_conferences(&[
                ConferenceFilter::new("CITY", "EQ", "London"),
                ConferenceFilter::new("MAX_ATTENDEES", "GT", "10"),
            ])
            .await
            .unwrap();

        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn attended_and_created_conferences() {
        let (service, _) = service();
        let b = service.create_conference("org", draft("B", "Paris", 10)).await.unwrap();
        let a = service.create_conference("org", draft("A", "Paris", 10)).await.unwrap();
        service.create_conference("other", draft("C", "Paris", 10)).await.unwrap();

        let created: Vec<_> = service
            .conferences_created("org")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(created, vec!["A", "B"]);

        assert!(service.conferences_to_attend("ada").await.unwrap().is_empty());
        service.register("ada", &b.key).await.unwrap();
        service.register("ada", &a.key).await.unwrap();
        let attending: Vec<_> = service
            .conferences_to_attend("ada")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(attending, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn successful_conferences_have_under_five_percent_left() {
        let (service, _) = service();
        let full = service.create_conference("org", draft("Full", "Paris", 100)).await.unwrap();
        service.create_conference("org", draft("Empty", "Paris", 100)).await.unwrap();
        service.create_conference("org", draft("Zero", "Paris", 0)).await.unwrap();

        service
            .update_conference(
                "org",
                &full.key,
                ConferenceUpdate {
                    seats_available: Some(4),
                    ..ConferenceUpdate::default()
                },
            )
            .await
            .unwrap();

        let names: Vec<_> = service
            .successful_conferences()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Full"]);
    }

    #[tokio::test]
    async fn successful_conferences_handle_huge_capacities() {
        let (service, _) = service();
        let huge = service
            .create_conference("org", draft("Huge", "Paris", i64::MAX / 2))
            .await
            .unwrap();
        assert!(service.successful_conferences().await.unwrap().is_empty());

        service
            .update_conference(
                "org",
                &huge.key,
                ConferenceUpdate {
                    seats_available: Some(1),
                    ..ConferenceUpdate::default()
                },
            )
            .await
            .unwrap();
        let names: Vec<_> = service
            .successful_conferences()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Huge"]);
    }

    #[tokio::test]
    async fn update_rejects_negative_capacity() {
        let (service, _) = service();
        let conference = service
            .create_conference("org", draft("RustConf", "Paris", 10))
            .await
            .unwrap();

        let err = service
            .update_conference(
                "org",
                &conference.key,
                ConferenceUpdate {
                    max_attendees: Some(-5),
                    ..ConferenceUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::InvalidInput(_)));
        assert_eq!(service.conference(&conference.key).await.unwrap().max_attendees, 10);
    }
}
