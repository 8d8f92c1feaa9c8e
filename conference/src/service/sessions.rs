use super::{ConferenceService, required};
use crate::error::{ConferenceError, Result};
use crate::models::{Conference, Session, SessionType, Speaker};
use crate::repository;
use crate::triggers::Trigger;
use chrono::{NaiveDate, NaiveTime};
use conference_core::entity_store::{Entity, FilterOp, Query};
use conference_core::key::Key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

const DEFAULT_HIGHLIGHTS: &str = "No highlights";
const DEFAULT_DURATION: i64 = 1;
const EVENING: &str = "19:00:00";

/// Fields of a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDraft {
    /// Name; required.
    pub name: String,
    /// Highlights; defaults to `"No highlights"`.
    pub highlights: Option<String>,
    /// Speakers; each must exist.
    pub speakers: Vec<Key>,
    /// Duration in hours; defaults to 1.
    pub duration: Option<i64>,
    /// Kind; defaults to not specified.
    pub session_type: Option<SessionType>,
    /// Day; defaults to 2000-12-12.
    pub date: Option<NaiveDate>,
    /// Start; defaults to 12:00.
    pub start_time: Option<NaiveTime>,
}

/// Fields of a new speaker; all required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerDraft {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Institution.
    pub institution: String,
}

fn default_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 12, 12).unwrap_or_default()
}

fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()
}

impl ConferenceService {
    /// Add a session to a conference organized by `user_id`.
    ///
    /// Queues a featured-speaker recomputation for the new session.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the conference or a speaker,
    /// [`ConferenceError::Forbidden`], [`ConferenceError::InvalidInput`]
    /// for a missing name or a speaker listed twice; store failures.
    pub async fn create_session(
        &self,
        user_id: &str,
        conference_key: &Key,
        draft: SessionDraft,
    ) -> Result<Session> {
        let conference: Conference = repository::require(self.store(), conference_key).await?;
        Self::ensure_organizer(user_id, &conference)?;
        let name = required(&draft.name, "name")?;

        for (i, speaker) in draft.speakers.iter().enumerate() {
            if draft.speakers[..i].contains(speaker) {
                return Err(ConferenceError::InvalidInput(format!(
                    "speaker {speaker} is listed more than once"
                )));
            }
            repository::require::<Speaker>(self.store(), speaker).await?;
        }

        let id =
            repository::allocate_id(self.store(), Session::KIND, Some(conference_key)).await?;
        let session = Session {
            key: Key::with_parent(conference_key, Session::KIND, id),
            name,
            highlights: draft
                .highlights
                .unwrap_or_else(|| DEFAULT_HIGHLIGHTS.to_string()),
            speakers: draft.speakers,
            duration: draft.duration.unwrap_or(DEFAULT_DURATION),
            session_type: draft.session_type.unwrap_or_default(),
            date: draft.date.unwrap_or_else(default_date),
            start_time: draft.start_time.unwrap_or_else(default_start_time),
        };
        repository::save(self.store(), &session).await?;
        info!(user_id, session = %session.key, "Session created");

        self.dispatcher
            .dispatch(Trigger::RecomputeFeaturedSpeaker {
                session_key: session.key.clone(),
            })
            .await;
        Ok(session)
    }

    /// Sessions of a conference, in creation order.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the conference; store failures.
    pub async fn conference_sessions(&self, conference_key: &Key) -> Result<Vec<Session>> {
        repository::require::<Conference>(self.store(), conference_key).await?;
        repository::query(
            self.store(),
            &Query::new(Session::KIND).ancestor(conference_key.clone()),
        )
        .await
    }

    /// Sessions of a conference of one type.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the conference; store failures.
    pub async fn conference_sessions_by_type(
        &self,
        conference_key: &Key,
        session_type: SessionType,
    ) -> Result<Vec<Session>> {
        repository::require::<Conference>(self.store(), conference_key).await?;
        let query = Query::new(Session::KIND)
            .ancestor(conference_key.clone())
            .filter(Session::SESSION_TYPE, FilterOp::Equal, session_type.as_str());
        repository::query(self.store(), &query).await
    }

    /// Sessions, across all conferences, that `speaker_key` speaks at.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the speaker; store failures.
    pub async fn sessions_by_speaker(&self, speaker_key: &Key) -> Result<Vec<Session>> {
        repository::require::<Speaker>(self.store(), speaker_key).await?;
        let query = Query::new(Session::KIND).filter(
            Session::SPEAKERS,
            FilterOp::Equal,
            speaker_key.urlsafe(),
        );
        repository::query(self.store(), &query).await
    }

    /// Create a speaker.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::InvalidInput`] when a field is blank; store
    /// failures.
    pub async fn create_speaker(&self, draft: SpeakerDraft) -> Result<Speaker> {
        let first_name = required(&draft.first_name, "first_name")?;
        let last_name = required(&draft.last_name, "last_name")?;
        let institution = required(&draft.institution, "institution")?;

        let id = repository::allocate_id(self.store(), Speaker::KIND, None).await?;
        let speaker = Speaker {
            key: Key::root(Speaker::KIND, id),
            first_name,
            last_name,
            institution,
        };
        repository::save(self.store(), &speaker).await?;
        info!(speaker = %speaker.key, "Speaker created");
        Ok(speaker)
    }

    /// All speakers, in creation order.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_speakers(&self) -> Result<Vec<Speaker>> {
        repository::query(self.store(), &Query::new(Speaker::KIND)).await
    }

    /// Add a speaker to a session of a conference organized by `user_id`.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the session, its conference or the
    /// speaker, [`ConferenceError::Forbidden`],
    /// [`ConferenceError::InvalidInput`] when the speaker is already listed;
    /// store failures.
    pub async fn add_speaker_to_session(
        &self,
        user_id: &str,
        session_key: &Key,
        speaker_key: &Key,
    ) -> Result<Session> {
        repository::require::<Speaker>(self.store(), speaker_key).await?;
        self.ensure_session_organizer(user_id, session_key).await?;

        let session = self
            .mutate(
                session_key,
                || Err(ConferenceError::not_found(Session::KIND, session_key)),
                |session: &mut Session| {
                    if session.speakers.contains(speaker_key) {
                        return Err(ConferenceError::InvalidInput(
                            "speaker already added to the session".to_string(),
                        ));
                    }
                    session.speakers.push(speaker_key.clone());
                    Ok(())
                },
            )
            .await?;

        info!(user_id, session = %session_key, speaker = %speaker_key, "Speaker added");
        self.dispatcher
            .dispatch(Trigger::RecomputeFeaturedSpeaker {
                session_key: session_key.clone(),
            })
            .await;
        Ok(session)
    }

    /// Remove a speaker from a session of a conference organized by
    /// `user_id`.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the session, its conference or the
    /// speaker, [`ConferenceError::Forbidden`],
    /// [`ConferenceError::InvalidInput`] when the speaker is not listed;
    /// store failures.
    pub async fn remove_speaker_from_session(
        &self,
        user_id: &str,
        session_key: &Key,
        speaker_key: &Key,
    ) -> Result<Session> {
        repository::require::<Speaker>(self.store(), speaker_key).await?;
        self.ensure_session_organizer(user_id, session_key).await?;

        let session = self
            .mutate(
                session_key,
                || Err(ConferenceError::not_found(Session::KIND, session_key)),
                |session: &mut Session| {
                    let before = session.speakers.len();
                    session.speakers.retain(|k| k != speaker_key);
                    if session.speakers.len() == before {
                        return Err(ConferenceError::InvalidInput(
                            "speaker is not part of the session".to_string(),
                        ));
                    }
                    Ok(())
                },
            )
            .await?;

        info!(user_id, session = %session_key, speaker = %speaker_key, "Speaker removed");
        Ok(session)
    }

    /// Speakers appearing in two or more sessions, across conferences.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn popular_speakers(&self) -> Result<Vec<Speaker>> {
        let sessions: Vec<Session> =
            repository::query(self.store(), &Query::new(Session::KIND)).await?;

        let mut counts: HashMap<&Key, usize> = HashMap::new();
        let mut order = Vec::new();
        for speaker in sessions.iter().flat_map(|s| &s.speakers) {
            let count = counts.entry(speaker).or_insert(0);
            *count += 1;
            if *count == 2 {
                order.push(speaker.clone());
            }
        }
        repository::fetch_existing(self.store(), &order).await
    }

    /// Sessions of a conference starting before 19:00 that are not
    /// workshops, by start time.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the conference; store failures.
    pub async fn early_non_workshop_sessions(&self, conference_key: &Key) -> Result<Vec<Session>> {
        repository::require::<Conference>(self.store(), conference_key).await?;
        let query = Query::new(Session::KIND)
            .ancestor(conference_key.clone())
            .filter(Session::START_TIME, FilterOp::LessThan, EVENING)
            .order_by(Session::START_TIME);
        let sessions: Vec<Session> = repository::query(self.store(), &query).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.session_type != SessionType::Workshop)
            .collect())
    }

    async fn ensure_session_organizer(&self, user_id: &str, session_key: &Key) -> Result<()> {
        if session_key.kind() != Session::KIND {
            return Err(ConferenceError::not_found(Session::KIND, session_key));
        }
        let conference_key = session_key
            .parent()
            .ok_or_else(|| ConferenceError::not_found(Session::KIND, session_key))?;
        let conference: Conference = repository::require(self.store(), &conference_key).await?;
        Self::ensure_organizer(user_id, &conference)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::service::ConferenceDraft;
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

    async fn conference(service: &ConferenceService, name: &str) -> Key {
        service
            .create_conference(
                "org",
                ConferenceDraft {
                    name: name.into(),
                    max_attendees: Some(10),
                    ..ConferenceDraft::default()
                },
            )
            .await
            .unwrap()
            .key
    }

    async fn speaker(service: &ConferenceService, last_name: &str) -> Key {
        service
            .create_speaker(SpeakerDraft {
                first_name: "Ann".into(),
                last_name: last_name.into(),
                institution: "MIT".into(),
            })
            .await
            .unwrap()
            .key
    }

    fn session(name: &str, speakers: Vec<Key>) -> SessionDraft {
        SessionDraft {
            name: name.into(),
            speakers,
            ..SessionDraft::default()
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_queues_featured_recompute() {
        let (service, queue) = service();
        let conf = conference(&service, "RustConf").await;
        queue.drain(service.dispatcher().queue_name());

        let created = service
            .create_session("org", &conf, session("Borrowing", vec![]))
            .await
            .unwrap();

        assert_eq!(created.highlights, "No highlights");
        assert_eq!(created.duration, 1);
        assert_eq!(created.session_type, SessionType::NotSpecified);
        assert_eq!(created.date, NaiveDate::from_ymd_opt(2000, 12, 12).unwrap());
        assert_eq!(created.start_time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(created.conference_key(), Some(conf));

        let queued: Vec<Trigger> = queue
            .drain(service.dispatcher().queue_name())
            .iter()
            .map(|p| Trigger::decode(p).unwrap())
            .collect();
        assert_eq!(
            queued,
            vec![Trigger::RecomputeFeaturedSpeaker {
                session_key: created.key
            }]
        );
    }

    #[tokio::test]
    async fn only_the_organizer_creates_sessions() {
        let (service, _) = service();
        let conf = conference(&service, "RustConf").await;

        let err = service
            .create_session("mallory", &conf, session("Borrowing", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::Forbidden(_)));

        let err = service
            .create_session("org", &conf, session("", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn sessions_by_type_and_speaker() {
        let (service, _) = service();
        let conf = conference(&service, "RustConf").await;
        let ann = speaker(&service, "Smith").await;
        service
            .create_session(
                "org",
                &conf,
                SessionDraft {
                    session_type: Some(SessionType::Workshop),
                    ..session("Async", vec![ann.clone()])
                },
            )
            .await
            .unwrap();
        service
            .create_session("org", &conf, session("Traits", vec![]))
            .await
            .unwrap();

        let workshops = service
            .conference_sessions_by_type(&conf, SessionType::Workshop)
            .await
            .unwrap();
        assert_eq!(workshops.len(), 1);
        assert_eq!(workshops[0].name, "Async");

        let by_speaker = service.sessions_by_speaker(&ann).await.unwrap();
        assert_eq!(by_speaker.len(), 1);
        assert_eq!(service.conference_sessions(&conf).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn speakers_are_added_and_removed_once() {
        let (service, _) = service();
        let conf = conference(&service, "RustConf").await;
        let ann = speaker(&service, "Smith").await;
        let talk = service
            .create_session("org", &conf, session("Borrowing", vec![]))
            .await
            .unwrap();

        let updated = service
            .add_speaker_to_session("org", &talk.key, &ann)
            .await
            .unwrap();
        assert_eq!(updated.speakers, vec![ann.clone()]);
        assert!(matches!(
            service.add_speaker_to_session("org", &talk.key, &ann).await,
            Err(ConferenceError::InvalidInput(_))
        ));
        assert!(matches!(
            service.add_speaker_to_session("mallory", &talk.key, &ann).await,
            Err(ConferenceError::Forbidden(_))
        ));

        let updated = service
            .remove_speaker_from_session("org", &talk.key, &ann)
            .await
            .unwrap();
        assert!(updated.speakers.is_empty());
        assert!(matches!(
            service.remove_speaker_from_session("org", &talk.key, &ann).await,
            Err(ConferenceError::InvalidInput(_))
        ));

        let ghost = Key::root(Speaker::KIND, 999);
        assert!(matches!(
            service.add_speaker_to_session("org", &talk.key, &ghost).await,
            Err(ConferenceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn popular_speakers_span_conferences() {
        let (service, _) = service();
        let first = conference(&service, "RustConf").await;
        let second = conference(&service, "EuroRust").await;
        let ann = speaker(&service, "Smith").await;
        let bob = speaker(&service, "Jones").await;

        service
            .create_session("org", &first, session("A", vec![ann.clone(), bob.clone()]))
            .await
            .unwrap();
        service
            .create_session("org", &second, session("B", vec![ann.clone()]))
            .await
            .unwrap();

        let popular = service.popular_speakers().await.unwrap();
        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0].key, ann);
        assert_eq!(service.list_speakers().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn repeated_speaker_in_a_draft_is_rejected() {
        let (service, queue) = service();
        let conf = conference(&service, "RustConf").await;
        let ann = speaker(&service, "Smith").await;
        queue.drain(service.dispatcher().queue_name());

        let err = service
            .create_session("org", &conf, session("Borrowing", vec![ann.clone(), ann.clone()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::InvalidInput(_)));

        // Nothing stored, nothing counted, nothing queued.
        assert!(service.conference_sessions(&conf).await.unwrap().is_empty());
        assert!(service.popular_speakers().await.unwrap().is_empty());
        assert!(queue.pending(service.dispatcher().queue_name()).is_empty());

        let created = service
            .create_session("org", &conf, session("Borrowing", vec![ann.clone()]))
            .await
            .unwrap();
        assert_eq!(created.speakers, vec![ann]);
        assert!(service.popular_speakers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn early_sessions_exclude_workshops_and_evenings() {
        let (service, _) = service();
        let conf = conference(&service, "RustConf").await;
        let at = |h| NaiveTime::from_hms_opt(h, 0, 0);

        for (name, hour, kind) in [
            ("Late", 20, SessionType::Lecture),
            ("Workshop", 9, SessionType::Workshop),
            ("Keynote", 9, SessionType::Keynote),
            ("Panel", 14, SessionType::Panel),
        ] {
            service
                .create_session(
                    "org",
                    &conf,
                    SessionDraft {
                        start_time: at(hour),
                        session_type: Some(kind),
                        ..session(name, vec![])
                    },
                )
                .await
                .unwrap();
        }

        let names: Vec<_> = service
            .early_non_workshop_sessions(&conf)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Keynote", "Panel"]);
    }
}
