use super::ConferenceService;
use crate::error::{ConferenceError, Result};
use crate::models::{Profile, Session, Speaker};
use crate::repository;
use conference_core::entity_store::Entity;
use conference_core::key::Key;
use tracing::info;

impl ConferenceService {
    /// Add a session to the wishlist of `user_id`.
    ///
    /// The user must be registered for the session's conference.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::NotFound`] for the session,
    /// [`ConferenceError::InvalidInput`] when the user does not attend the
    /// conference or the session is already listed; store failures.
    pub async fn add_session_to_wishlist(&self, user_id: &str, session_key: &Key) -> Result<Profile> {
        let session: Session = repository::require(self.store(), session_key).await?;
        let conference_key = session
            .conference_key()
            .ok_or_else(|| ConferenceError::not_found(Session::KIND, session_key))?;

        let profile = self
            .mutate(
                &Profile::key_for(user_id),
                || Ok(Profile::new(user_id)),
                |profile: &mut Profile| {
                    if !profile.attends(&conference_key) {
                        return Err(ConferenceError::InvalidInput(
                            "you must be registered for the session's conference".to_string(),
                        ));
                    }
                    if profile.wishlist.contains(session_key) {
                        return Err(ConferenceError::InvalidInput(
                            "session already in the wishlist".to_string(),
                        ));
                    }
                    profile.wishlist.push(session_key.clone());
                    Ok(())
                },
            )
            .await?;

        info!(user_id, session = %session_key, "Session added to wishlist");
        Ok(profile)
    }

    /// Sessions in the wishlist of `user_id`, in the order added.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn sessions_in_wishlist(&self, user_id: &str) -> Result<Vec<Session>> {
        let profile = self.profile(user_id).await?;
        repository::fetch_existing(self.store(), &profile.wishlist).await
    }

    /// Remove a session from the wishlist of `user_id`.
    ///
    /// # Errors
    ///
    /// [`ConferenceError::InvalidInput`] when the session is not listed;
    /// store failures.
    pub async fn remove_session_from_wishlist(
        &self,
        user_id: &str,
        session_key: &Key,
    ) -> Result<Profile> {
        let profile = self
            .mutate(
                &Profile::key_for(user_id),
                || Ok(Profile::new(user_id)),
                |profile: &mut Profile| {
                    let before = profile.wishlist.len();
                    profile.wishlist.retain(|k| k != session_key);
                    if profile.wishlist.len() == before {
                        return Err(ConferenceError::InvalidInput(
                            "session is not in the wishlist".to_string(),
                        ));
                    }
                    Ok(())
                },
            )
            .await?;

        info!(user_id, session = %session_key, "Session removed from wishlist");
        Ok(profile)
    }

    /// Speakers of the sessions in the wishlist of `user_id`, each once, in
    /// order of first appearance.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn speakers_in_wishlist(&self, user_id: &str) -> Result<Vec<Speaker>> {
        let sessions = self.sessions_in_wishlist(user_id).await?;
        let mut keys: Vec<Key> = Vec::new();
        for key in sessions.iter().flat_map(|s| &s.speakers) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        repository::fetch_existing(self.store(), &keys).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::config::Config;
    use crate::error::ConferenceError;
    use crate::models::Session;
    use crate::service::{ConferenceDraft, ConferenceService, SessionDraft, SpeakerDraft};
    use conference_core::key::Key;
    use conference_testing::{InMemoryCache, InMemoryEntityStore, InMemoryTaskQueue};
    use std::sync::Arc;

    struct Fixture {
        service: ConferenceService,
        conference: Key,
        sessions: Vec<Session>,
    }

    async fn fixture() -> Fixture {
        let service = ConferenceService::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryTaskQueue::new()),
            &Config::default(),
        );
        let conference = service
            .create_conference(
                "org",
                ConferenceDraft {
                    name: "RustConf".into(),
                    max_attendees: Some(10),
                    ..ConferenceDraft::default()
                },
            )
            .await
            .unwrap()
            .key;

        let mut speakers = Vec::new();
        for last_name in ["Smith", "Jones"] {
            speakers.push(
                service
                    .create_speaker(SpeakerDraft {
                        first_name: "Ann".into(),
                        last_name: last_name.into(),
                        institution: "MIT".into(),
                    })
                    .await
                    .unwrap()
                    .key,
            );
        }

        let mut sessions = Vec::new();
        for (name, speakers) in [
            ("Borrowing", vec![speakers[0].clone(), speakers[1].clone()]),
            ("Lifetimes", vec![speakers[1].clone()]),
        ] {
            sessions.push(
                service
                    .create_session(
                        "org",
                        &conference,
                        SessionDraft {
                            name: name.into(),
                            speakers,
                            ..SessionDraft::default()
                        },
                    )
                    .await
                    .unwrap(),
            );
        }

        Fixture {
            service,
            conference,
            sessions,
        }
    }

    #[tokio::test]
    async fn wishlist_requires_registration() {
        let f = fixture().await;
        let err = f
            .service
            .add_session_to_wishlist("ada", &f.sessions[0].key)
            .await
            .unwrap_err();
        assert!(matches!(err, ConferenceError::InvalidInput(_)));

        f.service.register("ada", &f.conference).await.unwrap();
        let profile = f
            .service
            .add_session_to_wishlist("ada", &f.sessions[0].key)
            .await
            .unwrap();
        assert_eq!(profile.wishlist, vec![f.sessions[0].key.clone()]);
        assert!(matches!(
            f.service
                .add_session_to_wishlist("ada", &f.sessions[0].key)
                .await,
            Err(ConferenceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn wishlist_speakers_are_deduplicated() {
        let f = fixture().await;
        assert!(f.service.speakers_in_wishlist("ada").await.unwrap().is_empty());

        f.service.register("ada", &f.conference).await.unwrap();
        for session in &f.sessions {
            f.service
                .add_session_to_wishlist("ada", &session.key)
                .await
                .unwrap();
        }

        let names: Vec<_> = f
            .service
            .speakers_in_wishlist("ada")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.last_name)
            .collect();
        assert_eq!(names, vec!["Smith", "Jones"]);
        assert_eq!(f.service.sessions_in_wishlist("ada").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn removing_an_absent_session_is_rejected() {
        let f = fixture().await;
        f.service.register("ada", &f.conference).await.unwrap();
        f.service
            .add_session_to_wishlist("ada", &f.sessions[1].key)
            .await
            .unwrap();

        let profile = f
            .service
            .remove_session_from_wishlist("ada", &f.sessions[1].key)
            .await
            .unwrap();
        assert!(profile.wishlist.is_empty());
        assert!(matches!(
            f.service
                .remove_session_from_wishlist("ada", &f.sessions[1].key)
                .await,
            Err(ConferenceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let f = fixture().await;
        let ghost = Key::with_parent(&f.conference, "Session", 404);
        assert!(matches!(
            f.service.add_session_to_wishlist("ada", &ghost).await,
            Err(ConferenceError::NotFound { .. })
        ));
    }
}
