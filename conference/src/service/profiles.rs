use super::{ConferenceService, required};
use crate::error::Result;
use crate::models::{Profile, TeeShirtSize};
use crate::repository;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Partial update of a profile; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    pub display_name: Option<String>,
    /// New tee-shirt size.
    pub tee_shirt_size: Option<TeeShirtSize>,
    /// New contact address.
    pub main_email: Option<String>,
}

impl ConferenceService {
    /// Profile of `user_id`, created with defaults on first access.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn profile(&self, user_id: &str) -> Result<Profile> {
        let key = Profile::key_for(user_id);
        if let Some(profile) = repository::fetch(self.store(), &key).await? {
            return Ok(profile);
        }

        let profile = self
            .mutate(&key, || Ok(Profile::new(user_id)), |_: &mut Profile| Ok(()))
            .await?;
        debug!(user_id, "Profile created");
        Ok(profile)
    }

    /// Apply `update` to the profile of `user_id`.
    ///
    /// # Errors
    ///
    /// [`crate::ConferenceError::InvalidInput`] for a blank display name or
    /// email; store failures.
    pub async fn save_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<Profile> {
        let display_name = update
            .display_name
            .as_deref()
            .map(|name| required(name, "display_name"))
            .transpose()?;
        let main_email = update
            .main_email
            .as_deref()
            .map(|email| required(email, "main_email"))
            .transpose()?;

        let profile = self
            .mutate(
                &Profile::key_for(user_id),
                || Ok(Profile::new(user_id)),
                |profile: &mut Profile| {
                    if let Some(display_name) = &display_name {
                        profile.display_name.clone_from(display_name);
                    }
                    if let Some(size) = update.tee_shirt_size {
                        profile.tee_shirt_size = size;
                    }
                    if let Some(email) = &main_email {
                        profile.main_email = Some(email.clone());
                    }
                    Ok(())
                },
            )
            .await?;

        info!(user_id, "Profile saved");
        Ok(profile)
    }
}
