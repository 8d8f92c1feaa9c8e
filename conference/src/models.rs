//! Persistent domain entities.
//!
//! | kind         | key                          | notes |
//! |--------------|------------------------------|-------|
//! | `Profile`    | `Profile:{user_id}`          | created lazily |
//! | `Conference` | `Profile:{organizer}/Conference:#n` | owned by its organizer |
//! | `Session`    | `.../Conference:#n/Session:#m` | owned by its conference |
//! | `Speaker`    | `Speaker:#n`                 | referenced, never owned |
//!
//! Property names are the serde field names (`seats_available`,
//! `max_attendees`, ...); queries refer to them through the constants on
//! each type. References to other entities are stored as [`Key`]s, which
//! serialize as websafe strings.

use chrono::{NaiveDate, NaiveTime};
use conference_core::entity_store::Entity;
use conference_core::key::Key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attendee tee-shirt size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum TeeShirtSize {
    #[default]
    NotSpecified,
    XsM,
    XsW,
    SM,
    SW,
    MM,
    MW,
    LM,
    LW,
    XlM,
    XlW,
    XxlM,
    XxlW,
    XxxlM,
    XxxlW,
}

/// Kind of a conference session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    /// Not classified.
    #[default]
    NotSpecified,
    /// Hands-on workshop.
    Workshop,
    /// Lecture.
    Lecture,
    /// Keynote.
    Keynote,
    /// Live demonstration.
    Demonstration,
    /// Panel discussion.
    Panel,
}

impl SessionType {
    /// Name as stored and as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSpecified => "NOT_SPECIFIED",
            Self::Workshop => "WORKSHOP",
            Self::Lecture => "LECTURE",
            Self::Keynote => "KEYNOTE",
            Self::Demonstration => "DEMONSTRATION",
            Self::Panel => "PANEL",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::NotSpecified,
            Self::Workshop,
            Self::Lecture,
            Self::Keynote,
            Self::Demonstration,
            Self::Panel,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown session type '{s}'"))
    }
}

/// Attendee profile, keyed by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// `Profile:{user_id}`.
    pub key: Key,
    /// Display name.
    pub display_name: String,
    /// Contact address for notifications, when known.
    #[serde(default)]
    pub main_email: Option<String>,
    /// Tee-shirt size.
    #[serde(default)]
    pub tee_shirt_size: TeeShirtSize,
    /// Conferences the user is registered for; no duplicates.
    #[serde(default)]
    pub conference_keys_to_attend: Vec<Key>,
    /// Sessions the user wishes to attend; no duplicates.
    #[serde(default)]
    pub wishlist: Vec<Key>,
}

impl Profile {
    /// Key of the profile of `user_id`.
    #[must_use]
    pub fn key_for(user_id: &str) -> Key {
        Key::named(Self::KIND, user_id)
    }

    /// Fresh profile with default settings.
    #[must_use]
    pub fn new(user_id: &str) -> Self {
        Self {
            key: Self::key_for(user_id),
            display_name: user_id.to_string(),
            main_email: None,
            tee_shirt_size: TeeShirtSize::NotSpecified,
            conference_keys_to_attend: Vec::new(),
            wishlist: Vec::new(),
        }
    }

    /// Whether the user is registered for `conference`.
    #[must_use]
    pub fn attends(&self, conference: &Key) -> bool {
        self.conference_keys_to_attend.contains(conference)
    }
}

impl Entity for Profile {
    const KIND: &'static str = "Profile";

    fn key(&self) -> &Key {
        &self.key
    }
}

/// A conference with a seat inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conference {
    /// `Profile:{organizer}/Conference:#n`.
    pub key: Key,
    /// Name; required.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// User id of the organizer.
    pub organizer_user_id: String,
    /// Topics.
    pub topics: Vec<String>,
    /// City.
    pub city: String,
    /// First day.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Month of `start_date`, 0 when unset.
    pub month: u32,
    /// Last day.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Capacity; 0 means no seat inventory.
    pub max_attendees: i64,
    /// Seats left. Never negative.
    pub seats_available: i64,
}

impl Conference {
    /// Property holding the remaining seat count.
    pub const SEATS_AVAILABLE: &'static str = "seats_available";
    /// Property holding the name.
    pub const NAME: &'static str = "name";
}

impl Entity for Conference {
    const KIND: &'static str = "Conference";

    fn key(&self) -> &Key {
        &self.key
    }
}

/// A talk, workshop, ... inside a conference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// `.../Conference:#n/Session:#m`.
    pub key: Key,
    /// Name; required.
    pub name: String,
    /// Highlights.
    pub highlights: String,
    /// Speakers, by key.
    pub speakers: Vec<Key>,
    /// Duration in hours.
    pub duration: i64,
    /// Kind of session.
    pub session_type: SessionType,
    /// Day.
    pub date: NaiveDate,
    /// Start time.
    pub start_time: NaiveTime,
}

impl Session {
    /// Property holding the speaker keys.
    pub const SPEAKERS: &'static str = "speakers";
    /// Property holding the session type.
    pub const SESSION_TYPE: &'static str = "session_type";
    /// Property holding the start time.
    pub const START_TIME: &'static str = "start_time";

    /// Key of the conference the session belongs to.
    #[must_use]
    pub fn conference_key(&self) -> Option<Key> {
        self.key.parent()
    }
}

impl Entity for Session {
    const KIND: &'static str = "Session";

    fn key(&self) -> &Key {
        &self.key
    }
}

/// Speaker, referenced by sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    /// `Speaker:#n`.
    pub key: Key,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Institution.
    pub institution: String,
}

impl Speaker {
    /// `First Last (Institution)`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {} ({})", self.first_name, self.last_name, self.institution)
    }
}

impl Entity for Speaker {
    const KIND: &'static str = "Speaker";

    fn key(&self) -> &Key {
        &self.key
    }
}
