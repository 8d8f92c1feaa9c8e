//! Error taxonomy of the conference services.
//!
//! Every operation returns [`ConferenceError`]. The surrounding service layer
//! does not need to match on individual variants to render a response:
//! [`ConferenceError::kind`] collapses them into an [`ErrorKind`], and
//! [`ErrorKind::code`] gives a stable machine-readable code.

use conference_core::entity_store::EntityStoreError;
use conference_core::key::{Key, KeyError};
use thiserror::Error;

/// Conference service error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConferenceError {
    /// A referenced entity key does not resolve.
    #[error("No {entity} found with key: {key}")]
    NotFound {
        /// Entity kind that was looked up.
        entity: &'static str,
        /// Websafe form of the key.
        key: String,
    },

    /// Unknown filter field or operator, or a value of the wrong type.
    #[error("Filter contains invalid field, operator or value: {0}")]
    InvalidFilter(String),

    /// Inequality filters were requested on two different fields.
    #[error("Inequality filter is allowed on only one field (got '{first}' and '{second}')")]
    MultipleInequalityFields {
        /// Field of the first inequality filter.
        first: String,
        /// Conflicting field.
        second: String,
    },

    /// The conference is already in the attendee's list.
    #[error("You have already registered for this conference")]
    AlreadyRegistered,

    /// No seats left.
    #[error("There are no seats available")]
    SeatsUnavailable,

    /// A concurrent writer won; retried internally before surfacing.
    #[error("Transaction conflict on {0}")]
    TransactionConflict(String),

    /// The acting user may not perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed or inconsistent request data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity store failure other than a transaction conflict.
    #[error("Entity store error: {0}")]
    Store(EntityStoreError),

    /// An outbound notification could not be delivered.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Entity or payload (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of a [`ConferenceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced entity does not exist.
    NotFound,
    /// Caller input is invalid; never retried.
    InvalidInput,
    /// Business-rule or concurrency conflict.
    Conflict,
    /// Caller lacks permission.
    Forbidden,
    /// A backend could not be reached.
    Unavailable,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable code for clients.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidInput => "BAD_REQUEST",
            Self::Conflict => "CONFLICT",
            Self::Forbidden => "FORBIDDEN",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl ConferenceError {
    /// `NotFound` for a key.
    #[must_use]
    pub fn not_found(entity: &'static str, key: &Key) -> Self {
        Self::NotFound {
            entity,
            key: key.urlsafe(),
        }
    }

    /// Classification for the service layer.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidFilter(_)
            | Self::MultipleInequalityFields { .. }
            | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AlreadyRegistered | Self::SeatsUnavailable | Self::TransactionConflict(_) => {
                ErrorKind::Conflict
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Store(EntityStoreError::Backend(_)) | Self::Notification(_) => {
                ErrorKind::Unavailable
            }
            Self::Store(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// True only for transient transaction conflicts.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict(_))
    }
}

impl From<EntityStoreError> for ConferenceError {
    fn from(err: EntityStoreError) -> Self {
        match err {
            EntityStoreError::Conflict { key } => Self::TransactionConflict(key.to_string()),
            EntityStoreError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Store(other),
        }
    }
}

impl From<KeyError> for ConferenceError {
    fn from(err: KeyError) -> Self {
        Self::InvalidInput(format!("invalid key: {err}"))
    }
}

impl From<bincode::Error> for ConferenceError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for conference operations.
pub type Result<T> = std::result::Result<T, ConferenceError>;
