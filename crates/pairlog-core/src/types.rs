//! Core types for Pairlog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identity of a chat participant.
///
/// Opaque to this crate: the login provider hands out user ids and the
/// remote store keys object ownership by them. Pairlog only ever compares
/// them for equality and embeds them in store paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a UserId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for a message.
///
/// Uses ULID for 128-bit collision-resistant identifiers that sort
/// lexicographically and serialize as compact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Ulid);

impl MessageId {
    /// Create a new random MessageId.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse from string representation.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single chat message.
///
/// Immutable once created: a given id never changes its `author` or
/// `content` after any party has observed it. `received_at` is assigned by
/// whichever side persists the message into its own log (for the author it
/// equals `sent_at`; for the receiving side it is the time of first merge)
/// and is set exactly once at insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Globally unique message id
    pub id: MessageId,
    /// Identity of the sender (one of the two conversation parties)
    pub author: UserId,
    /// Plain text payload
    pub content: String,
    /// Timestamp assigned by the author at creation (monotonic per author only)
    pub sent_at: DateTime<Utc>,
    /// Timestamp assigned by the side that persisted this copy into its log
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Compose a fresh locally-authored message.
    ///
    /// Stamps both timestamps with the current time: for the author,
    /// receipt coincides with sending.
    pub fn compose(author: UserId, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            author,
            content: content.into(),
            sent_at: now,
            received_at: now,
        }
    }

    /// Copy of this message re-stamped for insertion into the local log.
    ///
    /// Preserves `id`, `author`, `content` and `sent_at`; only
    /// `received_at` is replaced, once, at first merge.
    pub fn received_copy(&self, received_at: DateTime<Utc>) -> Self {
        Self {
            received_at,
            ..self.clone()
        }
    }
}
