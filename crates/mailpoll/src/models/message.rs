//! Message identifiers and the records emitted to consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message that fell inside the requested window
///
/// Header fields hold the raw header value, or an empty string when the
/// message carried no such header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: MessageId,
    /// Server-assigned receive time, millisecond precision
    pub time: DateTime<Utc>,
    pub snippet: String,
    pub from: String,
    pub to: String,
    pub subject: String,
}

impl Record {
    /// Create a record with empty snippet and headers
    pub fn new(id: impl Into<MessageId>, time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            time,
            snippet: String::new(),
            from: String::new(),
            to: String::new(),
            subject: String::new(),
        }
    }
}
