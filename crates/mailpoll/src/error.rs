//! Typed errors surfaced by the engine
//!
//! Plumbing (HTTP, JSON, files) reports through `anyhow`; these are the
//! errors callers are expected to match on.

use chrono::{DateTime, Utc};

/// Invalid or conflicting time-range options. Fatal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("one of 'from', 'to' or 'last' must be specified")]
    MissingTimeRange,

    #[error("'last' cannot be combined with 'from' or 'to'")]
    LastWithFromTo,

    #[error("'from' ({from}) must not be after 'to' ({to})")]
    FromAfterTo {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("poll delay must be positive")]
    NonPositiveDelay,

    #[error("'{option}' reaches outside the representable time range")]
    OutOfRange { option: &'static str },
}

/// Failure of a running poll loop
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Fetching the current window kept failing after every retry
    #[error("giving up on window starting {from} after {attempts} failed attempts")]
    RetriesExhausted {
        from: DateTime<Utc>,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The record sink refused a batch or the end-of-stream signal. The
    /// lower bound was not advanced past the undelivered records.
    #[error("record sink failed")]
    Sink(#[source] anyhow::Error),
}
