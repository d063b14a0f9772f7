//! Time ranges with an optional open end

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Upper end of a time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpperBound {
    /// Inclusive upper bound
    At(DateTime<Utc>),
    /// No upper bound; polling never terminates on its own
    Unbounded,
}

impl UpperBound {
    /// The bound as a timestamp, `None` when unbounded
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            UpperBound::At(t) => Some(*t),
            UpperBound::Unbounded => None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self, UpperBound::At(_))
    }
}

impl From<DateTime<Utc>> for UpperBound {
    fn from(t: DateTime<Utc>) -> Self {
        UpperBound::At(t)
    }
}

/// A closed window `[from, to]`, or `[from, ∞)` when `to` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: UpperBound,
}

impl TimeRange {
    /// Create a range, rejecting `from` later than a bounded `to`
    pub fn new(
        from: DateTime<Utc>,
        to: impl Into<UpperBound>,
    ) -> Result<Self, ConfigurationError> {
        let to = to.into();
        if let UpperBound::At(end) = to
            && from > end
        {
            return Err(ConfigurationError::FromAfterTo { from, to: end });
        }
        Ok(Self { from, to })
    }

    /// Range starting at `from` with no upper bound
    pub fn open_ended(from: DateTime<Utc>) -> Self {
        Self {
            from,
            to: UpperBound::Unbounded,
        }
    }

    /// Whether `time` lies inside the range (both ends inclusive)
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        if time < self.from {
            return false;
        }
        match self.to {
            UpperBound::At(end) => time <= end,
            UpperBound::Unbounded => true,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.to.is_bounded()
    }

    /// Whether no instant can fall inside the range (`from` after `to`)
    pub fn is_empty(&self) -> bool {
        matches!(self.to, UpperBound::At(end) if self.from > end)
    }

    /// True when the range is bounded and its end is not after `now`,
    /// meaning no new data can ever arrive for it.
    pub fn ends_at_or_before(&self, now: DateTime<Utc>) -> bool {
        matches!(self.to, UpperBound::At(end) if end <= now)
    }
}
