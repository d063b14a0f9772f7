//! Gmail search query construction
//!
//! Gmail's `after:`/`before:` operators only understand whole days, so the
//! window is widened to day boundaries here and narrowed back to the exact
//! millisecond by the precision filter.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;

use crate::models::{TimeRange, UpperBound};

/// Day format understood by Gmail's date operators
const DAY_FORMAT: &str = "%Y/%m/%d";

/// A Gmail search string for one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Query {
    /// Wrap a ready-made search string
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds day-quantized queries with dates evaluated in a fixed zone
///
/// The zone must match the one Gmail uses for the mailbox; the ambient
/// system zone is never consulted.
#[derive(Debug, Clone)]
pub struct QueryBuilder<Tz: TimeZone> {
    zone: Tz,
}

impl<Tz: TimeZone> QueryBuilder<Tz>
where
    Tz::Offset: fmt::Display,
{
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &Tz {
        &self.zone
    }

    /// Build the query for `range`, prefixed by the optional raw fragment and
    /// compiled filter. The combined syntax is not validated.
    pub fn build(&self, range: &TimeRange, raw: Option<&str>, filter: Option<&str>) -> Query {
        let mut parts: Vec<String> = [raw, filter]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        parts.push(format!("after:{}", self.day_of(range.from)));

        // The day after `to`, so `to` itself is never cut off
        if let UpperBound::At(to) = range.to {
            let next_day = to.checked_add_signed(Duration::days(1)).unwrap_or(to);
            parts.push(format!("before:{}", self.day_of(next_day)));
        }

        Query(parts.join(" "))
    }

    fn day_of(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.zone).format(DAY_FORMAT).to_string()
    }
}
