//! Resolution of user-facing read options into a concrete time range

use chrono::{DateTime, Duration, Utc};

use crate::error::ConfigurationError;
use crate::filter::FilterExpr;
use crate::models::{PollState, TimeRange, UpperBound};

/// Delay between poll cycles when none is given
pub const DEFAULT_DELAY: Duration = Duration::seconds(1);

/// Options for a read, as supplied by the host
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<UpperBound>,
    /// Read the window ending now with this length. Excludes `from`/`to`.
    pub last: Option<Duration>,
    /// Raw Gmail search fragment passed through unchanged
    pub raw: Option<String>,
    pub delay: Option<Duration>,
    pub filter: Option<FilterExpr>,
}

/// Validated read: everything the poller needs to start
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPlan {
    pub range: TimeRange,
    pub raw: Option<String>,
    /// Compiled filter, already in Gmail search syntax
    pub filter_fragment: Option<String>,
    pub delay: Duration,
}

impl ReadOptions {
    /// Validate the options and pin relative times to `now`
    pub fn resolve(self, now: DateTime<Utc>) -> Result<ReadPlan, ConfigurationError> {
        if self.from.is_none() && self.to.is_none() && self.last.is_none() {
            return Err(ConfigurationError::MissingTimeRange);
        }
        if self.last.is_some() && (self.from.is_some() || self.to.is_some()) {
            return Err(ConfigurationError::LastWithFromTo);
        }

        let range = match self.last {
            Some(last) => {
                let from = now
                    .checked_sub_signed(last)
                    .ok_or(ConfigurationError::OutOfRange { option: "last" })?;
                TimeRange::new(from, now)?
            }
            None => TimeRange::new(
                self.from.unwrap_or(now),
                self.to.unwrap_or(UpperBound::At(now)),
            )?,
        };

        let delay = self.delay.unwrap_or(DEFAULT_DELAY);
        if delay <= Duration::zero() {
            return Err(ConfigurationError::NonPositiveDelay);
        }
        if now.checked_add_signed(delay).is_none() {
            return Err(ConfigurationError::OutOfRange { option: "delay" });
        }

        let filter_fragment = self
            .filter
            .map(|f| f.compile())
            .filter(|s| !s.is_empty());

        Ok(ReadPlan {
            range,
            raw: self.raw.filter(|s| !s.trim().is_empty()),
            filter_fragment,
            delay,
        })
    }
}

impl ReadPlan {
    /// First poll state of the run
    pub fn initial_state(&self) -> PollState {
        PollState::new(self.range, self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterField;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_missing_time_range() {
        let err = ReadOptions::default().resolve(now()).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingTimeRange);
    }

    #[test]
    fn test_last_conflicts_with_from() {
        let opts = ReadOptions {
            from: Some(now() - Duration::days(1)),
            last: Some(Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(opts.resolve(now()).unwrap_err(), ConfigurationError::LastWithFromTo);
    }

    #[test]
    fn test_last_conflicts_with_to() {
        let opts = ReadOptions {
            to: Some(UpperBound::Unbounded),
            last: Some(Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(opts.resolve(now()).unwrap_err(), ConfigurationError::LastWithFromTo);
    }

    #[test]
    fn test_from_after_to() {
        let opts = ReadOptions {
            from: Some(now()),
            to: Some(UpperBound::At(now() - Duration::hours(2))),
            ..Default::default()
        };
        assert!(matches!(
            opts.resolve(now()).unwrap_err(),
            ConfigurationError::FromAfterTo { .. }
        ));
    }

    #[test]
    fn test_last_ends_now() {
        let plan = ReadOptions {
            last: Some(Duration::hours(1)),
            ..Default::default()
        }
        .resolve(now())
        .unwrap();

        assert_eq!(plan.range.from, now() - Duration::hours(1));
        assert_eq!(plan.range.to, UpperBound::At(now()));
        assert_eq!(plan.delay, DEFAULT_DELAY);
    }

    #[test]
    fn test_from_only_defaults_to_now() {
        let from = now() - Duration::days(3);
        let plan = ReadOptions {
            from: Some(from),
            ..Default::default()
        }
        .resolve(now())
        .unwrap();

        assert_eq!(plan.range.from, from);
        assert_eq!(plan.range.to, UpperBound::At(now()));
    }

    #[test]
    fn test_to_only_defaults_from_to_now() {
        let plan = ReadOptions {
            to: Some(UpperBound::Unbounded),
            ..Default::default()
        }
        .resolve(now())
        .unwrap();

        assert_eq!(plan.range.from, now());
        assert!(!plan.range.is_bounded());
    }

    #[test]
    fn test_zero_delay_rejected() {
        let opts = ReadOptions {
            last: Some(Duration::minutes(5)),
            delay: Some(Duration::zero()),
            ..Default::default()
        };
        assert_eq!(opts.resolve(now()).unwrap_err(), ConfigurationError::NonPositiveDelay);
    }

    #[test]
    fn test_last_beyond_representable_range_rejected() {
        let opts = ReadOptions {
            last: Some(Duration::days(99_999_999)),
            ..Default::default()
        };
        assert_eq!(
            opts.resolve(now()).unwrap_err(),
            ConfigurationError::OutOfRange { option: "last" }
        );
    }

    #[test]
    fn test_delay_beyond_representable_range_rejected() {
        let opts = ReadOptions {
            to: Some(UpperBound::Unbounded),
            delay: Some(Duration::days(99_999_999)),
            ..Default::default()
        };
        assert_eq!(
            opts.resolve(now()).unwrap_err(),
            ConfigurationError::OutOfRange { option: "delay" }
        );
    }

    #[test]
    fn test_filter_and_raw_carried_into_plan() {
        let plan = ReadOptions {
            last: Some(Duration::minutes(5)),
            raw: Some("label:alerts".to_string()),
            filter: Some(FilterExpr::field(FilterField::From, "ops@example.com")),
            delay: Some(Duration::seconds(30)),
            ..Default::default()
        }
        .resolve(now())
        .unwrap();

        assert_eq!(plan.raw.as_deref(), Some("label:alerts"));
        assert_eq!(plan.filter_fragment.as_deref(), Some("from:ops@example.com"));
        assert_eq!(plan.initial_state().delay, Duration::seconds(30));
        assert_eq!(plan.initial_state().current_from, plan.range.from);
    }

    #[test]
    fn test_blank_raw_dropped() {
        let plan = ReadOptions {
            last: Some(Duration::minutes(5)),
            raw: Some("   ".to_string()),
            ..Default::default()
        }
        .resolve(now())
        .unwrap();
        assert!(plan.raw.is_none());
        assert!(plan.filter_fragment.is_none());
    }
}
