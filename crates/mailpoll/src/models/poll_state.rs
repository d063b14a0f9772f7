//! State threaded from one poll cycle to the next

use chrono::{DateTime, Duration, Utc};

use super::{MessageId, TimeRange, UpperBound};

/// Resumption point for the next poll cycle
///
/// Lives only in memory for one continuous run. `current_from` never moves
/// backwards between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    /// Lower bound (inclusive) of the next cycle's window
    pub current_from: DateTime<Utc>,
    /// Upper bound shared by every cycle of the run
    pub to: UpperBound,
    /// Wait between a completed cycle and the next one
    pub delay: Duration,
    /// Ids already emitted with `time == current_from`. Only populated when
    /// continuation is keyed on `(time, id)`.
    pub boundary_ids: Vec<MessageId>,
    /// Consecutive failed fetches for this window
    pub failures: u32,
}

impl PollState {
    /// Initial state for a run over `range`
    pub fn new(range: TimeRange, delay: Duration) -> Self {
        Self {
            current_from: range.from,
            to: range.to,
            delay,
            boundary_ids: Vec::new(),
            failures: 0,
        }
    }

    /// Window this cycle covers
    ///
    /// Empty (`from` after a bounded `to`) once a record stamped exactly at
    /// `to` has been emitted in millisecond mode.
    pub fn window(&self) -> TimeRange {
        TimeRange {
            from: self.current_from,
            to: self.to,
        }
    }

    /// Advance past a cycle that emitted records, excluding the last one by
    /// bumping the lower bound one millisecond past it. Saturates at the
    /// latest representable instant.
    pub fn advanced_past(&self, last_time: DateTime<Utc>) -> Self {
        let bumped = last_time
            .checked_add_signed(Duration::milliseconds(1))
            .unwrap_or(last_time);
        Self {
            current_from: self.current_from.max(bumped),
            to: self.to,
            delay: self.delay,
            boundary_ids: Vec::new(),
            failures: 0,
        }
    }

    /// Advance to `last_time` itself, remembering which ids were already
    /// emitted at that millisecond.
    pub fn advanced_to(&self, last_time: DateTime<Utc>, emitted_at_last: Vec<MessageId>) -> Self {
        let mut boundary_ids = emitted_at_last;
        if last_time == self.current_from {
            for id in &self.boundary_ids {
                if !boundary_ids.contains(id) {
                    boundary_ids.push(id.clone());
                }
            }
        }
        Self {
            current_from: self.current_from.max(last_time),
            to: self.to,
            delay: self.delay,
            boundary_ids,
            failures: 0,
        }
    }

    /// Same window, failure counter reset (cycle succeeded but emitted nothing)
    pub fn unchanged(&self) -> Self {
        Self {
            failures: 0,
            ..self.clone()
        }
    }

    /// Same window with one more recorded failure
    pub fn with_failure(&self) -> Self {
        Self {
            failures: self.failures + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn state() -> PollState {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        PollState::new(TimeRange::open_ended(from), Duration::seconds(1))
    }

    #[test]
    fn test_advanced_past_adds_one_millisecond() {
        let s = state();
        let last = s.current_from + Duration::minutes(5);
        let next = s.advanced_past(last);
        assert_eq!(next.current_from, last + Duration::milliseconds(1));
        assert!(next.boundary_ids.is_empty());
    }

    #[test]
    fn test_advanced_past_saturates_at_max_time() {
        let next = state().advanced_past(DateTime::<Utc>::MAX_UTC);
        assert_eq!(next.current_from, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_window_empty_after_record_at_upper_bound() {
        let s = state();
        let to = s.current_from + Duration::hours(1);
        let bounded = PollState::new(TimeRange::new(s.current_from, to).unwrap(), s.delay);

        let window = bounded.advanced_past(to).window();
        assert!(window.is_empty());
        assert!(!window.contains(to));
    }

    #[test]
    fn test_advanced_to_keeps_ids_at_same_boundary() {
        let s = state();
        let first = s.advanced_to(s.current_from, vec![MessageId::new("a")]);
        let second = first.advanced_to(first.current_from, vec![MessageId::new("b")]);
        assert_eq!(second.current_from, s.current_from);
        assert_eq!(
            second.boundary_ids,
            vec![MessageId::new("b"), MessageId::new("a")]
        );
    }

    #[test]
    fn test_advanced_to_drops_ids_when_boundary_moves() {
        let s = state().advanced_to(state().current_from, vec![MessageId::new("a")]);
        let later = s.current_from + Duration::seconds(3);
        let next = s.advanced_to(later, vec![MessageId::new("c")]);
        assert_eq!(next.current_from, later);
        assert_eq!(next.boundary_ids, vec![MessageId::new("c")]);
    }

    #[test]
    fn test_failure_counter() {
        let s = state().with_failure().with_failure();
        assert_eq!(s.failures, 2);
        assert_eq!(s.unchanged().failures, 0);
        assert_eq!(s.advanced_past(s.current_from).failures, 0);
    }
}
