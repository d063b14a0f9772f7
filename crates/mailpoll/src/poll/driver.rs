//! Window poll driver
//!
//! One cycle: build query → fetch → precision filter → sort → emit, then
//! either terminate (bounded range already in the past) or hand back the
//! state and instant for the next cycle. Cycles never overlap; the only state
//! carried between them is the [`PollState`] value.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::fetch::fetch_details;
use super::precision::retain_window;
use super::query::QueryBuilder;
use super::sink::RecordSink;
use super::timing::{Clock, backoff_delay, rand_jitter};
use crate::error::PollError;
use crate::models::{MessageId, PollState};
use crate::options::ReadPlan;
use crate::source::MessageSource;

/// How the next cycle's lower bound is derived from the last emitted record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// `last.time + 1ms`. A message stamped with the same millisecond as
    /// the last one emitted, but not yet visible when it was fetched, is
    /// never delivered.
    #[default]
    Millisecond,
    /// `last.time`, skipping ids already delivered at that millisecond
    TimeAndId,
}

/// Tuning knobs for the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub boundary_mode: BoundaryMode,
    /// Consecutive failed fetches tolerated before giving up
    pub max_retries: u32,
    /// First retry wait; doubles on every further failure
    pub retry_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            boundary_mode: BoundaryMode::Millisecond,
            max_retries: 5,
            retry_backoff: Duration::seconds(1),
        }
    }
}

/// What the caller should do after a cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Run the next cycle at `at` with `state`
    Reschedule {
        at: DateTime<Utc>,
        state: PollState,
        emitted: usize,
    },
    /// The fetch failed; retry the same window at `at`
    Retry {
        at: DateTime<Utc>,
        state: PollState,
        error: anyhow::Error,
    },
    /// Range fully consumed, end-of-stream already signalled
    Terminated { emitted: usize },
}

/// Statistics from a complete run
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    /// Number of cycles started, including failed ones
    pub cycles: usize,
    /// Number of non-empty batches emitted
    pub batches_emitted: usize,
    /// Number of records emitted
    pub records_emitted: usize,
    /// Number of failed fetches that were retried
    pub retries: usize,
    /// Wall time of the run
    pub duration_ms: u64,
}

/// Polls a message source over a time window
pub struct WindowPoller<S, Tz: TimeZone> {
    source: S,
    query: QueryBuilder<Tz>,
    raw: Option<String>,
    filter_fragment: Option<String>,
    settings: PollSettings,
}

impl<S, Tz> WindowPoller<S, Tz>
where
    S: MessageSource,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    /// Poller with no search fragments and default settings
    pub fn new(source: S, zone: Tz) -> Self {
        Self {
            source,
            query: QueryBuilder::new(zone),
            raw: None,
            filter_fragment: None,
            settings: PollSettings::default(),
        }
    }

    /// Poller carrying the search fragments of a resolved read
    pub fn for_plan(source: S, zone: Tz, plan: &ReadPlan) -> Self {
        Self::new(source, zone)
            .with_raw(plan.raw.clone())
            .with_filter_fragment(plan.filter_fragment.clone())
    }

    pub fn with_raw(mut self, raw: Option<String>) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_filter_fragment(mut self, fragment: Option<String>) -> Self {
        self.filter_fragment = fragment;
        self
    }

    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run one cycle for `state`. `now` must be read before the call; it
    /// decides termination and anchors the next schedule.
    pub fn poll_cycle(
        &self,
        state: &PollState,
        now: DateTime<Utc>,
        sink: &mut dyn RecordSink,
    ) -> Result<CycleOutcome, PollError> {
        let window = state.window();
        let query = self.query.build(
            &window,
            self.raw.as_deref(),
            self.filter_fragment.as_deref(),
        );
        log::debug!("Polling from {} with query {:?}", window.from, query.as_str());

        let details = if window.is_empty() {
            log::debug!("Window is empty, skipping fetch");
            Vec::new()
        } else {
            match fetch_details(&self.source, &query) {
                Ok(details) => details,
                Err(error) => return self.on_fetch_failure(state, now, error),
            }
        };
        let fetched = details.len();

        let boundary_ids: &[MessageId] = match self.settings.boundary_mode {
            BoundaryMode::Millisecond => &[],
            BoundaryMode::TimeAndId => &state.boundary_ids,
        };
        let mut records = retain_window(details, &window, boundary_ids);
        records.sort_by_key(|r| r.time);

        let next = match records.last() {
            None => state.unchanged(),
            Some(last) => match self.settings.boundary_mode {
                BoundaryMode::Millisecond => state.advanced_past(last.time),
                BoundaryMode::TimeAndId => {
                    let at_last = records
                        .iter()
                        .rev()
                        .take_while(|r| r.time == last.time)
                        .map(|r| r.id.clone())
                        .collect();
                    state.advanced_to(last.time, at_last)
                }
            },
        };

        let emitted = records.len();
        if emitted > 0 {
            log::info!("Emitting {} of {} fetched messages", emitted, fetched);
            sink.emit(records).map_err(PollError::Sink)?;
        }

        if window.ends_at_or_before(now) {
            log::info!("Range ends at or before {}, done", now);
            sink.end().map_err(PollError::Sink)?;
            return Ok(CycleOutcome::Terminated { emitted });
        }

        let at = later(now, state.delay);
        log::debug!("Next poll at {} from {}", at, next.current_from);
        Ok(CycleOutcome::Reschedule {
            at,
            state: next,
            emitted,
        })
    }

    fn on_fetch_failure(
        &self,
        state: &PollState,
        now: DateTime<Utc>,
        error: anyhow::Error,
    ) -> Result<CycleOutcome, PollError> {
        let failed = state.with_failure();
        if failed.failures > self.settings.max_retries {
            log::error!(
                "Could not read messages after {} attempts: {:#}",
                failed.failures,
                error
            );
            return Err(PollError::RetriesExhausted {
                from: state.current_from,
                attempts: failed.failures,
                source: error,
            });
        }

        let wait = backoff_delay(self.settings.retry_backoff, failed.failures) + rand_jitter();
        log::warn!(
            "Could not read messages (attempt {}/{}), retrying in {}ms: {:#}",
            failed.failures,
            self.settings.max_retries + 1,
            wait.num_milliseconds(),
            error
        );
        Ok(CycleOutcome::Retry {
            at: later(now, wait),
            state: failed,
            error,
        })
    }

    /// Poll until the range is exhausted, sleeping on `clock` between cycles
    ///
    /// Returns only when the state machine terminates or retries run out.
    /// Unbounded ranges therefore never return `Ok`.
    pub fn run(
        &self,
        initial: PollState,
        clock: &dyn Clock,
        sink: &mut dyn RecordSink,
    ) -> Result<RunStats, PollError> {
        let start = std::time::Instant::now();
        let mut stats = RunStats::default();
        let mut state = initial;

        loop {
            let now = clock.now();
            stats.cycles += 1;

            match self.poll_cycle(&state, now, sink)? {
                CycleOutcome::Terminated { emitted } => {
                    stats.record(emitted);
                    break;
                }
                CycleOutcome::Reschedule {
                    at,
                    state: next,
                    emitted,
                } => {
                    stats.record(emitted);
                    state = next;
                    clock.sleep_until(at);
                }
                CycleOutcome::Retry { at, state: next, .. } => {
                    stats.retries += 1;
                    state = next;
                    clock.sleep_until(at);
                }
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }
}

/// `now + wait`, saturating at the latest representable instant
fn later(now: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    now.checked_add_signed(wait).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl RunStats {
    fn record(&mut self, emitted: usize) {
        if emitted > 0 {
            self.batches_emitted += 1;
            self.records_emitted += emitted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::MessageDetail;
    use crate::models::{Record, TimeRange};
    use crate::poll::sink::CollectingSink;
    use crate::poll::timing::ManualClock;
    use crate::source::InMemorySource;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn msg(id: &str, time: DateTime<Utc>) -> MessageDetail {
        MessageDetail::new(id, time.timestamp_millis())
    }

    fn ids(sink: &CollectingSink) -> Vec<String> {
        sink.records().map(|r| r.id.0.clone()).collect()
    }

    #[test]
    fn test_past_range_terminates_after_one_cycle() {
        let source = InMemorySource::new().with_messages([
            msg("noon", t(12, 0)),
            msg("evening", t(18, 0)),
            msg("morning", t(10, 0)),
        ]);
        let poller = WindowPoller::new(&source, Utc);
        let range = TimeRange::new(t(0, 0), t(23, 59)).unwrap();
        let state = PollState::new(range, Duration::seconds(1));
        let mut sink = CollectingSink::new();

        let outcome = poller
            .poll_cycle(&state, t(23, 59) + Duration::days(1), &mut sink)
            .unwrap();

        assert!(matches!(outcome, CycleOutcome::Terminated { emitted: 3 }));
        assert_eq!(sink.batches.len(), 1);
        assert_eq!(ids(&sink), vec!["morning", "noon", "evening"]);
        assert!(sink.ended);
    }

    #[test]
    fn test_empty_cycle_keeps_lower_bound() {
        let source = InMemorySource::new();
        let poller = WindowPoller::new(&source, Utc);
        let now = t(12, 0);
        let state = PollState::new(
            TimeRange::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap(),
            Duration::seconds(2),
        );
        let mut sink = CollectingSink::new();

        match poller.poll_cycle(&state, now, &mut sink).unwrap() {
            CycleOutcome::Reschedule { at, state: next, emitted } => {
                assert_eq!(at, now + Duration::seconds(2));
                assert_eq!(next.current_from, state.current_from);
                assert_eq!(emitted, 0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(sink.batches.is_empty());
        assert!(!sink.ended);
    }

    #[test]
    fn test_reschedule_advances_past_last_record() {
        let source = InMemorySource::new().with_messages([msg("a", t(9, 30)), msg("b", t(9, 45))]);
        let poller = WindowPoller::new(&source, Utc);
        let state = PollState::new(TimeRange::open_ended(t(9, 0)), Duration::seconds(1));
        let mut sink = CollectingSink::new();

        match poller.poll_cycle(&state, t(10, 0), &mut sink).unwrap() {
            CycleOutcome::Reschedule { state: next, .. } => {
                assert_eq!(next.current_from, t(9, 45) + Duration::milliseconds(1));
                assert_eq!(next.to, state.to);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_failure_retries_same_window() {
        let source = InMemorySource::new();
        source.fail_next(1);
        let poller = WindowPoller::new(&source, Utc);
        let state = PollState::new(TimeRange::open_ended(t(9, 0)), Duration::seconds(1));
        let mut sink = CollectingSink::new();

        match poller.poll_cycle(&state, t(10, 0), &mut sink).unwrap() {
            CycleOutcome::Retry { at, state: next, .. } => {
                assert!(at >= t(10, 0) + Duration::seconds(1));
                assert!(at < t(10, 0) + Duration::seconds(2));
                assert_eq!(next.current_from, state.current_from);
                assert_eq!(next.failures, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(sink.batches.is_empty());
    }

    #[test]
    fn test_retries_exhausted() {
        let source = InMemorySource::new();
        source.fail_next(10);
        let poller = WindowPoller::new(&source, Utc).with_settings(PollSettings {
            max_retries: 2,
            ..PollSettings::default()
        });
        let state = PollState::new(TimeRange::open_ended(t(9, 0)), Duration::seconds(1));
        let clock = ManualClock::new(t(10, 0));
        let mut sink = CollectingSink::new();

        let err = poller.run(state, &clock, &mut sink).unwrap_err();
        match err {
            PollError::RetriesExhausted { attempts, from, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(from, t(9, 0));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(source.queries().len(), 3);
        assert!(!sink.ended);
    }

    #[test]
    fn test_raw_and_filter_reach_query() {
        let source = InMemorySource::new();
        let poller = WindowPoller::new(&source, Utc)
            .with_raw(Some("label:alerts".to_string()))
            .with_filter_fragment(Some("from:ops".to_string()));
        let state = PollState::new(TimeRange::new(t(9, 0), t(10, 0)).unwrap(), Duration::seconds(1));
        let mut sink = CollectingSink::new();

        poller.poll_cycle(&state, t(11, 0), &mut sink).unwrap();
        assert_eq!(
            source.queries(),
            vec!["label:alerts from:ops after:2024/03/01 before:2024/03/02"]
        );
        assert!(sink.ended);
    }

    struct RefusingSink;

    impl RecordSink for RefusingSink {
        fn emit(&mut self, _batch: Vec<Record>) -> anyhow::Result<()> {
            anyhow::bail!("output closed")
        }

        fn end(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("output closed")
        }
    }

    #[test]
    fn test_sink_failure_stops_without_skipping_records() {
        let source = InMemorySource::new().with_messages([msg("a", t(9, 30))]);
        let poller = WindowPoller::new(&source, Utc);
        let state = PollState::new(TimeRange::open_ended(t(9, 0)), Duration::seconds(1));

        let err = poller.poll_cycle(&state, t(10, 0), &mut RefusingSink).unwrap_err();
        assert!(matches!(err, PollError::Sink(_)));

        // The state the caller still holds covers the undelivered record
        let mut sink = CollectingSink::new();
        poller.poll_cycle(&state, t(10, 0), &mut sink).unwrap();
        assert_eq!(ids(&sink), vec!["a"]);
    }

    #[test]
    fn test_run_surfaces_sink_failure() {
        let source = InMemorySource::new().with_messages([msg("a", t(9, 30))]);
        let poller = WindowPoller::new(&source, Utc);
        let state = PollState::new(TimeRange::open_ended(t(9, 0)), Duration::seconds(1));
        let clock = ManualClock::new(t(10, 0));

        let err = poller.run(state, &clock, &mut RefusingSink).unwrap_err();
        assert!(matches!(err, PollError::Sink(_)));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_huge_delay_saturates_next_poll() {
        let source = InMemorySource::new();
        let poller = WindowPoller::new(&source, Utc);
        let state = PollState::new(TimeRange::open_ended(t(9, 0)), Duration::days(99_999_999));
        let mut sink = CollectingSink::new();

        match poller.poll_cycle(&state, t(10, 0), &mut sink).unwrap() {
            CycleOutcome::Reschedule { at, .. } => assert_eq!(at, DateTime::<Utc>::MAX_UTC),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_empty_window_skips_fetch() {
        let source = InMemorySource::new().with_messages([msg("edge", t(11, 0))]);
        let poller = WindowPoller::new(&source, Utc);
        let range = TimeRange::new(t(9, 0), t(11, 0)).unwrap();
        let state = PollState::new(range, Duration::seconds(1)).advanced_past(t(11, 0));
        let mut sink = CollectingSink::new();

        match poller.poll_cycle(&state, t(10, 30), &mut sink).unwrap() {
            CycleOutcome::Reschedule { emitted, .. } => assert_eq!(emitted, 0),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(source.queries().is_empty());
        assert!(sink.batches.is_empty());
    }
}
