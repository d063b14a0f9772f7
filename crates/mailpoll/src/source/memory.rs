//! In-memory message source
//!
//! Mimics the parts of the Gmail API the poller relies on: day-granularity
//! `after:`/`before:` filtering in a fixed zone, newest-first pagination and
//! batch detail lookups. Failures can be injected to exercise retries.

use anyhow::{Result, bail};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use std::sync::{Mutex, RwLock};

use super::MessageSource;
use crate::gmail::api::{ListMessagesResponse, MessageDetail, MessageRef};
use crate::models::MessageId;

/// Thread-safe in-memory implementation of [`MessageSource`]
pub struct InMemorySource {
    messages: RwLock<Vec<MessageDetail>>,
    page_size: usize,
    zone: FixedOffset,
    queries: Mutex<Vec<String>>,
    batch_sizes: Mutex<Vec<usize>>,
    failures_remaining: Mutex<u32>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySource {
    /// Empty source evaluating dates in UTC, 100 ids per page
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            page_size: 100,
            zone: Utc.fix(),
            queries: Mutex::new(Vec::new()),
            batch_sizes: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Zone in which `after:`/`before:` dates are interpreted
    pub fn with_zone(mut self, zone: FixedOffset) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_messages(self, messages: impl IntoIterator<Item = MessageDetail>) -> Self {
        for message in messages {
            self.add_message(message);
        }
        self
    }

    /// Make a message visible to subsequent listings
    pub fn add_message(&self, message: MessageDetail) {
        if let Ok(mut guard) = self.messages.write() {
            guard.push(message);
        }
    }

    /// Fail the next `count` listing calls
    pub fn fail_next(&self, count: u32) {
        if let Ok(mut guard) = self.failures_remaining.lock() {
            *guard = count;
        }
    }

    /// Every query string received, in call order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    /// Number of ids in each batch call, in call order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().map(|b| b.clone()).unwrap_or_default()
    }

    fn take_failure(&self) -> bool {
        match self.failures_remaining.lock() {
            Ok(mut guard) if *guard > 0 => {
                *guard -= 1;
                true
            }
            _ => false,
        }
    }

    /// Start of `date` in the source's zone
    fn day_start(&self, value: &str) -> Option<DateTime<Utc>> {
        let date = NaiveDate::parse_from_str(value, "%Y/%m/%d").ok()?;
        let midnight = date.and_hms_opt(0, 0, 0)?;
        self.zone
            .from_local_datetime(&midnight)
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    fn matching_ids(&self, query: &str) -> Vec<String> {
        let mut after = None;
        let mut before = None;
        for token in query.split_whitespace() {
            if let Some(value) = token.strip_prefix("after:") {
                after = self.day_start(value);
            } else if let Some(value) = token.strip_prefix("before:") {
                before = self.day_start(value);
            }
        }

        let Ok(messages) = self.messages.read() else {
            return Vec::new();
        };
        let mut matches: Vec<(i64, String)> = messages
            .iter()
            .filter_map(|m| m.internal_date.parse::<i64>().ok().map(|t| (t, m.id.clone())))
            .filter(|(t, _)| after.is_none_or(|a| *t >= a.timestamp_millis()))
            .filter(|(t, _)| before.is_none_or(|b| *t < b.timestamp_millis()))
            .collect();

        // Gmail lists newest first
        matches.sort_by(|a, b| b.cmp(a));
        matches.into_iter().map(|(_, id)| id).collect()
    }
}

impl MessageSource for InMemorySource {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> Result<ListMessagesResponse> {
        if let Ok(mut guard) = self.queries.lock() {
            guard.push(query.to_string());
        }
        if self.take_failure() {
            bail!("injected listing failure");
        }

        let offset = match page_token {
            Some(token) => match token.strip_prefix("offset:").and_then(|n| n.parse().ok()) {
                Some(n) => n,
                None => bail!("invalid page token: {}", token),
            },
            None => 0usize,
        };

        let ids = self.matching_ids(query);
        let end = (offset + self.page_size).min(ids.len());
        let page: Vec<MessageRef> = ids
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|id| MessageRef {
                id: id.clone(),
                thread_id: id.clone(),
            })
            .collect();

        Ok(ListMessagesResponse {
            next_page_token: (end < ids.len()).then(|| format!("offset:{}", end)),
            result_size_estimate: Some(ids.len() as u32),
            messages: if page.is_empty() { None } else { Some(page) },
        })
    }

    fn get_messages_batch(&self, ids: &[MessageId]) -> Result<Vec<MessageDetail>> {
        if let Ok(mut guard) = self.batch_sizes.lock() {
            guard.push(ids.len());
        }
        let Ok(messages) = self.messages.read() else {
            bail!("message store poisoned");
        };

        ids.iter()
            .map(|id| match messages.iter().find(|m| m.id == id.as_str()) {
                Some(m) => Ok(m.clone()),
                None => bail!("message {} not found", id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(y: i32, mo: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap().timestamp_millis()
    }

    #[test]
    fn test_day_bounds_filter() {
        let source = InMemorySource::new().with_messages([
            MessageDetail::new("early", ms(2024, 2, 29, 23)),
            MessageDetail::new("in", ms(2024, 3, 1, 12)),
            MessageDetail::new("late", ms(2024, 3, 2, 0)),
        ]);

        let page = source
            .list_messages("after:2024/03/01 before:2024/03/02", None)
            .unwrap();
        let ids: Vec<String> = page.messages.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["in"]);
    }

    #[test]
    fn test_zone_shifts_day_boundary() {
        // 2024-03-01 03:00 UTC is still Feb 29 at UTC-8
        let source = InMemorySource::new()
            .with_zone(FixedOffset::west_opt(8 * 3600).unwrap())
            .with_messages([MessageDetail::new("m", ms(2024, 3, 1, 3))]);

        let page = source.list_messages("after:2024/03/01", None).unwrap();
        assert!(page.messages.is_none());
        let page = source.list_messages("after:2024/02/29", None).unwrap();
        assert_eq!(page.messages.unwrap().len(), 1);
    }

    #[test]
    fn test_pagination_newest_first() {
        let source = InMemorySource::new().with_page_size(2).with_messages([
            MessageDetail::new("a", ms(2024, 3, 1, 1)),
            MessageDetail::new("b", ms(2024, 3, 1, 2)),
            MessageDetail::new("c", ms(2024, 3, 1, 3)),
        ]);

        let first = source.list_messages("", None).unwrap();
        let ids: Vec<String> = first.messages.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["c", "b"]);
        let token = first.next_page_token.unwrap();

        let second = source.list_messages("", Some(&token)).unwrap();
        assert_eq!(second.messages.unwrap()[0].id, "a");
        assert!(second.next_page_token.is_none());
    }

    #[test]
    fn test_injected_failures() {
        let source = InMemorySource::new();
        source.fail_next(1);
        assert!(source.list_messages("", None).is_err());
        assert!(source.list_messages("", None).is_ok());
        assert_eq!(source.queries().len(), 2);
    }

    #[test]
    fn test_batch_unknown_id_fails() {
        let source = InMemorySource::new().with_messages([MessageDetail::new("a", 1)]);
        assert!(source.get_messages_batch(&[MessageId::new("zzz")]).is_err());
        assert_eq!(source.get_messages_batch(&[MessageId::new("a")]).unwrap().len(), 1);
        assert_eq!(source.batch_sizes(), vec![1, 1]);
    }
}
