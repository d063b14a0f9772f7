//! Exact window filtering of fetched details

use chrono::{DateTime, TimeZone, Utc};

use crate::gmail::api::MessageDetail;
use crate::models::{MessageId, Record, TimeRange};

/// Parse Gmail's `internalDate` (epoch milliseconds as a string)
pub fn parse_internal_date(value: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = value.trim().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Convert a detail into a record; `None` if its date is unusable
pub fn to_record(detail: MessageDetail) -> Option<Record> {
    let time = parse_internal_date(&detail.internal_date)?;
    let header = |name: &str| detail.header(name).unwrap_or_default().to_string();

    Some(Record {
        from: header("From"),
        to: header("To"),
        subject: header("Subject"),
        time,
        snippet: detail.snippet,
        id: MessageId::new(detail.id),
    })
}

/// Keep only records whose time lies in `window`
///
/// Records stamped exactly at `window.from` whose id is in `boundary_ids`
/// were delivered by an earlier cycle and are dropped too.
pub fn retain_window(
    details: Vec<MessageDetail>,
    window: &TimeRange,
    boundary_ids: &[MessageId],
) -> Vec<Record> {
    details
        .into_iter()
        .filter_map(|detail| {
            let id = detail.id.clone();
            let record = to_record(detail);
            if record.is_none() {
                log::warn!("Dropping message {} with unparseable internalDate", id);
            }
            record
        })
        .filter(|record| window.contains(record.time))
        .filter(|record| !(record.time == window.from && boundary_ids.contains(&record.id)))
        .collect()
}
