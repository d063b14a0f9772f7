//! Command-line flags and their conversion into read options

use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use mailpoll::{FilterExpr, FilterField, PollConfig, ReadOptions, UpperBound};

/// A point in time as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moment {
    Now,
    At(DateTime<Utc>),
}

impl Moment {
    fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Moment::Now => now,
            Moment::At(t) => t,
        }
    }
}

/// Upper bound as given on the command line (`end` means open-ended)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndMoment {
    End,
    Moment(Moment),
}

/// Stream Gmail messages in a time range as JSON lines
#[derive(Debug, Parser)]
#[command(name = "mailtail", version)]
pub struct Cli {
    /// Start of the range: RFC 3339 timestamp, YYYY-MM-DD, or "now"
    #[arg(long, value_parser = parse_moment)]
    pub from: Option<Moment>,

    /// End of the range: RFC 3339 timestamp, YYYY-MM-DD, "now", or "end" to keep polling
    #[arg(long, value_parser = parse_end)]
    pub to: Option<EndMoment>,

    /// Read the window of this length ending now (e.g. 30m, 2h, 1d)
    #[arg(long, value_parser = parse_duration)]
    pub last: Option<Duration>,

    /// Wait between polls when the range reaches into the future
    #[arg(long, value_parser = parse_duration)]
    pub delay: Option<Duration>,

    /// Raw Gmail search fragment, passed through as-is
    #[arg(long)]
    pub raw: Option<String>,

    /// Only messages from this sender (repeat for any of several)
    #[arg(long = "sender")]
    pub senders: Vec<String>,

    /// Only messages whose subject matches
    #[arg(long)]
    pub subject: Option<String>,

    /// Only messages carrying this label
    #[arg(long)]
    pub label: Option<String>,

    /// Skip messages carrying this label
    #[arg(long)]
    pub exclude_label: Vec<String>,

    /// Gmail user id to read ("me" is the authorized account)
    #[arg(long)]
    pub mailbox: Option<String>,

    /// Use this bearer token instead of the OAuth flow
    #[arg(long, env = "MAILTAIL_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Zone Gmail uses for day boundaries, as an offset like -08:00 or +05:30
    #[arg(long, value_parser = parse_utc_offset, allow_hyphen_values = true)]
    pub utc_offset: Option<i32>,

    /// Key continuation on (time, id) instead of bumping by one millisecond
    #[arg(long)]
    pub dedupe_by_id: bool,

    /// Consecutive failed fetches tolerated before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// OAuth client credentials file (Google Cloud Console JSON)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Remove cached OAuth tokens and exit
    #[arg(long)]
    pub logout: bool,
}

impl Cli {
    /// Read options with relative moments pinned to `now`
    pub fn read_options(&self, now: DateTime<Utc>) -> ReadOptions {
        ReadOptions {
            from: self.from.map(|m| m.resolve(now)),
            to: self.to.map(|end| match end {
                EndMoment::End => UpperBound::Unbounded,
                EndMoment::Moment(m) => UpperBound::At(m.resolve(now)),
            }),
            last: self.last,
            raw: self.raw.clone(),
            delay: self.delay,
            filter: self.filter(),
        }
    }

    /// Structured filter assembled from the convenience flags
    pub fn filter(&self) -> Option<FilterExpr> {
        let mut clauses = Vec::new();

        match self.senders.as_slice() {
            [] => {}
            [one] => clauses.push(FilterExpr::field(FilterField::From, one.clone())),
            many => clauses.push(FilterExpr::Or(
                many.iter()
                    .map(|s| FilterExpr::field(FilterField::From, s.clone()))
                    .collect(),
            )),
        }
        if let Some(subject) = &self.subject {
            clauses.push(FilterExpr::field(FilterField::Subject, subject.clone()));
        }
        if let Some(label) = &self.label {
            clauses.push(FilterExpr::field(FilterField::Label, label.clone()));
        }
        for label in &self.exclude_label {
            clauses.push(FilterExpr::negate(FilterExpr::field(
                FilterField::Label,
                label.clone(),
            )));
        }

        if clauses.is_empty() {
            None
        } else {
            Some(FilterExpr::And(clauses))
        }
    }

    /// Apply flag overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut PollConfig) {
        if let Some(mailbox) = &self.mailbox {
            config.mailbox = mailbox.clone();
        }
        if let Some(offset) = self.utc_offset {
            config.utc_offset_minutes = offset;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if self.dedupe_by_id {
            config.boundary_mode = mailpoll::BoundaryMode::TimeAndId;
        }
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| format!("invalid time '{}': expected RFC 3339, YYYY-MM-DD or 'now'", s))
}

pub fn parse_moment(s: &str) -> Result<Moment, String> {
    match s.trim() {
        "now" => Ok(Moment::Now),
        other => parse_timestamp(other).map(Moment::At),
    }
}

pub fn parse_end(s: &str) -> Result<EndMoment, String> {
    match s.trim() {
        "end" => Ok(EndMoment::End),
        other => parse_moment(other).map(EndMoment::Moment),
    }
}

/// Parse `500ms`, `30s`, `5m`, `2h`, `1d`; a bare number means seconds
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", s))?;

    let duration = match unit {
        "ms" => Duration::try_milliseconds(value),
        "" | "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        _ => return Err(format!("invalid duration unit in '{}': use ms, s, m, h or d", s)),
    };
    duration.ok_or_else(|| format!("duration '{}' is out of range", s))
}

/// Parse `Z`, `+HH:MM` or `-HH:MM` into minutes east of UTC
pub fn parse_utc_offset(s: &str) -> Result<i32, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(0);
    }
    let invalid = || format!("invalid UTC offset '{}': expected +HH:MM or -HH:MM", s);

    let (sign, rest) = match s.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(sign * (hours * 60 + minutes))
}
