//! mailpoll - incremental, time-windowed retrieval from Gmail
//!
//! Turns Gmail's paginated, day-granular search into an ordered,
//! duplicate-free stream of records bounded by a time range:
//! - Option resolution and filter compilation into Gmail search syntax
//! - Gmail API client (OAuth, listing, batched detail fetch)
//! - Query builder, record fetcher and millisecond precision filter
//! - Window poll driver that keeps polling while the range reaches into
//!   the future
//!
//! The engine is synchronous and executor-agnostic; hosts drive it through
//! [`WindowPoller::run`] or call [`WindowPoller::poll_cycle`] from their own
//! scheduler.

pub mod config;
pub mod error;
pub mod filter;
pub mod gmail;
pub mod models;
pub mod options;
pub mod poll;
pub mod source;

pub use crate::config::{GmailCredentials, PollConfig};
pub use error::{ConfigurationError, PollError};
pub use filter::{FilterExpr, FilterField};
pub use gmail::{GmailAuth, GmailClient, StaticToken, TokenSource};
pub use models::{MessageId, PollState, Record, TimeRange, UpperBound};
pub use options::{ReadOptions, ReadPlan};
pub use poll::{
    BoundaryMode, Clock, CollectingSink, CycleOutcome, ManualClock, PollSettings, Query,
    QueryBuilder, RecordSink, RunStats, SystemClock, WindowPoller,
};
pub use source::{InMemorySource, MessageSource};
