//! Incremental windowed polling
//!
//! - [`query`]: day-quantized Gmail search strings
//! - [`fetch`]: paginated listing with batched detail fetches
//! - [`precision`]: exact millisecond window filtering
//! - [`driver`]: the cycle state machine and run loop

pub mod driver;
pub mod fetch;
pub mod precision;
pub mod query;
pub mod sink;
pub mod timing;

pub use driver::{BoundaryMode, CycleOutcome, PollSettings, RunStats, WindowPoller};
pub use fetch::{MAX_BATCH_SIZE, fetch_details};
pub use precision::retain_window;
pub use query::{Query, QueryBuilder};
pub use sink::{CollectingSink, RecordSink};
pub use timing::{Clock, ManualClock, SystemClock};
