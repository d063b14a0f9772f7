//! Domain models for windowed retrieval

mod message;
mod poll_state;
mod range;

pub use message::{MessageId, Record};
pub use poll_state::PollState;
pub use range::{TimeRange, UpperBound};
