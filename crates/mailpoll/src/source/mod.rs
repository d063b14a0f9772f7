//! Remote message sources
//!
//! [`MessageSource`] is the seam between the poll engine and the Gmail API.
//! [`InMemorySource`] stands in for the API in tests and dry runs.

mod memory;
mod traits;

pub use memory::InMemorySource;
pub use traits::MessageSource;
