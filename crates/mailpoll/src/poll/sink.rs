//! Consumers of emitted record batches

use anyhow::Result;

use crate::models::Record;

/// Receives each cycle's sorted batch and the end-of-stream signal
///
/// A failed `emit` stops the run. The poll state is left at the window the
/// batch came from, so nothing past an undelivered record is skipped.
pub trait RecordSink {
    /// One non-empty batch, sorted ascending by time
    fn emit(&mut self, batch: Vec<Record>) -> Result<()>;

    /// The range is exhausted; nothing more will be emitted
    fn end(&mut self) -> Result<()>;
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn emit(&mut self, batch: Vec<Record>) -> Result<()> {
        (**self).emit(batch)
    }

    fn end(&mut self) -> Result<()> {
        (**self).end()
    }
}

/// Sink that keeps everything it receives
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub batches: Vec<Vec<Record>>,
    pub ended: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records across batches, in emission order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.batches.iter().flatten()
    }
}

impl RecordSink for CollectingSink {
    fn emit(&mut self, batch: Vec<Record>) -> Result<()> {
        self.batches.push(batch);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.ended = true;
        Ok(())
    }
}
