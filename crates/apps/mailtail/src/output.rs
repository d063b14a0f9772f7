//! JSON-lines output of emitted records

use anyhow::Context;
use std::io::Write;

use mailpoll::{Record, RecordSink};

/// Writes each record as one JSON object per line
pub struct JsonLinesSink<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    fn write_batch(&mut self, batch: &[Record]) -> anyhow::Result<()> {
        for record in batch {
            serde_json::to_writer(&mut self.out, record)?;
            self.out.write_all(b"\n")?;
            self.written += 1;
        }
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, batch: Vec<Record>) -> anyhow::Result<()> {
        self.write_batch(&batch).context("Failed to write records to output")
    }

    fn end(&mut self) -> anyhow::Result<()> {
        log::info!("End of stream after {} records", self.written);
        self.out.flush().context("Failed to flush output")
    }
}
