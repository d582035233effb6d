use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Result of one replayed command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub reference: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `ok` or `error`.
    pub outcome: &'static str,
    pub status: String,
    pub amount: String,
    pub detail: String,
}

pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, outcome: &OutcomeRecord) -> Result<()> {
        self.writer.serialize(outcome)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
