use crate::domain::authorization::Exemption;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Authorize,
    Capture,
    Reverse,
    Refund,
    CaptureRefund,
    Echo,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Authorize => "authorize",
            CommandType::Capture => "capture",
            CommandType::Reverse => "reverse",
            CommandType::Refund => "refund",
            CommandType::CaptureRefund => "capture_refund",
            CommandType::Echo => "echo",
        }
    }
}

/// One row of a replay file.
///
/// `reference` is the caller's alias for an authorization or refund: `authorize` and
/// `refund` rows define it, the other rows point back at it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub psp: String,
    pub reference: String,
    pub scheme: Option<String>,
    pub pan: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    #[serde(rename = "final")]
    pub is_final: Option<bool>,
    pub exemption: Option<Exemption>,
}

/// Reads replay commands from a CSV source, trimming whitespace and tolerating
/// short rows.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows; a malformed row yields an error and the stream goes on.
    pub fn commands(self) -> impl Iterator<Item = Result<CommandRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
