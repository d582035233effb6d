use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Card networks the acquirer holds a connection to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Mastercard,
    Visa,
}

impl Scheme {
    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Mastercard => "mastercard",
            Scheme::Visa => "visa",
        }
    }
}

impl FromStr for Scheme {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mastercard" => Ok(Scheme::Mastercard),
            "visa" => Ok(Scheme::Visa),
            other => Err(PaymentError::Validation(format!(
                "unsupported card scheme: {other}"
            ))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A clear primary account number. `Debug` never prints the digits.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pan(String);

impl Pan {
    pub fn new(digits: &str) -> Result<Self, PaymentError> {
        let digits = digits.trim();
        if !(12..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PaymentError::Validation(
                "PAN must be 12 to 19 digits".to_string(),
            ));
        }
        if !luhn_valid(digits) {
            return Err(PaymentError::Validation(
                "PAN fails the Luhn check".to_string(),
            ));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        let len = self.0.len();
        format!("{}{}{}", &self.0[..6], "*".repeat(len - 10), &self.0[len - 4..])
    }
}

impl fmt::Debug for Pan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pan({})", self.masked())
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .map(|b| u32::from(b - b'0'))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Card details as they travel through the pipeline.
///
/// The clear `pan` is only present right after intake and after detokenization;
/// persisted entities carry the `masked_pan` and the `token_id` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    #[serde(skip_serializing)]
    pub pan: Option<Pan>,
    pub masked_pan: String,
    pub token_id: Option<String>,
    pub scheme: Scheme,
}

impl Card {
    pub fn new(pan: Pan, scheme: Scheme) -> Self {
        Self {
            masked_pan: pan.masked(),
            pan: Some(pan),
            token_id: None,
            scheme,
        }
    }

    /// Drops the clear PAN, keeping only what may be stored.
    pub fn redacted(&self) -> Self {
        Self {
            pan: None,
            ..self.clone()
        }
    }
}
