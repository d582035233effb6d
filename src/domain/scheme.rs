use super::card::Scheme;
use super::authorization::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-character ISO 8583 style response code returned by a card network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseCode(String);

impl ResponseCode {
    pub const APPROVED: &'static str = "00";
    pub const FORMAT_ERROR: &'static str = "30";
    pub const DO_NOT_HONOR: &'static str = "05";

    // Partial approval and VIP approvals count as approved.
    const APPROVALS: [&'static str; 4] = ["00", "08", "10", "11"];

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_approval(&self) -> bool {
        Self::APPROVALS.contains(&self.0.as_str())
    }

    pub fn is_format_error(&self) -> bool {
        self.0 == Self::FORMAT_ERROR
    }

    /// Lifecycle status implied by this code for an authorization or refund.
    pub fn status(&self) -> Status {
        if self.is_approval() {
            Status::Approved
        } else {
            Status::Declined
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network response fields common to every scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeResponse {
    pub response_code: ResponseCode,
    /// System trace audit number the outbound message was sent with.
    pub stan: u64,
    pub approval_code: Option<String>,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MastercardData {
    pub banknet_reference: Option<String>,
    pub financial_network_code: Option<String>,
    pub settlement_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisaData {
    pub transaction_id: Option<String>,
    pub validation_code: Option<String>,
}

/// Scheme-specific request/response data, stored apart from the main row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum SchemeData {
    Mastercard(MastercardData),
    Visa(VisaData),
}

impl SchemeData {
    pub fn scheme(&self) -> Scheme {
        match self {
            SchemeData::Mastercard(_) => Scheme::Mastercard,
            SchemeData::Visa(_) => Scheme::Visa,
        }
    }
}

/// Anything the dispatcher can route to a scheme connection.
pub trait SchemeTransaction {
    fn scheme(&self) -> Option<Scheme>;
    fn response_code(&self) -> Option<&ResponseCode>;
}
