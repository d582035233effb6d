use super::authorization::Authorization;
use super::capture::CaptureSummary;
use super::card::Scheme;
use super::money::Amount;
use super::scheme::{ResponseCode, SchemeResponse, SchemeTransaction};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReversalStatus {
    #[default]
    New,
    Failed,
    Succeeded,
}

impl ReversalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReversalStatus::New => "new",
            ReversalStatus::Failed => "failed",
            ReversalStatus::Succeeded => "succeeded",
        }
    }
}

/// Cancellation of the uncaptured remainder of an authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reversal {
    pub id: Uuid,
    pub authorization_id: Uuid,
    /// The authorization being reversed, with the clear PAN once detokenized.
    pub authorization: Option<Authorization>,
    pub amount: Option<Amount>,
    pub status: ReversalStatus,
    pub response: Option<SchemeResponse>,
    pub created_at: DateTime<Utc>,
}

impl Reversal {
    pub fn new(authorization_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            authorization_id,
            authorization: None,
            amount: None,
            status: ReversalStatus::New,
            response: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_authorization(authorization: Authorization) -> Self {
        let mut reversal = Self::new(authorization.id);
        reversal.authorization = Some(authorization);
        reversal
    }
}

/// Uncaptured remainder of the authorization. Fails when nothing is left to reverse.
pub fn reversal_amount(authorized: Amount, summary: &CaptureSummary) -> Result<Amount> {
    Amount::new(summary.remaining(authorized))
}

impl SchemeTransaction for Reversal {
    fn scheme(&self) -> Option<Scheme> {
        self.authorization.as_ref().map(|a| a.card.scheme)
    }

    fn response_code(&self) -> Option<&ResponseCode> {
        self.response.as_ref().map(|r| &r.response_code)
    }
}
