use super::authorization::Status;
use super::card::{Card, Scheme};
use super::money::{Amount, Currency};
use super::scheme::{ResponseCode, SchemeData, SchemeResponse, SchemeTransaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Money moving back to the cardholder. Shares the authorization lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub psp_id: String,
    pub merchant_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub card: Card,
    pub status: Status,
    pub response: Option<SchemeResponse>,
    pub scheme_data: Option<SchemeData>,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        psp_id: impl Into<String>,
        merchant_id: impl Into<String>,
        amount: Amount,
        currency: Currency,
        card: Card,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            psp_id: psp_id.into(),
            merchant_id: merchant_id.into(),
            amount,
            currency,
            card,
            status: Status::New,
            response: None,
            scheme_data: None,
            created_at: Utc::now(),
        }
    }
}

impl SchemeTransaction for Refund {
    fn scheme(&self) -> Option<Scheme> {
        Some(self.card.scheme)
    }

    fn response_code(&self) -> Option<&ResponseCode> {
        self.response.as_ref().map(|r| &r.response_code)
    }
}
