use super::card::{Card, Scheme};
use super::money::{Amount, Currency};
use super::scheme::{ResponseCode, SchemeData, SchemeResponse, SchemeTransaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an authorization or a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    #[default]
    New,
    Approved,
    Declined,
    Failed,
    RiskDeclined,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Approved => "approved",
            Status::Declined => "declined",
            Status::Failed => "failed",
            Status::RiskDeclined => "riskDeclined",
        }
    }
}

/// SCA exemption the merchant declared for the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Exemption {
    #[default]
    None,
    LowValue,
    TransactionRiskAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    #[default]
    Cardholder,
    Merchant,
}

/// Cardholder/merchant initiated transaction metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CitMit {
    pub initiator: Initiator,
    pub recurring: bool,
    /// Trace id of the initial transaction in a recurring series.
    pub initial_trace_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub id: Uuid,
    pub psp_id: String,
    pub merchant_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub card: Card,
    pub exemption: Exemption,
    /// Exemption the risk rules accepted; `None` until assessed or when none applied.
    pub applied_exemption: Option<Exemption>,
    pub cit_mit: CitMit,
    pub status: Status,
    pub response: Option<SchemeResponse>,
    pub scheme_data: Option<SchemeData>,
    pub created_at: DateTime<Utc>,
}

impl Authorization {
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
            exemption: Exemption::None,
            applied_exemption: None,
            cit_mit: CitMit::default(),
            status: Status::New,
            response: None,
            scheme_data: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_exemption(mut self, exemption: Exemption) -> Self {
        self.exemption = exemption;
        self
    }
}

impl SchemeTransaction for Authorization {
    fn scheme(&self) -> Option<Scheme> {
        Some(self.card.scheme)
    }

    fn response_code(&self) -> Option<&ResponseCode> {
        self.response.as_ref().map(|r| &r.response_code)
    }
}
