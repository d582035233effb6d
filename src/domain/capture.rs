use super::money::Amount;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    #[default]
    Created,
    Failed,
    Cleared,
    Rejected,
}

/// Settlement request against an approved authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub id: Uuid,
    pub authorization_id: Uuid,
    pub amount: Amount,
    pub is_final: bool,
    pub status: CaptureStatus,
    pub created_at: DateTime<Utc>,
}

impl Capture {
    pub fn new(authorization_id: Uuid, amount: Amount, is_final: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            authorization_id,
            amount,
            is_final,
            status: CaptureStatus::Created,
            created_at: Utc::now(),
        }
    }
}

/// Settlement request against an approved refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundCapture {
    pub id: Uuid,
    pub refund_id: Uuid,
    pub amount: Amount,
    pub is_final: bool,
    pub status: CaptureStatus,
    pub created_at: DateTime<Utc>,
}

impl RefundCapture {
    pub fn new(refund_id: Uuid, amount: Amount, is_final: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            refund_id,
            amount,
            is_final,
            status: CaptureStatus::Created,
            created_at: Utc::now(),
        }
    }
}

/// Read-only projection over the captures of one authorization or refund.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub total_captured_amount: Decimal,
    pub has_final_capture: bool,
}

/// Refund-side twin of [`CaptureSummary`].
pub type CaptureRefundSummary = CaptureSummary;

impl CaptureSummary {
    /// Builds the summary from `(amount, is_final, status)` triples. Failed captures
    /// neither count towards the total nor close the authorization.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Amount, bool, CaptureStatus)>,
    {
        entries
            .into_iter()
            .filter(|(_, _, status)| *status != CaptureStatus::Failed)
            .fold(Self::default(), |mut summary, (amount, is_final, _)| {
                summary.total_captured_amount += amount.value();
                summary.has_final_capture |= is_final;
                summary
            })
    }

    pub fn from_captures(captures: &[Capture]) -> Self {
        Self::from_entries(captures.iter().map(|c| (c.amount, c.is_final, c.status)))
    }

    pub fn from_refund_captures(captures: &[RefundCapture]) -> Self {
        Self::from_entries(captures.iter().map(|c| (c.amount, c.is_final, c.status)))
    }

    pub fn remaining(&self, authorized: Amount) -> Decimal {
        authorized.value() - self.total_captured_amount
    }
}

/// Rejects a capture that would follow a final one or overdraw the authorized amount.
pub fn check_capturable(
    summary: &CaptureSummary,
    authorized: Amount,
    requested: Amount,
) -> Result<()> {
    if summary.has_final_capture {
        return Err(PaymentError::FinalCaptureExists);
    }
    if summary.total_captured_amount + requested.value() > authorized.value() {
        return Err(PaymentError::AuthorizedAmountExceeded);
    }
    Ok(())
}

/// A capture becomes final once it brings the cumulative amount up to the authorized one,
/// whatever flag the caller sent.
pub fn becomes_final(
    summary: &CaptureSummary,
    authorized: Amount,
    requested: Amount,
    flagged_final: bool,
) -> bool {
    flagged_final || summary.total_captured_amount + requested.value() == authorized.value()
}
