use crate::config::TopicConfig;
use crate::domain::authorization::Status;
use crate::domain::capture::{
    Capture, CaptureStatus, RefundCapture, becomes_final, check_capturable,
};
use crate::domain::card::Scheme;
use crate::domain::money::Currency;
use crate::domain::ports::{
    AuthorizationRepositoryRef, CaptureRepositoryRef, PublisherRef, RefundRepositoryRef,
    ReversalRepositoryRef,
};
use crate::error::{PaymentError, Result, ResultExt};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inserts lost to a concurrent capture before the request gives up with `DupValOnIndex`.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Published once a capture is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub capture_id: Uuid,
    pub authorization_id: Uuid,
    pub psp_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub is_final: bool,
    pub scheme: Scheme,
    pub masked_pan: String,
    pub captured_at: DateTime<Utc>,
}

/// Published once a refund capture is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundCaptureEvent {
    pub capture_id: Uuid,
    pub refund_id: Uuid,
    pub psp_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub is_final: bool,
    pub scheme: Scheme,
    pub masked_pan: String,
    pub captured_at: DateTime<Utc>,
}

/// Validates and records captures against authorizations and refunds.
#[derive(Clone)]
pub struct CaptureService {
    authorizations: AuthorizationRepositoryRef,
    refunds: RefundRepositoryRef,
    captures: CaptureRepositoryRef,
    reversals: ReversalRepositoryRef,
    publisher: PublisherRef,
    topics: TopicConfig,
}

impl CaptureService {
    pub fn new(
        authorizations: AuthorizationRepositoryRef,
        refunds: RefundRepositoryRef,
        captures: CaptureRepositoryRef,
        reversals: ReversalRepositoryRef,
        publisher: PublisherRef,
        topics: TopicConfig,
    ) -> Self {
        Self {
            authorizations,
            refunds,
            captures,
            reversals,
            publisher,
            topics,
        }
    }

    /// Records a capture and publishes it.
    ///
    /// The returned capture has `is_final` set when it brings the captured total up to the
    /// authorized amount. A publish failure is reported but the capture stays recorded.
    ///
    /// Validation runs against a summary that the insert re-checks under the repository's
    /// lock, so concurrent captures cannot overdraw the authorization. A capture that loses
    /// that race is validated again against the new summary.
    #[tracing::instrument(
        skip_all,
        fields(psp = %psp_id, authorization_id = %capture.authorization_id, amount = %capture.amount)
    )]
    pub async fn capture(&self, psp_id: &str, mut capture: Capture) -> Result<Capture> {
        let authorization = self
            .authorizations
            .get_authorization_with_scheme_data(psp_id, capture.authorization_id)
            .await
            .context("failed to get authorization")?;

        if matches!(authorization.status, Status::Declined | Status::RiskDeclined) {
            return Err(PaymentError::AuthorizationDeclined.wrap("invalid capture"));
        }

        let flagged_final = capture.is_final;
        let mut attempt = 1;
        loop {
            let summary = self
                .captures
                .get_capture_summary(authorization.id)
                .await
                .context("failed to get capture summary")?;
            check_capturable(&summary, authorization.amount, capture.amount)
                .context("invalid capture")?;

            capture.is_final =
                becomes_final(&summary, authorization.amount, capture.amount, flagged_final);
            if capture.is_final && !flagged_final {
                tracing::debug!("capture reaches the authorized amount, marking it final");
            }

            self.ensure_not_reversed(authorization.id).await?;

            match self.captures.create_capture(&capture, &summary).await {
                Ok(()) => break,
                Err(err)
                    if matches!(err.root(), PaymentError::DupValOnIndex)
                        && attempt < MAX_WRITE_ATTEMPTS =>
                {
                    tracing::debug!(attempt, "captures changed concurrently, validating again");
                    attempt += 1;
                }
                Err(err) => return Err(err.wrap("failed to create capture")),
            }
        }

        // a reversal created while the capture was written takes precedence
        if let Err(err) = self.ensure_not_reversed(authorization.id).await {
            capture.status = CaptureStatus::Failed;
            self.captures
                .update_capture_status(&capture)
                .await
                .context("failed to withdraw capture")?;
            tracing::info!(capture_id = %capture.id, "capture withdrawn, authorization is being reversed");
            return Err(err);
        }

        let event = CaptureEvent {
            capture_id: capture.id,
            authorization_id: authorization.id,
            psp_id: authorization.psp_id.clone(),
            amount: capture.amount.value(),
            currency: authorization.currency.clone(),
            is_final: capture.is_final,
            scheme: authorization.card.scheme,
            masked_pan: authorization.card.masked_pan.clone(),
            captured_at: capture.created_at,
        };
        self.publish(&self.topics.capture, &event).await?;

        tracing::info!(capture_id = %capture.id, is_final = capture.is_final, "capture recorded");
        Ok(capture)
    }

    /// Refund-side twin of [`CaptureService::capture`]; refunds cannot be reversed, so there
    /// is no reversal check.
    #[tracing::instrument(
        skip_all,
        fields(psp = %psp_id, refund_id = %capture.refund_id, amount = %capture.amount)
    )]
    pub async fn capture_refund(
        &self,
        psp_id: &str,
        mut capture: RefundCapture,
    ) -> Result<RefundCapture> {
        let refund = self
            .refunds
            .get_refund(psp_id, capture.refund_id)
            .await
            .context("failed to get refund")?;

        if refund.status == Status::Declined {
            return Err(PaymentError::RefundDeclined.wrap("invalid refund capture"));
        }

        let flagged_final = capture.is_final;
        let mut attempt = 1;
        loop {
            let summary = self
                .captures
                .get_capture_refund_summary(refund.id)
                .await
                .context("failed to get capture refund summary")?;
            check_capturable(&summary, refund.amount, capture.amount)
                .context("invalid refund capture")?;
            capture.is_final = becomes_final(&summary, refund.amount, capture.amount, flagged_final);

            match self.captures.create_refund_capture(&capture, &summary).await {
                Ok(()) => break,
                Err(err)
                    if matches!(err.root(), PaymentError::DupValOnIndex)
                        && attempt < MAX_WRITE_ATTEMPTS =>
                {
                    tracing::debug!(attempt, "refund captures changed concurrently, validating again");
                    attempt += 1;
                }
                Err(err) => return Err(err.wrap("failed to create refund capture")),
            }
        }

        let event = RefundCaptureEvent {
            capture_id: capture.id,
            refund_id: refund.id,
            psp_id: refund.psp_id.clone(),
            amount: capture.amount.value(),
            currency: refund.currency.clone(),
            is_final: capture.is_final,
            scheme: refund.card.scheme,
            masked_pan: refund.card.masked_pan.clone(),
            captured_at: capture.created_at,
        };
        self.publish(&self.topics.refund_capture, &event).await?;

        tracing::info!(capture_id = %capture.id, is_final = capture.is_final, "refund capture recorded");
        Ok(capture)
    }

    /// Any reversal that has not failed blocks captures, even one still waiting for the
    /// network.
    async fn ensure_not_reversed(&self, authorization_id: Uuid) -> Result<()> {
        if self
            .reversals
            .reversal_exists(authorization_id)
            .await
            .context("failed to check reversal")?
        {
            return Err(PaymentError::AuthAlreadyReversed.wrap("invalid capture"));
        }
        Ok(())
    }

    async fn publish<E: Serialize>(&self, topic: &str, event: &E) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.publisher
            .publish(topic, payload)
            .await
            .inspect_err(|err| tracing::warn!(topic, error = %err, "capture persisted but not published"))
            .context("failed to publish capture event")
    }
}
