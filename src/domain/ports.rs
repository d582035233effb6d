//! Collaborator interfaces the orchestrators are wired against.

use super::authorization::Authorization;
use super::capture::{Capture, CaptureRefundSummary, CaptureSummary, RefundCapture};
use super::card::Card;
use super::refund::Refund;
use super::reversal::Reversal;
use super::sequence::Block;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Vaults the clear PAN and returns its token id.
    async fn tokenize(&self, merchant_id: &str, card: &Card) -> Result<String>;
    /// Returns the card with its clear PAN restored from the token.
    async fn detokenize(&self, merchant_id: &str, card: &Card) -> Result<Card>;
}

#[async_trait]
pub trait AuthorizationRepository: Send + Sync {
    async fn create_authorization(&self, authorization: &Authorization) -> Result<()>;
    async fn create_mastercard_authorization(&self, authorization: &Authorization) -> Result<()>;
    async fn create_visa_authorization(&self, authorization: &Authorization) -> Result<()>;
    async fn update_authorization_response(&self, authorization: &Authorization) -> Result<()>;
    async fn get_authorizations(&self, psp_id: &str) -> Result<Vec<Authorization>>;
    /// Fails with `RecordNotFound` when the id is unknown or belongs to another PSP.
    async fn get_authorization(&self, psp_id: &str, id: Uuid) -> Result<Authorization>;
    async fn get_authorization_with_scheme_data(
        &self,
        psp_id: &str,
        id: Uuid,
    ) -> Result<Authorization>;
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn create_refund(&self, refund: &Refund) -> Result<()>;
    async fn create_mastercard_refund(&self, refund: &Refund) -> Result<()>;
    async fn create_visa_refund(&self, refund: &Refund) -> Result<()>;
    async fn update_refund_response(&self, refund: &Refund) -> Result<()>;
    async fn get_refunds(&self, psp_id: &str) -> Result<Vec<Refund>>;
    async fn get_refund(&self, psp_id: &str, id: Uuid) -> Result<Refund>;
}

#[async_trait]
pub trait CaptureRepository: Send + Sync {
    /// Inserts the capture only while the authorization's summary still equals `seen`.
    /// Fails with `DupValOnIndex` and stores nothing when another capture got in first.
    async fn create_capture(&self, capture: &Capture, seen: &CaptureSummary) -> Result<()>;
    async fn update_capture_status(&self, capture: &Capture) -> Result<()>;
    async fn get_captures(&self, authorization_id: Uuid) -> Result<Vec<Capture>>;
    async fn get_capture_summary(&self, authorization_id: Uuid) -> Result<CaptureSummary>;
    async fn final_capture_exists(&self, authorization_id: Uuid) -> Result<bool>;
    /// Refund-side twin of `create_capture`.
    async fn create_refund_capture(
        &self,
        capture: &RefundCapture,
        seen: &CaptureRefundSummary,
    ) -> Result<()>;
    async fn get_capture_refund_summary(&self, refund_id: Uuid) -> Result<CaptureRefundSummary>;
}

#[async_trait]
pub trait ReversalRepository: Send + Sync {
    /// Fails with `DupValOnIndex` when a non-failed reversal already exists for the
    /// same authorization.
    async fn create_reversal(&self, reversal: &Reversal) -> Result<()>;
    async fn update_reversal_response(&self, reversal: &Reversal) -> Result<()>;
    async fn authorization_already_reversed(&self, authorization_id: Uuid) -> Result<bool>;
    /// True when a reversal exists that has not failed, including one still in `new`.
    async fn reversal_exists(&self, authorization_id: Uuid) -> Result<bool>;
    async fn get_reversals(&self, authorization_id: Uuid) -> Result<Vec<Reversal>>;
}

/// One network connection per card scheme. Each call attaches the network's response
/// to the entity in place; an `Err` means the exchange itself failed.
#[async_trait]
pub trait SchemeConnection: Send + Sync {
    async fn authorize(&self, authorization: &mut Authorization) -> Result<()>;
    async fn reverse(&self, reversal: &mut Reversal) -> Result<()>;
    async fn refund(&self, refund: &mut Refund) -> Result<()>;
    async fn echo(&self) -> Result<()>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()>;
}

/// Predicate evaluated against the projected block of a reservation.
pub type RolloverCondition<'a> = &'a (dyn Fn(&Block) -> bool + Send + Sync);

/// Durable counter behind the sequence allocator.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Reserves `batch_size` values of `name` in one read-modify-write and returns the
    /// first of them. Fails with `UnknownSequence` when the sequence is not provisioned.
    async fn next_batch(
        &self,
        name: &str,
        batch_size: u64,
        rollover_condition: RolloverCondition<'_>,
        rollover_target: &Block,
    ) -> Result<u64>;
}

pub type TokenizerRef = Arc<dyn Tokenizer>;
pub type AuthorizationRepositoryRef = Arc<dyn AuthorizationRepository>;
pub type RefundRepositoryRef = Arc<dyn RefundRepository>;
pub type CaptureRepositoryRef = Arc<dyn CaptureRepository>;
pub type ReversalRepositoryRef = Arc<dyn ReversalRepository>;
pub type PublisherRef = Arc<dyn Publisher>;
pub type SchemeConnectionRef = Arc<dyn SchemeConnection>;
pub type SequenceStoreRef = Arc<dyn SequenceStore>;
