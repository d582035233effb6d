use crate::domain::authorization::Authorization;
use crate::domain::capture::{Capture, CaptureRefundSummary, CaptureSummary, RefundCapture};
use crate::domain::card::{Card, Pan, Scheme};
use crate::domain::ports::{
    AuthorizationRepository, CaptureRepository, Publisher, RefundRepository,
    ReversalRepository, RolloverCondition, SequenceStore, Tokenizer,
};
use crate::domain::refund::Refund;
use crate::domain::reversal::{Reversal, ReversalStatus};
use crate::domain::scheme::SchemeData;
use crate::domain::sequence::{Block, reserve};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

fn scheme_data_for(
    id: Uuid,
    scheme_data: Option<&SchemeData>,
    expected: Scheme,
) -> Result<SchemeData> {
    match scheme_data {
        Some(data) if data.scheme() == expected => Ok(data.clone()),
        _ => Err(PaymentError::Validation(format!(
            "{id} carries no {expected} scheme data"
        ))),
    }
}

/// Authorizations keyed by id, with scheme data kept in its own table.
#[derive(Default, Clone)]
pub struct InMemoryAuthorizationRepository {
    authorizations: Arc<RwLock<HashMap<Uuid, Authorization>>>,
    scheme_data: Arc<RwLock<HashMap<Uuid, SchemeData>>>,
}

impl InMemoryAuthorizationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn store_scheme_data(&self, authorization: &Authorization, scheme: Scheme) -> Result<()> {
        let data = scheme_data_for(
            authorization.id,
            authorization.scheme_data.as_ref(),
            scheme,
        )?;
        self.scheme_data.write().await.insert(authorization.id, data);
        Ok(())
    }
}

#[async_trait]
impl AuthorizationRepository for InMemoryAuthorizationRepository {
    async fn create_authorization(&self, authorization: &Authorization) -> Result<()> {
        let mut authorizations = self.authorizations.write().await;
        if authorizations.contains_key(&authorization.id) {
            return Err(PaymentError::DupValOnIndex);
        }
        let row = Authorization {
            card: authorization.card.redacted(),
            scheme_data: None,
            ..authorization.clone()
        };
        authorizations.insert(authorization.id, row);
        Ok(())
    }

    async fn create_mastercard_authorization(&self, authorization: &Authorization) -> Result<()> {
        self.store_scheme_data(authorization, Scheme::Mastercard).await
    }

    async fn create_visa_authorization(&self, authorization: &Authorization) -> Result<()> {
        self.store_scheme_data(authorization, Scheme::Visa).await
    }

    async fn update_authorization_response(&self, authorization: &Authorization) -> Result<()> {
        let mut authorizations = self.authorizations.write().await;
        let row = authorizations
            .get_mut(&authorization.id)
            .ok_or(PaymentError::RecordNotFound)?;
        row.status = authorization.status;
        row.applied_exemption = authorization.applied_exemption;
        row.response = authorization.response.clone();
        Ok(())
    }

    async fn get_authorizations(&self, psp_id: &str) -> Result<Vec<Authorization>> {
        let authorizations = self.authorizations.read().await;
        let mut found: Vec<Authorization> = authorizations
            .values()
            .filter(|a| a.psp_id == psp_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    async fn get_authorization(&self, psp_id: &str, id: Uuid) -> Result<Authorization> {
        let authorizations = self.authorizations.read().await;
        authorizations
            .get(&id)
            .filter(|a| a.psp_id == psp_id)
            .cloned()
            .ok_or(PaymentError::RecordNotFound)
    }

    async fn get_authorization_with_scheme_data(
        &self,
        psp_id: &str,
        id: Uuid,
    ) -> Result<Authorization> {
        let mut authorization = self.get_authorization(psp_id, id).await?;
        authorization.scheme_data = self.scheme_data.read().await.get(&id).cloned();
        Ok(authorization)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryRefundRepository {
    refunds: Arc<RwLock<HashMap<Uuid, Refund>>>,
    scheme_data: Arc<RwLock<HashMap<Uuid, SchemeData>>>,
}

impl InMemoryRefundRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn store_scheme_data(&self, refund: &Refund, scheme: Scheme) -> Result<()> {
        let data = scheme_data_for(refund.id, refund.scheme_data.as_ref(), scheme)?;
        self.scheme_data.write().await.insert(refund.id, data);
        Ok(())
    }
}

#[async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn create_refund(&self, refund: &Refund) -> Result<()> {
        let mut refunds = self.refunds.write().await;
        if refunds.contains_key(&refund.id) {
            return Err(PaymentError::DupValOnIndex);
        }
        let row = Refund {
            card: refund.card.redacted(),
            scheme_data: None,
            ..refund.clone()
        };
        refunds.insert(refund.id, row);
        Ok(())
    }

    async fn create_mastercard_refund(&self, refund: &Refund) -> Result<()> {
        self.store_scheme_data(refund, Scheme::Mastercard).await
    }

    async fn create_visa_refund(&self, refund: &Refund) -> Result<()> {
        self.store_scheme_data(refund, Scheme::Visa).await
    }

    async fn update_refund_response(&self, refund: &Refund) -> Result<()> {
        let mut refunds = self.refunds.write().await;
        let row = refunds
            .get_mut(&refund.id)
            .ok_or(PaymentError::RecordNotFound)?;
        row.status = refund.status;
        row.response = refund.response.clone();
        Ok(())
    }

    async fn get_refunds(&self, psp_id: &str) -> Result<Vec<Refund>> {
        let refunds = self.refunds.read().await;
        let mut found: Vec<Refund> = refunds
            .values()
            .filter(|r| r.psp_id == psp_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn get_refund(&self, psp_id: &str, id: Uuid) -> Result<Refund> {
        let refunds = self.refunds.read().await;
        let mut refund = refunds
            .get(&id)
            .filter(|r| r.psp_id == psp_id)
            .cloned()
            .ok_or(PaymentError::RecordNotFound)?;
        refund.scheme_data = self.scheme_data.read().await.get(&id).cloned();
        Ok(refund)
    }
}

/// Captures and refund captures, grouped by the transaction they settle.
#[derive(Default, Clone)]
pub struct InMemoryCaptureRepository {
    captures: Arc<RwLock<HashMap<Uuid, Vec<Capture>>>>,
    refund_captures: Arc<RwLock<HashMap<Uuid, Vec<RefundCapture>>>>,
}

impl InMemoryCaptureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_refund_captures(&self, refund_id: Uuid) -> Vec<RefundCapture> {
        let refund_captures = self.refund_captures.read().await;
        refund_captures.get(&refund_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CaptureRepository for InMemoryCaptureRepository {
    async fn create_capture(&self, capture: &Capture, seen: &CaptureSummary) -> Result<()> {
        let mut captures = self.captures.write().await;
        let rows = captures.entry(capture.authorization_id).or_default();
        if CaptureSummary::from_captures(rows) != *seen {
            return Err(PaymentError::DupValOnIndex);
        }
        rows.push(capture.clone());
        Ok(())
    }

    async fn update_capture_status(&self, capture: &Capture) -> Result<()> {
        let mut captures = self.captures.write().await;
        let row = captures
            .get_mut(&capture.authorization_id)
            .and_then(|rows| rows.iter_mut().find(|c| c.id == capture.id))
            .ok_or(PaymentError::RecordNotFound)?;
        row.status = capture.status;
        Ok(())
    }

    async fn get_captures(&self, authorization_id: Uuid) -> Result<Vec<Capture>> {
        let captures = self.captures.read().await;
        Ok(captures.get(&authorization_id).cloned().unwrap_or_default())
    }

    async fn get_capture_summary(&self, authorization_id: Uuid) -> Result<CaptureSummary> {
        let captures = self.captures.read().await;
        Ok(captures
            .get(&authorization_id)
            .map(|c| CaptureSummary::from_captures(c))
            .unwrap_or_default())
    }

    async fn final_capture_exists(&self, authorization_id: Uuid) -> Result<bool> {
        Ok(self
            .get_capture_summary(authorization_id)
            .await?
            .has_final_capture)
    }

    async fn create_refund_capture(
        &self,
        capture: &RefundCapture,
        seen: &CaptureRefundSummary,
    ) -> Result<()> {
        let mut refund_captures = self.refund_captures.write().await;
        let rows = refund_captures.entry(capture.refund_id).or_default();
        if CaptureSummary::from_refund_captures(rows) != *seen {
            return Err(PaymentError::DupValOnIndex);
        }
        rows.push(capture.clone());
        Ok(())
    }

    async fn get_capture_refund_summary(&self, refund_id: Uuid) -> Result<CaptureRefundSummary> {
        let refund_captures = self.refund_captures.read().await;
        Ok(refund_captures
            .get(&refund_id)
            .map(|c| CaptureSummary::from_refund_captures(c))
            .unwrap_or_default())
    }
}

/// Reversals per authorization. The write lock around check-and-insert plays the role
/// of the unique index over non-failed reversals.
#[derive(Default, Clone)]
pub struct InMemoryReversalRepository {
    reversals: Arc<RwLock<HashMap<Uuid, Vec<Reversal>>>>,
}

impl InMemoryReversalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReversalRepository for InMemoryReversalRepository {
    async fn create_reversal(&self, reversal: &Reversal) -> Result<()> {
        let mut reversals = self.reversals.write().await;
        let existing = reversals.entry(reversal.authorization_id).or_default();
        if existing.iter().any(|r| r.status != ReversalStatus::Failed) {
            return Err(PaymentError::DupValOnIndex);
        }
        let mut row = reversal.clone();
        if let Some(authorization) = row.authorization.as_mut() {
            authorization.card = authorization.card.redacted();
        }
        existing.push(row);
        Ok(())
    }

    async fn update_reversal_response(&self, reversal: &Reversal) -> Result<()> {
        let mut reversals = self.reversals.write().await;
        let row = reversals
            .get_mut(&reversal.authorization_id)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == reversal.id))
            .ok_or(PaymentError::RecordNotFound)?;
        row.status = reversal.status;
        row.response = reversal.response.clone();
        Ok(())
    }

    async fn authorization_already_reversed(&self, authorization_id: Uuid) -> Result<bool> {
        let reversals = self.reversals.read().await;
        Ok(reversals
            .get(&authorization_id)
            .is_some_and(|rows| rows.iter().any(|r| r.status == ReversalStatus::Succeeded)))
    }

    async fn reversal_exists(&self, authorization_id: Uuid) -> Result<bool> {
        let reversals = self.reversals.read().await;
        Ok(reversals
            .get(&authorization_id)
            .is_some_and(|rows| rows.iter().any(|r| r.status != ReversalStatus::Failed)))
    }

    async fn get_reversals(&self, authorization_id: Uuid) -> Result<Vec<Reversal>> {
        let reversals = self.reversals.read().await;
        Ok(reversals.get(&authorization_id).cloned().unwrap_or_default())
    }
}

/// Token vault scoped per merchant.
#[derive(Default, Clone)]
pub struct InMemoryTokenizer {
    vault: Arc<RwLock<HashMap<(String, String), Pan>>>,
}

impl InMemoryTokenizer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tokenizer for InMemoryTokenizer {
    async fn tokenize(&self, merchant_id: &str, card: &Card) -> Result<String> {
        let pan = card
            .pan
            .clone()
            .ok_or_else(|| PaymentError::Tokenization("card has no PAN".to_string()))?;
        let token = Uuid::new_v4().to_string();
        self.vault
            .write()
            .await
            .insert((merchant_id.to_string(), token.clone()), pan);
        Ok(token)
    }

    async fn detokenize(&self, merchant_id: &str, card: &Card) -> Result<Card> {
        let token = card
            .token_id
            .clone()
            .ok_or_else(|| PaymentError::Tokenization("card has no token".to_string()))?;
        let vault = self.vault.read().await;
        let pan = vault
            .get(&(merchant_id.to_string(), token))
            .cloned()
            .ok_or_else(|| PaymentError::Tokenization("unknown token".to_string()))?;
        Ok(Card {
            pan: Some(pan),
            ..card.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Keeps every published message in order.
#[derive(Default, Clone)]
pub struct InMemoryPublisher {
    messages: Arc<RwLock<Vec<PublishedMessage>>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, message: Vec<u8>) -> Result<()> {
        self.messages.write().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload: message,
        });
        Ok(())
    }
}

/// Sequence blocks behind one mutex, so each reservation is a single read-modify-write.
#[derive(Default, Clone)]
pub struct InMemorySequenceStore {
    blocks: Arc<Mutex<HashMap<String, Block>>>,
    failures: Arc<AtomicUsize>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn provision(&self, name: &str, block: Block) {
        self.blocks.lock().await.insert(name.to_string(), block);
    }

    pub async fn block(&self, name: &str) -> Option<Block> {
        self.blocks.lock().await.get(name).cloned()
    }

    /// Makes the next `count` reservations fail with a storage error.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn next_batch(
        &self,
        name: &str,
        batch_size: u64,
        rollover_condition: RolloverCondition<'_>,
        rollover_target: &Block,
    ) -> Result<u64> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PaymentError::Internal(Box::new(std::io::Error::other(
                "sequence store unavailable",
            ))));
        }

        let mut blocks = self.blocks.lock().await;
        let current = blocks
            .get(name)
            .ok_or_else(|| PaymentError::UnknownSequence(name.to_string()))?;
        let (start, next) = reserve(current, batch_size, rollover_condition, rollover_target);
        blocks.insert(name.to_string(), next);
        Ok(start)
    }
}
