use super::authorization::AuthorizationService;
use super::capture::CaptureService;
use super::dispatch::{SchemeConnections, SchemeDispatcher};
use super::refund::RefundService;
use super::reversal::ReversalService;
use super::risk::RiskEngine;
use crate::config::ProcessorConfig;
use crate::domain::authorization::Authorization;
use crate::domain::capture::{Capture, RefundCapture};
use crate::domain::card::Scheme;
use crate::domain::ports::{
    AuthorizationRepositoryRef, CaptureRepositoryRef, PublisherRef, RefundRepositoryRef,
    ReversalRepositoryRef, TokenizerRef,
};
use crate::domain::refund::Refund;
use crate::domain::reversal::Reversal;
use crate::error::{PaymentError, Result};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Adapters the processor is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub tokenizer: TokenizerRef,
    pub authorizations: AuthorizationRepositoryRef,
    pub refunds: RefundRepositoryRef,
    pub captures: CaptureRepositoryRef,
    pub reversals: ReversalRepositoryRef,
    pub publisher: PublisherRef,
    pub connections: SchemeConnections,
}

/// Single entry point over the four orchestrators.
///
/// Every call runs under the configured request deadline. When it expires the in-flight
/// future is dropped, so no further steps run, and the caller gets `DeadlineExceeded`.
/// Rows written before that point stay as they are.
#[derive(Clone)]
pub struct PaymentProcessor {
    authorizations: AuthorizationService,
    captures: CaptureService,
    refunds: RefundService,
    reversals: ReversalService,
    dispatcher: SchemeDispatcher,
    timeout: Duration,
}

impl PaymentProcessor {
    pub fn new(config: &ProcessorConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            tokenizer,
            authorizations,
            refunds,
            captures,
            reversals,
            publisher,
            connections,
        } = collaborators;
        let dispatcher = SchemeDispatcher::new(connections);
        let risk = RiskEngine::with_default_rules(config.risk.low_value_ceiling);

        Self {
            authorizations: AuthorizationService::new(
                tokenizer.clone(),
                authorizations.clone(),
                risk,
                dispatcher.clone(),
            ),
            captures: CaptureService::new(
                authorizations.clone(),
                refunds.clone(),
                captures.clone(),
                reversals.clone(),
                publisher,
                config.topics.clone(),
            ),
            refunds: RefundService::new(tokenizer.clone(), refunds, dispatcher.clone()),
            reversals: ReversalService::new(
                tokenizer,
                authorizations,
                captures,
                reversals,
                dispatcher.clone(),
            ),
            dispatcher,
            timeout: config.request_timeout(),
        }
    }

    async fn within_deadline<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "request deadline exceeded");
                PaymentError::DeadlineExceeded
            })?
    }

    pub async fn authorize(&self, authorization: &mut Authorization) -> Result<()> {
        self.within_deadline(self.authorizations.authorize(authorization))
            .await
    }

    pub async fn capture(&self, psp_id: &str, capture: Capture) -> Result<Capture> {
        self.within_deadline(self.captures.capture(psp_id, capture))
            .await
    }

    pub async fn capture_refund(&self, psp_id: &str, capture: RefundCapture) -> Result<RefundCapture> {
        self.within_deadline(self.captures.capture_refund(psp_id, capture))
            .await
    }

    pub async fn refund(&self, refund: &mut Refund) -> Result<()> {
        self.within_deadline(self.refunds.refund(refund)).await
    }

    pub async fn reverse(&self, psp_id: &str, reversal: &mut Reversal) -> Result<()> {
        self.within_deadline(self.reversals.reverse(psp_id, reversal))
            .await
    }

    pub async fn echo(&self, scheme: Scheme) -> Result<()> {
        self.within_deadline(self.dispatcher.send_echo(scheme)).await
    }

    pub async fn get_authorization(&self, psp_id: &str, id: Uuid) -> Result<Authorization> {
        self.authorizations.get_authorization(psp_id, id).await
    }

    pub async fn get_authorizations(&self, psp_id: &str) -> Result<Vec<Authorization>> {
        self.authorizations.get_authorizations(psp_id).await
    }

    pub async fn get_refund(&self, psp_id: &str, id: Uuid) -> Result<Refund> {
        self.refunds.get_refund(psp_id, id).await
    }

    pub async fn get_refunds(&self, psp_id: &str) -> Result<Vec<Refund>> {
        self.refunds.get_refunds(psp_id).await
    }

    pub async fn get_reversals(&self, authorization_id: Uuid) -> Result<Vec<Reversal>> {
        self.reversals.get_reversals(authorization_id).await
    }
}
