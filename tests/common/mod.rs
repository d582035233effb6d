#![allow(dead_code)]

use acquirer::application::dispatch::SchemeConnections;
use acquirer::application::processor::{Collaborators, PaymentProcessor};
use acquirer::application::sequence::{SequenceAllocator, SystemClock};
use acquirer::config::ProcessorConfig;
use acquirer::domain::authorization::{Authorization, Exemption, Status};
use acquirer::domain::capture::{Capture, CaptureRefundSummary, CaptureSummary, RefundCapture};
use acquirer::domain::card::{Card, Pan, Scheme};
use acquirer::domain::money::{Amount, Currency};
use acquirer::domain::ports::{
    CaptureRepository, CaptureRepositoryRef, Publisher, PublisherRef, SchemeConnection,
    SchemeConnectionRef,
};
use acquirer::domain::refund::Refund;
use acquirer::domain::reversal::Reversal;
use acquirer::domain::scheme::ResponseCode;
use acquirer::domain::sequence::{Block, rollover_tag};
use acquirer::error::{PaymentError, Result};
use acquirer::infrastructure::in_memory::{
    InMemoryAuthorizationRepository, InMemoryCaptureRepository, InMemoryPublisher,
    InMemoryRefundRepository, InMemoryReversalRepository, InMemorySequenceStore, InMemoryTokenizer,
};
use acquirer::infrastructure::simulated::SimulatedConnection;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

pub const PSP: &str = "psp-1";
pub const VISA_PAN: &str = "4111111111111111";
pub const MASTERCARD_PAN: &str = "5555555555554444";

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn eur() -> Currency {
    "EUR".parse().unwrap()
}

pub fn card(scheme: Scheme) -> Card {
    let pan = match scheme {
        Scheme::Visa => VISA_PAN,
        Scheme::Mastercard => MASTERCARD_PAN,
    };
    Card::new(Pan::new(pan).unwrap(), scheme)
}

pub fn authorization(value: Decimal, scheme: Scheme) -> Authorization {
    Authorization::new(PSP, "merchant-1", amount(value), eur(), card(scheme))
}

pub fn low_value_authorization(value: Decimal) -> Authorization {
    authorization(value, Scheme::Mastercard).with_exemption(Exemption::LowValue)
}

pub fn refund(value: Decimal, scheme: Scheme) -> Refund {
    Refund::new(PSP, "merchant-1", amount(value), eur(), card(scheme))
}

/// Wraps a connection and counts the messages that reach the network.
pub struct RecordingConnection {
    inner: SchemeConnectionRef,
    pub authorizations: AtomicUsize,
    pub reversals: AtomicUsize,
    pub refunds: AtomicUsize,
    pub echoes: AtomicUsize,
    decline_reversals: AtomicBool,
    fail_reversals: AtomicBool,
}

impl RecordingConnection {
    pub fn new(inner: SchemeConnectionRef) -> Self {
        Self {
            inner,
            authorizations: AtomicUsize::new(0),
            reversals: AtomicUsize::new(0),
            refunds: AtomicUsize::new(0),
            echoes: AtomicUsize::new(0),
            decline_reversals: AtomicBool::new(false),
            fail_reversals: AtomicBool::new(false),
        }
    }

    /// Makes the network answer reversals with "do not honor".
    pub fn decline_reversals(&self, decline: bool) {
        self.decline_reversals.store(decline, Ordering::SeqCst);
    }

    /// Makes reversal exchanges fail before the network answers.
    pub fn fail_reversals(&self, fail: bool) {
        self.fail_reversals.store(fail, Ordering::SeqCst);
    }

    pub fn authorization_count(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst)
    }

    pub fn reversal_count(&self) -> usize {
        self.reversals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemeConnection for RecordingConnection {
    async fn authorize(&self, authorization: &mut Authorization) -> Result<()> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        self.inner.authorize(authorization).await
    }

    async fn reverse(&self, reversal: &mut Reversal) -> Result<()> {
        self.reversals.fetch_add(1, Ordering::SeqCst);
        if self.fail_reversals.load(Ordering::SeqCst) {
            return Err(PaymentError::Upstream("connection reset".to_string()));
        }
        self.inner.reverse(reversal).await?;
        if self.decline_reversals.load(Ordering::SeqCst) {
            if let Some(response) = reversal.response.as_mut() {
                response.response_code = ResponseCode::new(ResponseCode::DO_NOT_HONOR);
            }
        }
        Ok(())
    }

    async fn refund(&self, refund: &mut Refund) -> Result<()> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        self.inner.refund(refund).await
    }

    async fn echo(&self) -> Result<()> {
        self.echoes.fetch_add(1, Ordering::SeqCst);
        self.inner.echo().await
    }
}

/// A network that never answers in time.
pub struct SlowConnection {
    pub delay: Duration,
}

#[async_trait]
impl SchemeConnection for SlowConnection {
    async fn authorize(&self, _authorization: &mut Authorization) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn reverse(&self, _reversal: &mut Reversal) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn refund(&self, _refund: &mut Refund) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn echo(&self) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// A network whose link is down.
pub struct BrokenConnection;

#[async_trait]
impl SchemeConnection for BrokenConnection {
    async fn authorize(&self, _authorization: &mut Authorization) -> Result<()> {
        Err(PaymentError::Upstream("connection reset".to_string()))
    }

    async fn reverse(&self, _reversal: &mut Reversal) -> Result<()> {
        Err(PaymentError::Upstream("connection reset".to_string()))
    }

    async fn refund(&self, _refund: &mut Refund) -> Result<()> {
        Err(PaymentError::Upstream("connection reset".to_string()))
    }

    async fn echo(&self) -> Result<()> {
        Err(PaymentError::Upstream("connection reset".to_string()))
    }
}

/// Adds a round trip delay to every capture summary read.
pub struct SlowCaptureRepository {
    inner: Arc<InMemoryCaptureRepository>,
    delay: Duration,
}

#[async_trait]
impl CaptureRepository for SlowCaptureRepository {
    async fn create_capture(&self, capture: &Capture, seen: &CaptureSummary) -> Result<()> {
        self.inner.create_capture(capture, seen).await
    }

    async fn update_capture_status(&self, capture: &Capture) -> Result<()> {
        self.inner.update_capture_status(capture).await
    }

    async fn get_captures(&self, authorization_id: Uuid) -> Result<Vec<Capture>> {
        self.inner.get_captures(authorization_id).await
    }

    async fn get_capture_summary(&self, authorization_id: Uuid) -> Result<CaptureSummary> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_capture_summary(authorization_id).await
    }

    async fn final_capture_exists(&self, authorization_id: Uuid) -> Result<bool> {
        self.inner.final_capture_exists(authorization_id).await
    }

    async fn create_refund_capture(
        &self,
        capture: &RefundCapture,
        seen: &CaptureRefundSummary,
    ) -> Result<()> {
        self.inner.create_refund_capture(capture, seen).await
    }

    async fn get_capture_refund_summary(&self, refund_id: Uuid) -> Result<CaptureRefundSummary> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_capture_refund_summary(refund_id).await
    }
}

pub struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _message: Vec<u8>) -> Result<()> {
        Err(PaymentError::Publish("broker unavailable".to_string()))
    }
}

pub struct Harness {
    pub processor: PaymentProcessor,
    pub authorizations: Arc<InMemoryAuthorizationRepository>,
    pub refunds: Arc<InMemoryRefundRepository>,
    pub captures: Arc<InMemoryCaptureRepository>,
    pub reversals: Arc<InMemoryReversalRepository>,
    pub publisher: Arc<InMemoryPublisher>,
    /// Visa connection; most flows run on Visa cards.
    pub network: Arc<RecordingConnection>,
    pub mastercard: Arc<RecordingConnection>,
    pub stans: Arc<SequenceAllocator>,
}

pub struct HarnessBuilder {
    config: ProcessorConfig,
    response_code: String,
    publisher: Option<PublisherRef>,
    connection: Option<SchemeConnectionRef>,
    capture_latency: Option<Duration>,
}

impl HarnessBuilder {
    pub fn response_code(mut self, code: &str) -> Self {
        self.response_code = code.to_string();
        self
    }

    pub fn publisher(mut self, publisher: PublisherRef) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Replaces the simulated network on both schemes.
    pub fn connection(mut self, connection: SchemeConnectionRef) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Slows down capture summary reads, like a remote database would.
    pub fn capture_latency(mut self, latency: Duration) -> Self {
        self.capture_latency = Some(latency);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub async fn build(self) -> Harness {
        let store = Arc::new(InMemorySequenceStore::new());
        store
            .provision(
                &self.config.sequence.name,
                Block::new(
                    self.config.sequence.min_value,
                    rollover_tag(Utc::now().date_naive()),
                ),
            )
            .await;
        let stans = Arc::new(
            SequenceAllocator::start(&self.config.sequence, store, Arc::new(SystemClock)).unwrap(),
        );

        let simulated = |scheme: Scheme| -> SchemeConnectionRef {
            match &self.connection {
                Some(connection) => connection.clone(),
                None => Arc::new(
                    SimulatedConnection::new(scheme, stans.clone())
                        .with_response_code(&self.response_code),
                ),
            }
        };
        let network = Arc::new(RecordingConnection::new(simulated(Scheme::Visa)));
        let mastercard = Arc::new(RecordingConnection::new(simulated(Scheme::Mastercard)));

        let authorizations = Arc::new(InMemoryAuthorizationRepository::new());
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let captures = Arc::new(InMemoryCaptureRepository::new());
        let capture_repository: CaptureRepositoryRef = match self.capture_latency {
            Some(delay) => Arc::new(SlowCaptureRepository {
                inner: captures.clone(),
                delay,
            }),
            None => captures.clone(),
        };
        let reversals = Arc::new(InMemoryReversalRepository::new());
        let publisher = Arc::new(InMemoryPublisher::new());

        let connections = SchemeConnections::new()
            .with(Scheme::Visa, network.clone())
            .with(Scheme::Mastercard, mastercard.clone());

        let processor = PaymentProcessor::new(
            &self.config,
            Collaborators {
                tokenizer: Arc::new(InMemoryTokenizer::new()),
                authorizations: authorizations.clone(),
                refunds: refunds.clone(),
                captures: capture_repository,
                reversals: reversals.clone(),
                publisher: self
                    .publisher
                    .unwrap_or_else(|| publisher.clone() as PublisherRef),
                connections,
            },
        );

        Harness {
            processor,
            authorizations,
            refunds,
            captures,
            reversals,
            publisher,
            network,
            mastercard,
            stans,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: ProcessorConfig::default(),
            response_code: ResponseCode::APPROVED.to_string(),
            publisher: None,
            connection: None,
            capture_latency: None,
        }
    }

    /// Approving network on both schemes.
    pub async fn new() -> Harness {
        Self::builder().build().await
    }

    /// Authorizes on Visa and asserts the network approved.
    pub async fn approved_authorization(&self, value: Decimal) -> Authorization {
        let mut authorization = authorization(value, Scheme::Visa);
        self.processor.authorize(&mut authorization).await.unwrap();
        assert_eq!(authorization.status, Status::Approved);
        authorization
    }
}
