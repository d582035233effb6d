mod common;

use acquirer::application::dispatch::SchemeConnections;
use acquirer::application::processor::{Collaborators, PaymentProcessor};
use acquirer::config::ProcessorConfig;
use acquirer::domain::card::Scheme;
use acquirer::error::PaymentError;
use acquirer::infrastructure::in_memory::{
    InMemoryAuthorizationRepository, InMemoryCaptureRepository, InMemoryPublisher,
    InMemoryRefundRepository, InMemoryReversalRepository, InMemoryTokenizer,
};
use common::{Harness, authorization};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_authorizations_get_unique_stans() {
    let harness = Arc::new(Harness::new().await);

    let mut handles = Vec::new();
    for i in 0..64 {
        let harness = harness.clone();
        let scheme = if i % 2 == 0 { Scheme::Visa } else { Scheme::Mastercard };
        handles.push(tokio::spawn(async move {
            let mut auth = authorization(dec!(10), scheme);
            harness.processor.authorize(&mut auth).await.unwrap();
            auth.response.unwrap().stan
        }));
    }

    let mut stans = HashSet::new();
    for handle in handles {
        let stan = handle.await.unwrap();
        assert!((1..=999_999).contains(&stan));
        assert!(stans.insert(stan), "STAN {stan} handed out twice");
    }
    assert_eq!(stans.len(), 64);
}

#[tokio::test]
async fn test_echo_consumes_a_stan() {
    let harness = Harness::new().await;

    harness.processor.echo(Scheme::Visa).await.unwrap();
    harness.processor.echo(Scheme::Mastercard).await.unwrap();

    assert_eq!(harness.network.echoes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.mastercard.echoes.load(Ordering::SeqCst), 1);
    let mut auth = authorization(dec!(10), Scheme::Visa);
    harness.processor.authorize(&mut auth).await.unwrap();
    assert_eq!(auth.response.unwrap().stan, 3);
}

#[tokio::test]
async fn test_missing_connection_is_reported() {
    let processor = PaymentProcessor::new(
        &ProcessorConfig::default(),
        Collaborators {
            tokenizer: Arc::new(InMemoryTokenizer::new()),
            authorizations: Arc::new(InMemoryAuthorizationRepository::new()),
            refunds: Arc::new(InMemoryRefundRepository::new()),
            captures: Arc::new(InMemoryCaptureRepository::new()),
            reversals: Arc::new(InMemoryReversalRepository::new()),
            publisher: Arc::new(InMemoryPublisher::new()),
            connections: SchemeConnections::new(),
        },
    );

    let err = processor.echo(Scheme::Visa).await.unwrap_err();
    assert!(matches!(err.root(), PaymentError::NoConnectionForScheme(name) if name == "visa"));

    let mut auth = authorization(dec!(10), Scheme::Mastercard);
    let err = processor.authorize(&mut auth).await.unwrap_err();
    assert!(matches!(err.root(), PaymentError::NoConnectionForScheme(_)));
}

#[tokio::test]
async fn test_closed_allocator_fails_network_exchange() {
    let harness = Harness::new().await;
    harness.stans.shutdown();

    // Drain whatever was reserved before the shutdown.
    while harness.stans.next().await.is_ok() {}

    let mut auth = authorization(dec!(10), Scheme::Visa);
    let err = harness.processor.authorize(&mut auth).await.unwrap_err();
    assert!(matches!(err.root(), PaymentError::SequenceClosed(_)));
}
