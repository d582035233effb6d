use crate::domain::authorization::Authorization;
use crate::domain::card::Scheme;
use crate::domain::ports::SchemeConnectionRef;
use crate::domain::refund::Refund;
use crate::domain::reversal::Reversal;
use crate::domain::scheme::SchemeTransaction;
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Scheme to network connection mapping. Built once at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct SchemeConnections {
    connections: HashMap<Scheme, SchemeConnectionRef>,
}

impl SchemeConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scheme: Scheme, connection: SchemeConnectionRef) -> Self {
        self.connections.insert(scheme, connection);
        self
    }

    pub fn get(&self, scheme: Scheme) -> Result<&SchemeConnectionRef> {
        self.connections
            .get(&scheme)
            .ok_or_else(|| PaymentError::NoConnectionForScheme(scheme.to_string()))
    }

    /// Case-insensitive lookup by scheme name.
    pub fn get_by_name(&self, name: &str) -> Result<&SchemeConnectionRef> {
        let scheme: Scheme = name
            .parse()
            .map_err(|_| PaymentError::NoConnectionForScheme(name.to_string()))?;
        self.get(scheme)
    }
}

/// Routes a transaction to the connection of its card scheme and classifies the outcome.
///
/// The dispatcher never touches transaction fields; the connection attaches the
/// network response and the dispatcher only inspects it.
#[derive(Clone)]
pub struct SchemeDispatcher {
    connections: Arc<SchemeConnections>,
}

impl SchemeDispatcher {
    pub fn new(connections: SchemeConnections) -> Self {
        Self {
            connections: Arc::new(connections),
        }
    }

    fn connection_for<T: SchemeTransaction>(&self, tx: &T) -> Result<&SchemeConnectionRef> {
        let scheme = tx.scheme().ok_or_else(|| {
            PaymentError::Validation("transaction carries no card scheme".to_string())
        })?;
        self.connections.get(scheme)
    }

    #[tracing::instrument(skip_all, fields(id = %authorization.id, scheme = %authorization.card.scheme))]
    pub async fn send_authorization(&self, authorization: &mut Authorization) -> Result<()> {
        let connection = self.connection_for(&*authorization)?;
        connection.authorize(authorization).await?;
        check_format(&*authorization)
    }

    #[tracing::instrument(skip_all, fields(id = %reversal.id, authorization_id = %reversal.authorization_id))]
    pub async fn send_reversal(&self, reversal: &mut Reversal) -> Result<()> {
        let connection = self.connection_for(&*reversal)?;
        connection.reverse(reversal).await?;
        check_format(&*reversal)
    }

    #[tracing::instrument(skip_all, fields(id = %refund.id, scheme = %refund.card.scheme))]
    pub async fn send_refund(&self, refund: &mut Refund) -> Result<()> {
        let connection = self.connection_for(&*refund)?;
        connection.refund(refund).await?;
        check_format(&*refund)
    }

    #[tracing::instrument(skip(self))]
    pub async fn send_echo(&self, scheme: Scheme) -> Result<()> {
        self.connections.get(scheme)?.echo().await
    }
}

// A "format error" response means the network rejected the message shape rather than
// declining the transaction.
fn check_format<T: SchemeTransaction>(tx: &T) -> Result<()> {
    match tx.response_code() {
        Some(code) if code.is_format_error() => {
            tracing::warn!("card network answered with a format error");
            Err(PaymentError::FormatError)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::{Card, Pan};
    use crate::domain::money::Amount;
    use crate::domain::ports::SchemeConnection;
    use crate::domain::scheme::{ResponseCode, SchemeResponse};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCodeConnection {
        code: &'static str,
        calls: AtomicUsize,
    }

    impl FixedCodeConnection {
        fn new(code: &'static str) -> Arc<Self> {
            Arc::new(Self {
                code,
                calls: AtomicUsize::new(0),
            })
        }

        fn response(&self) -> SchemeResponse {
            SchemeResponse {
                response_code: ResponseCode::new(self.code),
                stan: 1,
                approval_code: None,
                responded_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl SchemeConnection for FixedCodeConnection {
        async fn authorize(&self, authorization: &mut Authorization) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            authorization.response = Some(self.response());
            Ok(())
        }

        async fn reverse(&self, reversal: &mut Reversal) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            reversal.response = Some(self.response());
            Ok(())
        }

        async fn refund(&self, refund: &mut Refund) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            refund.response = Some(self.response());
            Ok(())
        }

        async fn echo(&self) -> Result<()> {
            Ok(())
        }
    }

    fn authorization(scheme: Scheme, pan: &str) -> Authorization {
        Authorization::new(
            "psp-1",
            "merchant-1",
            Amount::new(dec!(10)).unwrap(),
            "EUR".parse().unwrap(),
            Card::new(Pan::new(pan).unwrap(), scheme),
        )
    }

    #[tokio::test]
    async fn test_routes_by_scheme() {
        let visa = FixedCodeConnection::new("00");
        let mastercard = FixedCodeConnection::new("05");
        let dispatcher = SchemeDispatcher::new(
            SchemeConnections::new()
                .with(Scheme::Visa, visa.clone())
                .with(Scheme::Mastercard, mastercard.clone()),
        );

        let mut auth = authorization(Scheme::Mastercard, "5555555555554444");
        dispatcher.send_authorization(&mut auth).await.unwrap();

        assert_eq!(mastercard.calls.load(Ordering::SeqCst), 1);
        assert_eq!(visa.calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.response_code().unwrap().as_str(), "05");
    }

    #[tokio::test]
    async fn test_missing_connection_is_configuration_error() {
        let dispatcher = SchemeDispatcher::new(
            SchemeConnections::new().with(Scheme::Visa, FixedCodeConnection::new("00")),
        );
        let mut auth = authorization(Scheme::Mastercard, "5555555555554444");

        let err = dispatcher.send_authorization(&mut auth).await.unwrap_err();
        assert_eq!(err.to_string(), "no connection for scheme mastercard");
        assert!(auth.response.is_none());
    }

    #[tokio::test]
    async fn test_format_error_is_promoted() {
        let dispatcher = SchemeDispatcher::new(
            SchemeConnections::new().with(Scheme::Visa, FixedCodeConnection::new("30")),
        );
        let mut auth = authorization(Scheme::Visa, "4111111111111111");

        let err = dispatcher.send_authorization(&mut auth).await.unwrap_err();
        assert!(matches!(err, PaymentError::FormatError));
        assert!(auth.response.is_some());
    }

    #[test]
    fn test_lookup_by_name_is_case_insensitive() {
        let connections =
            SchemeConnections::new().with(Scheme::Visa, FixedCodeConnection::new("00"));
        assert!(connections.get_by_name("VISA").is_ok());
        assert!(connections.get_by_name("Visa").is_ok());
        assert!(matches!(
            connections.get_by_name("mastercard"),
            Err(PaymentError::NoConnectionForScheme(_))
        ));
        assert!(matches!(
            connections.get_by_name("diners"),
            Err(PaymentError::NoConnectionForScheme(name)) if name == "diners"
        ));
    }
}
