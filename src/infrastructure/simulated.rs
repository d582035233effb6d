use crate::application::sequence::SequenceAllocator;
use crate::domain::authorization::Authorization;
use crate::domain::card::Scheme;
use crate::domain::ports::SchemeConnection;
use crate::domain::refund::Refund;
use crate::domain::reversal::Reversal;
use crate::domain::scheme::{MastercardData, ResponseCode, SchemeData, SchemeResponse, VisaData};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Stand-in for a card network connection.
///
/// Every outbound message draws its STAN from the shared allocator, exactly like a real
/// connection would, and the network answers with a fixed response code.
pub struct SimulatedConnection {
    scheme: Scheme,
    stans: Arc<SequenceAllocator>,
    response_code: String,
}

impl SimulatedConnection {
    pub fn new(scheme: Scheme, stans: Arc<SequenceAllocator>) -> Self {
        Self {
            scheme,
            stans,
            response_code: ResponseCode::APPROVED.to_string(),
        }
    }

    pub fn with_response_code(mut self, code: &str) -> Self {
        self.response_code = code.to_string();
        self
    }

    async fn respond(&self) -> Result<SchemeResponse> {
        let stan = self.stans.next().await?;
        let response_code = ResponseCode::new(self.response_code.clone());
        let approval_code = response_code
            .is_approval()
            .then(|| format!("{:06}", stan % 1_000_000));
        Ok(SchemeResponse {
            response_code,
            stan,
            approval_code,
            responded_at: Utc::now(),
        })
    }

    fn scheme_data(&self, response: &SchemeResponse) -> SchemeData {
        match self.scheme {
            Scheme::Mastercard => SchemeData::Mastercard(MastercardData {
                banknet_reference: Some(format!("MCC{:06}", response.stan % 1_000_000)),
                financial_network_code: Some("MCC".to_string()),
                settlement_date: Some(response.responded_at.format("%m%d").to_string()),
            }),
            Scheme::Visa => SchemeData::Visa(VisaData {
                transaction_id: Some(format!(
                    "{}{:09}",
                    response.responded_at.format("%y%j"),
                    response.stan
                )),
                validation_code: Some("A1B2".to_string()),
            }),
        }
    }
}

#[async_trait]
impl SchemeConnection for SimulatedConnection {
    async fn authorize(&self, authorization: &mut Authorization) -> Result<()> {
        let response = self.respond().await?;
        authorization.scheme_data = Some(self.scheme_data(&response));
        authorization.response = Some(response);
        Ok(())
    }

    async fn reverse(&self, reversal: &mut Reversal) -> Result<()> {
        let has_clear_pan = reversal
            .authorization
            .as_ref()
            .is_some_and(|a| a.card.pan.is_some());
        if !has_clear_pan {
            return Err(PaymentError::Upstream(
                "reversal message requires the clear PAN".to_string(),
            ));
        }
        reversal.response = Some(self.respond().await?);
        Ok(())
    }

    async fn refund(&self, refund: &mut Refund) -> Result<()> {
        let response = self.respond().await?;
        refund.scheme_data = Some(self.scheme_data(&response));
        refund.response = Some(response);
        Ok(())
    }

    async fn echo(&self) -> Result<()> {
        let stan = self.stans.next().await?;
        tracing::debug!(scheme = %self.scheme, stan, "echo answered");
        Ok(())
    }
}
