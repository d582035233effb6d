use super::dispatch::SchemeDispatcher;
use crate::domain::authorization::Status;
use crate::domain::card::Scheme;
use crate::domain::ports::{RefundRepositoryRef, TokenizerRef};
use crate::domain::refund::Refund;
use crate::domain::scheme::SchemeTransaction;
use crate::error::{Result, ResultExt};
use uuid::Uuid;

/// Sends refunds to the card network. Same pipeline as authorizations, minus risk rules.
#[derive(Clone)]
pub struct RefundService {
    tokenizer: TokenizerRef,
    repository: RefundRepositoryRef,
    dispatcher: SchemeDispatcher,
}

impl RefundService {
    pub fn new(
        tokenizer: TokenizerRef,
        repository: RefundRepositoryRef,
        dispatcher: SchemeDispatcher,
    ) -> Self {
        Self {
            tokenizer,
            repository,
            dispatcher,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(id = %refund.id, psp = %refund.psp_id, scheme = %refund.card.scheme)
    )]
    pub async fn refund(&self, refund: &mut Refund) -> Result<()> {
        let token = self
            .tokenizer
            .tokenize(&refund.merchant_id, &refund.card)
            .await
            .context("failed to tokenize consumer token")?;
        refund.card.token_id = Some(token);
        refund.status = Status::New;

        self.repository
            .create_refund(refund)
            .await
            .context("failed to create refund")?;

        self.dispatcher
            .send_refund(refund)
            .await
            .context("failed to refund with the cardscheme")?;

        match refund.card.scheme {
            Scheme::Mastercard => self
                .repository
                .create_mastercard_refund(refund)
                .await
                .context("failed to create mastercard refund")?,
            Scheme::Visa => self
                .repository
                .create_visa_refund(refund)
                .await
                .context("failed to create visa refund")?,
        }

        refund.status = refund
            .response_code()
            .map(|code| code.status())
            .unwrap_or(Status::Failed);
        self.repository
            .update_refund_response(refund)
            .await
            .context("failed to update refund")?;

        tracing::info!(status = ?refund.status, "refund processed");
        Ok(())
    }

    pub async fn get_refunds(&self, psp_id: &str) -> Result<Vec<Refund>> {
        self.repository.get_refunds(psp_id).await
    }

    pub async fn get_refund(&self, psp_id: &str, id: Uuid) -> Result<Refund> {
        self.repository.get_refund(psp_id, id).await
    }
}
