use super::dispatch::SchemeDispatcher;
use super::risk::RiskEngine;
use crate::domain::authorization::{Authorization, Status};
use crate::domain::card::Scheme;
use crate::domain::ports::{AuthorizationRepositoryRef, TokenizerRef};
use crate::domain::scheme::SchemeTransaction;
use crate::error::{Result, ResultExt};
use uuid::Uuid;

/// Runs a new authorization from intake to the persisted network response.
#[derive(Clone)]
pub struct AuthorizationService {
    tokenizer: TokenizerRef,
    repository: AuthorizationRepositoryRef,
    risk: RiskEngine,
    dispatcher: SchemeDispatcher,
}

impl AuthorizationService {
    pub fn new(
        tokenizer: TokenizerRef,
        repository: AuthorizationRepositoryRef,
        risk: RiskEngine,
        dispatcher: SchemeDispatcher,
    ) -> Self {
        Self {
            tokenizer,
            repository,
            risk,
            dispatcher,
        }
    }

    /// Tokenizes the card, stores the authorization as `new`, runs the risk rules, sends it
    /// to the card network and stores the response.
    ///
    /// A failure after the row was created leaves it in place for reconciliation: in `new`
    /// status when the network exchange failed, in `riskDeclined` when a risk rule rejected.
    #[tracing::instrument(
        skip_all,
        fields(
            id = %authorization.id,
            psp = %authorization.psp_id,
            scheme = %authorization.card.scheme,
            card = %authorization.card.masked_pan,
        )
    )]
    pub async fn authorize(&self, authorization: &mut Authorization) -> Result<()> {
        let token = self
            .tokenizer
            .tokenize(&authorization.merchant_id, &authorization.card)
            .await
            .context("failed to tokenize consumer token")?;
        authorization.card.token_id = Some(token);
        authorization.status = Status::New;

        self.repository
            .create_authorization(authorization)
            .await
            .context("failed to create authorization")?;

        match self.risk.assess(authorization).await {
            Ok(assessment) => authorization.applied_exemption = assessment.applied_exemption,
            Err(err) => {
                tracing::info!(error = %err, "authorization rejected by risk rules");
                authorization.status = Status::RiskDeclined;
                self.repository
                    .update_authorization_response(authorization)
                    .await
                    .context("failed to store risk decline")?;
                return Err(err.wrap("risk assessment failed"));
            }
        }

        self.dispatcher
            .send_authorization(authorization)
            .await
            .context("failed to authorize with the cardscheme")?;

        match authorization.card.scheme {
            Scheme::Mastercard => self
                .repository
                .create_mastercard_authorization(authorization)
                .await
                .context("failed to create mastercard authorization")?,
            Scheme::Visa => self
                .repository
                .create_visa_authorization(authorization)
                .await
                .context("failed to create visa authorization")?,
        }

        authorization.status = authorization
            .response_code()
            .map(|code| code.status())
            .unwrap_or(Status::Failed);
        self.repository
            .update_authorization_response(authorization)
            .await
            .context("failed to update authorization")?;

        tracing::info!(status = ?authorization.status, "authorization processed");
        Ok(())
    }

    pub async fn get_authorizations(&self, psp_id: &str) -> Result<Vec<Authorization>> {
        self.repository.get_authorizations(psp_id).await
    }

    pub async fn get_authorization(&self, psp_id: &str, id: Uuid) -> Result<Authorization> {
        self.repository.get_authorization_with_scheme_data(psp_id, id).await
    }
}
