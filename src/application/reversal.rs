use super::dispatch::SchemeDispatcher;
use crate::domain::authorization::Status;
use crate::domain::ports::{
    AuthorizationRepositoryRef, CaptureRepositoryRef, ReversalRepositoryRef, TokenizerRef,
};
use crate::domain::reversal::{Reversal, ReversalStatus, reversal_amount};
use crate::domain::scheme::SchemeTransaction;
use crate::error::{PaymentError, Result, ResultExt};
use uuid::Uuid;

/// Cancels the uncaptured remainder of an approved authorization at the card network.
#[derive(Clone)]
pub struct ReversalService {
    tokenizer: TokenizerRef,
    authorizations: AuthorizationRepositoryRef,
    captures: CaptureRepositoryRef,
    reversals: ReversalRepositoryRef,
    dispatcher: SchemeDispatcher,
}

impl ReversalService {
    pub fn new(
        tokenizer: TokenizerRef,
        authorizations: AuthorizationRepositoryRef,
        captures: CaptureRepositoryRef,
        reversals: ReversalRepositoryRef,
        dispatcher: SchemeDispatcher,
    ) -> Self {
        Self {
            tokenizer,
            authorizations,
            captures,
            reversals,
            dispatcher,
        }
    }

    /// Reverses the authorization referenced by `reversal`.
    ///
    /// The already-reversed check is only a shortcut; the unique index on the reversal
    /// table decides races and surfaces as `DupValOnIndex`. The same error reports a
    /// capture that landed between reading the capture summary and storing the reversal;
    /// the reversal is then stored as `failed` without reaching the network. A network
    /// decline is not an error: the reversal is stored as `failed` and may be attempted
    /// again.
    #[tracing::instrument(
        skip_all,
        fields(psp = %psp_id, id = %reversal.id, authorization_id = %reversal.authorization_id)
    )]
    pub async fn reverse(&self, psp_id: &str, reversal: &mut Reversal) -> Result<()> {
        let mut authorization = match reversal.authorization.clone() {
            Some(authorization) => authorization,
            None => self
                .authorizations
                .get_authorization_with_scheme_data(psp_id, reversal.authorization_id)
                .await
                .context("failed to get authorization")?,
        };
        if authorization.psp_id != psp_id {
            return Err(PaymentError::RecordNotFound.wrap("failed to get authorization"));
        }
        if authorization.id != reversal.authorization_id {
            return Err(PaymentError::Validation(
                "reversal references a different authorization".to_string(),
            ));
        }
        if authorization.status != Status::Approved {
            return Err(PaymentError::AuthorizationNotApproved.wrap("invalid reversal"));
        }

        authorization.card = self
            .tokenizer
            .detokenize(&authorization.merchant_id, &authorization.card)
            .await
            .context("failed to detokenize card")?;

        if self
            .reversals
            .authorization_already_reversed(authorization.id)
            .await
            .context("failed to check reversal")?
        {
            return Err(PaymentError::AuthAlreadyReversed.wrap("invalid reversal"));
        }

        if self
            .captures
            .final_capture_exists(authorization.id)
            .await
            .context("failed to check final capture")?
        {
            return Err(PaymentError::FinalCaptureExists.wrap("invalid reversal"));
        }

        let summary = self
            .captures
            .get_capture_summary(authorization.id)
            .await
            .context("failed to get capture summary")?;
        reversal.amount = Some(
            reversal_amount(authorization.amount, &summary)
                .map_err(|_| PaymentError::AuthorizedAmountExceeded.wrap("nothing left to reverse"))?,
        );
        let authorization_id = authorization.id;
        reversal.authorization = Some(authorization);
        reversal.status = ReversalStatus::New;

        self.reversals
            .create_reversal(reversal)
            .await
            .context("failed to create reversal")?;

        // a capture written after the summary was read would make the amount too large
        let current = self
            .captures
            .get_capture_summary(authorization_id)
            .await
            .context("failed to get capture summary")?;
        if current != summary {
            reversal.status = ReversalStatus::Failed;
            self.reversals
                .update_reversal_response(reversal)
                .await
                .context("failed to withdraw reversal")?;
            tracing::info!("reversal withdrawn, captures changed concurrently");
            return Err(PaymentError::DupValOnIndex.wrap("invalid reversal"));
        }

        self.dispatcher
            .send_reversal(reversal)
            .await
            .context("failed to reverse with the cardscheme")?;

        reversal.status = match reversal.response_code() {
            Some(code) if code.is_approval() => ReversalStatus::Succeeded,
            _ => ReversalStatus::Failed,
        };
        self.reversals
            .update_reversal_response(reversal)
            .await
            .context("failed to update reversal")?;

        tracing::info!(status = ?reversal.status, amount = ?reversal.amount, "reversal processed");
        Ok(())
    }

    pub async fn get_reversals(&self, authorization_id: Uuid) -> Result<Vec<Reversal>> {
        self.reversals.get_reversals(authorization_id).await
    }
}
