use super::command_reader::{CommandRecord, CommandType};
use super::outcome_writer::OutcomeRecord;
use crate::application::processor::PaymentProcessor;
use crate::domain::authorization::{Authorization, Status};
use crate::domain::capture::{Capture, RefundCapture};
use crate::domain::card::{Card, Pan, Scheme};
use crate::domain::money::{Amount, Currency};
use crate::domain::refund::Refund;
use crate::domain::reversal::Reversal;
use crate::domain::scheme::SchemeResponse;
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use uuid::Uuid;

/// Feeds replay commands to the processor and turns each result into an outcome row.
///
/// References are scoped per PSP, like the records they resolve to.
pub struct Replay {
    processor: PaymentProcessor,
    authorizations: HashMap<(String, String), Uuid>,
    refunds: HashMap<(String, String), Uuid>,
}

struct Applied {
    status: String,
    amount: String,
    detail: String,
}

impl Replay {
    pub fn new(processor: PaymentProcessor) -> Self {
        Self {
            processor,
            authorizations: HashMap::new(),
            refunds: HashMap::new(),
        }
    }

    pub async fn apply(&mut self, command: CommandRecord) -> OutcomeRecord {
        let kind = command.kind.as_str();
        let reference = command.reference.clone();
        match self.dispatch(command).await {
            Ok(applied) => OutcomeRecord {
                reference,
                kind,
                outcome: "ok",
                status: applied.status,
                amount: applied.amount,
                detail: applied.detail,
            },
            Err(err) => {
                tracing::warn!(reference = %reference, kind, error = %err, "command failed");
                OutcomeRecord {
                    reference,
                    kind,
                    outcome: "error",
                    status: String::new(),
                    amount: String::new(),
                    detail: err.to_string(),
                }
            }
        }
    }

    async fn dispatch(&mut self, command: CommandRecord) -> Result<Applied> {
        match command.kind {
            CommandType::Authorize => self.authorize(command).await,
            CommandType::Capture => self.capture(command).await,
            CommandType::Reverse => self.reverse(command).await,
            CommandType::Refund => self.refund(command).await,
            CommandType::CaptureRefund => self.capture_refund(command).await,
            CommandType::Echo => {
                let scheme: Scheme = required(command.scheme.as_deref(), "scheme")?.parse()?;
                self.processor.echo(scheme).await?;
                Ok(Applied {
                    status: "ok".to_string(),
                    amount: String::new(),
                    detail: format!("scheme={scheme}"),
                })
            }
        }
    }

    async fn authorize(&mut self, command: CommandRecord) -> Result<Applied> {
        let (card, amount, currency) = card_payment(&command)?;
        let mut authorization = Authorization::new(
            command.psp.clone(),
            command.psp.clone(),
            amount,
            currency,
            card,
        )
        .with_exemption(command.exemption.unwrap_or_default());

        let key = (command.psp, command.reference);
        let result = self.processor.authorize(&mut authorization).await;
        // Rows rejected after creation still exist and can be looked up.
        if result.is_ok() || authorization.status != Status::New {
            self.authorizations.insert(key, authorization.id);
        }
        result?;

        Ok(Applied {
            status: authorization.status.as_str().to_string(),
            amount: authorization.amount.to_string(),
            detail: response_detail(authorization.response.as_ref()),
        })
    }

    async fn capture(&mut self, command: CommandRecord) -> Result<Applied> {
        let authorization_id = lookup(&self.authorizations, &command)?;
        let amount = Amount::new(required(command.amount, "amount")?)?;
        let capture = Capture::new(authorization_id, amount, command.is_final.unwrap_or(false));

        let capture = self.processor.capture(&command.psp, capture).await?;
        Ok(Applied {
            status: "captured".to_string(),
            amount: capture.amount.to_string(),
            detail: format!("final={}", capture.is_final),
        })
    }

    async fn reverse(&mut self, command: CommandRecord) -> Result<Applied> {
        let authorization_id = lookup(&self.authorizations, &command)?;
        let mut reversal = Reversal::new(authorization_id);

        self.processor.reverse(&command.psp, &mut reversal).await?;
        Ok(Applied {
            status: reversal.status.as_str().to_string(),
            amount: reversal
                .amount
                .map(|amount| amount.to_string())
                .unwrap_or_default(),
            detail: response_detail(reversal.response.as_ref()),
        })
    }

    async fn refund(&mut self, command: CommandRecord) -> Result<Applied> {
        let (card, amount, currency) = card_payment(&command)?;
        let mut refund = Refund::new(
            command.psp.clone(),
            command.psp.clone(),
            amount,
            currency,
            card,
        );

        let key = (command.psp, command.reference);
        let result = self.processor.refund(&mut refund).await;
        if result.is_ok() {
            self.refunds.insert(key, refund.id);
        }
        result?;

        Ok(Applied {
            status: refund.status.as_str().to_string(),
            amount: refund.amount.to_string(),
            detail: response_detail(refund.response.as_ref()),
        })
    }

    async fn capture_refund(&mut self, command: CommandRecord) -> Result<Applied> {
        let refund_id = lookup(&self.refunds, &command)?;
        let amount = Amount::new(required(command.amount, "amount")?)?;
        let capture = RefundCapture::new(refund_id, amount, command.is_final.unwrap_or(false));

        let capture = self.processor.capture_refund(&command.psp, capture).await?;
        Ok(Applied {
            status: "captured".to_string(),
            amount: capture.amount.to_string(),
            detail: format!("final={}", capture.is_final),
        })
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| PaymentError::Validation(format!("missing {field}")))
}

fn lookup(references: &HashMap<(String, String), Uuid>, command: &CommandRecord) -> Result<Uuid> {
    references
        .get(&(command.psp.clone(), command.reference.clone()))
        .copied()
        .ok_or_else(|| {
            PaymentError::Validation(format!("unknown reference {}", command.reference))
        })
}

fn card_payment(command: &CommandRecord) -> Result<(Card, Amount, Currency)> {
    let scheme: Scheme = required(command.scheme.as_deref(), "scheme")?.parse()?;
    let pan = Pan::new(required(command.pan.as_deref(), "pan")?)?;
    let amount = Amount::new(required(command.amount, "amount")?)?;
    let currency: Currency = required(command.currency.as_deref(), "currency")?.parse()?;
    Ok((Card::new(pan, scheme), amount, currency))
}

fn response_detail(response: Option<&SchemeResponse>) -> String {
    match response {
        Some(response) => format!(
            "code={} stan={}",
            response.response_code.as_str(),
            response.stan
        ),
        None => String::new(),
    }
}
