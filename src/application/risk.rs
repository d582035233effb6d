use crate::domain::authorization::{Authorization, Exemption};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Outcome accumulated while the rule set runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskAssessment {
    /// Set by a rule once no further rule needs to look at the transaction.
    pub completed: bool,
    pub applied_exemption: Option<Exemption>,
    pub evaluated_rules: Vec<&'static str>,
}

#[async_trait]
pub trait RiskRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, authorization: &Authorization) -> bool;
    async fn eval(
        &self,
        authorization: &Authorization,
        assessment: &mut RiskAssessment,
    ) -> Result<()>;
}

/// Runs the supporting rules in order until one completes the assessment or rejects.
#[derive(Clone)]
pub struct RiskEngine {
    rules: Vec<Arc<dyn RiskRule>>,
}

impl RiskEngine {
    pub fn new(rules: Vec<Arc<dyn RiskRule>>) -> Self {
        Self { rules }
    }

    pub fn with_default_rules(low_value_ceiling: Decimal) -> Self {
        Self::new(vec![
            Arc::new(NoExemptionRule),
            Arc::new(LowValueExemptionRule::new(low_value_ceiling)),
            Arc::new(TraExemptionRule),
        ])
    }

    pub async fn assess(&self, authorization: &Authorization) -> Result<RiskAssessment> {
        let mut assessment = RiskAssessment::default();
        for rule in self.rules.iter().filter(|r| r.supports(authorization)) {
            assessment.evaluated_rules.push(rule.name());
            rule.eval(authorization, &mut assessment).await?;
            if assessment.completed {
                break;
            }
        }
        Ok(assessment)
    }
}

pub struct NoExemptionRule;

#[async_trait]
impl RiskRule for NoExemptionRule {
    fn name(&self) -> &'static str {
        "no_exemption"
    }

    fn supports(&self, authorization: &Authorization) -> bool {
        authorization.exemption == Exemption::None
    }

    async fn eval(&self, _: &Authorization, assessment: &mut RiskAssessment) -> Result<()> {
        assessment.completed = true;
        Ok(())
    }
}

/// Low-value exemptions are only valid up to a fixed amount per transaction.
pub struct LowValueExemptionRule {
    ceiling: Decimal,
}

impl LowValueExemptionRule {
    pub fn new(ceiling: Decimal) -> Self {
        Self { ceiling }
    }
}

#[async_trait]
impl RiskRule for LowValueExemptionRule {
    fn name(&self) -> &'static str {
        "low_value_exemption"
    }

    fn supports(&self, authorization: &Authorization) -> bool {
        authorization.exemption == Exemption::LowValue
    }

    async fn eval(
        &self,
        authorization: &Authorization,
        assessment: &mut RiskAssessment,
    ) -> Result<()> {
        let amount = authorization.amount.value();
        if amount > self.ceiling {
            return Err(PaymentError::LowValueExemptionExceeded {
                amount,
                ceiling: self.ceiling,
            });
        }
        assessment.applied_exemption = Some(Exemption::LowValue);
        assessment.completed = true;
        Ok(())
    }
}

pub struct TraExemptionRule;

#[async_trait]
impl RiskRule for TraExemptionRule {
    fn name(&self) -> &'static str {
        "tra_exemption"
    }

    fn supports(&self, authorization: &Authorization) -> bool {
        authorization.exemption == Exemption::TransactionRiskAnalysis
    }

    async fn eval(&self, _: &Authorization, assessment: &mut RiskAssessment) -> Result<()> {
        assessment.applied_exemption = Some(Exemption::TransactionRiskAnalysis);
        assessment.completed = true;
        Ok(())
    }
}
