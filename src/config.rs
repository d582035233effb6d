use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Runtime settings for the processor. Every field has a default, so a config file
/// only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub sequence: SequenceConfig,
    pub risk: RiskConfig,
    pub topics: TopicConfig,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub name: String,
    pub min_value: u64,
    pub max_value: u64,
    pub batch_size: u64,
    pub prefetch: u64,
    pub retry_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub low_value_ceiling: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub capture: String,
    pub refund_capture: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sequence: SequenceConfig::default(),
            risk: RiskConfig::default(),
            topics: TopicConfig::default(),
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            name: "stan".to_string(),
            min_value: 1,
            max_value: 999_999,
            batch_size: 100,
            prefetch: 50,
            retry_interval_ms: 250,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            low_value_ceiling: dec!(30),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            capture: "captures".to_string(),
            refund_capture: "refund-captures".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Loads a JSON config file and validates it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| PaymentError::Validation(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sequence.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SequenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_value > self.max_value {
            return Err(PaymentError::Validation(format!(
                "sequence {}: min_value {} exceeds max_value {}",
                self.name, self.min_value, self.max_value
            )));
        }
        if self.batch_size == 0 || self.batch_size > self.max_value - self.min_value + 1 {
            return Err(PaymentError::Validation(format!(
                "sequence {}: batch_size must be between 1 and the size of the range",
                self.name
            )));
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}
