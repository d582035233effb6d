use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("authorized amount exceeded")]
    AuthorizedAmountExceeded,
    #[error("final capture already exists")]
    FinalCaptureExists,
    #[error("authorization already reversed")]
    AuthAlreadyReversed,
    #[error("authorization declined")]
    AuthorizationDeclined,
    #[error("authorization not approved")]
    AuthorizationNotApproved,
    #[error("refund declined")]
    RefundDeclined,
    #[error("low value exemption not allowed for amount {amount} (ceiling {ceiling})")]
    LowValueExemptionExceeded {
        amount: rust_decimal::Decimal,
        ceiling: rust_decimal::Decimal,
    },
    #[error("record not found")]
    RecordNotFound,
    #[error("duplicate value on unique index")]
    DupValOnIndex,
    #[error("format error reported by the card network")]
    FormatError,
    #[error("unknown sequence: {0}")]
    UnknownSequence(String),
    #[error("sequence {0} is no longer being filled")]
    SequenceClosed(String),
    #[error("no connection for scheme {0}")]
    NoConnectionForScheme(String),
    #[error("tokenizer error: {0}")]
    Tokenization(String),
    #[error("card network error: {0}")]
    Upstream(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PaymentError>,
    },
}

impl PaymentError {
    /// Innermost error of a context chain. Sentinel matching goes through here.
    pub fn root(&self) -> &PaymentError {
        match self {
            PaymentError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn wrap(self, context: &str) -> Self {
        PaymentError::Context {
            context: context.to_string(),
            source: Box::new(self),
        }
    }

    /// Business-rule and conflict errors must not be retried blindly; only transport
    /// level failures are worth another attempt by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            PaymentError::Publish(_) | PaymentError::DeadlineExceeded | PaymentError::Io(_)
        )
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::Internal(Box::new(err))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Internal(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Wraps an error with the name of the step that produced it.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|source| source.wrap(context))
    }
}
