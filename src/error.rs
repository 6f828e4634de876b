use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Payment context is missing `{0}`")]
    MissingPaymentContext(&'static str),
    #[error("Malformed channel message: {0}")]
    MalformedMessage(String),
    #[error("Verification unavailable: {0}")]
    VerificationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
