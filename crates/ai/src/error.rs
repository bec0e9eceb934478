use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    /// Not enough history to score root causes.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
