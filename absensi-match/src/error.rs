use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding length mismatch: expected {expected} values, found {found}")]
    EmbeddingLengthMismatch { expected: usize, found: usize },
}

impl MatchError {
    /// True when the failure points at the caller's request rather than at
    /// enrolled data.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MatchError::InvalidInput(_))
    }
}
