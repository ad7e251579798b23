use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by level generation. Rejected candidates are retried
/// internally and never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("invalid generation parameters: {reason}")]
    InvalidParameters { reason: String },
    #[error("no valid level after {attempts} attempts")]
    Exhausted { attempts: usize },
    #[error("generation cancelled")]
    Cancelled,
    #[error("generation gave up after {elapsed:?}")]
    TimedOut { elapsed: Duration },
}

impl GenerationError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        GenerationError::InvalidParameters {
            reason: reason.into(),
        }
    }
}
