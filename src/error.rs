// =============================================================================
// Pipeline Errors
// =============================================================================
//
// Failures that cross a collaborator seam (tick store, result sink, pub/sub)
// or a per-symbol unit of work. Data absence is NOT an error: it is modelled
// as `Ok(None)` by the callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The tick store, result sink or feed could not be reached.
    #[error("{operation} unavailable: {reason}")]
    Unavailable { operation: &'static str, reason: String },

    /// The subscription's underlying channel was closed.
    #[error("feed subscription closed")]
    FeedClosed,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound record or message could not be understood.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Deriving a market status from analysis results failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

impl PipelineError {
    pub fn unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            reason: reason.into(),
        }
    }
}
