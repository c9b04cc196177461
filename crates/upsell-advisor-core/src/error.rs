//! Typed failures of the analysis path.
//!
//! Every variant reaches the HTTP boundary as a server error; none is
//! replaced by synthetic content.

use crate::completion::CompletionError;
use crate::models::Shape;

/// Why a single completion attempt produced no usable value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("completion failed: {0}")]
    Completion(CompletionError),

    #[error("no JSON value could be recovered from the response")]
    Unparseable,

    #[error("expected a JSON {expected}, got {found}")]
    ShapeMismatch { expected: Shape, found: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// A collaborator needed by the request was not configured at start-up.
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("data store query failed: {0}")]
    DataStore(String),

    /// The provider rejected the request in a way retrying cannot fix.
    #[error("completion failed: {0}")]
    CompletionFailed(CompletionError),

    #[error("could not recover a valid response after {attempts} attempts: {last}")]
    RecoveryExhausted { attempts: usize, last: AttemptFailure },

    #[error("expected a JSON {expected}, got {found}")]
    ShapeMismatch { expected: Shape, found: &'static str },
}

impl AnalysisError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Unavailable { .. } => "collaborator_unavailable",
            AnalysisError::DataStore(_) => "data_store_error",
            AnalysisError::CompletionFailed(_) => "completion_failed",
            AnalysisError::RecoveryExhausted { .. } => "recovery_exhausted",
            AnalysisError::ShapeMismatch { .. } => "shape_mismatch",
        }
    }
}
