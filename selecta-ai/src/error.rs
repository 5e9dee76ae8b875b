//! Error types for selecta-ai
//!
//! Per-sample failures (`UnsupportedAudio`) are recoverable by the caller.
//! Bundle failures (`ArtifactLoad`, `ArtifactConsistency`) mean the process
//! should not proceed with that bundle. "Unclassified" is a result status,
//! never an error.

use thiserror::Error;

/// Classification error type
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Input buffer fails minimum duration/format requirements for extraction
    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),

    /// Bundle file missing, corrupt, or of an unrecognized version
    #[error("Artifact load error: {0}")]
    ArtifactLoad(String),

    /// Loaded bundle is internally malformed (schema/tree/stage mismatch)
    #[error("Artifact consistency error: {0}")]
    ArtifactConsistency(String),

    /// Batch item not started because cancellation was requested
    #[error("Classification cancelled before start")]
    Cancelled,

    /// Blocking worker task panicked or was aborted
    #[error("Worker failure: {0}")]
    Worker(String),

    /// Audio file could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClassifyError {
    /// True for failures that only affect the current sample
    pub fn is_per_sample(&self) -> bool {
        matches!(
            self,
            ClassifyError::UnsupportedAudio(_) | ClassifyError::Decode(_) | ClassifyError::Cancelled
        )
    }
}

/// Result type for classification operations
pub type Result<T> = std::result::Result<T, ClassifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_sample_split() {
        assert!(ClassifyError::UnsupportedAudio("too short".to_string()).is_per_sample());
        assert!(ClassifyError::Decode("bad header".to_string()).is_per_sample());
        assert!(ClassifyError::Cancelled.is_per_sample());

        assert!(!ClassifyError::ArtifactLoad("missing".to_string()).is_per_sample());
        assert!(!ClassifyError::ArtifactConsistency("shape".to_string()).is_per_sample());
        assert!(!ClassifyError::Worker("panicked".to_string()).is_per_sample());
    }
}
