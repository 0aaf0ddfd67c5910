//! Error taxonomy for bundle analysis.

use serde::Serialize;
use thiserror::Error;

/// Why the analysis gate refused to serve a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateRejection {
    RequiresFullAnalysis,
    RequiresCompletion,
}

impl GateRejection {
    pub fn code(&self) -> &'static str {
        match self {
            GateRejection::RequiresFullAnalysis => "REQUIRES_FULL_ANALYSIS",
            GateRejection::RequiresCompletion => "REQUIRES_COMPLETION",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            GateRejection::RequiresFullAnalysis => "this view requires a full analysis bundle",
            GateRejection::RequiresCompletion => {
                "this view is available once every chunk has been analysed"
            }
        }
    }
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Failure reported by a [`ChunkExtractor`](crate::extract::ChunkExtractor).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// Timeout, rate limit, or other retryable failure.
    #[error("transient extraction failure: {0}")]
    Transient(String),

    /// Failure that will not succeed on retry (bad request, unparsable output).
    #[error("extraction failed: {0}")]
    Permanent(String),
}

impl ExtractionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractionError::Transient(_))
    }
}

/// Errors returned by bundle operations.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("view not available: {0}")]
    Gate(GateRejection),

    #[error("chunk {chunk_index} failed after {attempts} attempt(s): {message}")]
    FatalProcessing {
        chunk_index: u32,
        attempts: u32,
        message: String,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("storage error: {0}")]
    Store(#[from] anyhow::Error),
}

impl BundleError {
    pub fn validation(message: impl Into<String>) -> Self {
        BundleError::Validation(message.into())
    }

    pub fn bundle_not_found(bundle_id: &str) -> Self {
        BundleError::NotFound(format!("bundle {}", bundle_id))
    }

    /// Machine-readable error code used in API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            BundleError::Validation(_) => "validation",
            BundleError::NotFound(_) => "not_found",
            BundleError::Gate(_) => "gate_error",
            BundleError::FatalProcessing { .. } | BundleError::Extraction(_) => {
                "extraction_failed"
            }
            BundleError::Store(_) => "internal",
        }
    }
}

pub type BundleResult<T> = Result<T, BundleError>;
