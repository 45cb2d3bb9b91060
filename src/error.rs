//! Typed errors for the belief extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

use crate::types::usage::Usage;

/// Errors that can occur while running the extraction pipeline.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Invalid configuration, caught before any classification work starts.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// A worker task panicked or was aborted by the runtime.
    #[error("worker task failed: {0}")]
    Worker(String),

    /// Transcript parsing failed.
    #[error("transcript parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors returned by the classification port.
///
/// The engine retries `Transient` failures with backoff up to the configured
/// attempt budget and immediately skips the chunk on `Permanent` failures.
/// Either variant may carry the token usage the failed attempt consumed, which
/// is accounted separately from successful-call usage.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Rate limit, network timeout, or other retryable condition.
    #[error("transient classification failure: {reason}")]
    Transient {
        reason: String,
        usage: Option<Usage>,
    },

    /// Malformed response or unsupported input. Not retried.
    #[error("permanent classification failure: {reason}")]
    Permanent {
        reason: String,
        usage: Option<Usage>,
    },
}

impl ClassifyError {
    /// Transient failure that consumed no tokens.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
            usage: None,
        }
    }

    /// Permanent failure that consumed no tokens.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
            usage: None,
        }
    }

    /// Permanent failure for an unparseable classifier payload.
    pub fn malformed(err: serde_json::Error, usage: Option<Usage>) -> Self {
        Self::Permanent {
            reason: format!("malformed response: {err}"),
            usage,
        }
    }

    /// Usage consumed by the failed attempt, if any was reported.
    pub fn usage(&self) -> Option<Usage> {
        match self {
            Self::Transient { usage, .. } | Self::Permanent { usage, .. } => *usage,
        }
    }

    /// True when the engine may retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors that can occur while parsing a diarized transcript.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Could not read the transcript file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No parseable utterance lines in the input.
    #[error("no utterances found in transcript")]
    Empty,
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for classification port operations.
pub type ClassifyResult<T> = std::result::Result<T, ClassifyError>;
