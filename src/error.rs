//! Error types for the protocol pipeline.
//!
//! Chunk, reduce and refine failures are carried as data through
//! [`crate::models::Outcome`]; only [`PipelineError`] aborts a run.

use std::time::Duration;

use thiserror::Error;

/// Shape or schema mismatch in a JSON document
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

/// Failure reported by an [`crate::llm::LlmClient`] after its own retry budget
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Rate limited by provider: {message}")]
    RateLimited { message: String },

    #[error("Connection to provider failed: {message}")]
    Connection { message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider server error: {status} - {body}")]
    Server { status: u16, body: String },

    #[error("Provider API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Invalid provider response: {message}")]
    InvalidResponse { message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("LLM configuration error: {message}")]
    Config { message: String },
}

impl LlmError {
    /// Rate limits, connection problems, timeouts and 5xx responses are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Connection { .. }
                | LlmError::Timeout(_)
                | LlmError::Server { .. }
        )
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        LlmError::InvalidResponse {
            message: message.into(),
        }
    }
}

/// A single chunk could not be analyzed; recovered locally with a placeholder
#[derive(Error, Debug, Clone)]
pub enum ChunkProcessingError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("chunk analysis timed out after {0:?}")]
    TimedOut(Duration),

    #[error("chunk task failed: {0}")]
    Task(String),
}

/// The reduce call failed; affects the whole batch
#[derive(Error, Debug, Clone)]
pub enum AggregationError {
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// The refine call failed; recovered with an error protocol
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Cache backends report these; callers log and swallow them
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache lock poisoned")]
    Poisoned,
}

/// Conditions that abort a run before any artifact is produced
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transcript contains no segments")]
    EmptyTranscript,

    #[error("Every LLM call failed and no partial data is available: {cause}")]
    LlmUnavailable { cause: String },
}
