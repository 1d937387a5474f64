//! Error types for each seam of the pipeline.
//!
//! None of these abort call processing on their own: classification errors route to
//! the heuristic fallback, backend errors land in their action slot, and store
//! errors on denormalized writes are only logged.

use thiserror::Error;

/// Record store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Completion service failures.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service not configured: {0}")]
    NotConfigured(String),

    #[error("completion request timed out")]
    Timeout,

    #[error("completion transport error: {0}")]
    Transport(String),

    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response was empty or malformed: {0}")]
    InvalidResponse(String),
}

/// Reasons the primary (model-backed) classification path was abandoned.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("no JSON object found in completion response")]
    NoJson,

    #[error("decision has invalid structure: {0}")]
    InvalidStructure(String),
}

/// Ticket, client, and follow-up backend failures.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request timed out")]
    Timeout,

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("backend response could not be parsed: {0}")]
    InvalidResponse(String),
}
