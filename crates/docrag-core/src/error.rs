use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Corrupt index {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("Stale index: expected {expected}, found {found}")]
    StaleIndex { expected: String, found: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptIndex { path: path.into(), reason: reason.into() }
    }
}

/// Failures talking to an embedding model.
///
/// Only transport hiccups, timeouts, 5xx and 429 responses are retryable;
/// everything else signals a misconfiguration and aborts immediately.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding transport error: {0}")]
    Transport(String),

    /// The request could not be built, e.g. an endpoint URL without a scheme.
    #[error("Invalid embedding request: {0}")]
    InvalidRequest(String),

    #[error("Embedding request timed out after {0} ms")]
    Timeout(u64),

    #[error("Embedding endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode embedding response: {0}")]
    Decode(String),

    #[error("Embedding count mismatch: sent {expected} inputs, got {got} vectors")]
    CountMismatch { expected: usize, got: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<EmbeddingError>,
    },
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
