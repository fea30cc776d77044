//! Error types for replikv

use crate::replica::ConsistencyLevel;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Root cause of a failed coordinated read.
///
/// Callers match on this to tell "not enough replicas reachable" apart from
/// "replicas disagree and repair failed" and "transport error".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailure {
    #[error("cannot reach enough replicas")]
    Replicas,

    #[error("read repair error")]
    Repair,

    #[error("read error")]
    Read,
}

#[derive(Error, Debug)]
pub enum Error {
    // === Consistency Errors ===
    #[error("cannot achieve consistency level \"{level}\": {cause}")]
    ConsistencyLevel {
        level: ConsistencyLevel,
        #[source]
        cause: ReadFailure,
    },

    #[error("Insufficient replicas for shard {shard}: need {needed}, have {available}")]
    InsufficientReplicas {
        shard: String,
        needed: usize,
        available: usize,
    },

    // === Validation Errors ===
    #[error("nil object at index {0}")]
    NilObject(usize),

    #[error("missing node or shard at index {0}")]
    MissingShardOrNode(usize),

    // === Routing Errors ===
    #[error("cannot resolve node name: {0}")]
    UnresolvedNode(String),

    #[error("Shard not found: {0}")]
    ShardNotFound(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn consistency(level: ConsistencyLevel, cause: ReadFailure) -> Self {
        Error::ConsistencyLevel { level, cause }
    }

    /// Root cause of a failed coordinated read, if this is one.
    pub fn cause(&self) -> Option<ReadFailure> {
        match self {
            Error::ConsistencyLevel { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::ConnectionFailed(_)
                | Error::ConsistencyLevel {
                    cause: ReadFailure::Replicas | ReadFailure::Read,
                    ..
                }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            Error::Http(format!("invalid response body: {}", e))
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
