//! Error types for rollup-sync
//!
//! The synchronizer distinguishes four failure classes:
//! - **Transport** - the upstream could not be reached (connection refused, timeout)
//! - **Protocol** - the upstream answered with something that is not a well-formed page
//! - **Decode** - a raw entry does not conform to the expected payload encoding
//! - **Database** - persisting artifacts or progress failed
//!
//! Transport and protocol failures are transient: the loop logs them and polls again
//! after its fixed interval. Decode and database failures halt the loop, because
//! retrying them deterministically reproduces the same failure.

use thiserror::Error;

/// Result type alias for rollup-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rollup-sync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "sync.batch_size")
        key: Option<String>,
    },

    /// Upstream could not be reached (connection failure, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream response was not a well-formed page (bad status, malformed body,
    /// GraphQL error envelope)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A raw entry could not be decoded into an artifact
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Persisting artifacts or sync progress failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if the synchronizer may swallow this error and poll again.
    ///
    /// Only failures on the way to the upstream are transient. Everything that happens
    /// after a page has been received (decoding, persisting) is permanent for that
    /// page and must stop the loop instead of being skipped.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Protocol(_) => true,
            Error::Decode(_) | Error::Database(_) => false,
            Error::Config { .. } | Error::Serialization(_) | Error::Other(_) => false,
        }
    }
}

/// Database-related errors
///
/// Any of these surfacing from a commit means the whole commit was rolled back.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Transaction could not be started or committed
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// A value does not fit the column it is stored in
    #[error("value out of range for {column}: {value}")]
    OutOfRange {
        /// Column the value was destined for
        column: &'static str,
        /// Offending value
        value: u64,
    },
}

/// Errors produced while turning a raw entry into an artifact
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Blob is not valid 0x-prefixed hex
    #[error("invalid hex blob at index {index}: {reason}")]
    InvalidHex {
        /// Global index of the offending entry
        index: u64,
        /// Hex decoder message
        reason: String,
    },

    /// Blob is shorter than the 4-byte selector
    #[error("output {index} payload too short ({len} bytes)")]
    TooShort {
        /// Global index of the offending entry
        index: u64,
        /// Decoded payload length
        len: usize,
    },

    /// ABI fields could not be parsed
    #[error("output {index} ABI fields could not be parsed as {kind}: {reason}")]
    Abi {
        /// Global index of the offending entry
        index: u64,
        /// Artifact kind the payload was parsed as
        kind: &'static str,
        /// ABI decoder message
        reason: String,
    },
}
