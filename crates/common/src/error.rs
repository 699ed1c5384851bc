use std::time::Duration;

use thiserror::Error;

/// Canonical RFQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`RfqError::InvalidConfig`]: query/config contract violations caught at construction
/// - [`RfqError::QueryExecution`]: node failure, remote page fault, or cancellation
///   surfaced through the result stream
/// - [`RfqError::Timeout`]: a bounded wait expired; never retried internally
/// - [`RfqError::Interrupted`]: a blocked consumer's wait was torn down underneath it
///   (stream closed/released while a thread was parked on it)
///
/// The enum is `Clone` so a terminal failure can be recorded once in the stream
/// state and surfaced to every subsequent caller.
#[derive(Debug, Clone, Error)]
pub enum RfqError {
    /// Invalid or inconsistent query configuration.
    ///
    /// Examples:
    /// - zero page size
    /// - empty participating-node set
    /// - zero contributing-node divisor
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Runtime failure of the distributed query itself.
    ///
    /// Examples:
    /// - a node reported a failed ranked execution
    /// - a remote page could not be decoded
    /// - the query was cancelled while results were still streaming
    #[error("query execution error: {0}")]
    QueryExecution(String),

    /// A bounded wait expired before the awaited condition held.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The wait a consumer was blocked in no longer exists.
    #[error("interrupted: {0}")]
    Interrupted(String),
}

impl RfqError {
    /// Standard failure recorded when a stream is cancelled.
    pub fn cancelled() -> Self {
        RfqError::QueryExecution("query was cancelled".to_string())
    }
}

/// Standard RFQ result alias.
pub type Result<T> = std::result::Result<T, RfqError>;
