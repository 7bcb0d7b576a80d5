//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by DialClaw components.
#[derive(Debug, Error)]
pub enum DialClawError {
    /// Storage layer failure (SQLite, serialization of stored JSON).
    #[error("storage error: {0}")]
    Storage(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input from a management operation (duplicate template
    /// name, lead without a phone id, malformed time window string...).
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The voice API asked us to slow down. Distinguished from other
    /// dispatch failures so the engine can back off and retry once.
    #[error("rate limited by call provider")]
    RateLimited,

    /// Any other call-dispatch failure (HTTP error, provider rejection).
    #[error("call dispatch failed: {0}")]
    Dispatch(String),
}

pub type Result<T> = std::result::Result<T, DialClawError>;

impl DialClawError {
    /// True for failures worth one local retry before giving up on a lead.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, DialClawError::RateLimited)
    }
}
