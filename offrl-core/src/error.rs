//! Errors in the library.
use thiserror::Error;

/// Errors raised by components of `offrl-core`.
#[derive(Error, Debug)]
pub enum OffrlError {
    /// The record does not have the key.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// The record value has a type different from the requested one.
    #[error("Record value type error: expected {0}")]
    RecordValueTypeError(String),
}
