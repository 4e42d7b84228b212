//! Error taxonomy.
//!
//! Fatal conditions abort a session and are returned as [`Error`]. Everything
//! else is recoverable and reaches the caller as a [`Condition`] through
//! [`Callbacks::on_error`](crate::Callbacks::on_error), while parsing
//! continues.

use thiserror::Error;

use crate::codec::DecodeError;

/// A fatal error. The session cannot continue.
#[derive(Debug, Error)]
pub enum Error {
    /// The format or driver configuration is unusable.
    #[error("Invalid configuration: {0}.")]
    Config(String),
    /// A persisted parser state is malformed or inconsistent with the format.
    #[error("Invalid parser state: {0}.")]
    InvalidState(String),
    /// An error from the underlying byte stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A recoverable condition, reported while parsing continues.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A chunk matched the sieve but failed to decode. Its bytes were consumed
    /// and no particle was produced.
    Sample {
        start: u64,
        end: u64,
        error: DecodeError,
    },
    /// Bytes matched no record and no known artifact. They were skipped.
    Unexpected { start: u64, bytes: Vec<u8> },
}

impl Condition {
    /// The number of stream bytes covered by the condition.
    pub fn len(&self) -> u64 {
        match self {
            Self::Sample { start, end, .. } => end - start,
            Self::Unexpected { bytes, .. } => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
