//! Core error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid block range: first block {first} is after last block {last}")]
    InvalidBlockRange { first: u64, last: u64 },

    #[error("Truncated {what}: need {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{count} trailing bytes after {what}")]
    TrailingBytes { what: &'static str, count: usize },

    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Codec(err.to_string())
    }
}
