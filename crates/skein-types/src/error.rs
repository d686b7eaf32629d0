use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("codec error: {0}")]
    Codec(#[from] skein_codec::CodecError),

    #[error("{message}: required field `{field}` is absent")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("logical clock {0} has no successor")]
    ClockExhausted(u64),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

pub type TypeResult<T> = Result<T, TypeError>;
