use skein_types::TypeError;
use thiserror::Error;

/// Errors from key handling and event signing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error(transparent)]
    Type(#[from] TypeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
