use std::time::Duration;

use skein_crypto::CryptoError;
use skein_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error from {replica}: {message}")]
    Transport { replica: String, message: String },

    #[error("{replica} answered with status {status}")]
    RemoteStatus { replica: String, status: u16 },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cannot reach any replica ({attempted} tried): {last_error}")]
    NoReplicaResponded { attempted: usize, last_error: String },

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl SyncError {
    pub fn transport(replica: impl ToString, message: impl ToString) -> Self {
        Self::Transport {
            replica: replica.to_string(),
            message: message.to_string(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
