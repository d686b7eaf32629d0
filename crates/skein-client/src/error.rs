use skein_crypto::CryptoError;
use skein_sync::SyncError;
use skein_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not signed in")]
    NotSignedIn,

    #[error("already signed in as {0}")]
    AlreadySignedIn(String),

    #[error("cannot remove the last server")]
    CannotRemoveLastServer,

    #[error("server not registered: {0}")]
    UnknownServer(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CryptoError> for ClientError {
    fn from(err: CryptoError) -> Self {
        Self::Sync(err.into())
    }
}

impl From<TypeError> for ClientError {
    fn from(err: TypeError) -> Self {
        Self::Sync(err.into())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
