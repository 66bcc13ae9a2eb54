use sled::transaction::TransactionError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Raised when folding would make two distinct keys of a keyed collection identical.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("normalizing keys {first:?} and {second:?} collides on {folded:?}")]
pub struct CollisionError {
    pub first: String,
    pub second: String,
    pub folded: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Collision(#[from] CollisionError),
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("parse result was not successful, refusing to index")]
    ParseUnsuccessful,
    #[error("index not found: {0}")]
    IndexNotFound(String),
    #[error("index already exists: {0}")]
    IndexExists(String),
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),
    #[error("document already exists: {0}")]
    DocumentExists(Uuid),
    #[error("corrupt record in {tree}: {reason}")]
    Corrupt { tree: &'static str, reason: String },
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error(transparent)]
    Encoding(#[from] bincode::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Error::Storage(e),
        }
    }
}
