use thiserror::Error;

use crate::models::{SaveStatus, Title};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("no saved page for {0}")]
    NotFound(Title),

    #[error("storage failure during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("inconsistency: {0}")]
    Inconsistency(String),

    #[error("invalid title: {0}")]
    InvalidTitle(String),

    #[error("cannot move {title} from {from} to {to}")]
    InvalidTransition {
        title: Title,
        from: SaveStatus,
        to: SaveStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Storage,
    Inconsistency,
    InvalidTitle,
    InvalidTransition,
}

impl TrackingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Inconsistency(_) => ErrorKind::Inconsistency,
            Self::InvalidTitle(_) => ErrorKind::InvalidTitle,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }
}
