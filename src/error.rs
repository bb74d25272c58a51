//! Error taxonomy shared by the ingestion pipeline, the table store, and the
//! report builders.
//!
//! Classification and normalization are total and never produce these errors;
//! only lookups against caller-supplied names, files, and identities do.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// A file, table, column, or identity row could not be located
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation was invoked out of order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A caller-supplied table name or threshold is unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown encoding label or undecodable input bytes
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
