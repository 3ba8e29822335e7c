//! Error types for wgfleet

use thiserror::Error;

/// Result type alias using wgfleet Error
pub type Result<T> = std::result::Result<T, Error>;

/// wgfleet error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: String, id: String },

    #[error("Address space exhausted: subnet supports only {max} peers")]
    AddressSpaceExhausted { max: u32 },

    #[error("Remote call failed: {0}")]
    Remote(String),
}

impl Error {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    pub fn already_exists(kind: &str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}
