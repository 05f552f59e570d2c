//! Error type shared by the trawl crates

use thiserror::Error;

/// Result alias over [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure, including lock contention
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem access (root folder, persona files, exports)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of a stored column or payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bad TOML, bad persona, or an invalid setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup by id found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or persisted value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invariant broken or retries exhausted
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite lock contention, which is worth retrying
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}
