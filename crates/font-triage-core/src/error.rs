use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Extraction error: {0}")]
    Extraction(#[from] crate::extract::ExtractError),

    #[error("Write permission denied for {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("An apply is already in progress")]
    ApplyInProgress,

    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("No reference index has been built")]
    IndexNotBuilt,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
