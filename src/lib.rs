//! Org-Harvest: a concurrent harvester for organizational accounts on a
//! paginated, rate-limited REST API
//!
//! This crate collects organizations, repositories, commits, contributors and
//! follower relations using a pool of credentials, writes them to CSV and GEXF
//! files, and records completed work in SQLite so re-runs skip it.

pub mod config;
pub mod harvest;
pub mod input;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Org-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error in {path}: {message}")]
    Input { path: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error(
        "No API credentials configured. Add at least one [[credential]] entry \
         with a non-empty user-name and api-token"
    )]
    MissingCredentials,
}

// Re-export commonly used types
pub use config::Config;
pub use harvest::{CredentialPool, DedupGate, FetchRequest, Operation, PaginatedFetcher, TaskOrchestrator};
pub use model::{WorkKind, WorkUnit};
