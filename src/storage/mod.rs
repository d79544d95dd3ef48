//! Storage module for persisting harvest results
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Idempotent upserts of entities, organizations, repositories, users and commits
//! - "Already harvested" lookups used by the dedup gate
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::HarvestError;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage handle shared between concurrently running harvest tasks
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens (or creates) the store and wraps it for sharing across tasks
pub fn open_shared_storage(path: &Path) -> Result<SharedStorage, HarvestError> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// Runs `f` with the shared store locked
pub fn with_storage<T>(
    storage: &SharedStorage,
    f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
) -> Result<T, HarvestError> {
    let mut guard = storage.lock().map_err(|_| HarvestError::LockPoisoned)?;
    Ok(f(&mut *guard)?)
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub operations: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    /// Finished, but at least one work unit failed or was cancelled
    Partial,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Tables whose sizes are reported by `--stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTable {
    Entity,
    Org,
    User,
    Repo,
    Commit,
    Runs,
}

impl StoreTable {
    pub const ALL: [StoreTable; 6] = [
        Self::Entity,
        Self::Org,
        Self::User,
        Self::Repo,
        Self::Commit,
        Self::Runs,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Org => "org",
            Self::User => "user",
            Self::Repo => "repo",
            Self::Commit => "git_commit",
            Self::Runs => "runs",
        }
    }
}
