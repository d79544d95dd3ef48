//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{CommitRecord, EntityOrgRecord, RepoRecord};
use crate::storage::{RunRecord, RunStatus, StoreTable};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// All inserts are idempotent: inserting a row whose natural key already exists
/// is a no-op, never an error.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new harvest run and returns its ID
    fn create_run(&mut self, config_hash: &str, operations: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Entities & Organizations =====

    /// Checks whether an entity has already been resolved to organizations
    fn entity_exists(&self, name: &str) -> StorageResult<bool>;

    /// Gets the organizations recorded for an entity
    fn get_orgs_for_entity(&self, entity: &str) -> StorageResult<Vec<String>>;

    /// Records an entity and the organizations found for it in one transaction
    fn record_entity_organizations(
        &mut self,
        entity: &str,
        orgs: &[EntityOrgRecord],
    ) -> StorageResult<()>;

    // ===== Repositories & Commits =====

    /// Checks whether a repository's commit history has been harvested
    fn repo_exists(&self, org: &str, name: &str) -> StorageResult<bool>;

    /// Records a repository, its commit authors, and its commits in one transaction
    ///
    /// Commits without an author name are skipped. Returns the number of commit
    /// rows actually inserted.
    fn record_commit_history(
        &mut self,
        repo: &RepoRecord,
        commits: &[CommitRecord],
    ) -> StorageResult<usize>;

    // ===== Statistics =====

    /// Counts the rows of a table
    fn count_rows(&self, table: StoreTable) -> StorageResult<u64>;
}
