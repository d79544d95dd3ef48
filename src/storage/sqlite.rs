//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{CommitRecord, EntityOrgRecord, RepoRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, StoreTable};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and applies the schema
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        operations: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Failed),
    })
}

fn insert_entity_row(conn: &Connection, name: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO entity (name) VALUES (?1)",
        params![name],
    )
}

/// Inserts an organization, filling in a missing URL or entity link on conflict
fn insert_org_row(
    conn: &Connection,
    name: &str,
    url: Option<&str>,
    entity: Option<&str>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO org (name, org_url, entity_id)
         VALUES (?1, ?2, (SELECT id FROM entity WHERE name = ?3))
         ON CONFLICT(name) DO UPDATE SET
             org_url = COALESCE(org.org_url, excluded.org_url),
             entity_id = COALESCE(org.entity_id, excluded.entity_id)",
        params![name, url, entity],
    )
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, operations: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, operations, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, operations, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, operations, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Entities & Organizations =====

    fn entity_exists(&self, name: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM entity WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_orgs_for_entity(&self, entity: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT org.name FROM org JOIN entity ON org.entity_id = entity.id
             WHERE entity.name = ?1 ORDER BY org.name",
        )?;

        let orgs = stmt
            .query_map(params![entity], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(orgs)
    }

    fn record_entity_organizations(
        &mut self,
        entity: &str,
        orgs: &[EntityOrgRecord],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        insert_entity_row(&tx, entity)?;
        for org in orgs {
            insert_org_row(
                &tx,
                &org.github_org_name,
                org.html_url.as_deref(),
                Some(entity),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ===== Repositories & Commits =====

    fn repo_exists(&self, org: &str, name: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT repo.id FROM repo JOIN org ON repo.org_id = org.id
                 WHERE org.name = ?1 AND repo.name = ?2",
                params![org, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record_commit_history(
        &mut self,
        repo: &RepoRecord,
        commits: &[CommitRecord],
    ) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;

        insert_org_row(&tx, &repo.organization, None, None)?;
        tx.execute(
            "INSERT OR IGNORE INTO repo (name, org_id, created_at, fork)
             VALUES (?1, (SELECT id FROM org WHERE name = ?2), ?3, ?4)",
            params![repo.name, repo.organization, repo.created_at, repo.fork],
        )?;

        let mut inserted = 0;
        for commit in commits {
            let (Some(author), Some(committed_at)) =
                (commit.committer_name.as_deref(), commit.committed_at.as_deref())
            else {
                tracing::debug!("Skipping commit {} without author or date", commit.sha);
                continue;
            };

            tx.execute(
                "INSERT OR IGNORE INTO user (name, email) VALUES (?1, ?2)",
                params![author, commit.committer_email.as_deref().unwrap_or("")],
            )?;
            inserted += tx.execute(
                "INSERT OR IGNORE INTO git_commit (hash, author_id, repo_id, committed_at)
                 VALUES (
                     ?1,
                     (SELECT id FROM user WHERE name = ?2),
                     (SELECT repo.id FROM repo JOIN org ON repo.org_id = org.id
                      WHERE org.name = ?3 AND repo.name = ?4),
                     ?5
                 )",
                params![
                    commit.sha,
                    author,
                    repo.organization,
                    repo.name,
                    committed_at
                ],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    // ===== Statistics =====

    fn count_rows(&self, table: StoreTable) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
