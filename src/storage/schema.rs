//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Org-Harvest database.
//! Every natural key is unique and every insert is `INSERT OR IGNORE`, so re-running
//! a harvest never fails on rows that already exist.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    operations TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Real-world entities that own one or more organizations
CREATE TABLE IF NOT EXISTS entity (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE
);

-- Organizational accounts
CREATE TABLE IF NOT EXISTS org (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    org_url TEXT,
    entity_id INTEGER REFERENCES entity(id)
);

CREATE INDEX IF NOT EXISTS idx_org_entity ON org(entity_id);

-- Commit authors
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    email TEXT NOT NULL
);

-- Repositories whose commit history has been harvested
CREATE TABLE IF NOT EXISTS repo (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL COLLATE NOCASE,
    org_id INTEGER NOT NULL REFERENCES org(id),
    created_at TEXT,
    fork INTEGER NOT NULL,
    UNIQUE(org_id, name)
);

-- Commits of harvested repositories
CREATE TABLE IF NOT EXISTS git_commit (
    id INTEGER PRIMARY KEY,
    hash TEXT NOT NULL UNIQUE,
    author_id INTEGER NOT NULL REFERENCES user(id),
    repo_id INTEGER NOT NULL REFERENCES repo(id),
    committed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_git_commit_repo ON git_commit(repo_id);
CREATE INDEX IF NOT EXISTS idx_git_commit_author ON git_commit(author_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
