//! Work-unit sources loaded from user-provided CSV files
//!
//! - Entities: column `entity_name`
//! - Organizations: column `github_org_name`
//! - Repositories: columns `organization`, `name` and optional metadata
//!
//! An input that yields no rows is a fatal error, raised before any network activity.

use crate::model::RepoRecord;
use crate::HarvestError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct EntityRow {
    entity_name: String,
}

#[derive(Debug, Deserialize)]
struct OrganizationRow {
    github_org_name: String,
}

/// Reads entity names
pub fn read_entities(path: &Path) -> Result<Vec<String>, HarvestError> {
    let rows: Vec<EntityRow> = read_rows(path)?;
    non_empty(
        path,
        names(rows.into_iter().map(|r| r.entity_name)),
        "Add the names of the entities to harvest in the column 'entity_name' (one name per row)",
    )
}

/// Reads organization logins
pub fn read_organizations(path: &Path) -> Result<Vec<String>, HarvestError> {
    let rows: Vec<OrganizationRow> = read_rows(path)?;
    non_empty(
        path,
        names(rows.into_iter().map(|r| r.github_org_name)),
        "Add the names of the organizations to harvest in the column 'github_org_name' \
         (one name per row)",
    )
}

/// Reads repositories with whatever metadata columns are present
pub fn read_repositories(path: &Path) -> Result<Vec<RepoRecord>, HarvestError> {
    let rows: Vec<RepoRecord> = read_rows(path)?;
    let rows = rows
        .into_iter()
        .filter(|r| !r.organization.trim().is_empty() && !r.name.trim().is_empty())
        .collect();
    non_empty(
        path,
        rows,
        "Add the repositories to harvest with the columns 'organization' and 'name' \
         (one repository per row)",
    )
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, HarvestError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| input_error(path, e.to_string()))?;
    let mut rows = Vec::new();
    for (index, row) in reader.deserialize().enumerate() {
        let row: T = row.map_err(|e| input_error(path, format!("row {}: {}", index + 1, e)))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Trims names, drops blanks and duplicates while keeping file order
fn names(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.to_lowercase()))
        .collect()
}

fn non_empty<T>(path: &Path, rows: Vec<T>, hint: &str) -> Result<Vec<T>, HarvestError> {
    if rows.is_empty() {
        return Err(input_error(path, format!("no rows to harvest. {}.", hint)));
    }
    Ok(rows)
}

fn input_error(path: &Path, message: String) -> HarvestError {
    HarvestError::Input {
        path: path.display().to_string(),
        message,
    }
}
