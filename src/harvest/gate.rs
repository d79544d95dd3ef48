//! Dedup gate
//!
//! Decides whether a work unit should be fetched. Two checks apply:
//! - Within a run, every unit is dispatched at most once
//! - Across runs, units whose completion is persisted are skipped once recorded
//!
//! The persisted check is a point-in-time read. Store writes are idempotent, so a
//! check that races a concurrent writer costs at most one redundant fetch.

use crate::model::{WorkKind, WorkUnit};
use crate::storage::{with_storage, SharedStorage, Storage};
use crate::HarvestError;
use std::collections::HashSet;
use std::sync::Mutex;

pub struct DedupGate {
    storage: SharedStorage,
    dispatched: Mutex<HashSet<WorkUnit>>,
}

impl DedupGate {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            dispatched: Mutex::new(HashSet::new()),
        }
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Returns true if the unit should be fetched, and records it as dispatched
    ///
    /// A failing store lookup lets the unit through: a redundant fetch is
    /// preferable to silently dropping work.
    pub fn should_fetch(&self, unit: &WorkUnit) -> bool {
        match self.is_harvested(unit) {
            Ok(true) => {
                tracing::info!("skipping {}: already harvested", unit);
                return false;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("dedup lookup failed for {}, fetching anyway: {}", unit, e);
            }
        }

        let mut dispatched = self
            .dispatched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !dispatched.insert(unit.clone()) {
            tracing::debug!("skipping {}: already dispatched in this run", unit);
            return false;
        }
        true
    }

    /// Checks the persisted store for a completed unit
    pub fn is_harvested(&self, unit: &WorkUnit) -> Result<bool, HarvestError> {
        if !unit.kind.is_persisted() {
            return Ok(false);
        }

        with_storage(&self.storage, |store| match (unit.kind, &unit.organization) {
            (WorkKind::CommitHistory, Some(org)) => store.repo_exists(org, &unit.subject),
            (WorkKind::EntityOrganizations, _) => store.entity_exists(&unit.subject),
            _ => Ok(false),
        })
    }
}
