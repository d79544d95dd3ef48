//! Statistics from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! row counts and run history from the storage layer.

use crate::storage::{RunRecord, Storage, StoreTable};
use crate::HarvestError;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Row count of every store table
    pub table_counts: Vec<(StoreTable, u64)>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl HarvestStatistics {
    pub fn count(&self, table: StoreTable) -> u64 {
        self.table_counts
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    let mut table_counts = Vec::with_capacity(StoreTable::ALL.len());
    for table in StoreTable::ALL {
        table_counts.push((table, storage.count_rows(table)?));
    }

    Ok(HarvestStatistics {
        table_counts,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a human-readable format
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    for (table, count) in &stats.table_counts {
        println!("  {:<12} {:>10}", table.table_name(), count);
    }

    println!();
    match &stats.latest_run {
        Some(run) => {
            println!("Latest run: #{} ({})", run.id, run.status.to_db_string());
            println!("  Started:    {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished:   {}", finished);
            }
            println!("  Operations: {}", run.operations);
            println!("  Config:     {}", run.config_hash);
        }
        None => println!("No harvest runs recorded"),
    }
}
