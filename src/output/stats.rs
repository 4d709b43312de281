//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::storage::{RunRecord, RunStatus, Storage};
use crate::HarvestError;
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of collections in the store
    pub total_collections: u64,

    /// Collections whose feature says they carry a transcribed index
    pub indexed_collections: u64,

    /// Total number of stored sections across all browse trees
    pub total_sections: u64,

    /// Row tables and their row counts, by table name
    pub row_tables: Vec<(String, u64)>,

    /// Count of fetch runs by status
    pub runs_by_status: HashMap<RunStatus, u64>,

    /// Most recent fetch run of any status
    pub latest_run: Option<RunRecord>,
}

impl HarvestStatistics {
    /// Total number of extracted rows across all tables
    pub fn total_rows(&self) -> u64 {
        self.row_tables.iter().map(|(_, count)| count).sum()
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    let collections = storage.list_collections()?;
    let indexed_collections = collections
        .iter()
        .filter(|r| r.collection.feature.is_some_and(|f| f.has_index()))
        .count() as u64;

    let mut runs_by_status = HashMap::new();
    for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
        let count = storage.count_runs_by_status(status)?;
        if count > 0 {
            runs_by_status.insert(status, count);
        }
    }

    Ok(HarvestStatistics {
        total_collections: collections.len() as u64,
        indexed_collections,
        total_sections: storage.count_sections()?,
        row_tables: storage.list_row_tables()?,
        runs_by_status,
        latest_run: storage.get_latest_run(None)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Catalog:");
    println!("  Collections: {}", stats.total_collections);
    println!("  With index: {}", stats.indexed_collections);
    println!("  Browse sections: {}", stats.total_sections);
    println!();

    println!("Fetch Runs:");
    for status in [RunStatus::Completed, RunStatus::Failed, RunStatus::Running] {
        let count = stats.runs_by_status.get(&status).copied().unwrap_or(0);
        println!("  {}: {}", status.to_db_string(), count);
    }
    if let Some(run) = &stats.latest_run {
        println!(
            "  Latest: run {} ({}) started {}",
            run.id,
            run.status.to_db_string(),
            run.started_at
        );
    }
    println!();

    println!(
        "Extracted Rows ({} in {} tables):",
        stats.total_rows(),
        stats.row_tables.len()
    );
    let mut tables: Vec<_> = stats.row_tables.iter().collect();
    tables.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, count) in tables {
        println!("  {}: {}", name, count);
    }
}
