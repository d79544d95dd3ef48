//! Output module for harvested data
//!
//! This module handles:
//! - Writing record tables as CSV into a per-run directory
//! - Building directed relation graphs and writing them as GEXF
//! - Reporting store statistics

mod csv_sink;
mod graph;
pub mod stats;

pub use csv_sink::FileSink;
pub use graph::{Attributes, DirectedGraph};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Invalid output name: {0}")]
    InvalidName(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
