//! CSV output for harvested records
//!
//! Each harvest run writes into its own timestamped directory. The columns of a
//! table are the serde field names of the record type being written.

use crate::output::{DirectedGraph, OutputError, OutputResult};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File-backed sink for tables (CSV) and graphs (GEXF) of one run
#[derive(Debug, Clone)]
pub struct FileSink {
    directory: PathBuf,
}

impl FileSink {
    /// Creates `{data_dir}/{YYYY-mm-dd_HH-MM-SS}` and returns a sink writing into it
    pub fn for_new_run(data_dir: &Path) -> OutputResult<Self> {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut directory = data_dir.join(&stamp);

        // Two runs started within the same second get distinct folders
        let mut suffix = 1;
        while directory.exists() {
            directory = data_dir.join(format!("{}_{}", stamp, suffix));
            suffix += 1;
        }

        Self::in_directory(directory)
    }

    /// Creates a sink writing into an explicit directory
    pub fn in_directory(directory: PathBuf) -> OutputResult<Self> {
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes `records` to `{name}` as CSV, one row per record in the order given
    ///
    /// Returns the path written.
    pub fn write_table<T: Serialize>(&self, name: &str, records: &[T]) -> OutputResult<PathBuf> {
        let path = self.path_for(name)?;
        let mut writer = csv::Writer::from_path(&path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        tracing::info!("- {} rows saved as {}", records.len(), path.display());
        Ok(path)
    }

    /// Writes a graph to `{name}` in GEXF format
    pub fn write_graph(&self, name: &str, graph: &DirectedGraph) -> OutputResult<PathBuf> {
        let path = self.path_for(name)?;
        std::fs::write(&path, graph.to_gexf())?;

        tracing::info!(
            "- graph with {} nodes and {} edges saved as {}",
            graph.node_count(),
            graph.edge_count(),
            path.display()
        );
        Ok(path)
    }

    /// Output names come from entity, organization and repository names, so
    /// path separators are replaced to keep every file inside the run directory
    fn path_for(&self, name: &str) -> OutputResult<PathBuf> {
        let file_name = sanitize_file_name(name);
        if file_name.is_empty() || file_name == "." || file_name == ".." {
            return Err(OutputError::InvalidName(name.to_string()));
        }
        Ok(self.directory.join(file_name))
    }
}

/// Replaces path separators and control characters with `_`
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
