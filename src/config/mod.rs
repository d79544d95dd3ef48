//! Configuration module for Org-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! including the pool of API credentials.
//!
//! # Example
//!
//! ```no_run
//! use org_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting with {} credentials", config.credentials.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Config, CredentialEntry, HarvestConfig, OutputConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
