//! Concurrent paginated-fetch engine
//!
//! # Components
//!
//! - `CredentialPool`: authenticated sessions handed out round-robin
//! - `PaginatedFetcher`: runs one query to completion, with rate-limit backoff
//! - `DedupGate`: skips work already done in this run or recorded in the store
//! - `TaskOrchestrator`: bounded fan-out of work units and fan-in of their results
//! - `Harvester`: the operations built on top of the engine

mod credentials;
mod fetcher;
mod gate;
mod harvester;
mod operations;
mod orchestrator;
pub mod rate_limit;

pub use credentials::{build_http_client, CredentialPool, CredentialSession};
pub use fetcher::{
    is_single_object, CompletionCallback, FetchOutcome, FetchRequest, FetchStatus, ItemTransform,
    PageTransform, PaginatedFetcher,
};
pub use gate::DedupGate;
pub use harvester::{Harvester, MemberMap, Targets};
pub use operations::{describe, Operation};
pub use orchestrator::{AggregatedResult, DispatchReport, TaskOrchestrator, TaskOutcome, TaskState};

use crate::config::Config;
use crate::storage::SharedStorage;
use crate::HarvestError;
use std::sync::Arc;

/// Assembles credential pool, fetcher, gate and orchestrator from configuration
pub fn build_orchestrator(
    config: &Config,
    storage: SharedStorage,
) -> Result<TaskOrchestrator, HarvestError> {
    let pool = Arc::new(CredentialPool::new(&config.credentials, &config.api)?);
    tracing::info!("Credential pool ready with {} sessions", pool.len());

    let fetcher = Arc::new(PaginatedFetcher::new(pool, &config.api));
    let gate = Arc::new(DedupGate::new(storage));
    Ok(TaskOrchestrator::new(fetcher, gate, &config.harvest))
}
