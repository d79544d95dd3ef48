//! Task orchestration: bounded fan-out and fan-in of work units
//!
//! Every unit that passes the dedup gate becomes its own tokio task. A semaphore
//! caps the number of in-flight fetches, a per-task timeout bounds each unit and
//! a cancellation token lets a run deadline stop everything still running.
//! Failures are values: a failed unit never cancels its siblings.

use crate::config::HarvestConfig;
use crate::harvest::fetcher::{FetchOutcome, FetchRequest, FetchStatus, PaginatedFetcher};
use crate::harvest::gate::DedupGate;
use crate::model::WorkUnit;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one task: `Pending -> Fetching -> Completed | Failed`
///
/// Rate-limit waits happen inside `Fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Fetching,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result of one task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub unit: WorkUnit,
    pub state: TaskState,

    /// Present when the fetch finished, even if it stopped early
    pub fetch: Option<FetchOutcome>,

    /// Why the task failed (timeout, cancellation)
    pub error: Option<String>,
}

impl TaskOutcome {
    fn completed(unit: WorkUnit, fetch: FetchOutcome) -> Self {
        Self {
            unit,
            state: TaskState::Completed,
            fetch: Some(fetch),
            error: None,
        }
    }

    fn failed(unit: WorkUnit, reason: String) -> Self {
        Self {
            unit,
            state: TaskState::Failed,
            fetch: None,
            error: Some(reason),
        }
    }

    pub fn items(&self) -> &[Value] {
        self.fetch.as_ref().map(|f| f.items.as_slice()).unwrap_or(&[])
    }

    /// True if the unit's query ran all the way to its last page
    pub fn is_complete(&self) -> bool {
        self.fetch.as_ref().is_some_and(FetchOutcome::is_complete)
    }
}

/// Counters of one or more dispatches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Units that passed the gate and were spawned
    pub dispatched: usize,

    /// Tasks whose query ran to completion
    pub completed: usize,

    /// Tasks that finished with partial results
    pub partial: usize,

    /// Tasks that timed out, were cancelled or panicked
    pub failed: usize,

    /// Units rejected by the dedup gate
    pub skipped: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: &DispatchReport) {
        self.dispatched += other.dispatched;
        self.completed += other.completed;
        self.partial += other.partial;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// True if nothing failed or stopped early
    pub fn is_clean(&self) -> bool {
        self.partial == 0 && self.failed == 0
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match (outcome.state, outcome.fetch.as_ref().map(|f| f.status)) {
            (TaskState::Completed, Some(FetchStatus::Complete)) => self.completed += 1,
            (TaskState::Completed, _) => self.partial += 1,
            _ => self.failed += 1,
        }
    }
}

/// Fan-in of one dispatch
#[derive(Debug, Default)]
pub struct AggregatedResult {
    /// Outcomes in task-completion order
    pub outcomes: Vec<TaskOutcome>,

    /// Units the gate rejected, in submission order
    pub skipped: Vec<WorkUnit>,

    pub report: DispatchReport,
}

impl AggregatedResult {
    /// All items of all outcomes; page order is kept within each unit
    pub fn items(&self) -> impl Iterator<Item = &Value> {
        self.outcomes.iter().flat_map(|o| o.items().iter())
    }

    pub fn into_items(self) -> Vec<Value> {
        self.outcomes
            .into_iter()
            .filter_map(|o| o.fetch)
            .flat_map(|f| f.items)
            .collect()
    }
}

/// Dispatches work units concurrently and collects their results
pub struct TaskOrchestrator {
    fetcher: Arc<PaginatedFetcher>,
    gate: Arc<DedupGate>,
    semaphore: Arc<Semaphore>,
    limit: usize,
    task_timeout: Duration,
    cancel: CancellationToken,
}

impl TaskOrchestrator {
    /// Creates an orchestrator whose in-flight limit is
    /// `credentials x concurrency-per-credential`
    pub fn new(fetcher: Arc<PaginatedFetcher>, gate: Arc<DedupGate>, config: &HarvestConfig) -> Self {
        let permits = fetcher.pool().len().max(1) * config.concurrency_per_credential.max(1) as usize;
        tracing::debug!("Task orchestrator allows {} concurrent fetches", permits);

        Self {
            fetcher,
            gate,
            semaphore: Arc::new(Semaphore::new(permits)),
            limit: permits,
            task_timeout: config.task_timeout(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn fetcher(&self) -> &Arc<PaginatedFetcher> {
        &self.fetcher
    }

    pub fn gate(&self) -> &Arc<DedupGate> {
        &self.gate
    }

    /// Number of fetches allowed in flight at once
    pub fn concurrency_limit(&self) -> usize {
        self.limit
    }

    /// Token that stops every running and future task when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the run once `deadline` has elapsed
    pub fn arm_deadline(&self, deadline: Duration) {
        let token = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    tracing::warn!("Run deadline of {:?} reached, cancelling remaining work", deadline);
                    token.cancel();
                }
            }
        });
    }

    /// Fans out one task per unit that passes the gate and waits for all of them
    pub async fn dispatch(&self, jobs: Vec<(WorkUnit, FetchRequest)>) -> AggregatedResult {
        let mut result = AggregatedResult::default();
        let mut tasks = JoinSet::new();

        for (unit, request) in jobs {
            if !self.gate.should_fetch(&unit) {
                result.report.skipped += 1;
                result.skipped.push(unit);
                continue;
            }

            result.report.dispatched += 1;
            tasks.spawn(run_task(
                unit,
                request,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.semaphore),
                self.cancel.clone(),
                self.task_timeout,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    result.report.record(&outcome);
                    result.outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!("Harvest task aborted: {}", e);
                    result.report.failed += 1;
                }
            }
        }

        result
    }
}

async fn run_task(
    unit: WorkUnit,
    request: FetchRequest,
    fetcher: Arc<PaginatedFetcher>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
) -> TaskOutcome {
    tracing::trace!("{}: {}", unit, TaskState::Pending);

    let permit = tokio::select! {
        _ = cancel.cancelled() => {
            return TaskOutcome::failed(unit, "cancelled before start".to_string());
        }
        permit = semaphore.acquire_owned() => permit,
    };
    let Ok(_permit) = permit else {
        return TaskOutcome::failed(unit, "task limiter closed".to_string());
    };

    tracing::trace!("{}: {}", unit, TaskState::Fetching);

    let result = tokio::select! {
        _ = cancel.cancelled() => Err("cancelled".to_string()),
        fetched = tokio::time::timeout(timeout, fetcher.fetch(&request)) => {
            fetched.map_err(|_| format!("timed out after {:?}", timeout))
        }
    };

    let outcome = match result {
        Ok(fetch) => TaskOutcome::completed(unit, fetch),
        Err(reason) => {
            tracing::warn!("{} failed: {}", unit, reason);
            TaskOutcome::failed(unit, reason)
        }
    };
    tracing::trace!("{}: {}", outcome.unit, outcome.state);
    outcome
}
