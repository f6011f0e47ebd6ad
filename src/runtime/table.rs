// src/runtime/table.rs
//! The dining table: lifecycle of a whole simulation
//!
//! # Architecture
//!
//! ```text
//! Table
//! ├─ ForkSet: [fork 0, fork 1, ..., fork N-1]   (shared, Arc)
//! ├─ Philosophers: N tokio tasks                (one per seat)
//! ├─ Counters: meals / cycles / waits per seat  (live stats)
//! └─ CancellationToken                          (cooperative stop)
//! ```
//!
//! Philosophers never talk to each other; everything goes through the
//! forks. Observers only see state changes.

use crate::observer::StateObserver;
use crate::runtime::forks::{ForkSet, ForkStats};
use crate::runtime::philosopher::{AgentCounters, Philosopher, PhilosopherConfig, PhilosopherReport};
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Number of philosophers, and of forks (default: 5)
    pub agents: usize,

    /// Length of one thinking/eating slot in milliseconds (default: 200)
    pub timescale_ms: u64,

    /// Phases last `0..think_slots` slots (default: 10)
    pub think_slots: u32,

    /// Seed base; philosopher `i` uses `seed + i` (default: 0)
    pub seed: u64,

    /// Cycles each philosopher completes before leaving (default: unbounded)
    pub max_cycles: Option<u64>,

    /// Time `stop()` waits for philosophers to leave (default: 5000)
    pub shutdown_timeout_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            agents: 5,
            timescale_ms: 200,
            think_slots: 10,
            seed: 0,
            max_cycles: None,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl TableConfig {
    pub fn timescale(&self) -> Duration {
        Duration::from_millis(self.timescale_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agents == 0 {
            return Err(EngineError::InvalidConfig("agents must be at least 1".into()));
        }
        if self.timescale_ms == 0 {
            return Err(EngineError::InvalidConfig("timescale_ms must be positive".into()));
        }
        if self.think_slots == 0 {
            return Err(EngineError::InvalidConfig("think_slots must be positive".into()));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "shutdown_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// A running simulation
pub struct Table {
    config: TableConfig,
    forks: Arc<ForkSet>,
    counters: Vec<Arc<AgentCounters>>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<Result<PhilosopherReport>>>,
    started_at: Instant,
}

impl Table {
    /// Validate `config`, lay out the forks and seat every philosopher
    ///
    /// Must be called from within a tokio runtime; philosophers run as
    /// tasks on it.
    pub fn start(config: TableConfig, observer: Arc<dyn StateObserver>) -> Result<Self> {
        config.validate()?;
        let forks = Arc::new(ForkSet::new(config.agents));
        Self::start_with_forks(config, forks, observer)
    }

    /// Like [`Table::start`], on a caller-provided fork set
    ///
    /// Lets the caller keep a handle on the forks from the very first
    /// transition, e.g. to inspect holders from an observer.
    pub fn start_with_forks(
        config: TableConfig,
        forks: Arc<ForkSet>,
        observer: Arc<dyn StateObserver>,
    ) -> Result<Self> {
        config.validate()?;
        if forks.len() != config.agents {
            return Err(EngineError::InvalidConfig(format!(
                "table of {} agents needs {} forks, got {}",
                config.agents,
                config.agents,
                forks.len()
            )));
        }

        let runtime = Handle::try_current().map_err(|e| EngineError::NoRuntime(e.to_string()))?;

        info!(
            agents = config.agents,
            timescale_ms = config.timescale_ms,
            seed = config.seed,
            "Seating philosophers"
        );

        let cancel = CancellationToken::new();
        let philosopher_config = PhilosopherConfig::from(&config);
        let mut counters = Vec::with_capacity(config.agents);
        let mut handles = Vec::with_capacity(config.agents);

        for index in 0..config.agents {
            let seat_counters = Arc::new(AgentCounters::default());
            let mut philosopher = Philosopher::new(index, forks.len(), philosopher_config.clone())
                .with_counters(Arc::clone(&seat_counters));

            let forks = Arc::clone(&forks);
            let observer = Arc::clone(&observer);
            let cancel = cancel.clone();

            handles.push(runtime.spawn(async move {
                philosopher.run(&forks, observer.as_ref(), &cancel).await
            }));
            counters.push(seat_counters);
        }

        Ok(Self {
            config,
            forks,
            counters,
            cancel,
            handles,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn forks(&self) -> &Arc<ForkSet> {
        &self.forks
    }

    /// Token that stops the table when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once every philosopher has left
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(|handle| handle.is_finished())
    }

    /// Live snapshot of the table
    pub fn stats(&self) -> TableReport {
        TableReport {
            agents: self
                .counters
                .iter()
                .enumerate()
                .map(|(index, counters)| counters.snapshot(index))
                .collect(),
            forks: self.forks.stats(),
            elapsed: self.started_at.elapsed(),
        }
    }

    /// Wait for every philosopher to leave on its own
    ///
    /// Returns once `max_cycles` is reached or the cancellation token fires.
    pub async fn join(self) -> Result<TableReport> {
        self.collect(None).await
    }

    /// Ask every philosopher to leave and wait for them
    ///
    /// All forks are free once this returns, with or without an error.
    /// Philosophers still running after the shutdown timeout are aborted and
    /// awaited, and `ShutdownTimeout` is returned.
    pub async fn stop(self) -> Result<TableReport> {
        info!("Stopping table");
        self.cancel.cancel();
        let timeout = self.config.shutdown_timeout();
        self.collect(Some(timeout)).await
    }

    async fn collect(mut self, timeout: Option<Duration>) -> Result<TableReport> {
        let mut handles = std::mem::take(&mut self.handles);
        let joined = futures::future::join_all(handles.iter_mut());

        let results = match timeout {
            Some(limit) => match tokio::time::timeout(limit, joined).await {
                Ok(results) => results,
                Err(_) => {
                    warn!("Philosophers did not leave within {:?}, aborting", limit);
                    for handle in &handles {
                        handle.abort();
                    }
                    // an aborted task drops its fork guards when it is torn down
                    futures::future::join_all(handles).await;
                    debug_assert!(self.forks.all_free(), "forks still held after abort");
                    return Err(EngineError::ShutdownTimeout(limit));
                }
            },
            None => joined.await,
        };

        let mut agents = Vec::with_capacity(results.len());
        for (agent, result) in results.into_iter().enumerate() {
            let report = result.map_err(|source| EngineError::AgentFailed { agent, source })??;
            agents.push(report);
        }

        let report = TableReport {
            agents,
            forks: self.forks.stats(),
            elapsed: self.started_at.elapsed(),
        };
        debug_assert!(report.forks_free(), "forks still held after all philosophers left");
        info!(
            meals = report.total_meals(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Table cleared"
        );
        Ok(report)
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            debug!("Table dropped while running, cancelling philosophers");
            self.cancel.cancel();
        }
    }
}

/// Activity of a table, live or final
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub agents: Vec<PhilosopherReport>,

    pub forks: Vec<ForkStats>,

    pub elapsed: Duration,
}

impl TableReport {
    pub fn total_meals(&self) -> u64 {
        self.agents.iter().map(|agent| agent.meals).sum()
    }

    /// True if every philosopher ate at least once
    pub fn all_ate(&self) -> bool {
        self.agents.iter().all(|agent| agent.meals > 0)
    }

    /// True if no fork is held
    pub fn forks_free(&self) -> bool {
        self.forks.iter().all(|fork| fork.holder.is_none())
    }
}
