//! Reconciliation engine.
//!
//! The engine owns all per-agent bookkeeping and drives the daemon loop.
//! Each cycle re-derives the world from the ledger file and the live
//! session list, then runs its phases in a fixed order:
//!
//! ```text
//! snapshot ─► cleanup ─► reconcile ─► monitor ─► spec cleanup
//!                                                     │
//!            backlog ◄─ spec spawn ◄─ spawn ◄─────────┘
//! ```
//!
//! Per-item failures are logged with their phase and skipped; the next
//! cycle naturally retries. Only a failure to read the ledger or list the
//! sessions skips a whole cycle.
//!
//! # Example
//!
//! ```rust,ignore
//! use kollaborate::engine::Engine;
//! use kollaborate::pool::TmuxSessions;
//! use kollaborate::shutdown::Shutdown;
//!
//! let sessions = Arc::new(TmuxSessions::new(project_dir.clone()));
//! let mut engine = Engine::new(config, capacity, sessions);
//! engine.run(&Shutdown::new()).await?;
//! ```

mod cycle;
pub mod scheduling;

pub use cycle::CycleReport;
pub use scheduling::{policy_for, LedgerOrder, RangeGate, SchedulingPolicy};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{Capacity, WatcherConfig};
use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::monitor::{AgentBookkeeping, StrikePolicy};
use crate::pool::{AgentName, AgentPool};
use crate::shutdown::Shutdown;
use crate::spec_gate::SpecGate;
use crate::testing::SessionManager;

/// The reconciliation engine. One instance per ledger.
#[derive(Debug)]
pub struct Engine {
    config: WatcherConfig,
    capacity: Capacity,
    store: LedgerStore,
    gate: SpecGate,
    pool: AgentPool,
    strikes: StrikePolicy,
    policy: Box<dyn SchedulingPolicy>,
    /// Keyed by session name
    bookkeeping: HashMap<String, AgentBookkeeping>,
    /// Recycled agents whose kill failed
    pending_kills: BTreeSet<AgentName>,
    cycles: u64,
}

impl Engine {
    /// Build an engine from resolved configuration.
    ///
    /// The scheduling policy comes from `config.blocking_rules`.
    #[must_use]
    pub fn new(
        config: WatcherConfig,
        capacity: Capacity,
        sessions: Arc<dyn SessionManager>,
    ) -> Self {
        let pool = AgentPool::new(sessions, config.agent_command.clone(), config.agent_startup());
        Self {
            store: LedgerStore::new(config.ledger_path.clone()),
            gate: SpecGate::new(config.spec_dir.clone(), config.spec_min_lines),
            strikes: StrikePolicy::from_config(&config),
            policy: policy_for(&config.blocking_rules),
            pool,
            config,
            capacity,
            bookkeeping: HashMap::new(),
            pending_kills: BTreeSet::new(),
            cycles: 0,
        }
    }

    /// Replace the scheduling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Box<dyn SchedulingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    #[must_use]
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    #[must_use]
    pub fn gate(&self) -> &SpecGate {
        &self.gate
    }

    /// Bookkeeping for a session, if any is held.
    #[must_use]
    pub fn bookkeeping(&self, session: &str) -> Option<&AgentBookkeeping> {
        self.bookkeeping.get(session)
    }

    /// Mutable bookkeeping for a session, created on first use.
    pub fn bookkeeping_mut(&mut self, session: &str) -> &mut AgentBookkeeping {
        self.bookkeeping.entry(session.to_string()).or_default()
    }

    /// Recycled agents still waiting for a successful kill.
    #[must_use]
    pub fn pending_kills(&self) -> &BTreeSet<AgentName> {
        &self.pending_kills
    }

    /// Number of cycles run so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until `shutdown` is triggered.
    ///
    /// Shutdown is honoured between cycles; a cycle in progress always
    /// completes.
    ///
    /// # Errors
    ///
    /// Cycle failures are logged, never returned. The `Result` is kept for
    /// startup checks done here.
    pub async fn run(&mut self, shutdown: &Shutdown) -> Result<()> {
        self.gate.ensure_dir()?;
        info!(
            ledger = %self.store.path().display(),
            spec_dir = %self.gate.dir().display(),
            max_workers = self.capacity.max_workers,
            max_spec_agents = self.capacity.max_spec_agents,
            interval_secs = self.config.cycle_interval_secs,
            policy = self.policy.name(),
            "Task watcher started"
        );

        while !shutdown.is_triggered() {
            match self.run_cycle().await {
                Ok(report) => report.log(),
                Err(e) if e.is_transient() => {
                    warn!(cycle = self.cycles, error = %e, "Cycle skipped");
                }
                Err(e) => {
                    error!(cycle = self.cycles, error = %e, "Cycle failed");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.cycle_interval()) => {}
                () = shutdown.wait() => break,
            }
        }

        info!(cycles = self.cycles, "Task watcher stopped");
        Ok(())
    }
}
