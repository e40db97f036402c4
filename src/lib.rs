//! Kollaborate - task watcher for LLM agent pools
//!
//! A daemon that keeps a pool of LLM CLI agents, each running inside its
//! own tmux session, in sync with a plain-text task ledger.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`] - Layered settings and pool capacity
//! - [`engine`] - The reconciliation loop and its phases
//! - [`error`] - Custom error types and handling
//! - [`ledger`] - Task ledger parsing and targeted rewrites
//! - [`monitor`] - Activity polling and the idle-strike policy
//! - [`pool`] - Agent naming and the tmux session backend
//! - [`prompt`] - Task classification and instruction synthesis
//! - [`shutdown`] - Signal-driven graceful shutdown
//! - [`spec_gate`] - Spec file checks that gate worker spawning
//! - [`testing`] - Testing infrastructure (traits, mocks, fixtures)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kollaborate::{Capacity, Engine, Shutdown, TmuxSessions, WatcherConfig};
//!
//! let config = WatcherConfig::load(&project)?.resolved(&project);
//! let sessions = Arc::new(TmuxSessions::new(project.clone()));
//! let mut engine = Engine::new(config, Capacity::new(3, 2)?, sessions);
//!
//! let shutdown = Shutdown::new();
//! shutdown.listen_for_signals();
//! engine.run(&shutdown).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod pool;
pub mod prompt;
pub mod shutdown;
pub mod spec_gate;
pub mod testing;

// Re-export commonly used types
pub use error::{IntoKollabError, KollabError, Result};

pub use config::{BlockingRule, Capacity, WatcherConfig};
pub use engine::{CycleReport, Engine, SchedulingPolicy};
pub use ledger::{Ledger, LedgerStore, TaskId, TaskRecord, TaskState, TypeTag};
pub use monitor::{MonitorAction, StrikePolicy, Verdict};
pub use pool::{AgentName, AgentPool, TmuxSessions};
pub use shutdown::Shutdown;
pub use spec_gate::SpecGate;

// Re-export testing types for convenience
pub use testing::{MockSessionManager, SessionManager};
