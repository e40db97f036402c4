//! Agent pool registry.
//!
//! Agents are sessions whose names encode their role:
//!
//! | Session name     | Agent                          |
//! |------------------|--------------------------------|
//! | `R12`            | worker for task `R12`          |
//! | `SPEC-R12`       | spec agent for task `R12`      |
//! | `TASK-GENERATOR` | backlog generator              |
//!
//! Any other session is foreign and left alone. The pool lists sessions
//! once per pass into a [`PoolSnapshot`]; spawn and kill calls keep that
//! snapshot current for the rest of the pass.

pub mod tmux;

pub use tmux::TmuxSessions;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{KollabError, Result};
use crate::ledger::TaskId;
use crate::testing::SessionManager;

/// Session name of the backlog generator
pub const GENERATOR_SESSION: &str = "TASK-GENERATOR";

/// Session-name prefix of spec agents
pub const SPEC_PREFIX: &str = "SPEC-";

// ============================================================================
// Agent Names
// ============================================================================

/// Role of an agent, derived from its session name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentName {
    /// Works on one task
    Worker(TaskId),
    /// Writes the spec for one task
    Spec(TaskId),
    /// Appends new tasks to the ledger
    Generator,
}

impl AgentName {
    /// Parse a session name. Returns `None` for foreign sessions.
    ///
    /// # Example
    ///
    /// ```
    /// use kollaborate::pool::AgentName;
    ///
    /// assert!(matches!(AgentName::parse("SPEC-F3"), Some(AgentName::Spec(_))));
    /// assert_eq!(AgentName::parse("TASK-GENERATOR"), Some(AgentName::Generator));
    /// assert_eq!(AgentName::parse("main"), None);
    /// ```
    #[must_use]
    pub fn parse(session: &str) -> Option<Self> {
        if session == GENERATOR_SESSION {
            return Some(Self::Generator);
        }
        let agent = match session.strip_prefix(SPEC_PREFIX) {
            Some(rest) => Self::Spec(TaskId::parse(rest).ok()?),
            None => Self::Worker(TaskId::parse(session).ok()?),
        };
        // Only the canonical spelling maps back to the same session.
        (agent.to_string() == session).then_some(agent)
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker(id) => write!(f, "{id}"),
            Self::Spec(id) => write!(f, "{SPEC_PREFIX}{id}"),
            Self::Generator => write!(f, "{GENERATOR_SESSION}"),
        }
    }
}

// ============================================================================
// Pool Snapshot
// ============================================================================

/// Live agents as of one `list_sessions` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub workers: BTreeSet<TaskId>,
    pub spec_agents: BTreeSet<TaskId>,
    pub generator_live: bool,
    /// Sessions that are not ours
    pub foreign: Vec<String>,
}

impl PoolSnapshot {
    /// Classify raw session names.
    pub fn from_sessions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut snapshot = Self::default();
        for name in names {
            let name = name.as_ref();
            match AgentName::parse(name) {
                Some(agent) => snapshot.mark_live(&agent),
                None => snapshot.foreign.push(name.to_string()),
            }
        }
        snapshot
    }

    /// Whether an agent is live.
    #[must_use]
    pub fn exists(&self, agent: &AgentName) -> bool {
        match agent {
            AgentName::Worker(id) => self.workers.contains(id),
            AgentName::Spec(id) => self.spec_agents.contains(id),
            AgentName::Generator => self.generator_live,
        }
    }

    #[must_use]
    pub fn has_worker(&self, id: &TaskId) -> bool {
        self.workers.contains(id)
    }

    #[must_use]
    pub fn has_spec_agent(&self, id: &TaskId) -> bool {
        self.spec_agents.contains(id)
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn spec_agent_count(&self) -> usize {
        self.spec_agents.len()
    }

    /// Every live agent of ours.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentName> {
        let mut agents: Vec<AgentName> = self
            .workers
            .iter()
            .map(|id| AgentName::Worker(*id))
            .chain(self.spec_agents.iter().map(|id| AgentName::Spec(*id)))
            .collect();
        if self.generator_live {
            agents.push(AgentName::Generator);
        }
        agents
    }

    /// Record an agent as live (after a spawn).
    pub fn mark_live(&mut self, agent: &AgentName) {
        match agent {
            AgentName::Worker(id) => {
                self.workers.insert(*id);
            }
            AgentName::Spec(id) => {
                self.spec_agents.insert(*id);
            }
            AgentName::Generator => self.generator_live = true,
        }
    }

    /// Record an agent as gone (after a kill).
    pub fn mark_gone(&mut self, agent: &AgentName) {
        match agent {
            AgentName::Worker(id) => {
                self.workers.remove(id);
            }
            AgentName::Spec(id) => {
                self.spec_agents.remove(id);
            }
            AgentName::Generator => self.generator_live = false,
        }
    }
}

// ============================================================================
// Agent Pool
// ============================================================================

/// Spawns, kills, and messages agents over a [`SessionManager`].
#[derive(Clone)]
pub struct AgentPool {
    sessions: Arc<dyn SessionManager>,
    agent_command: String,
    startup: Duration,
}

impl fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentPool")
            .field("agent_command", &self.agent_command)
            .field("startup", &self.startup)
            .finish_non_exhaustive()
    }
}

impl AgentPool {
    /// Create a pool that launches `agent_command` in each new session and
    /// waits `startup` before sending instructions.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionManager>,
        agent_command: impl Into<String>,
        startup: Duration,
    ) -> Self {
        Self {
            sessions,
            agent_command: agent_command.into(),
            startup,
        }
    }

    /// The underlying session manager.
    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionManager> {
        &self.sessions
    }

    /// List live sessions once and classify them.
    ///
    /// # Errors
    ///
    /// Returns the session manager's error if listing fails.
    pub async fn snapshot(&self) -> Result<PoolSnapshot> {
        let names = self.sessions.list_sessions().await?;
        let snapshot = PoolSnapshot::from_sessions(&names);
        if !snapshot.foreign.is_empty() {
            debug!(foreign = ?snapshot.foreign, "Ignoring foreign sessions");
        }
        Ok(snapshot)
    }

    /// Start an agent: create its session, launch the agent command, wait
    /// for it to come up, then send `instructions`.
    ///
    /// A failure after the session exists kills the half-started session.
    ///
    /// # Errors
    ///
    /// Returns [`KollabError::SessionExists`] if the name is taken, or the
    /// first failing session call.
    pub async fn spawn(&self, agent: &AgentName, instructions: &str) -> Result<()> {
        let name = agent.to_string();
        if self.sessions.session_exists(&name).await {
            return Err(KollabError::SessionExists { name });
        }
        self.sessions.create_session(&name).await?;

        if let Err(e) = self.launch(&name, instructions).await {
            if let Err(kill_err) = self.sessions.kill_session(&name).await {
                warn!(agent = %name, error = %kill_err, "Failed to kill half-started session");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn launch(&self, name: &str, instructions: &str) -> Result<()> {
        self.submit(name, &self.agent_command).await?;
        if !self.startup.is_zero() {
            tokio::time::sleep(self.startup).await;
        }
        self.submit(name, instructions).await
    }

    async fn submit(&self, name: &str, text: &str) -> Result<()> {
        self.sessions.send_text(name, text).await?;
        self.sessions.send_submit(name).await
    }

    /// Kill an agent's session.
    ///
    /// # Errors
    ///
    /// Returns the session manager's error.
    pub async fn kill(&self, agent: &AgentName) -> Result<()> {
        self.sessions.kill_session(&agent.to_string()).await
    }

    /// Send a message followed by a separate submit.
    ///
    /// # Errors
    ///
    /// Returns the session manager's error.
    pub async fn message(&self, agent: &AgentName, text: &str) -> Result<()> {
        self.submit(&agent.to_string(), text).await
    }
}
