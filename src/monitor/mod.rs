//! Activity monitor.
//!
//! A poll captures an agent's recent output, waits, captures again, and
//! compares md5 hashes of the two normalised snapshots. Unchanged output
//! means the agent is idle. Polls for all working agents run as separate
//! tokio tasks, so one cycle pays the poll wait once.
//!
//! [`StrikePolicy`] turns a verdict into an action and updates the agent's
//! [`AgentBookkeeping`]. The engine carries the actions out.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::debug;

use crate::config::WatcherConfig;
use crate::error::KollabError;
use crate::testing::SessionManager;

// ============================================================================
// Verdicts
// ============================================================================

/// Result of comparing two output snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Output unchanged across the poll wait
    Idle,
    /// Output changed
    Active,
    /// Session no longer exists
    Vanished,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Vanished => write!(f, "VANISHED"),
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Verdict(Verdict),
    /// Capture failed for a reason other than a missing session
    Failed(String),
}

/// Normalise a snapshot: trailing whitespace is dropped from every line
/// and trailing blank lines are dropped.
#[must_use]
pub fn normalize_snapshot(output: &str) -> String {
    let lines: Vec<&str> = output.lines().map(str::trim_end).collect();
    let end = lines
        .iter()
        .rposition(|l| !l.is_empty())
        .map_or(0, |i| i + 1);
    lines[..end].join("\n")
}

/// md5 hex digest of the normalised snapshot.
///
/// # Example
///
/// ```
/// use kollaborate::monitor::snapshot_hash;
///
/// assert_eq!(snapshot_hash("$ cargo test  \n\n"), snapshot_hash("$ cargo test"));
/// assert_ne!(snapshot_hash("step 1"), snapshot_hash("step 2"));
/// ```
#[must_use]
pub fn snapshot_hash(output: &str) -> String {
    format!("{:x}", md5::compute(normalize_snapshot(output).as_bytes()))
}

async fn capture_hash(
    sessions: &dyn SessionManager,
    name: &str,
    capture_lines: usize,
) -> std::result::Result<String, PollOutcome> {
    match sessions.capture_output(name, capture_lines).await {
        Ok(output) => Ok(snapshot_hash(&output)),
        Err(KollabError::SessionNotFound { .. }) => Err(PollOutcome::Verdict(Verdict::Vanished)),
        Err(e) => Err(PollOutcome::Failed(e.to_string())),
    }
}

/// Poll one agent.
pub async fn poll(
    sessions: &dyn SessionManager,
    name: &str,
    capture_lines: usize,
    wait: Duration,
) -> PollOutcome {
    let before = match capture_hash(sessions, name, capture_lines).await {
        Ok(hash) => hash,
        Err(outcome) => return outcome,
    };
    tokio::time::sleep(wait).await;
    let after = match capture_hash(sessions, name, capture_lines).await {
        Ok(hash) => hash,
        Err(outcome) => return outcome,
    };

    let verdict = if before == after {
        Verdict::Idle
    } else {
        Verdict::Active
    };
    debug!(agent = name, %verdict, "Polled agent");
    PollOutcome::Verdict(verdict)
}

/// Poll several agents concurrently, one task each. Results keep the
/// input order.
pub async fn poll_all(
    sessions: Arc<dyn SessionManager>,
    names: Vec<String>,
    capture_lines: usize,
    wait: Duration,
) -> Vec<(String, PollOutcome)> {
    let handles: Vec<_> = names
        .iter()
        .cloned()
        .map(|name| {
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move { poll(sessions.as_ref(), &name, capture_lines, wait).await })
        })
        .collect();

    let join_results = join_all(handles).await;

    names
        .into_iter()
        .zip(join_results)
        .map(|(name, joined)| {
            let outcome = joined
                .unwrap_or_else(|e| PollOutcome::Failed(format!("poll task panicked: {e}")));
            (name, outcome)
        })
        .collect()
}

// ============================================================================
// Bookkeeping and Policy
// ============================================================================

/// Per-agent state owned by the engine, keyed by session name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentBookkeeping {
    /// Consecutive idle verdicts
    pub idle_strikes: u32,
    /// Last progress nudge, or first active verdict
    pub last_reminder_at: Option<Instant>,
    /// When a spec agent or the generator was started
    pub started_at: Option<Instant>,
    /// Consecutive cycles with no matching ledger line
    pub violations: u32,
}

/// What the engine should do after a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    None,
    /// Tell the agent it is idle
    Warn { remaining: u32 },
    /// Send a progress nudge
    Nudge,
    /// Demote the task to `New`, then kill the agent
    Recycle,
    /// Demote the task to `New`; the agent is already gone
    Demote,
}

/// Idle-strike and reminder policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikePolicy {
    pub strike_limit: u32,
    pub reminder_interval: Duration,
}

impl StrikePolicy {
    #[must_use]
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            strike_limit: config.idle_strike_limit,
            reminder_interval: config.reminder_interval(),
        }
    }

    /// Apply a verdict to one agent's bookkeeping.
    ///
    /// Strikes are left at the limit on `Recycle`; the caller clears them
    /// once the task has been demoted, so a failed demotion recycles again
    /// on the next idle verdict.
    ///
    /// # Example
    ///
    /// ```
    /// use kollaborate::monitor::{AgentBookkeeping, MonitorAction, StrikePolicy, Verdict};
    /// use std::time::{Duration, Instant};
    ///
    /// let policy = StrikePolicy { strike_limit: 3, reminder_interval: Duration::from_secs(120) };
    /// let mut book = AgentBookkeeping { idle_strikes: 2, ..Default::default() };
    ///
    /// assert_eq!(policy.apply(Verdict::Idle, &mut book, Instant::now()), MonitorAction::Recycle);
    /// assert_eq!(book.idle_strikes, 3);
    /// ```
    pub fn apply(&self, verdict: Verdict, book: &mut AgentBookkeeping, now: Instant) -> MonitorAction {
        match verdict {
            Verdict::Idle => {
                book.idle_strikes = book.idle_strikes.saturating_add(1);
                if book.idle_strikes >= self.strike_limit {
                    MonitorAction::Recycle
                } else {
                    MonitorAction::Warn {
                        remaining: self.strike_limit - book.idle_strikes,
                    }
                }
            }
            Verdict::Active => {
                book.idle_strikes = 0;
                match book.last_reminder_at {
                    None => {
                        book.last_reminder_at = Some(now);
                        MonitorAction::None
                    }
                    Some(last) if now.saturating_duration_since(last) > self.reminder_interval => {
                        book.last_reminder_at = Some(now);
                        MonitorAction::Nudge
                    }
                    Some(_) => MonitorAction::None,
                }
            }
            Verdict::Vanished => MonitorAction::Demote,
        }
    }
}
