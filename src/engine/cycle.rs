//! One reconciliation cycle.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::Engine;
use crate::error::{KollabError, Result};
use crate::ledger::{Ledger, TaskId, TaskRecord, TaskState, TaskTransition};
use crate::monitor::{poll_all, MonitorAction, PollOutcome};
use crate::pool::{AgentName, PoolSnapshot};
use crate::prompt::{
    build_generator_prompt, build_spec_prompt, build_worker_prompt, classify, idle_warning,
    progress_nudge, PromptContext,
};

/// What one cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    /// Ledger changes written this cycle
    pub transitions: Vec<TaskTransition>,
    /// Sessions killed this cycle
    pub killed: Vec<String>,
    pub spawned_workers: Vec<TaskId>,
    pub spawned_spec_agents: Vec<TaskId>,
    pub generator_spawned: bool,
    pub warned: usize,
    pub nudged: usize,
    pub placeholders_deleted: Vec<TaskId>,
    /// Per-item failures that were logged and skipped
    pub failures: usize,
    pub pending: usize,
    pub working: usize,
    pub live_workers: usize,
    pub live_spec_agents: usize,
    pub generator_live: bool,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    /// Tasks moved from `Working` back to `New`.
    #[must_use]
    pub fn demoted(&self) -> Vec<TaskId> {
        self.transitions
            .iter()
            .filter(|t| t.from == TaskState::Working && t.to == TaskState::New)
            .map(|t| t.task)
            .collect()
    }

    /// Log the one-line cycle summary.
    pub fn log(&self) {
        info!(
            cycle = self.cycle,
            pending = self.pending,
            working = self.working,
            workers = self.live_workers,
            spec_agents = self.live_spec_agents,
            generator = self.generator_live,
            spawned = self.spawned_workers.len(),
            specs_started = self.spawned_spec_agents.len(),
            demoted = self.demoted().len(),
            killed = self.killed.len(),
            failures = self.failures,
            "Cycle complete"
        );
    }
}

impl Engine {
    /// Run one full cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the ledger cannot be read or the session
    /// list cannot be fetched; nothing is changed in that case.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycles += 1;
        let mut report = CycleReport::new(self.cycles);

        let mut ledger = self.store.load()?;
        let mut pool = self.pool.snapshot().await?;
        self.forget_departed(&pool);

        self.cleanup(&ledger, &mut pool, &mut report).await;
        self.reconcile(&mut ledger, &pool, &mut report);
        self.monitor(&mut ledger, &mut pool, &mut report).await;
        self.check_protocol(&ledger, &mut pool, &mut report).await;
        self.clean_placeholders(&ledger, &pool, &mut report);
        let missing = self.spawn_workers(&mut ledger, &mut pool, &mut report).await;
        self.spawn_spec_agents(&missing, &mut pool, &mut report).await;
        self.replenish(&ledger, &mut pool, &mut report).await;

        report.pending = ledger.pending_count();
        report.working = ledger.working_ids().len();
        report.live_workers = pool.worker_count();
        report.live_spec_agents = pool.spec_agent_count();
        report.generator_live = pool.generator_live;
        Ok(report)
    }

    /// Drop bookkeeping for agents that are no longer live.
    fn forget_departed(&mut self, pool: &PoolSnapshot) {
        self.bookkeeping
            .retain(|name, _| AgentName::parse(name).is_some_and(|a| pool.exists(&a)));
        self.pending_kills.retain(|agent| pool.exists(agent));
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    /// Write one transition to the ledger file and mirror it in memory.
    fn transition(
        &self,
        ledger: &mut Ledger,
        transition: TaskTransition,
        phase: &'static str,
        report: &mut CycleReport,
    ) -> bool {
        let TaskTransition { task, from, to, .. } = transition;
        match self.store.transition(&task, from, to) {
            Ok(true) => {
                ledger.set_state(&task, from, to);
                info!(phase, task = %task, "{transition}");
                report.transitions.push(transition);
                true
            }
            Ok(false) => {
                debug!(phase, task = %task, %from, %to, "Ledger line no longer in expected state");
                false
            }
            Err(e) => {
                warn!(phase, task = %task, error = %e, "Ledger update failed");
                report.failures += 1;
                false
            }
        }
    }

    /// Kill an agent. A session that is already gone counts as killed.
    async fn kill_agent(
        &mut self,
        agent: AgentName,
        reason: &str,
        phase: &'static str,
        pool: &mut PoolSnapshot,
        report: &mut CycleReport,
    ) -> bool {
        match self.pool.kill(&agent).await {
            Ok(()) => {
                info!(phase, agent = %agent, reason, "Killed agent");
                report.killed.push(agent.to_string());
            }
            Err(KollabError::SessionNotFound { .. }) => {
                debug!(phase, agent = %agent, "Agent already gone");
            }
            Err(e) => {
                warn!(phase, agent = %agent, reason, error = %e, "Kill failed");
                report.failures += 1;
                return false;
            }
        }
        pool.mark_gone(&agent);
        self.bookkeeping.remove(&agent.to_string());
        true
    }

    fn started_at(&mut self, agent: &AgentName, now: Instant) -> Instant {
        *self
            .bookkeeping
            .entry(agent.to_string())
            .or_default()
            .started_at
            .get_or_insert(now)
    }

    // =========================================================================
    // Phase: cleanup
    // =========================================================================

    async fn cleanup(&mut self, ledger: &Ledger, pool: &mut PoolSnapshot, report: &mut CycleReport) {
        for id in pool.workers.clone() {
            if let Some(state) = ledger.state_of(&id).filter(TaskState::is_finished) {
                let reason = format!("task is {state}");
                self.kill_agent(AgentName::Worker(id), &reason, "cleanup", pool, report)
                    .await;
            }
        }

        for agent in self.pending_kills.clone() {
            if self
                .kill_agent(agent, "retrying recycle kill", "cleanup", pool, report)
                .await
            {
                self.pending_kills.remove(&agent);
            }
        }

        let now = Instant::now();
        for id in pool.spec_agents.clone() {
            let agent = AgentName::Spec(id);
            let reason = if self.gate.has_complete_spec(&id) {
                Some("spec complete")
            } else if ledger.state_of(&id) != Some(TaskState::New) {
                Some("task no longer pending")
            } else if now.saturating_duration_since(self.started_at(&agent, now))
                > self.config.spec_agent_timeout()
            {
                Some("spec agent timed out")
            } else {
                None
            };
            if let Some(reason) = reason {
                self.kill_agent(agent, reason, "cleanup", pool, report).await;
            }
        }

        if pool.generator_live {
            let pending = ledger.pending_count();
            let reason = if pending >= self.config.replenish_threshold {
                Some("backlog replenished")
            } else if now.saturating_duration_since(self.started_at(&AgentName::Generator, now))
                > self.config.generator_timeout()
            {
                Some("generator timed out")
            } else {
                None
            };
            if let Some(reason) = reason {
                self.kill_agent(AgentName::Generator, reason, "cleanup", pool, report)
                    .await;
            }
        }
    }

    // =========================================================================
    // Phase: reconcile
    // =========================================================================

    fn reconcile(&mut self, ledger: &mut Ledger, pool: &PoolSnapshot, report: &mut CycleReport) {
        for id in ledger.working_ids() {
            if pool.has_worker(&id) {
                continue;
            }
            self.transition(
                ledger,
                TaskTransition::new(id, TaskState::Working, TaskState::New, "agent vanished"),
                "reconcile",
                report,
            );
            self.bookkeeping.remove(&id.to_string());
        }
    }

    // =========================================================================
    // Phase: monitor
    // =========================================================================

    async fn monitor(
        &mut self,
        ledger: &mut Ledger,
        pool: &mut PoolSnapshot,
        report: &mut CycleReport,
    ) {
        let targets: Vec<String> = ledger
            .working_ids()
            .into_iter()
            .filter(|id| pool.has_worker(id))
            .filter(|id| !self.pending_kills.contains(&AgentName::Worker(*id)))
            .map(|id| id.to_string())
            .collect();
        if targets.is_empty() {
            return;
        }

        let outcomes = poll_all(
            self.pool.sessions().clone(),
            targets,
            self.config.capture_lines,
            self.config.poll_wait(),
        )
        .await;

        let now = Instant::now();
        for (name, outcome) in outcomes {
            let Ok(id) = TaskId::parse(&name) else {
                continue;
            };
            let agent = AgentName::Worker(id);
            let verdict = match outcome {
                PollOutcome::Verdict(verdict) => verdict,
                PollOutcome::Failed(message) => {
                    warn!(phase = "monitor", agent = %agent, error = %message, "Poll failed");
                    report.failures += 1;
                    continue;
                }
            };

            let strikes = self.strikes;
            let action = strikes.apply(verdict, self.bookkeeping_mut(&name), now);
            debug!(phase = "monitor", agent = %agent, %verdict, ?action, "Applied verdict");

            match action {
                MonitorAction::None => {}
                MonitorAction::Warn { remaining } => {
                    info!(phase = "monitor", agent = %agent, remaining, "Agent idle");
                    match self.pool.message(&agent, &idle_warning(remaining)).await {
                        Ok(()) => report.warned += 1,
                        Err(e) => {
                            warn!(phase = "monitor", agent = %agent, error = %e, "Idle warning not delivered");
                            report.failures += 1;
                        }
                    }
                }
                MonitorAction::Nudge => match self.pool.message(&agent, &progress_nudge(&id)).await {
                    Ok(()) => report.nudged += 1,
                    Err(e) => {
                        warn!(phase = "monitor", agent = %agent, error = %e, "Progress nudge not delivered");
                        report.failures += 1;
                    }
                },
                MonitorAction::Recycle => {
                    self.recycle(ledger, id, pool, report).await;
                }
                MonitorAction::Demote => {
                    self.transition(
                        ledger,
                        TaskTransition::new(id, TaskState::Working, TaskState::New, "agent vanished"),
                        "monitor",
                        report,
                    );
                    pool.mark_gone(&agent);
                    self.bookkeeping.remove(&name);
                }
            }
        }
    }

    /// Return an idle task to the queue, then kill its agent. A failed kill
    /// is retried by later cleanup phases.
    async fn recycle(
        &mut self,
        ledger: &mut Ledger,
        id: TaskId,
        pool: &mut PoolSnapshot,
        report: &mut CycleReport,
    ) {
        let agent = AgentName::Worker(id);
        match self.store.transition(&id, TaskState::Working, TaskState::New) {
            Ok(true) => {
                ledger.set_state(&id, TaskState::Working, TaskState::New);
                let transition = TaskTransition::new(
                    id,
                    TaskState::Working,
                    TaskState::New,
                    "idle strikes exhausted",
                );
                info!(phase = "monitor", task = %id, "{transition}");
                report.transitions.push(transition);
            }
            // The agent moved its line on since the snapshot; the session still goes.
            Ok(false) => {}
            Err(e) => {
                warn!(phase = "monitor", task = %id, error = %e, "Recycle skipped: ledger update failed");
                report.failures += 1;
                return;
            }
        }
        self.bookkeeping_mut(&id.to_string()).idle_strikes = 0;

        if !self
            .kill_agent(agent, "idle strikes exhausted", "monitor", pool, report)
            .await
        {
            self.pending_kills.insert(agent);
        }
    }

    /// Kill workers with no `New`/`Working` ledger line after repeated
    /// cycles.
    async fn check_protocol(
        &mut self,
        ledger: &Ledger,
        pool: &mut PoolSnapshot,
        report: &mut CycleReport,
    ) {
        let limit = self.config.violation_limit;
        for id in pool.workers.clone() {
            let state = ledger.state_of(&id);
            let name = id.to_string();
            if state.is_some_and(|s| s.expects_agent() || s.is_finished()) {
                if let Some(book) = self.bookkeeping.get_mut(&name) {
                    book.violations = 0;
                }
                continue;
            }

            let book = self.bookkeeping_mut(&name);
            book.violations += 1;
            let violations = book.violations;
            if violations >= limit {
                self.kill_agent(
                    AgentName::Worker(id),
                    "no matching ledger line",
                    "monitor",
                    pool,
                    report,
                )
                .await;
            } else {
                warn!(
                    phase = "monitor",
                    agent = %id,
                    violations,
                    state = ?state,
                    "Agent has no matching ledger line"
                );
            }
        }
    }

    // =========================================================================
    // Phase: spec cleanup
    // =========================================================================

    fn clean_placeholders(&self, ledger: &Ledger, pool: &PoolSnapshot, report: &mut CycleReport) {
        for task in ledger.new_tasks() {
            match self
                .gate
                .delete_if_placeholder_and_unattended(&task.id, pool.has_spec_agent(&task.id))
            {
                Ok(true) => report.placeholders_deleted.push(task.id),
                Ok(false) => {}
                Err(e) => {
                    warn!(phase = "spec", task = %task.id, error = %e, "Placeholder spec not deleted");
                    report.failures += 1;
                }
            }
        }
    }

    // =========================================================================
    // Phase: spawn
    // =========================================================================

    /// Start workers for ready tasks. Returns pending tasks that still
    /// need a spec, in scheduling order.
    async fn spawn_workers(
        &mut self,
        ledger: &mut Ledger,
        pool: &mut PoolSnapshot,
        report: &mut CycleReport,
    ) -> Vec<TaskRecord> {
        let mut free = self
            .capacity
            .max_workers
            .saturating_sub(pool.worker_count());

        let candidates: Vec<TaskRecord> = {
            let mut tasks = ledger.new_tasks();
            self.policy.order(&mut tasks);
            tasks.into_iter().cloned().collect()
        };

        let mut missing = Vec::new();
        for task in candidates {
            let id = task.id;
            let agent = AgentName::Worker(id);

            if pool.has_worker(&id) {
                if !self.pending_kills.contains(&agent) {
                    // Spawned earlier but the ledger flip did not land.
                    self.transition(
                        ledger,
                        TaskTransition::new(id, TaskState::New, TaskState::Working, "worker already running"),
                        "spawn",
                        report,
                    );
                }
                continue;
            }

            if !self.gate.has_complete_spec(&id) {
                debug!(phase = "spawn", task = %id, "Waiting for spec");
                missing.push(task);
                continue;
            }

            if self.policy.blocks(&task, ledger) {
                debug!(phase = "spawn", task = %id, policy = self.policy.name(), "Held back by scheduling policy");
                continue;
            }

            if free == 0 {
                continue;
            }

            let ctx = PromptContext {
                ledger_path: self.store.path().to_path_buf(),
                spec_path: self.gate.spec_path_for(&id, &task.description),
                file_target: task.file_target.clone(),
            };
            let prompt = build_worker_prompt(&id, &task.description, classify(id.tag()), &ctx);

            match self.pool.spawn(&agent, &prompt).await {
                Ok(()) => {
                    info!(phase = "spawn", agent = %agent, "Spawned worker");
                    pool.mark_live(&agent);
                    self.bookkeeping.insert(agent.to_string(), Default::default());
                    report.spawned_workers.push(id);
                    free -= 1;
                    self.transition(
                        ledger,
                        TaskTransition::new(id, TaskState::New, TaskState::Working, "worker spawned"),
                        "spawn",
                        report,
                    );
                }
                Err(KollabError::SessionExists { .. }) => {
                    warn!(phase = "spawn", agent = %agent, "Session appeared since snapshot");
                    pool.mark_live(&agent);
                }
                Err(e) => {
                    warn!(phase = "spawn", agent = %agent, error = %e, "Spawn failed");
                    report.failures += 1;
                }
            }
        }
        missing
    }

    // =========================================================================
    // Phase: spec spawn
    // =========================================================================

    async fn spawn_spec_agents(
        &mut self,
        missing: &[TaskRecord],
        pool: &mut PoolSnapshot,
        report: &mut CycleReport,
    ) {
        let mut free = self
            .capacity
            .max_spec_agents
            .saturating_sub(pool.spec_agent_count());

        for task in missing {
            if free == 0 {
                debug!(phase = "spec", waiting = missing.len(), "Spec agent capacity exhausted");
                break;
            }
            let id = task.id;
            let agent = AgentName::Spec(id);
            if pool.has_spec_agent(&id) {
                continue;
            }

            let prompt = build_spec_prompt(
                &id,
                &task.description,
                classify(id.tag()),
                &self.gate.spec_path_for(&id, &task.description),
                self.store.path(),
                self.config.spec_min_lines,
            );
            match self.pool.spawn(&agent, &prompt).await {
                Ok(()) => {
                    info!(phase = "spec", agent = %agent, "Spawned spec agent");
                    pool.mark_live(&agent);
                    self.bookkeeping_mut(&agent.to_string()).started_at = Some(Instant::now());
                    report.spawned_spec_agents.push(id);
                    free -= 1;
                }
                Err(KollabError::SessionExists { .. }) => {
                    pool.mark_live(&agent);
                    free = free.saturating_sub(1);
                }
                Err(e) => {
                    warn!(phase = "spec", agent = %agent, error = %e, "Spec agent spawn failed");
                    report.failures += 1;
                }
            }
        }
    }

    // =========================================================================
    // Phase: backlog
    // =========================================================================

    async fn replenish(&mut self, ledger: &Ledger, pool: &mut PoolSnapshot, report: &mut CycleReport) {
        let pending = ledger.pending_count();
        let threshold = self.config.replenish_threshold;
        if pending >= threshold || pool.generator_live {
            return;
        }

        let prompt = build_generator_prompt(ledger, self.store.path(), threshold);
        let agent = AgentName::Generator;
        match self.pool.spawn(&agent, &prompt).await {
            Ok(()) => {
                info!(phase = "backlog", agent = %agent, pending, threshold, "Spawned task generator");
                pool.mark_live(&agent);
                self.bookkeeping_mut(&agent.to_string()).started_at = Some(Instant::now());
                report.generator_spawned = true;
            }
            Err(e) => {
                warn!(phase = "backlog", agent = %agent, error = %e, "Generator spawn failed");
                report.failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Capacity;
    use crate::testing::{
        assert_at_most_one_worker_per_task, assert_session_gone, assert_session_live,
        assert_task_state, MockSessionManager, TestFixture,
    };

    fn id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    fn engine(fixture: &TestFixture, sessions: &Arc<MockSessionManager>) -> Engine {
        Engine::new(
            fixture.config(),
            Capacity::new(3, 2).unwrap(),
            sessions.clone(),
        )
    }

    #[tokio::test]
    async fn test_third_idle_strike_recycles() {
        let fixture = TestFixture::with_ledger("WORKING: R5 - fix bug\n");
        let sessions = Arc::new(MockSessionManager::new().with_idle_session("R5", "$ "));
        let mut engine = engine(&fixture, &sessions);
        engine.bookkeeping_mut("R5").idle_strikes = 2;

        let report = engine.run_cycle().await.unwrap();

        assert_task_state(&fixture.ledger(), "R5", TaskState::New);
        assert_eq!(sessions.killed(), vec!["R5"]);
        assert_eq!(report.demoted(), vec![id("R5")]);
        assert!(engine.pending_kills().is_empty());
    }

    #[tokio::test]
    async fn test_idle_worker_is_warned() {
        let fixture = TestFixture::with_ledger("WORKING: R5 - fix bug\n");
        let sessions = Arc::new(MockSessionManager::new().with_idle_session("R5", "$ "));
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.warned, 1);
        assert_eq!(engine.bookkeeping("R5").unwrap().idle_strikes, 1);
        assert!(sessions.inputs("R5")[0].contains("2 idle checks remaining"));
        assert_eq!(sessions.submit_count("R5"), 1);
        assert_task_state(&fixture.ledger(), "R5", TaskState::Working);
    }

    #[tokio::test]
    async fn test_active_worker_resets_strikes() {
        let fixture = TestFixture::with_ledger("WORKING: F2 - build it\n");
        let sessions = Arc::new(MockSessionManager::new().with_active_session("F2"));
        let mut engine = engine(&fixture, &sessions);
        engine.bookkeeping_mut("F2").idle_strikes = 2;

        engine.run_cycle().await.unwrap();

        let book = engine.bookkeeping("F2").unwrap();
        assert_eq!(book.idle_strikes, 0);
        assert!(book.last_reminder_at.is_some());
        assert!(sessions.inputs("F2").is_empty());
    }

    #[tokio::test]
    async fn test_missing_worker_demotes_task() {
        let fixture = TestFixture::with_ledger("WORKING: B2 - fix crash\n");
        let sessions = Arc::new(MockSessionManager::new());
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();

        assert_task_state(&fixture.ledger(), "B2", TaskState::New);
        assert_eq!(report.demoted(), vec![id("B2")]);
    }

    #[tokio::test]
    async fn test_spawn_waits_for_spec() {
        let fixture =
            TestFixture::with_ledger("NEW: F3 - add login form\nNEW: F4 - add logout\n");
        fixture.write_spec("F4", "add-logout", 60);
        let sessions = Arc::new(MockSessionManager::new());
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.spawned_workers, vec![id("F4")]);
        assert_eq!(report.spawned_spec_agents, vec![id("F3")]);
        assert_task_state(&fixture.ledger(), "F4", TaskState::Working);
        assert_task_state(&fixture.ledger(), "F3", TaskState::New);
        assert_session_live(&sessions, "SPEC-F3");
        assert_session_gone(&sessions, "F3");
        assert!(sessions.inputs("F4")[1].contains("F4"));
    }

    #[tokio::test]
    async fn test_spawn_respects_worker_capacity() {
        let ledger: String = (1..=5).map(|n| format!("NEW: F{n} - task {n}\n")).collect();
        let fixture = TestFixture::with_ledger(&ledger);
        for n in 1..=5 {
            fixture.write_spec(&format!("F{n}"), "task", 60);
        }
        let sessions = Arc::new(MockSessionManager::new());
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.spawned_workers.len(), 3);
        assert_eq!(report.live_workers, 3);
        assert_task_state(&fixture.ledger(), "F4", TaskState::New);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let fixture = TestFixture::with_ledger("NEW: F1 - one\n");
        fixture.write_spec("F1", "one", 60);
        let sessions = Arc::new(MockSessionManager::new().with_active_session("F1"));
        let mut engine = engine(&fixture, &sessions);

        engine.run_cycle().await.unwrap();
        let after_first = fixture.ledger();
        engine.run_cycle().await.unwrap();

        assert_eq!(fixture.ledger(), after_first);
        assert_task_state(&after_first, "F1", TaskState::Working);
        assert!(!sessions.created().contains(&"F1".to_string()));
        assert_at_most_one_worker_per_task(&sessions);
    }

    #[tokio::test]
    async fn test_failed_recycle_kill_is_retried() {
        let fixture = TestFixture::with_ledger("WORKING: R5 - fix bug\n");
        let sessions = Arc::new(
            MockSessionManager::new()
                .with_idle_session("R5", "$ ")
                .with_kill_failure("R5"),
        );
        let mut engine = engine(&fixture, &sessions);
        engine.bookkeeping_mut("R5").idle_strikes = 2;

        engine.run_cycle().await.unwrap();
        assert_task_state(&fixture.ledger(), "R5", TaskState::New);
        assert!(engine.pending_kills().contains(&AgentName::Worker(id("R5"))));
        assert_session_live(&sessions, "R5");

        sessions.clear_kill_failure("R5");
        engine.run_cycle().await.unwrap();

        assert!(engine.pending_kills().is_empty());
        assert_session_gone(&sessions, "R5");
        assert_task_state(&fixture.ledger(), "R5", TaskState::New);
    }

    #[tokio::test]
    async fn test_recycle_resets_strikes_once_demoted() {
        let fixture = TestFixture::with_ledger("WORKING: R5 - fix bug\n");
        let sessions = Arc::new(
            MockSessionManager::new()
                .with_idle_session("R5", "$ ")
                .with_kill_failure("R5"),
        );
        let mut engine = engine(&fixture, &sessions);
        engine.bookkeeping_mut("R5").idle_strikes = 2;

        engine.run_cycle().await.unwrap();

        assert_task_state(&fixture.ledger(), "R5", TaskState::New);
        assert_eq!(engine.bookkeeping("R5").unwrap().idle_strikes, 0);
    }

    #[tokio::test]
    async fn test_failed_demotion_keeps_strikes_and_retries() {
        let fixture = TestFixture::with_ledger("WORKING: R5 - fix bug\n");
        let blocker = fixture.path().join(".TASKS.md.kollab.tmp");
        std::fs::create_dir(&blocker).unwrap();
        let sessions = Arc::new(MockSessionManager::new().with_idle_session("R5", "$ "));
        let mut engine = engine(&fixture, &sessions);
        engine.bookkeeping_mut("R5").idle_strikes = 2;

        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.failures, 1);
        assert!(report.demoted().is_empty());
        assert_eq!(engine.bookkeeping("R5").unwrap().idle_strikes, 3);
        assert_task_state(&fixture.ledger(), "R5", TaskState::Working);
        assert_session_live(&sessions, "R5");

        std::fs::remove_dir(&blocker).unwrap();
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.demoted(), vec![id("R5")]);
        assert_task_state(&fixture.ledger(), "R5", TaskState::New);
        assert_session_gone(&sessions, "R5");
    }

    #[tokio::test]
    async fn test_stalled_worker_is_warned() {
        let fixture = TestFixture::with_ledger("WORKING: F2 - build it\n");
        let sessions = Arc::new(MockSessionManager::new().with_active_session("F2"));
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.warned, 0);

        sessions.set_changing("F2", false);
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.warned, 1);
        assert_eq!(engine.bookkeeping("F2").unwrap().idle_strikes, 1);
        assert_task_state(&fixture.ledger(), "F2", TaskState::Working);
    }

    #[tokio::test]
    async fn test_foreign_session_is_left_alone() {
        let fixture = TestFixture::with_ledger("WORKING: F2 - build it\n");
        let sessions = Arc::new(MockSessionManager::new().with_active_session("F2"));
        sessions.add_session("main");
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();
        engine.run_cycle().await.unwrap();

        assert_eq!(report.live_workers, 1);
        assert!(sessions.killed().is_empty());
        assert_session_live(&sessions, "main");
        assert!(engine.bookkeeping("main").is_none());
    }

    #[tokio::test]
    async fn test_one_session_listing_per_cycle() {
        let fixture = TestFixture::with_ledger("NEW: F1 - one\nWORKING: F2 - two\n");
        fixture.write_spec("F1", "one", 60);
        let sessions = Arc::new(MockSessionManager::new().with_active_session("F2"));
        let mut engine = engine(&fixture, &sessions);

        engine.run_cycle().await.unwrap();
        assert_eq!(sessions.list_calls(), 1);

        engine.run_cycle().await.unwrap();
        assert_eq!(sessions.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_finished_worker_is_killed() {
        let fixture = TestFixture::with_ledger("DONE: F1 - one\nQA: F2 - two\n");
        let sessions = Arc::new(
            MockSessionManager::new()
                .with_active_session("F1")
                .with_active_session("F2"),
        );
        let mut engine = engine(&fixture, &sessions);

        engine.run_cycle().await.unwrap();

        assert_session_gone(&sessions, "F1");
        assert_session_gone(&sessions, "F2");
    }

    #[tokio::test]
    async fn test_worker_without_ledger_line_killed_on_second_cycle() {
        let fixture = TestFixture::with_ledger("BLOCKED: F9 - stuck | waiting\n");
        let sessions = Arc::new(MockSessionManager::new().with_active_session("F9"));
        let mut engine = engine(&fixture, &sessions);

        engine.run_cycle().await.unwrap();
        assert_session_live(&sessions, "F9");

        engine.run_cycle().await.unwrap();
        assert_session_gone(&sessions, "F9");
    }

    #[tokio::test]
    async fn test_generator_lifecycle() {
        let fixture = TestFixture::with_ledger("NEW: F1 - one\n");
        let sessions = Arc::new(MockSessionManager::new());
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();
        assert!(report.generator_spawned);
        assert_session_live(&sessions, "TASK-GENERATOR");

        let ledger: String = (1..=6).map(|n| format!("NEW: F{n} - task {n}\n")).collect();
        fixture.set_ledger(&ledger);
        let report = engine.run_cycle().await.unwrap();

        assert!(!report.generator_spawned);
        assert_session_gone(&sessions, "TASK-GENERATOR");
    }

    #[tokio::test]
    async fn test_spec_agent_killed_when_spec_complete() {
        let fixture = TestFixture::with_ledger("NEW: F3 - add login form\n");
        let sessions = Arc::new(MockSessionManager::new().with_active_session("SPEC-F3"));
        fixture.write_spec("F3", "add-login-form", 60);
        let mut engine = engine(&fixture, &sessions);

        let report = engine.run_cycle().await.unwrap();

        assert!(report.killed.contains(&"SPEC-F3".to_string()));
        assert_eq!(report.spawned_workers, vec![id("F3")]);
    }

    #[tokio::test]
    async fn test_unattended_placeholder_deleted() {
        let fixture = TestFixture::with_ledger("NEW: R1 - cleanup\n");
        fixture.write_spec("R1", "cleanup", 3);
        let sessions = Arc::new(MockSessionManager::new());
        let mut engine = Engine::new(
            fixture.config(),
            Capacity::new(1, 0).unwrap(),
            sessions.clone(),
        );

        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.placeholders_deleted, vec![id("R1")]);
        assert!(!fixture.has_spec_file(&id("R1")));
    }

    #[tokio::test]
    async fn test_list_failure_skips_cycle() {
        let fixture = TestFixture::with_ledger("WORKING: B2 - fix crash\n");
        let sessions = Arc::new(MockSessionManager::new().with_list_failure());
        let mut engine = engine(&fixture, &sessions);

        assert!(engine.run_cycle().await.is_err());
        assert_task_state(&fixture.ledger(), "B2", TaskState::Working);
        assert!(sessions.created().is_empty());
    }
}
