//! Scheduling hooks for the spawn phase.
//!
//! A [`SchedulingPolicy`] decides the order in which pending tasks are
//! considered and may hold some back. The default keeps ledger order and
//! holds nothing back; [`RangeGate`] implements id-range ordering rules
//! from the settings file.

use std::fmt;

use crate::config::BlockingRule;
use crate::ledger::{Ledger, TaskRecord};

/// Ordering and blocking hook consulted by the spawn phase.
pub trait SchedulingPolicy: Send + Sync + fmt::Debug {
    /// Reorder pending tasks in place. The default keeps ledger order.
    fn order(&self, _tasks: &mut Vec<&TaskRecord>) {}

    /// Whether `task` must wait this cycle.
    fn blocks(&self, task: &TaskRecord, ledger: &Ledger) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Ledger order, nothing blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerOrder;

impl SchedulingPolicy for LedgerOrder {
    fn blocks(&self, _task: &TaskRecord, _ledger: &Ledger) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "ledger-order"
    }
}

/// Holds back tasks whose ordinal is at least a rule's `from` until every
/// task with an ordinal in the rule's `wait_for` range is `Done` or `QA`.
///
/// Ordinals are compared across type tags. Ids in the range that have no
/// ledger line do not block.
///
/// # Example
///
/// ```
/// use kollaborate::config::BlockingRule;
/// use kollaborate::engine::{RangeGate, SchedulingPolicy};
/// use kollaborate::ledger::{Ledger, TaskId};
///
/// let gate = RangeGate::from_rules(vec![BlockingRule { from: 108, wait_for: (92, 107) }]);
/// let ledger = Ledger::parse("WORKING: F100 - a\nNEW: F108 - b\n");
/// let task = ledger.get(&TaskId::parse("F108").unwrap()).unwrap();
/// assert!(gate.blocks(task, &ledger));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RangeGate {
    rules: Vec<BlockingRule>,
}

impl RangeGate {
    #[must_use]
    pub fn from_rules(rules: Vec<BlockingRule>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[BlockingRule] {
        &self.rules
    }
}

impl SchedulingPolicy for RangeGate {
    fn blocks(&self, task: &TaskRecord, ledger: &Ledger) -> bool {
        let ordinal = task.id.ordinal();
        self.rules
            .iter()
            .filter(|rule| ordinal >= rule.from)
            .any(|rule| {
                let (lo, hi) = rule.wait_for;
                ledger.records().any(|other| {
                    other.id != task.id
                        && (lo..=hi).contains(&other.id.ordinal())
                        && !other.state.is_finished()
                })
            })
    }

    fn name(&self) -> &'static str {
        "range-gate"
    }
}

/// Policy for a set of configured rules: [`LedgerOrder`] when there are
/// none.
#[must_use]
pub fn policy_for(rules: &[BlockingRule]) -> Box<dyn SchedulingPolicy> {
    if rules.is_empty() {
        Box::new(LedgerOrder)
    } else {
        Box::new(RangeGate::from_rules(rules.to_vec()))
    }
}
