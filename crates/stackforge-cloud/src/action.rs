//! Planned and applied step actions

use crate::state::TopologyState;
use crate::step::{STEPS, StepName};
use serde::{Deserialize, Serialize};

/// Represents a planned action for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub step: StepName,
    pub action_type: ActionType,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Call the provider's `ensure`
    Ensure,
    /// Call the provider's `teardown`
    Teardown,
    /// Nothing to do for this step
    Skip,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Ensure => write!(f, "ensure"),
            ActionType::Teardown => write!(f, "teardown"),
            ActionType::Skip => write!(f, "skip"),
        }
    }
}

/// Ordered list of actions a run would perform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::Skip);
        Self {
            actions,
            has_changes,
        }
    }

    /// Forward walk: steps already in state are skipped
    pub fn provision(state: &TopologyState) -> Self {
        let actions = STEPS
            .iter()
            .map(|step| Action {
                step: step.name,
                action_type: if state.contains(step.name) {
                    ActionType::Skip
                } else {
                    ActionType::Ensure
                },
            })
            .collect();
        Self::new(actions)
    }

    /// Reverse walk: only steps present in state are torn down
    pub fn teardown(state: &TopologyState) -> Self {
        let actions = STEPS
            .iter()
            .rev()
            .map(|step| Action {
                step: step.name,
                action_type: if state.contains(step.name) {
                    ActionType::Teardown
                } else {
                    ActionType::Skip
                },
            })
            .collect();
        Self::new(actions)
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            ensure: self.actions_by_type(ActionType::Ensure).len(),
            teardown: self.actions_by_type(ActionType::Teardown).len(),
            skip: self.actions_by_type(ActionType::Skip).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub ensure: usize,
    pub teardown: usize,
    pub skip: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to ensure, {} to tear down, {} skipped",
            self.ensure, self.teardown, self.skip
        )
    }
}

/// Result of a completed orchestrator run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Steps whose provider was invoked, in invocation order
    pub applied: Vec<StepName>,

    /// Steps passed over because state already settled them
    pub skipped: Vec<StepName>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }
}
