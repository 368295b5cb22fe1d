//! Workflow states and steps of an entity

use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, StateId, StepId};

/// A state a row can be in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: StateId,
    pub entity_id: EntityId,
    pub order: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// An allowed transition
///
/// A step without `from_state_id` is an initial step: it applies to rows
/// whose workflow state is still unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub entity_id: EntityId,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state_id: Option<StateId>,
    pub to_state_id: StateId,
    /// Action label shown to users, e.g. "Send"
    pub action: String,
}

impl WorkflowStep {
    pub fn is_initial(&self) -> bool {
        self.from_state_id.is_none()
    }

    /// Whether this step leaves the given current state
    pub fn applies_to(&self, current: Option<&StateId>) -> bool {
        self.from_state_id.as_ref() == current
    }
}
