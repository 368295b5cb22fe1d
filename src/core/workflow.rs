//! Workflow engine for row state transitions
//!
//! Each entity with `has_workflow` owns a set of states and steps. A step
//! moves a row from one state to another; a step without a source state is
//! an initial step and only applies to rows that have no state yet.

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::core::activity;
use crate::core::context::TenantContext;
use crate::core::identity::{EntityId, RowId, StateId, StepId};
use crate::core::permissions;
use crate::core::store::Store;
use crate::entities::{Entity, LogAction, WorkflowState, WorkflowStep};

/// Errors that can occur during workflow operations
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow is not enabled for entity '{0}'. Set has_workflow on the entity first")]
    NotEnabled(String),

    #[error("Invalid transition: step {step} does not leave the current state ({from})")]
    InvalidTransition { step: String, from: String },

    #[error("Step not found: {0}")]
    UnknownStep(String),

    #[error("State not found: {0}")]
    UnknownState(String),

    #[error("State '{0}' already exists")]
    DuplicateState(String),

    #[error("A step with action '{action}' already leaves {from}")]
    DuplicateStep { action: String, from: String },

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Detail rows have no workflow state")]
    DetailRow,

    #[error("Permission denied: cannot {0}")]
    PermissionDenied(&'static str),
}

/// Read-only view of one entity's workflow
pub struct WorkflowEngine<'s> {
    store: &'s Store,
    entity: &'s Entity,
}

impl<'s> WorkflowEngine<'s> {
    /// Create an engine for an entity
    pub fn new(store: &'s Store, entity_id: &EntityId) -> Result<Self, WorkflowError> {
        let entity = store
            .entity(entity_id)
            .ok_or_else(|| WorkflowError::EntityNotFound(entity_id.to_string()))?;
        Ok(Self { store, entity })
    }

    /// Check if workflow features are enabled for the entity
    pub fn is_enabled(&self) -> bool {
        self.entity.flags.has_workflow
    }

    fn require_enabled(&self) -> Result<(), WorkflowError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(WorkflowError::NotEnabled(self.entity.slug.clone()))
        }
    }

    pub fn states(&self) -> Vec<&'s WorkflowState> {
        self.store.states_of(&self.entity.id)
    }

    pub fn steps(&self) -> Vec<&'s WorkflowStep> {
        self.store.steps_of(&self.entity.id)
    }

    /// Title of a state, or "(none)" for rows without one
    pub fn state_title(&self, state: Option<&StateId>) -> String {
        state
            .and_then(|id| self.store.state(id))
            .map(|s| s.title.clone())
            .unwrap_or_else(|| "(none)".to_string())
    }

    /// Steps available from the current state
    pub fn next_steps(&self, current: Option<&StateId>) -> Vec<&'s WorkflowStep> {
        self.steps()
            .into_iter()
            .filter(|s| s.applies_to(current))
            .collect()
    }

    /// Check if a step may fire from the current state
    pub fn is_valid_transition(&self, current: Option<&StateId>, step: &StepId) -> bool {
        self.next_steps(current).iter().any(|s| &s.id == step)
    }
}

/// Steps available to an entity's rows in `current`
pub fn next_steps<'s>(
    store: &'s Store,
    entity_id: &EntityId,
    current: Option<&StateId>,
) -> Result<Vec<&'s WorkflowStep>, WorkflowError> {
    let engine = WorkflowEngine::new(store, entity_id)?;
    engine.require_enabled()?;
    Ok(engine.next_steps(current))
}

/// Steps available to a row the caller can read
pub fn row_next_steps<'s>(
    store: &'s Store,
    ctx: &TenantContext,
    row_id: &RowId,
) -> Result<Vec<&'s WorkflowStep>, WorkflowError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| WorkflowError::RowNotFound(row_id.to_string()))?;
    if !permissions::resolve_in(store, row, ctx).can_read {
        return Err(WorkflowError::PermissionDenied("read this row"));
    }
    next_steps(store, &row.entity_id, row.workflow_state_id.as_ref())
}

/// Move a row along a step
///
/// The step must be one of the row's next steps; otherwise nothing changes.
/// An unknown step or one owned by another entity is an invalid transition.
/// Returns the new state.
pub fn transition(
    store: &mut Store,
    ctx: &TenantContext,
    row_id: &RowId,
    step_id: &StepId,
) -> Result<StateId, WorkflowError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| WorkflowError::RowNotFound(row_id.to_string()))?;
    if row.is_detail() {
        return Err(WorkflowError::DetailRow);
    }
    if !permissions::resolve(row, ctx).can_update {
        return Err(WorkflowError::PermissionDenied("transition this row"));
    }
    let engine = WorkflowEngine::new(store, &row.entity_id)?;
    engine.require_enabled()?;

    let current = row.workflow_state_id.as_ref();
    let step = match store.step(step_id) {
        Some(step) if engine.is_valid_transition(current, step_id) => step,
        other => {
            return Err(WorkflowError::InvalidTransition {
                step: other.map_or_else(|| step_id.to_string(), |s| s.action.clone()),
                from: engine.state_title(current),
            })
        }
    };

    let from_title = engine.state_title(current);
    let to_title = engine.state_title(Some(&step.to_state_id));
    let details = json!({
        "step": step.id,
        "action": step.action,
        "from": from_title,
        "to": to_title,
        "from_state_id": current,
        "to_state_id": step.to_state_id,
    });
    let to = step.to_state_id.clone();

    if let Some(row) = store.rows.get_mut(row_id) {
        row.workflow_state_id = Some(to.clone());
        row.version += 1;
        row.updated_at = Utc::now();
    }
    activity::record(store, row_id, ctx.actor(), LogAction::WorkflowTransition, details);
    info!(row = %row_id, from = %from_title, to = %to_title, "workflow transition");
    Ok(to)
}

/// [`transition`] by the step's action label (case-insensitive)
pub fn transition_by_action(
    store: &mut Store,
    ctx: &TenantContext,
    row_id: &RowId,
    action: &str,
) -> Result<StateId, WorkflowError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| WorkflowError::RowNotFound(row_id.to_string()))?;
    let engine = WorkflowEngine::new(store, &row.entity_id)?;
    engine.require_enabled()?;
    let current = row.workflow_state_id.as_ref();
    let step_id = engine
        .next_steps(current)
        .into_iter()
        .find(|s| s.action.eq_ignore_ascii_case(action.trim()))
        .map(|s| s.id.clone())
        .ok_or_else(|| WorkflowError::InvalidTransition {
            step: action.to_string(),
            from: engine.state_title(current),
        })?;
    transition(store, ctx, row_id, &step_id)
}

// =========================================================================
// Administration
// =========================================================================

fn require_super(ctx: &TenantContext) -> Result<(), WorkflowError> {
    if ctx.is_super() {
        Ok(())
    } else {
        Err(WorkflowError::PermissionDenied("change workflow definitions"))
    }
}

fn enabled_engine<'s>(store: &'s Store, entity_id: &EntityId) -> Result<WorkflowEngine<'s>, WorkflowError> {
    let engine = WorkflowEngine::new(store, entity_id)?;
    engine.require_enabled()?;
    Ok(engine)
}

/// Add a state at the end of the entity's state list
pub fn add_state(
    store: &mut Store,
    ctx: &TenantContext,
    entity_id: &EntityId,
    title: &str,
    color: Option<String>,
) -> Result<StateId, WorkflowError> {
    require_super(ctx)?;
    let engine = enabled_engine(store, entity_id)?;
    let title = title.trim();
    if engine
        .states()
        .iter()
        .any(|s| s.title.eq_ignore_ascii_case(title))
    {
        return Err(WorkflowError::DuplicateState(title.to_string()));
    }
    let order = engine.states().iter().map(|s| s.order).max().unwrap_or(0) + 1;

    let state = WorkflowState {
        id: StateId::new(),
        entity_id: entity_id.clone(),
        order,
        title: title.to_string(),
        color,
    };
    let id = state.id.clone();
    info!(entity = %entity_id, state = %title, "added workflow state");
    store.states.insert(id.clone(), state);
    Ok(id)
}

/// Add a step; `from = None` makes it an initial step
pub fn add_step(
    store: &mut Store,
    ctx: &TenantContext,
    entity_id: &EntityId,
    from: Option<&StateId>,
    to: &StateId,
    action: &str,
) -> Result<StepId, WorkflowError> {
    require_super(ctx)?;
    let engine = enabled_engine(store, entity_id)?;
    for state in from.into_iter().chain(Some(to)) {
        if !store.state(state).is_some_and(|s| &s.entity_id == entity_id) {
            return Err(WorkflowError::UnknownState(state.to_string()));
        }
    }
    let action = action.trim();
    if engine
        .next_steps(from)
        .iter()
        .any(|s| s.action.eq_ignore_ascii_case(action) || &s.to_state_id == to)
    {
        return Err(WorkflowError::DuplicateStep {
            action: action.to_string(),
            from: engine.state_title(from),
        });
    }
    let order = engine.steps().iter().map(|s| s.order).max().unwrap_or(0) + 1;

    let step = WorkflowStep {
        id: StepId::new(),
        entity_id: entity_id.clone(),
        order,
        from_state_id: from.cloned(),
        to_state_id: to.clone(),
        action: action.to_string(),
    };
    let id = step.id.clone();
    info!(entity = %entity_id, action = %action, "added workflow step");
    store.steps.insert(id.clone(), step);
    Ok(id)
}

pub fn remove_step(
    store: &mut Store,
    ctx: &TenantContext,
    step_id: &StepId,
) -> Result<(), WorkflowError> {
    require_super(ctx)?;
    store
        .steps
        .remove(step_id)
        .ok_or_else(|| WorkflowError::UnknownStep(step_id.to_string()))?;
    info!(step = %step_id, "removed workflow step");
    Ok(())
}

/// Remove a state, the steps touching it, and unset it on rows
///
/// Returns how many rows were reset.
pub fn remove_state(
    store: &mut Store,
    ctx: &TenantContext,
    state_id: &StateId,
) -> Result<usize, WorkflowError> {
    require_super(ctx)?;
    store
        .states
        .remove(state_id)
        .ok_or_else(|| WorkflowError::UnknownState(state_id.to_string()))?;
    store.steps.retain(|_, s| {
        &s.to_state_id != state_id && s.from_state_id.as_ref() != Some(state_id)
    });
    let mut reset = 0;
    for row in store.rows.values_mut() {
        if row.workflow_state_id.as_ref() == Some(state_id) {
            row.workflow_state_id = None;
            row.version += 1;
            reset += 1;
        }
    }
    info!(state = %state_id, rows = reset, "removed workflow state");
    Ok(reset)
}
