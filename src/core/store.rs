//! In-memory arena holding every record of the engine
//!
//! Records reference each other by id only. Removal of a parent goes through
//! the explicit cascade routines here so no index is left pointing at a
//! missing record.

use std::collections::BTreeMap;

use crate::core::identity::{
    ApiKeyId, EntityId, LogId, PropertyId, RowId, StateId, StepId, TenantId,
};
use crate::entities::{
    ApiKey, ApiKeyLog, Entity, Log, Property, Row, Value, WorkflowState, WorkflowStep,
};
use crate::schema::RelationLookup;

/// Everything removed by an entity cascade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub properties: usize,
    pub rows: usize,
    pub values: usize,
    pub states: usize,
    pub steps: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Store {
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    pub(crate) properties: BTreeMap<PropertyId, Property>,
    pub(crate) rows: BTreeMap<RowId, Row>,
    pub(crate) values: BTreeMap<RowId, BTreeMap<PropertyId, Value>>,
    pub(crate) states: BTreeMap<StateId, WorkflowState>,
    pub(crate) steps: BTreeMap<StepId, WorkflowStep>,
    pub(crate) logs: Vec<Log>,
    pub(crate) api_keys: BTreeMap<ApiKeyId, ApiKey>,
    pub(crate) api_logs: Vec<ApiKeyLog>,
    pub(crate) folio_counters: BTreeMap<(EntityId, TenantId), u64>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Entities and properties
    // =========================================================================

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// All entities in display order
    pub fn entities(&self) -> Vec<&Entity> {
        let mut entities: Vec<&Entity> = self.entities.values().collect();
        entities.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.slug.cmp(&b.slug)));
        entities
    }

    pub fn entity_by_slug(&self, slug: &str) -> Option<&Entity> {
        self.entities.values().find(|e| e.slug == slug)
    }

    pub fn property(&self, id: &PropertyId) -> Option<&Property> {
        self.properties.get(id)
    }

    /// Properties of an entity in display order
    pub fn properties_of(&self, entity_id: &EntityId) -> Vec<&Property> {
        let mut props: Vec<&Property> = self
            .properties
            .values()
            .filter(|p| &p.entity_id == entity_id)
            .collect();
        props.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        props
    }

    pub fn property_by_name(&self, entity_id: &EntityId, name: &str) -> Option<&Property> {
        self.properties
            .values()
            .find(|p| &p.entity_id == entity_id && p.name == name)
    }

    // =========================================================================
    // Rows and values
    // =========================================================================

    pub fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows.get(id)
    }

    /// Top-level rows of an entity inside one tenant, oldest first
    pub fn rows_of(&self, entity_id: &EntityId, tenant_id: &TenantId) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self
            .rows
            .values()
            .filter(|r| &r.entity_id == entity_id && &r.tenant_id == tenant_id && !r.is_detail())
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    /// Detail rows under a parent, in line order
    pub fn detail_rows(&self, parent_id: &RowId) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self
            .rows
            .values()
            .filter(|r| r.parent_id.as_ref() == Some(parent_id))
            .collect();
        rows.sort_by_key(|r| r.order);
        rows
    }

    pub fn values_of(&self, row_id: &RowId) -> Option<&BTreeMap<PropertyId, Value>> {
        self.values.get(row_id)
    }

    pub fn value(&self, row_id: &RowId, property_id: &PropertyId) -> Option<&Value> {
        self.values.get(row_id).and_then(|v| v.get(property_id))
    }

    /// Next folio number for an entity inside a tenant
    pub(crate) fn next_folio(&mut self, entity_id: &EntityId, tenant_id: &TenantId) -> u64 {
        let counter = self
            .folio_counters
            .entry((entity_id.clone(), tenant_id.clone()))
            .or_insert(0);
        *counter += 1;
        *counter
    }

    // =========================================================================
    // Workflow
    // =========================================================================

    pub fn state(&self, id: &StateId) -> Option<&WorkflowState> {
        self.states.get(id)
    }

    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.steps.get(id)
    }

    pub fn states_of(&self, entity_id: &EntityId) -> Vec<&WorkflowState> {
        let mut states: Vec<&WorkflowState> = self
            .states
            .values()
            .filter(|s| &s.entity_id == entity_id)
            .collect();
        states.sort_by_key(|s| s.order);
        states
    }

    pub fn steps_of(&self, entity_id: &EntityId) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self
            .steps
            .values()
            .filter(|s| &s.entity_id == entity_id)
            .collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    // =========================================================================
    // Logs and API keys
    // =========================================================================

    pub fn log(&self, id: &LogId) -> Option<&Log> {
        self.logs.iter().find(|l| &l.id == id)
    }

    pub(crate) fn log_mut(&mut self, id: &LogId) -> Option<&mut Log> {
        self.logs.iter_mut().find(|l| &l.id == id)
    }

    /// Log entries of a row, oldest first
    pub fn logs_of(&self, row_id: &RowId) -> Vec<&Log> {
        self.logs.iter().filter(|l| &l.row_id == row_id).collect()
    }

    pub fn api_key(&self, id: &ApiKeyId) -> Option<&ApiKey> {
        self.api_keys.get(id)
    }

    pub fn api_keys_of(&self, tenant_id: &TenantId) -> Vec<&ApiKey> {
        self.api_keys
            .values()
            .filter(|k| &k.tenant_id == tenant_id)
            .collect()
    }

    pub fn api_logs_of(&self, key_id: &ApiKeyId) -> Vec<&ApiKeyLog> {
        self.api_logs
            .iter()
            .filter(|l| &l.api_key_id == key_id)
            .collect()
    }

    // =========================================================================
    // Cascades
    // =========================================================================

    /// Remove a row with its values and detail rows; returns removed row ids
    ///
    /// Log entries stay: history is append-only.
    pub(crate) fn remove_row_cascade(&mut self, row_id: &RowId) -> Vec<RowId> {
        let mut removed = Vec::new();
        let mut pending = vec![row_id.clone()];
        while let Some(id) = pending.pop() {
            if self.rows.remove(&id).is_none() {
                continue;
            }
            self.values.remove(&id);
            pending.extend(
                self.rows
                    .values()
                    .filter(|r| r.parent_id.as_ref() == Some(&id))
                    .map(|r| r.id.clone()),
            );
            removed.push(id);
        }
        removed
    }

    /// Remove an entity and everything owned by it
    pub(crate) fn remove_entity_cascade(&mut self, entity_id: &EntityId) -> CascadeReport {
        let mut report = CascadeReport::default();
        if self.entities.remove(entity_id).is_none() {
            return report;
        }

        let row_ids: Vec<RowId> = self
            .rows
            .values()
            .filter(|r| &r.entity_id == entity_id)
            .map(|r| r.id.clone())
            .collect();
        report.values = row_ids
            .iter()
            .filter_map(|id| self.values.get(id))
            .map(|v| v.len())
            .sum();
        for id in &row_ids {
            report.rows += self.remove_row_cascade(id).len();
        }

        let before = self.properties.len();
        self.properties.retain(|_, p| &p.entity_id != entity_id);
        report.properties = before - self.properties.len();

        let before = self.states.len();
        self.states.retain(|_, s| &s.entity_id != entity_id);
        report.states = before - self.states.len();

        let before = self.steps.len();
        self.steps.retain(|_, s| &s.entity_id != entity_id);
        report.steps = before - self.steps.len();

        self.folio_counters.retain(|(e, _), _| e != entity_id);
        for key in self.api_keys.values_mut() {
            key.entities.retain(|p| &p.entity_id != entity_id);
        }
        report
    }
}

impl RelationLookup for Store {
    fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows.get(id)
    }
}
