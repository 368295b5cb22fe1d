//! Entity definitions as YAML
//!
//! Exports entities with their properties, options and workflow into a
//! portable document keyed by names instead of ids, and imports such a
//! document through the registry so every definition-time rule applies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use crate::core::context::TenantContext;
use crate::core::identity::{EntityId, StateId};
use crate::core::registry::{self, NewEntity, NewOption, NewProperty, RegistryError};
use crate::core::store::Store;
use crate::core::workflow::{self, WorkflowError};
use crate::entities::{EntityFlags, Property, PropertyType, Visibility};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("Entity '{entity}' has no property '{name}'")]
    UnknownProperty { entity: String, name: String },

    #[error("Entity '{entity}' has no workflow state '{title}'")]
    UnknownState { entity: String, title: String },
}

/// Top-level document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub slug: String,
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_plural: Option<String>,
    #[serde(default)]
    pub flags: EntityFlags,
    #[serde(default)]
    pub default_visibility: Visibility,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub detail: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
    /// Name of the parent SELECT property
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Slug of the related entity (ENTITY properties)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDef {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Value of the parent property's option this one is scoped under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
    #[serde(default)]
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    /// Source state title; absent for an initial step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub action: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// What [`import`] created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub entities: usize,
    pub properties: usize,
    pub states: usize,
    pub steps: usize,
}

impl Definition {
    pub fn from_yaml(text: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, DefinitionError> {
        Ok(serde_yml::to_string(self)?)
    }
}

// =========================================================================
// Export
// =========================================================================

fn property_def(store: &Store, property: &Property) -> PropertyDef {
    let parent = property.parent_id.as_ref().and_then(|id| store.property(id));
    let options = property
        .options
        .iter()
        .map(|o| OptionDef {
            value: o.value.clone(),
            name: o.name.clone(),
            color: o.color.clone(),
            parent: o
                .parent_id
                .as_ref()
                .and_then(|pid| parent.and_then(|p| p.option(pid)))
                .map(|po| po.value.clone()),
        })
        .collect();
    PropertyDef {
        name: property.name.clone(),
        title: property.title.clone(),
        property_type: property.property_type,
        required: property.is_required,
        hidden: property.is_hidden,
        detail: property.is_detail,
        system: property.is_default,
        depends_on: parent.map(|p| p.name.clone()),
        related: property
            .related_entity_id
            .as_ref()
            .and_then(|id| store.entity(id))
            .map(|e| e.slug.clone()),
        attributes: property
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect(),
        options,
    }
}

/// Export the given entities, or all of them when `slugs` is empty
pub fn export(store: &Store, slugs: &[String]) -> Result<Definition, DefinitionError> {
    let mut entities = Vec::new();
    let selected: Vec<_> = if slugs.is_empty() {
        store.entities()
    } else {
        slugs
            .iter()
            .map(|s| {
                store
                    .entity_by_slug(s)
                    .ok_or_else(|| DefinitionError::UnknownEntity(s.clone()))
            })
            .collect::<Result<_, _>>()?
    };
    for entity in selected {
        let states = store.states_of(&entity.id);
        let state_title = |id: &StateId| {
            states
                .iter()
                .find(|s| &s.id == id)
                .map(|s| s.title.clone())
        };
        let workflow = if states.is_empty() {
            None
        } else {
            Some(WorkflowDef {
                states: states
                    .iter()
                    .map(|s| StateDef {
                        title: s.title.clone(),
                        color: s.color.clone(),
                    })
                    .collect(),
                steps: store
                    .steps_of(&entity.id)
                    .iter()
                    .filter_map(|s| {
                        Some(StepDef {
                            from: match &s.from_state_id {
                                Some(id) => Some(state_title(id)?),
                                None => None,
                            },
                            to: state_title(&s.to_state_id)?,
                            action: s.action.clone(),
                        })
                    })
                    .collect(),
            })
        };
        entities.push(EntityDef {
            name: entity.name.clone(),
            slug: entity.slug.clone(),
            prefix: entity.prefix.clone(),
            title: Some(entity.title.clone()),
            title_plural: Some(entity.title_plural.clone()),
            flags: entity.flags.clone(),
            default_visibility: entity.default_visibility,
            properties: store
                .properties_of(&entity.id)
                .into_iter()
                .map(|p| property_def(store, p))
                .collect(),
            workflow,
        });
    }
    Ok(Definition { entities })
}

// =========================================================================
// Import
// =========================================================================

/// Create every entity of a definition
///
/// Entities are created first so ENTITY properties may reference entities
/// declared later in the same document.
pub fn import(
    store: &mut Store,
    ctx: &TenantContext,
    definition: &Definition,
) -> Result<ImportReport, DefinitionError> {
    let mut report = ImportReport::default();
    let mut created: Vec<(EntityId, &EntityDef)> = Vec::new();

    for def in &definition.entities {
        let mut new = NewEntity::new(&def.name, &def.slug, &def.prefix)
            .with_flags(def.flags.clone())
            .with_default_visibility(def.default_visibility);
        let title = def.title.clone().unwrap_or_else(|| new.title.clone());
        let plural = def
            .title_plural
            .clone()
            .unwrap_or_else(|| new.title_plural.clone());
        new = new.titled(title, plural);
        let id = registry::create_entity(store, ctx, new)?;
        created.push((id, def));
        report.entities += 1;
    }

    for (entity_id, def) in &created {
        for prop in &def.properties {
            let mut new = NewProperty::new(&prop.name, &prop.title, prop.property_type);
            new.is_required = prop.required;
            new.is_hidden = prop.hidden;
            new.is_detail = prop.detail;
            new.is_default = prop.system;
            for (name, value) in &prop.attributes {
                new = new.attribute(name, value);
            }
            if let Some(parent) = &prop.depends_on {
                let parent_id = store
                    .property_by_name(entity_id, parent)
                    .map(|p| p.id.clone())
                    .ok_or_else(|| DefinitionError::UnknownProperty {
                        entity: def.slug.clone(),
                        name: parent.clone(),
                    })?;
                new = new.depends_on(parent_id);
            }
            if let Some(slug) = &prop.related {
                let related = store
                    .entity_by_slug(slug)
                    .map(|e| e.id.clone())
                    .ok_or_else(|| DefinitionError::UnknownEntity(slug.clone()))?;
                new = new.relates_to(related);
            }
            for option in &prop.options {
                let mut o = NewOption::new(&option.value);
                o.name = option.name.clone();
                o.color = option.color.clone();
                o.parent = option.parent.clone();
                new = new.option(o);
            }
            registry::add_property(store, ctx, entity_id, new)?;
            report.properties += 1;
        }

        let Some(wf) = &def.workflow else {
            continue;
        };
        let mut states: Vec<(String, StateId)> = Vec::new();
        for state in &wf.states {
            let id = workflow::add_state(store, ctx, entity_id, &state.title, state.color.clone())?;
            states.push((state.title.clone(), id));
            report.states += 1;
        }
        let lookup = |title: &str| {
            states
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(title))
                .map(|(_, id)| id.clone())
                .ok_or_else(|| DefinitionError::UnknownState {
                    entity: def.slug.clone(),
                    title: title.to_string(),
                })
        };
        for step in &wf.steps {
            let from = step.from.as_deref().map(lookup).transpose()?;
            let to = lookup(&step.to)?;
            workflow::add_step(store, ctx, entity_id, from.as_ref(), &to, &step.action)?;
            report.steps += 1;
        }
    }

    info!(
        entities = report.entities,
        properties = report.properties,
        states = report.states,
        steps = report.steps,
        "imported definition"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::UserIdentity;

    const CONTRACTS: &str = r#"
entities:
  - name: Client
    slug: clients
    prefix: CLI
    properties:
      - name: name
        title: Name
        type: TEXT
        required: true
  - name: Contract
    slug: contracts
    prefix: CON
    default_visibility: tenant
    flags:
      has_workflow: true
    properties:
      - name: client
        title: Client
        type: ENTITY
        related: clients
      - name: region
        title: Region
        type: SELECT
        options:
          - value: eu
          - value: us
      - name: office
        title: Office
        type: SELECT
        depends_on: region
        options:
          - value: paris
            parent: eu
          - value: boston
            parent: us
    workflow:
      states:
        - title: Draft
        - title: Sent
      steps:
        - to: Draft
          action: Start
        - from: Draft
          to: Sent
          action: Send
"#;

    fn admin() -> TenantContext {
        TenantContext::user("acme", UserIdentity::new("root").super_user())
    }

    #[test]
    fn test_import_definition() {
        let mut store = Store::new();
        let def = Definition::from_yaml(CONTRACTS).unwrap();
        let report = import(&mut store, &admin(), &def).unwrap();
        assert_eq!(
            report,
            ImportReport {
                entities: 2,
                properties: 4,
                states: 2,
                steps: 2
            }
        );

        let contracts = store.entity_by_slug("contracts").unwrap();
        assert_eq!(contracts.default_visibility, Visibility::Tenant);
        let office = store.property_by_name(&contracts.id, "office").unwrap();
        let region = store.property_by_name(&contracts.id, "region").unwrap();
        assert_eq!(office.parent_id.as_ref(), Some(&region.id));
        let eu = region.find_option("eu").unwrap();
        assert_eq!(office.find_option("paris").unwrap().parent_id.as_ref(), Some(&eu.id));
    }

    #[test]
    fn test_export_reimports() {
        let mut store = Store::new();
        import(&mut store, &admin(), &Definition::from_yaml(CONTRACTS).unwrap()).unwrap();
        let exported = export(&store, &[]).unwrap();
        let yaml = exported.to_yaml().unwrap();

        let mut fresh = Store::new();
        import(&mut fresh, &admin(), &Definition::from_yaml(&yaml).unwrap()).unwrap();
        assert_eq!(export(&fresh, &[]).unwrap(), exported);
    }

    #[test]
    fn test_unknown_related_entity() {
        let yaml = r#"
entities:
  - name: Contract
    slug: contracts
    prefix: CON
    properties:
      - name: client
        title: Client
        type: ENTITY
        related: clients
"#;
        let mut store = Store::new();
        let err = import(&mut store, &admin(), &Definition::from_yaml(yaml).unwrap()).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownEntity(s) if s == "clients"));
    }
}
