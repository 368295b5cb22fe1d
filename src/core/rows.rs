//! Row value store
//!
//! Rows keep their values EAV-style: one [`Value`] per property, missing
//! means unset. Every write is validated as a whole against the property
//! type system and applied all-or-nothing; a rejected write leaves the row
//! and its version untouched.

use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::activity;
use crate::core::context::TenantContext;
use crate::core::identity::{AccountId, EntityId, PropertyId, RowId, TenantId};
use crate::core::permissions;
use crate::core::store::Store;
use crate::entities::{LogAction, Property, PropertyType, Row, RowAccess, RowValue, Value};
use crate::schema::{self, TypeContext, ValidationError};

/// Errors from row operations
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Entity '{0}' is not active")]
    EntityInactive(String),

    #[error("Unknown property '{0}' for this row")]
    UnknownProperty(String),

    #[error("Permission denied: cannot {0} this row")]
    PermissionDenied(&'static str),

    #[error("A tenant is required to create rows")]
    NoTenant,

    #[error("Entity '{0}' requires a linked account")]
    LinkedAccountRequired(String),

    #[error("Row {0} is not a detail row")]
    NotDetailRow(String),

    #[error("Row {0} is a detail row")]
    IsDetailRow(String),

    #[error("Row was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RowError {
    /// Field-level errors, if this is a validation failure
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            RowError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

/// One value to write; `None` clears the property
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInput {
    pub property_id: PropertyId,
    pub value: Option<Value>,
}

impl ValueInput {
    pub fn set(property_id: PropertyId, value: Value) -> Self {
        Self {
            property_id,
            value: Some(value),
        }
    }

    pub fn clear(property_id: PropertyId) -> Self {
        Self {
            property_id,
            value: None,
        }
    }
}

/// Input for [`create_row`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRow {
    pub values: Vec<ValueInput>,
    pub linked_account_id: Option<AccountId>,
    /// Detail rows to create with the row, in line order
    pub details: Vec<Vec<ValueInput>>,
}

impl NewRow {
    pub fn with_values(values: Vec<ValueInput>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }
}

/// Result of a successful value write
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub version: u64,
    /// Names of properties whose value changed
    pub changed: Vec<String>,
    /// Dependent SELECTs cleared because their parent choice changed
    pub cleared: Vec<String>,
}

/// Display-ready value of one property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedValue {
    pub name: String,
    pub title: String,
    pub text: String,
}

// =========================================================================
// Validation pipeline
// =========================================================================

type Values = BTreeMap<PropertyId, Value>;

/// Properties stored on a row of the given kind
fn row_properties<'s>(store: &'s Store, entity_id: &EntityId, detail: bool) -> Vec<&'s Property> {
    store
        .properties_of(entity_id)
        .into_iter()
        .filter(|p| p.is_detail == detail)
        .collect()
}

/// Apply inputs onto a value map; blank values count as cleared
fn apply_inputs(
    props: &[&Property],
    values: &mut Values,
    inputs: Vec<ValueInput>,
) -> Result<BTreeSet<PropertyId>, RowError> {
    let mut touched = BTreeSet::new();
    for input in inputs {
        if !props.iter().any(|p| p.id == input.property_id) {
            return Err(RowError::UnknownProperty(input.property_id.to_string()));
        }
        match input.value.filter(|v| !v.is_blank()) {
            Some(value) => values.insert(input.property_id.clone(), value),
            None => values.remove(&input.property_id),
        };
        touched.insert(input.property_id);
    }
    Ok(touched)
}

/// Whether `option` is selectable under the parent's current choice
fn option_fits(child: &Property, value: &Value, values: &Values) -> bool {
    let Some(option) = value.as_option().and_then(|id| child.option(id)) else {
        return false;
    };
    let parent_choice = child
        .parent_id
        .as_ref()
        .and_then(|p| values.get(p))
        .and_then(|v| v.as_option());
    match &option.parent_id {
        None => true,
        Some(scope) => parent_choice == Some(scope),
    }
}

/// Clear untouched dependent SELECTs whose parent choice no longer scopes them
///
/// Repeats until stable so chains (country -> state -> city) clear fully.
fn clear_orphaned_children(
    props: &[&Property],
    values: &mut Values,
    touched: &BTreeSet<PropertyId>,
) -> Vec<String> {
    let mut cleared = Vec::new();
    loop {
        let orphan = props.iter().find(|p| {
            p.parent_id.is_some()
                && p.property_type == PropertyType::Select
                && !touched.contains(&p.id)
                && values.get(&p.id).is_some_and(|v| !option_fits(p, v, values))
        });
        let Some(orphan) = orphan else {
            return cleared;
        };
        values.remove(&orphan.id);
        cleared.push(orphan.name.clone());
    }
}

/// Validate a candidate value map
///
/// Touched properties get full validation; every other property is only
/// checked for presence when required.
fn check_values(
    store: &Store,
    props: &[&Property],
    tenant: &TenantId,
    values: &Values,
    touched: &BTreeSet<PropertyId>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for prop in props {
        let value = values.get(&prop.id);
        if !touched.contains(&prop.id) && value.is_some() {
            continue;
        }
        if value.is_none() && schema::handler_for(prop.property_type).slot().is_none() {
            continue;
        }
        let parent_option = prop
            .parent_id
            .as_ref()
            .and_then(|p| values.get(p))
            .and_then(|v| v.as_option());
        let ctx = TypeContext::new(Some(tenant), store).with_parent_option(parent_option);
        if let Err(e) = schema::validate(prop, value, &ctx) {
            errors.push(e);
        }
    }
    errors
}

/// Run the full write pipeline on a copy of the row's values
fn prepare_values(
    store: &Store,
    props: &[&Property],
    tenant: &TenantId,
    mut values: Values,
    inputs: Vec<ValueInput>,
    touch_all: bool,
) -> Result<(Values, Vec<String>), RowError> {
    let mut touched = apply_inputs(props, &mut values, inputs)?;
    if touch_all {
        touched.extend(values.keys().cloned());
    }
    let cleared = clear_orphaned_children(props, &mut values, &touched);
    let errors = check_values(store, props, tenant, &values, &touched);
    if errors.is_empty() {
        Ok((values, cleared))
    } else {
        Err(RowError::Validation(errors))
    }
}

fn default_values(props: &[&Property]) -> Values {
    props
        .iter()
        .filter_map(|p| schema::default_value(p).map(|v| (p.id.clone(), v)))
        .collect()
}

fn access(store: &Store, row: &Row, ctx: &TenantContext) -> RowAccess {
    permissions::resolve_in(store, row, ctx)
}

fn readable_row<'s>(store: &'s Store, ctx: &TenantContext, id: &RowId) -> Result<&'s Row, RowError> {
    let row = store
        .row(id)
        .ok_or_else(|| RowError::RowNotFound(id.to_string()))?;
    if !access(store, row, ctx).can_read {
        return Err(RowError::PermissionDenied("read"));
    }
    Ok(row)
}

// =========================================================================
// Operations
// =========================================================================

/// Create a row with its values and optional detail rows
///
/// Unset properties with a `defaultValue` attribute receive it. The row gets
/// the next folio of its entity and the grants of the entity's default
/// visibility.
pub fn create_row(
    store: &mut Store,
    ctx: &TenantContext,
    entity_id: &EntityId,
    new: NewRow,
) -> Result<RowId, RowError> {
    let actor = ctx.actor().ok_or(RowError::PermissionDenied("create"))?;
    let tenant = ctx.tenant().cloned().ok_or(RowError::NoTenant)?;
    let entity = store
        .entity(entity_id)
        .ok_or_else(|| RowError::EntityNotFound(entity_id.to_string()))?;
    if !entity.flags.active {
        return Err(RowError::EntityInactive(entity.slug.clone()));
    }
    if entity.flags.requires_linked_accounts && new.linked_account_id.is_none() {
        return Err(RowError::LinkedAccountRequired(entity.slug.clone()));
    }
    let visibility = entity.default_visibility;

    let props = row_properties(store, entity_id, false);
    let (values, _) = prepare_values(
        store,
        &props,
        &tenant,
        default_values(&props),
        new.values,
        true,
    )?;

    let detail_props = row_properties(store, entity_id, true);
    let mut details = Vec::with_capacity(new.details.len());
    let mut errors = Vec::new();
    for (i, inputs) in new.details.into_iter().enumerate() {
        match prepare_values(
            store,
            &detail_props,
            &tenant,
            default_values(&detail_props),
            inputs,
            true,
        ) {
            Ok((values, _)) => details.push(values),
            Err(RowError::Validation(errs)) => {
                errors.extend(errs.into_iter().map(|e| e.in_detail(i + 1)))
            }
            Err(other) => return Err(other),
        }
    }
    if !errors.is_empty() {
        return Err(RowError::Validation(errors));
    }

    let number = store.next_folio(entity_id, &tenant);
    let folio = store.entity(entity_id).map(|e| e.folio(number));
    let now = Utc::now();
    let mut row = Row {
        id: RowId::new(),
        entity_id: entity_id.clone(),
        tenant_id: tenant.clone(),
        parent_id: None,
        order: 0,
        folio,
        created_by: actor.clone(),
        linked_account_id: new.linked_account_id,
        workflow_state_id: None,
        visibility,
        permissions: Vec::new(),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    row.permissions = permissions::default_grants(&row, visibility);
    let row_id = row.id.clone();
    let folio_text = row.display_folio();

    for (i, values) in details.into_iter().enumerate() {
        let detail = Row {
            id: RowId::new(),
            parent_id: Some(row_id.clone()),
            order: i as u32 + 1,
            folio: None,
            visibility: Default::default(),
            permissions: Vec::new(),
            ..row.clone()
        };
        store.values.insert(detail.id.clone(), values);
        store.rows.insert(detail.id.clone(), detail);
    }
    store.values.insert(row_id.clone(), values);
    store.rows.insert(row_id.clone(), row);

    activity::record(
        store,
        &row_id,
        Some(actor),
        LogAction::Created,
        json!({ "folio": folio_text }),
    );
    info!(row = %row_id, folio = %folio_text, "created row");
    Ok(row_id)
}

/// Row the caller can read
pub fn get_row<'s>(store: &'s Store, ctx: &TenantContext, id: &RowId) -> Result<&'s Row, RowError> {
    readable_row(store, ctx, id)
}

/// Stored values of a row in property order
pub fn get_values(
    store: &Store,
    ctx: &TenantContext,
    row_id: &RowId,
) -> Result<Vec<RowValue>, RowError> {
    let row = readable_row(store, ctx, row_id)?;
    let Some(values) = store.values_of(row_id) else {
        return Ok(Vec::new());
    };
    Ok(row_properties(store, &row.entity_id, row.is_detail())
        .into_iter()
        .filter_map(|p| {
            values.get(&p.id).map(|v| RowValue {
                row_id: row_id.clone(),
                property_id: p.id.clone(),
                value: v.clone(),
            })
        })
        .collect())
}

/// Write values to a row, all-or-nothing
///
/// Last writer wins; see [`set_values_if_version`] for optimistic writes.
pub fn set_values(
    store: &mut Store,
    ctx: &TenantContext,
    row_id: &RowId,
    inputs: Vec<ValueInput>,
) -> Result<SetOutcome, RowError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| RowError::RowNotFound(row_id.to_string()))?;
    if !access(store, row, ctx).can_update {
        return Err(RowError::PermissionDenied("update"));
    }
    let props = row_properties(store, &row.entity_id, row.is_detail());
    let current = store.values_of(row_id).cloned().unwrap_or_default();
    let (values, cleared) = prepare_values(
        store,
        &props,
        &row.tenant_id,
        current.clone(),
        inputs,
        false,
    )?;

    let changed: Vec<String> = props
        .iter()
        .filter(|p| current.get(&p.id) != values.get(&p.id))
        .map(|p| p.name.clone())
        .collect();
    let log_row = row.parent_id.clone().unwrap_or_else(|| row_id.clone());

    store.values.insert(row_id.clone(), values);
    let version = bump_version(store, row_id);
    if !changed.is_empty() {
        activity::record(
            store,
            &log_row,
            ctx.actor(),
            LogAction::Updated,
            json!({ "changed": changed, "cleared": cleared }),
        );
    }
    debug!(row = %row_id, version, changed = changed.len(), "set values");
    Ok(SetOutcome {
        version,
        changed,
        cleared,
    })
}

/// [`set_values`] that fails if the row moved past `expected_version`
pub fn set_values_if_version(
    store: &mut Store,
    ctx: &TenantContext,
    row_id: &RowId,
    expected_version: u64,
    inputs: Vec<ValueInput>,
) -> Result<SetOutcome, RowError> {
    let actual = store
        .row(row_id)
        .ok_or_else(|| RowError::RowNotFound(row_id.to_string()))?
        .version;
    if actual != expected_version {
        return Err(RowError::VersionConflict {
            expected: expected_version,
            actual,
        });
    }
    set_values(store, ctx, row_id, inputs)
}

fn bump_version(store: &mut Store, row_id: &RowId) -> u64 {
    match store.rows.get_mut(row_id) {
        Some(row) => {
            row.version += 1;
            row.updated_at = Utc::now();
            row.version
        }
        None => 0,
    }
}

/// Append a detail row under `parent_id`
pub fn add_detail_row(
    store: &mut Store,
    ctx: &TenantContext,
    parent_id: &RowId,
    inputs: Vec<ValueInput>,
) -> Result<RowId, RowError> {
    let parent = store
        .row(parent_id)
        .ok_or_else(|| RowError::RowNotFound(parent_id.to_string()))?;
    if parent.is_detail() {
        return Err(RowError::IsDetailRow(parent_id.to_string()));
    }
    if !access(store, parent, ctx).can_update {
        return Err(RowError::PermissionDenied("update"));
    }
    let props = row_properties(store, &parent.entity_id, true);
    let (values, _) = prepare_values(
        store,
        &props,
        &parent.tenant_id,
        default_values(&props),
        inputs,
        true,
    )?;

    let order = store
        .detail_rows(parent_id)
        .iter()
        .map(|r| r.order)
        .max()
        .unwrap_or(0)
        + 1;
    let detail = Row {
        id: RowId::new(),
        parent_id: Some(parent_id.clone()),
        order,
        folio: None,
        visibility: Default::default(),
        permissions: Vec::new(),
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..parent.clone()
    };
    let id = detail.id.clone();
    store.values.insert(id.clone(), values);
    store.rows.insert(id.clone(), detail);
    bump_version(store, parent_id);

    activity::record(
        store,
        parent_id,
        ctx.actor(),
        LogAction::Updated,
        json!({ "detail_added": order }),
    );
    debug!(parent = %parent_id, detail = %id, order, "added detail row");
    Ok(id)
}

/// Remove a detail row and renumber the remaining lines
pub fn remove_detail_row(
    store: &mut Store,
    ctx: &TenantContext,
    detail_id: &RowId,
) -> Result<(), RowError> {
    let detail = store
        .row(detail_id)
        .ok_or_else(|| RowError::RowNotFound(detail_id.to_string()))?;
    let parent_id = detail
        .parent_id
        .clone()
        .ok_or_else(|| RowError::NotDetailRow(detail_id.to_string()))?;
    if !access(store, detail, ctx).can_update {
        return Err(RowError::PermissionDenied("update"));
    }
    let removed_order = detail.order;

    store.remove_row_cascade(detail_id);
    let remaining: Vec<RowId> = store
        .detail_rows(&parent_id)
        .iter()
        .map(|r| r.id.clone())
        .collect();
    for (i, id) in remaining.iter().enumerate() {
        if let Some(row) = store.rows.get_mut(id) {
            row.order = i as u32 + 1;
        }
    }
    bump_version(store, &parent_id);
    activity::record(
        store,
        &parent_id,
        ctx.actor(),
        LogAction::Updated,
        json!({ "detail_removed": removed_order }),
    );
    Ok(())
}

/// Detail rows of a row, in line order
pub fn detail_rows<'s>(
    store: &'s Store,
    ctx: &TenantContext,
    parent_id: &RowId,
) -> Result<Vec<&'s Row>, RowError> {
    readable_row(store, ctx, parent_id)?;
    Ok(store.detail_rows(parent_id))
}

/// Delete a row with its values and detail rows
///
/// Returns the ids of every removed row. Log entries are kept.
pub fn delete_row(
    store: &mut Store,
    ctx: &TenantContext,
    row_id: &RowId,
) -> Result<Vec<RowId>, RowError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| RowError::RowNotFound(row_id.to_string()))?;
    if row.is_detail() {
        return Err(RowError::IsDetailRow(row_id.to_string()));
    }
    if !access(store, row, ctx).can_delete {
        return Err(RowError::PermissionDenied("delete"));
    }
    let folio = row.display_folio();

    activity::record(
        store,
        row_id,
        ctx.actor(),
        LogAction::Deleted,
        json!({ "folio": folio }),
    );
    let removed = store.remove_row_cascade(row_id);
    info!(row = %row_id, removed = removed.len(), "deleted row");
    Ok(removed)
}

/// Top-level rows of an entity in the caller's tenant that the caller can read
pub fn list_rows<'s>(
    store: &'s Store,
    ctx: &TenantContext,
    entity_id: &EntityId,
) -> Result<Vec<&'s Row>, RowError> {
    if store.entity(entity_id).is_none() {
        return Err(RowError::EntityNotFound(entity_id.to_string()));
    }
    let Some(tenant) = ctx.tenant() else {
        return Ok(Vec::new());
    };
    Ok(store
        .rows_of(entity_id, tenant)
        .into_iter()
        .filter(|r| permissions::resolve(r, ctx).can_read)
        .collect())
}

/// Display text of every visible property of a row
pub fn formatted_values(
    store: &Store,
    ctx: &TenantContext,
    row_id: &RowId,
) -> Result<Vec<FormattedValue>, RowError> {
    let row = readable_row(store, ctx, row_id)?;
    let type_ctx = TypeContext::new(Some(&row.tenant_id), store);
    Ok(row_properties(store, &row.entity_id, row.is_detail())
        .into_iter()
        .filter(|p| !p.is_hidden)
        .map(|p| FormattedValue {
            name: p.name.clone(),
            title: p.title.clone(),
            text: schema::format(p, store.value(row_id, &p.id), &type_ctx),
        })
        .collect())
}

/// Turn `name=text` pairs into inputs by parsing each text per property type
///
/// An empty text clears the property. All parse failures are reported.
pub fn inputs_from_text(
    store: &Store,
    entity_id: &EntityId,
    detail: bool,
    pairs: &[(String, String)],
) -> Result<Vec<ValueInput>, RowError> {
    let props = row_properties(store, entity_id, detail);
    let mut inputs = Vec::with_capacity(pairs.len());
    let mut errors = Vec::new();
    for (name, raw) in pairs {
        let prop = props
            .iter()
            .find(|p| &p.name == name)
            .ok_or_else(|| RowError::UnknownProperty(name.clone()))?;
        if raw.trim().is_empty() {
            inputs.push(ValueInput::clear(prop.id.clone()));
            continue;
        }
        match schema::parse(prop, raw) {
            Ok(value) => inputs.push(ValueInput::set(prop.id.clone(), value)),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(inputs)
    } else {
        Err(RowError::Validation(errors))
    }
}

/// Turn a JSON object keyed by property name into inputs
pub fn inputs_from_json(
    store: &Store,
    entity_id: &EntityId,
    detail: bool,
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<ValueInput>, RowError> {
    let props = row_properties(store, entity_id, detail);
    let mut inputs = Vec::with_capacity(object.len());
    let mut errors = Vec::new();
    for (name, json) in object {
        let prop = props
            .iter()
            .find(|p| &p.name == name)
            .ok_or_else(|| RowError::UnknownProperty(name.clone()))?;
        match schema::from_json(prop, json) {
            Ok(value) => inputs.push(ValueInput {
                property_id: prop.id.clone(),
                value,
            }),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(inputs)
    } else {
        Err(RowError::Validation(errors))
    }
}

/// Values of a row as a JSON object keyed by property name
pub fn values_to_json(store: &Store, row: &Row) -> serde_json::Map<String, serde_json::Value> {
    let mut object = serde_json::Map::new();
    let Some(values) = store.values_of(&row.id) else {
        return object;
    };
    for prop in row_properties(store, &row.entity_id, row.is_detail()) {
        if let Some(value) = values.get(&prop.id) {
            object.insert(prop.name.clone(), schema::to_json(prop, value));
        }
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::UserIdentity;
    use crate::core::registry::{self, NewEntity, NewOption, NewProperty};
    use crate::entities::EntityFlags;
    use crate::schema::ValidationErrorKind;

    fn admin() -> TenantContext {
        TenantContext::user("acme", UserIdentity::new("root").super_user())
    }

    fn alice() -> TenantContext {
        TenantContext::user("acme", UserIdentity::new("alice"))
    }

    struct Fixture {
        store: Store,
        entity: EntityId,
        title: PropertyId,
        amount: PropertyId,
        country: PropertyId,
        city: PropertyId,
        quantity: PropertyId,
    }

    fn fixture() -> Fixture {
        let mut store = Store::new();
        let ctx = admin();
        let entity = registry::create_entity(
            &mut store,
            &ctx,
            NewEntity::new("Invoice", "invoices", "INV").with_flags(EntityFlags {
                has_workflow: true,
                ..EntityFlags::default()
            }),
        )
        .unwrap();
        let title = registry::add_property(
            &mut store,
            &ctx,
            &entity,
            NewProperty::new("title", "Title", PropertyType::Text).required(),
        )
        .unwrap();
        let amount = registry::add_property(
            &mut store,
            &ctx,
            &entity,
            NewProperty::new("amount", "Amount", PropertyType::Number)
                .attribute("min", "0")
                .attribute("defaultValue", "10"),
        )
        .unwrap();
        let country = registry::add_property(
            &mut store,
            &ctx,
            &entity,
            NewProperty::new("country", "Country", PropertyType::Select)
                .option(NewOption::new("mx"))
                .option(NewOption::new("us")),
        )
        .unwrap();
        let city = registry::add_property(
            &mut store,
            &ctx,
            &entity,
            NewProperty::new("city", "City", PropertyType::Select)
                .depends_on(country.clone())
                .option(NewOption::new("monterrey").under("mx"))
                .option(NewOption::new("austin").under("us")),
        )
        .unwrap();
        let quantity = registry::add_property(
            &mut store,
            &ctx,
            &entity,
            NewProperty::new("quantity", "Quantity", PropertyType::Number)
                .detail()
                .required(),
        )
        .unwrap();
        Fixture {
            store,
            entity,
            title,
            amount,
            country,
            city,
            quantity,
        }
    }

    fn option(store: &Store, prop: &PropertyId, value: &str) -> Value {
        let id = store.property(prop).unwrap().find_option(value).unwrap().id.clone();
        Value::OptionRef(id)
    }

    #[test]
    fn test_create_applies_defaults_and_folio() {
        let mut f = fixture();
        let ctx = alice();
        let row = create_row(
            &mut f.store,
            &ctx,
            &f.entity,
            NewRow::with_values(vec![ValueInput::set(f.title.clone(), Value::Text("First".into()))]),
        )
        .unwrap();
        assert_eq!(f.store.value(&row, &f.amount), Some(&Value::Number(10.0)));
        assert_eq!(f.store.row(&row).unwrap().display_folio(), "INV-0001");

        let second = create_row(
            &mut f.store,
            &ctx,
            &f.entity,
            NewRow::with_values(vec![ValueInput::set(f.title.clone(), Value::Text("Second".into()))]),
        )
        .unwrap();
        assert_eq!(f.store.row(&second).unwrap().display_folio(), "INV-0002");
    }

    #[test]
    fn test_required_missing_rejects_whole_write() {
        let mut f = fixture();
        let ctx = alice();
        let row = create_row(
            &mut f.store,
            &ctx,
            &f.entity,
            NewRow::with_values(vec![ValueInput::set(f.title.clone(), Value::Text("Keep".into()))]),
        )
        .unwrap();
        let before = f.store.values_of(&row).cloned();
        let version = f.store.row(&row).unwrap().version;

        let err = set_values(
            &mut f.store,
            &ctx,
            &row,
            vec![
                ValueInput::clear(f.title.clone()),
                ValueInput::set(f.amount.clone(), Value::Number(99.0)),
            ],
        )
        .unwrap_err();
        let errors = err.validation_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].property, "title");
        assert_eq!(errors[0].kind, ValidationErrorKind::Required);

        assert_eq!(f.store.values_of(&row).cloned(), before);
        assert_eq!(f.store.row(&row).unwrap().version, version);
    }

    #[test]
    fn test_changing_parent_clears_child() {
        let mut f = fixture();
        let ctx = alice();
        let mx = option(&f.store, &f.country, "mx");
        let us = option(&f.store, &f.country, "us");
        let monterrey = option(&f.store, &f.city, "monterrey");
        let row = create_row(
            &mut f.store,
            &ctx,
            &f.entity,
            NewRow::with_values(vec![
                ValueInput::set(f.title.clone(), Value::Text("Trip".into())),
                ValueInput::set(f.country.clone(), mx),
                ValueInput::set(f.city.clone(), monterrey),
            ]),
        )
        .unwrap();

        let outcome =
            set_values(&mut f.store, &ctx, &row, vec![ValueInput::set(f.country.clone(), us)]).unwrap();
        assert_eq!(outcome.cleared, vec!["city".to_string()]);
        assert!(f.store.value(&row, &f.city).is_none());
    }

    #[test]
    fn test_child_outside_parent_scope_rejected() {
        let mut f = fixture();
        let ctx = alice();
        let us = option(&f.store, &f.country, "us");
        let monterrey = option(&f.store, &f.city, "monterrey");
        let err = create_row(
            &mut f.store,
            &ctx,
            &f.entity,
            NewRow::with_values(vec![
                ValueInput::set(f.title.clone(), Value::Text("Trip".into())),
                ValueInput::set(f.country.clone(), us),
                ValueInput::set(f.city.clone(), monterrey),
            ]),
        )
        .unwrap_err();
        assert_eq!(err.validation_errors()[0].kind, ValidationErrorKind::InvalidOption);
        assert!(f.store.rows.is_empty());
    }

    #[test]
    fn test_version_conflict() {
        let mut f = fixture();
        let ctx = alice();
        let row = create_row(
            &mut f.store,
            &ctx,
            &f.entity,
            NewRow::with_values(vec![ValueInput::set(f.title.clone(), Value::Text("A".into()))]),
        )
        .unwrap();
        let v1 = f.store.row(&row).unwrap().version;
        let outcome = set_values_if_version(
            &mut f.store,
            &ctx,
            &row,
            v1,
            vec![ValueInput::set(f.title.clone(), Value::Text("B".into()))],
        )
        .unwrap();
        assert_eq!(outcome.version, v1 + 1);

        let err = set_values_if_version(
            &mut f.store,
            &ctx,
            &row,
            v1,
            vec![ValueInput::set(f.title.clone(), Value::Text("C".into()))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RowError::VersionConflict {
                expected: v1,
                actual: v1 + 1
            }
        );
    }

    #[test]
    fn test_detail_rows_renumber_and_cascade() {
        let mut f = fixture();
        let ctx = alice();
        let row = create_row(
            &mut f.store,
            &ctx,
            &f.entity,
            NewRow {
                values: vec![ValueInput::set(f.title.clone(), Value::Text("Order".into()))],
                details: vec![
                    vec![ValueInput::set(f.quantity.clone(), Value::Number(1.0))],
                    vec![ValueInput::set(f.quantity.clone(), Value::Number(2.0))],
                ],
                ..NewRow::default()
            },
        )
        .unwrap();
        let third = add_detail_row(
            &mut f.store,
            &ctx,
            &row,
            vec![ValueInput::set(f.quantity.clone(), Value::Number(3.0))],
        )
        .unwrap();
        let lines = detail_rows(&f.store, &ctx, &row).unwrap();
        assert_eq!(lines.len(), 3);
        let first = lines[0].id.clone();

        remove_detail_row(&mut f.store, &ctx, &first).unwrap();
        let lines = detail_rows(&f.store, &ctx, &row).unwrap();
        let orders: Vec<u32> = lines.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(lines[1].id, third);

        let removed = delete_row(&mut f.store, &admin(), &row).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(f.store.rows.is_empty());
        assert!(!f.store.logs_of(&row).is_empty());
    }

    #[test]
    fn test_detail_validation_is_indexed() {
        let mut f = fixture();
        let err = create_row(
            &mut f.store,
            &alice(),
            &f.entity,
            NewRow {
                values: vec![ValueInput::set(f.title.clone(), Value::Text("Order".into()))],
                details: vec![vec![ValueInput::set(f.quantity.clone(), Value::Number(1.0))], vec![]],
                ..NewRow::default()
            },
        )
        .unwrap_err();
        let errors = err.validation_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "quantity[2] is required");
    }

    #[test]
    fn test_private_row_hidden_from_others() {
        let mut f = fixture();
        let row = create_row(
            &mut f.store,
            &alice(),
            &f.entity,
            NewRow::with_values(vec![ValueInput::set(f.title.clone(), Value::Text("Mine".into()))]),
        )
        .unwrap();
        let bob = TenantContext::user("acme", UserIdentity::new("bob"));
        assert_eq!(get_values(&f.store, &bob, &row), Err(RowError::PermissionDenied("read")));
        assert!(list_rows(&f.store, &bob, &f.entity).unwrap().is_empty());
        assert_eq!(
            set_values(&mut f.store, &bob, &row, vec![]).unwrap_err(),
            RowError::PermissionDenied("update")
        );
        assert_eq!(list_rows(&f.store, &alice(), &f.entity).unwrap().len(), 1);
    }

    #[test]
    fn test_inputs_from_text_and_format() {
        let mut f = fixture();
        let ctx = alice();
        let inputs = inputs_from_text(
            &f.store,
            &f.entity,
            false,
            &[
                ("title".to_string(), "Widget".to_string()),
                ("amount".to_string(), "1,250".to_string()),
                ("country".to_string(), "mx".to_string()),
            ],
        )
        .unwrap();
        let row = create_row(&mut f.store, &ctx, &f.entity, NewRow::with_values(inputs)).unwrap();
        let formatted = formatted_values(&f.store, &ctx, &row).unwrap();
        let text: Vec<(&str, &str)> = formatted
            .iter()
            .map(|v| (v.name.as_str(), v.text.as_str()))
            .collect();
        assert_eq!(
            text,
            vec![("title", "Widget"), ("amount", "1250"), ("country", "mx"), ("city", "")]
        );

        let err = inputs_from_text(&f.store, &f.entity, false, &[("color".into(), "red".into())])
            .unwrap_err();
        assert_eq!(err, RowError::UnknownProperty("color".to_string()));
    }
}
