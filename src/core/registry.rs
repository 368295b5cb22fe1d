//! Entity and property registry
//!
//! Definition-time CRUD for entities, their typed properties and SELECT
//! options. Schema invariants are enforced here so the row store can assume
//! well-formed definitions: property names are camelCase and unique per
//! entity, slugs are unique, default properties are never deleted or
//! retyped, and every attribute constraint compiles.

use chrono::Utc;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::context::TenantContext;
use crate::core::identity::{EntityId, OptionId, PropertyId};
use crate::core::store::{CascadeReport, Store};
use crate::entities::{
    Entity, EntityFlags, Property, PropertyAttribute, PropertyOption, PropertyType, Visibility,
};
use crate::schema;

/// Errors from definition changes
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Only a super-role may change entity definitions")]
    PermissionDenied,

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Option not found: {0}")]
    OptionNotFound(String),

    #[error("Invalid slug '{0}': use lowercase letters, digits and single dashes")]
    InvalidSlug(String),

    #[error("Slug '{0}' is already used by another entity")]
    DuplicateSlug(String),

    #[error("Invalid folio prefix '{0}': use 1-8 uppercase letters or digits")]
    InvalidPrefix(String),

    #[error("Invalid property name '{0}': expected camelCase (e.g. dueDate)")]
    InvalidName(String),

    #[error("Property '{0}' already exists on this entity")]
    DuplicateName(String),

    #[error("Default property '{name}' cannot be {action}")]
    DefaultProperty { name: String, action: &'static str },

    #[error("Default visibility must be private, tenant or public (got {0})")]
    InvalidDefaultVisibility(Visibility),

    #[error("Invalid attribute '{attribute}' on '{property}': {reason}")]
    InvalidAttribute {
        property: String,
        attribute: String,
        reason: String,
    },

    #[error("Parent of '{0}' must be another SELECT property of the same entity")]
    InvalidParent(String),

    #[error("ENTITY property '{0}' needs an existing related entity")]
    MissingRelatedEntity(String),

    #[error("Options are only allowed on SELECT properties ('{0}')")]
    NotSelect(String),

    #[error("Option '{option}' is scoped to '{parent}', which is not an option of the parent property")]
    InvalidOptionParent { option: String, parent: String },

    #[error("Cannot move {0}: already at the edge")]
    CannotMove(MoveDirection),
}

/// Direction for swap-based reordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

impl fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveDirection::Up => write!(f, "up"),
            MoveDirection::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for MoveDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(MoveDirection::Up),
            "down" => Ok(MoveDirection::Down),
            _ => Err(format!("Unknown direction: {} (use up or down)", s)),
        }
    }
}

// =========================================================================
// Inputs
// =========================================================================

/// Input for [`create_entity`]
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub name: String,
    pub slug: String,
    pub title: String,
    pub title_plural: String,
    pub prefix: String,
    pub flags: EntityFlags,
    pub default_visibility: Visibility,
}

impl NewEntity {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, prefix: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            title_plural: format!("{}s", name),
            name,
            slug: slug.into(),
            prefix: prefix.into(),
            flags: EntityFlags::default(),
            default_visibility: Visibility::Private,
        }
    }

    pub fn titled(mut self, title: impl Into<String>, plural: impl Into<String>) -> Self {
        self.title = title.into();
        self.title_plural = plural.into();
        self
    }

    pub fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_default_visibility(mut self, visibility: Visibility) -> Self {
        self.default_visibility = visibility;
        self
    }
}

/// Partial update for [`update_entity`]
#[derive(Debug, Clone, Default)]
pub struct EntityUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub title_plural: Option<String>,
    pub prefix: Option<String>,
    pub flags: Option<EntityFlags>,
    pub default_visibility: Option<Visibility>,
}

/// One SELECT option to add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOption {
    pub value: String,
    pub name: Option<String>,
    pub color: Option<String>,
    /// Option of the parent property (id, value or name)
    pub parent: Option<String>,
}

impl NewOption {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: None,
            color: None,
            parent: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn colored(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn under(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Input for [`add_property`]
#[derive(Debug, Clone)]
pub struct NewProperty {
    pub name: String,
    pub title: String,
    pub property_type: PropertyType,
    pub parent_id: Option<PropertyId>,
    pub related_entity_id: Option<EntityId>,
    pub is_default: bool,
    pub is_required: bool,
    pub is_hidden: bool,
    pub is_detail: bool,
    pub attributes: Vec<PropertyAttribute>,
    pub options: Vec<NewOption>,
}

impl NewProperty {
    pub fn new(name: impl Into<String>, title: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            property_type: ty,
            parent_id: None,
            related_entity_id: None,
            is_default: false,
            is_required: false,
            is_hidden: false,
            is_detail: false,
            attributes: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn detail(mut self) -> Self {
        self.is_detail = true;
        self
    }

    /// System-provided property (not deletable, not retypable)
    pub fn system(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(PropertyAttribute::new(name, value));
        self
    }

    pub fn option(mut self, option: NewOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn depends_on(mut self, parent: PropertyId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn relates_to(mut self, entity: EntityId) -> Self {
        self.related_entity_id = Some(entity);
        self
    }
}

/// Partial update for [`update_property`]
#[derive(Debug, Clone, Default)]
pub struct PropertyUpdate {
    pub name: Option<String>,
    pub title: Option<String>,
    pub property_type: Option<PropertyType>,
    pub related_entity_id: Option<EntityId>,
    pub is_required: Option<bool>,
    pub is_hidden: Option<bool>,
    /// Attributes to insert or overwrite
    pub set_attributes: Vec<PropertyAttribute>,
    pub remove_attributes: Vec<String>,
}

// =========================================================================
// Lexical rules
// =========================================================================

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

fn is_valid_prefix(prefix: &str) -> bool {
    (1..=8).contains(&prefix.len())
        && prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn is_camel_case(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

fn require_super(ctx: &TenantContext) -> Result<(), RegistryError> {
    if ctx.is_super() {
        Ok(())
    } else {
        Err(RegistryError::PermissionDenied)
    }
}

fn check_default_visibility(visibility: Visibility) -> Result<(), RegistryError> {
    match visibility {
        Visibility::Private | Visibility::Tenant | Visibility::Public => Ok(()),
        other => Err(RegistryError::InvalidDefaultVisibility(other)),
    }
}

fn check_attributes(property: &Property) -> Result<(), RegistryError> {
    schema::check_attributes(property).map_err(|p| RegistryError::InvalidAttribute {
        property: property.name.clone(),
        attribute: p.attribute,
        reason: p.reason,
    })
}

// =========================================================================
// Entities
// =========================================================================

/// Look up an entity by slug
pub fn entity_by_slug<'s>(store: &'s Store, slug: &str) -> Result<&'s Entity, RegistryError> {
    store
        .entity_by_slug(slug)
        .ok_or_else(|| RegistryError::EntityNotFound(slug.to_string()))
}

/// Properties of an entity in display order
pub fn properties_of<'s>(
    store: &'s Store,
    entity_id: &EntityId,
) -> Result<Vec<&'s Property>, RegistryError> {
    if store.entity(entity_id).is_none() {
        return Err(RegistryError::EntityNotFound(entity_id.to_string()));
    }
    Ok(store.properties_of(entity_id))
}

pub fn create_entity(
    store: &mut Store,
    ctx: &TenantContext,
    new: NewEntity,
) -> Result<EntityId, RegistryError> {
    require_super(ctx)?;
    if !is_valid_slug(&new.slug) {
        return Err(RegistryError::InvalidSlug(new.slug));
    }
    if store.entity_by_slug(&new.slug).is_some() {
        return Err(RegistryError::DuplicateSlug(new.slug));
    }
    if !is_valid_prefix(&new.prefix) {
        return Err(RegistryError::InvalidPrefix(new.prefix));
    }
    check_default_visibility(new.default_visibility)?;

    let order = store.entities.values().map(|e| e.order).max().unwrap_or(0) + 1;
    let entity = Entity {
        id: EntityId::new(),
        name: new.name,
        slug: new.slug,
        title: new.title,
        title_plural: new.title_plural,
        order,
        prefix: new.prefix,
        flags: new.flags,
        default_visibility: new.default_visibility,
        created_at: Utc::now(),
    };
    let id = entity.id.clone();
    info!(entity = %id, slug = %entity.slug, "created entity");
    store.entities.insert(id.clone(), entity);
    Ok(id)
}

pub fn update_entity(
    store: &mut Store,
    ctx: &TenantContext,
    id: &EntityId,
    update: EntityUpdate,
) -> Result<(), RegistryError> {
    require_super(ctx)?;
    if store.entity(id).is_none() {
        return Err(RegistryError::EntityNotFound(id.to_string()));
    }
    if let Some(slug) = &update.slug {
        if !is_valid_slug(slug) {
            return Err(RegistryError::InvalidSlug(slug.clone()));
        }
        if store.entity_by_slug(slug).is_some_and(|e| &e.id != id) {
            return Err(RegistryError::DuplicateSlug(slug.clone()));
        }
    }
    if let Some(prefix) = &update.prefix {
        if !is_valid_prefix(prefix) {
            return Err(RegistryError::InvalidPrefix(prefix.clone()));
        }
    }
    if let Some(visibility) = update.default_visibility {
        check_default_visibility(visibility)?;
    }

    let entity = store
        .entities
        .get_mut(id)
        .ok_or_else(|| RegistryError::EntityNotFound(id.to_string()))?;
    if let Some(name) = update.name {
        entity.name = name;
    }
    if let Some(slug) = update.slug {
        entity.slug = slug;
    }
    if let Some(title) = update.title {
        entity.title = title;
    }
    if let Some(plural) = update.title_plural {
        entity.title_plural = plural;
    }
    if let Some(prefix) = update.prefix {
        entity.prefix = prefix;
    }
    if let Some(flags) = update.flags {
        entity.flags = flags;
    }
    if let Some(visibility) = update.default_visibility {
        entity.default_visibility = visibility;
    }
    info!(entity = %id, "updated entity");
    Ok(())
}

/// Hard-delete an entity with its properties, rows and workflow
///
/// ENTITY properties of other entities that pointed here are left in place;
/// their values resolve as unresolved.
pub fn delete_entity(
    store: &mut Store,
    ctx: &TenantContext,
    id: &EntityId,
) -> Result<CascadeReport, RegistryError> {
    require_super(ctx)?;
    if store.entity(id).is_none() {
        return Err(RegistryError::EntityNotFound(id.to_string()));
    }
    let report = store.remove_entity_cascade(id);
    info!(
        entity = %id,
        properties = report.properties,
        rows = report.rows,
        "deleted entity"
    );
    Ok(report)
}

/// Swap an entity with its neighbour in display order
pub fn move_entity(
    store: &mut Store,
    ctx: &TenantContext,
    id: &EntityId,
    direction: MoveDirection,
) -> Result<(), RegistryError> {
    require_super(ctx)?;
    let ordered: Vec<EntityId> = store.entities().iter().map(|e| e.id.clone()).collect();
    let pos = ordered
        .iter()
        .position(|e| e == id)
        .ok_or_else(|| RegistryError::EntityNotFound(id.to_string()))?;
    let other = neighbour(&ordered, pos, direction)?;

    for (i, eid) in ordered.iter().enumerate() {
        if let Some(e) = store.entities.get_mut(eid) {
            e.order = i as u32 + 1;
        }
    }
    let a = pos as u32 + 1;
    let b = store.entities.get(&other).map(|e| e.order).unwrap_or(a);
    if let Some(e) = store.entities.get_mut(id) {
        e.order = b;
    }
    if let Some(e) = store.entities.get_mut(&other) {
        e.order = a;
    }
    debug!(entity = %id, %direction, "moved entity");
    Ok(())
}

fn neighbour<T: Clone>(ordered: &[T], pos: usize, direction: MoveDirection) -> Result<T, RegistryError> {
    let target = match direction {
        MoveDirection::Up => pos.checked_sub(1),
        MoveDirection::Down => Some(pos + 1).filter(|p| *p < ordered.len()),
    };
    target
        .map(|p| ordered[p].clone())
        .ok_or(RegistryError::CannotMove(direction))
}

/// Renumber an entity's properties 1..n in display order
///
/// Default properties keep their place in the sequence.
fn renumber_properties(store: &mut Store, entity_id: &EntityId) {
    let ordered: Vec<PropertyId> = store
        .properties_of(entity_id)
        .iter()
        .map(|p| p.id.clone())
        .collect();
    for (i, id) in ordered.iter().enumerate() {
        if let Some(p) = store.properties.get_mut(id) {
            p.order = i as u32 + 1;
        }
    }
}

// =========================================================================
// Properties
// =========================================================================

/// Resolve [`NewOption`]s into stored options, scoping each under the parent
fn build_options(
    store: &Store,
    property: &Property,
    new_options: Vec<NewOption>,
    existing: &[PropertyOption],
) -> Result<Vec<PropertyOption>, RegistryError> {
    let parent = property.parent_id.as_ref().and_then(|p| store.property(p));
    let mut options = Vec::with_capacity(new_options.len());
    for (i, new) in new_options.into_iter().enumerate() {
        let parent_id = match (&new.parent, parent) {
            (None, _) => None,
            (Some(needle), Some(parent)) => Some(
                parent
                    .find_option(needle)
                    .map(|o| o.id.clone())
                    .ok_or_else(|| RegistryError::InvalidOptionParent {
                        option: new.value.clone(),
                        parent: needle.clone(),
                    })?,
            ),
            (Some(needle), None) => {
                return Err(RegistryError::InvalidOptionParent {
                    option: new.value.clone(),
                    parent: needle.clone(),
                })
            }
        };
        let id = existing
            .iter()
            .find(|o| o.value == new.value && o.parent_id == parent_id)
            .map(|o| o.id.clone())
            .unwrap_or_default();
        options.push(PropertyOption {
            id,
            parent_id,
            order: i as u32 + 1,
            value: new.value,
            name: new.name,
            color: new.color,
        });
    }
    Ok(options)
}

fn check_parent(store: &Store, property: &Property) -> Result<(), RegistryError> {
    let Some(parent_id) = &property.parent_id else {
        return Ok(());
    };
    let valid = property.property_type == PropertyType::Select
        && parent_id != &property.id
        && store.property(parent_id).is_some_and(|p| {
            p.entity_id == property.entity_id && p.property_type == PropertyType::Select
        });
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidParent(property.name.clone()))
    }
}

fn check_related_entity(store: &Store, property: &Property) -> Result<(), RegistryError> {
    if property.property_type != PropertyType::Entity {
        return Ok(());
    }
    match &property.related_entity_id {
        Some(id) if store.entity(id).is_some() => Ok(()),
        _ => Err(RegistryError::MissingRelatedEntity(property.name.clone())),
    }
}

/// Add a property at the end of the entity's property list
pub fn add_property(
    store: &mut Store,
    ctx: &TenantContext,
    entity_id: &EntityId,
    new: NewProperty,
) -> Result<PropertyId, RegistryError> {
    require_super(ctx)?;
    if store.entity(entity_id).is_none() {
        return Err(RegistryError::EntityNotFound(entity_id.to_string()));
    }
    if !is_camel_case(&new.name) {
        return Err(RegistryError::InvalidName(new.name));
    }
    if store.property_by_name(entity_id, &new.name).is_some() {
        return Err(RegistryError::DuplicateName(new.name));
    }
    if !new.options.is_empty() && new.property_type != PropertyType::Select {
        return Err(RegistryError::NotSelect(new.name));
    }

    let order = store
        .properties_of(entity_id)
        .iter()
        .map(|p| p.order)
        .max()
        .unwrap_or(0)
        + 1;
    let title = if new.title.trim().is_empty() {
        new.name.clone()
    } else {
        new.title
    };
    let mut property = Property {
        id: PropertyId::new(),
        entity_id: entity_id.clone(),
        parent_id: new.parent_id,
        related_entity_id: new
            .related_entity_id
            .filter(|_| new.property_type == PropertyType::Entity),
        order,
        name: new.name,
        title,
        property_type: new.property_type,
        is_default: new.is_default,
        is_dynamic: !new.is_default,
        is_required: new.is_required,
        is_hidden: new.is_hidden,
        is_detail: new.is_detail,
        attributes: new.attributes,
        options: Vec::new(),
    };
    check_parent(store, &property)?;
    check_related_entity(store, &property)?;
    property.options = build_options(store, &property, new.options, &[])?;
    check_attributes(&property)?;

    let id = property.id.clone();
    info!(
        entity = %entity_id,
        property = %property.name,
        property_type = %property.property_type,
        "added property"
    );
    store.properties.insert(id.clone(), property);
    Ok(id)
}

/// Clear every stored value of a property; returns how many were removed
fn clear_property_values(store: &mut Store, property_id: &PropertyId) -> usize {
    let mut cleared = 0;
    for values in store.values.values_mut() {
        if values.remove(property_id).is_some() {
            cleared += 1;
        }
    }
    cleared
}

/// Clear values pointing at options that no longer exist
fn clear_dangling_options(store: &mut Store, property_id: &PropertyId) -> usize {
    let Some(property) = store.properties.get(property_id) else {
        return 0;
    };
    let known: Vec<OptionId> = property.options.iter().map(|o| o.id.clone()).collect();
    let mut cleared = 0;
    for values in store.values.values_mut() {
        let dangling = values
            .get(property_id)
            .and_then(|v| v.as_option())
            .is_some_and(|id| !known.contains(id));
        if dangling {
            values.remove(property_id);
            cleared += 1;
        }
    }
    cleared
}

pub fn update_property(
    store: &mut Store,
    ctx: &TenantContext,
    id: &PropertyId,
    update: PropertyUpdate,
) -> Result<(), RegistryError> {
    require_super(ctx)?;
    let current = store
        .property(id)
        .ok_or_else(|| RegistryError::PropertyNotFound(id.to_string()))?;
    let mut next = current.clone();

    if let Some(name) = update.name.filter(|n| n != &current.name) {
        if current.is_default {
            return Err(RegistryError::DefaultProperty {
                name: current.name.clone(),
                action: "renamed",
            });
        }
        if !is_camel_case(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if store.property_by_name(&current.entity_id, &name).is_some() {
            return Err(RegistryError::DuplicateName(name));
        }
        next.name = name;
    }

    let retyped = update
        .property_type
        .filter(|ty| *ty != current.property_type);
    if let Some(ty) = retyped {
        if current.is_default {
            return Err(RegistryError::DefaultProperty {
                name: current.name.clone(),
                action: "retyped",
            });
        }
        next.property_type = ty;
        if ty != PropertyType::Select {
            next.options.clear();
            next.parent_id = None;
        }
        if ty != PropertyType::Entity {
            next.related_entity_id = None;
        }
    }
    if let Some(related) = update.related_entity_id {
        next.related_entity_id = Some(related);
    }
    if let Some(title) = update.title {
        next.title = title;
    }
    if let Some(required) = update.is_required {
        next.is_required = required;
    }
    if let Some(hidden) = update.is_hidden {
        next.is_hidden = hidden;
    }
    for attr in update.set_attributes {
        match next.attributes.iter_mut().find(|a| a.name == attr.name) {
            Some(existing) => existing.value = attr.value,
            None => next.attributes.push(attr),
        }
    }
    next.attributes
        .retain(|a| !update.remove_attributes.contains(&a.name));

    check_parent(store, &next)?;
    check_related_entity(store, &next)?;
    check_attributes(&next)?;

    let retargeted = next.related_entity_id != current.related_entity_id;
    let lost_select = retyped.is_some() && next.property_type != PropertyType::Select;
    store.properties.insert(id.clone(), next);

    if retyped.is_some() || retargeted {
        let cleared = clear_property_values(store, id);
        debug!(property = %id, cleared, "cleared values after retype");
    }
    if lost_select {
        for child in store.properties.values_mut() {
            if child.parent_id.as_ref() == Some(id) {
                child.parent_id = None;
            }
        }
    }
    info!(property = %id, "updated property");
    Ok(())
}

/// Delete a non-default property and its stored values
pub fn delete_property(
    store: &mut Store,
    ctx: &TenantContext,
    id: &PropertyId,
) -> Result<(), RegistryError> {
    require_super(ctx)?;
    let property = store
        .property(id)
        .ok_or_else(|| RegistryError::PropertyNotFound(id.to_string()))?;
    if property.is_default {
        return Err(RegistryError::DefaultProperty {
            name: property.name.clone(),
            action: "deleted",
        });
    }
    let name = property.name.clone();
    let entity_id = property.entity_id.clone();

    store.properties.remove(id);
    let cleared = clear_property_values(store, id);
    for child in store.properties.values_mut() {
        if child.parent_id.as_ref() == Some(id) {
            child.parent_id = None;
        }
    }
    renumber_properties(store, &entity_id);
    info!(property = %name, cleared, "deleted property");
    Ok(())
}

/// Non-default properties of an entity in order; these are the reorderable set
fn reorderable(store: &Store, entity_id: &EntityId) -> Vec<(PropertyId, u32)> {
    store
        .properties_of(entity_id)
        .into_iter()
        .filter(|p| !p.is_default)
        .map(|p| (p.id.clone(), p.order))
        .collect()
}

fn non_default<'s>(store: &'s Store, id: &PropertyId) -> Result<&'s Property, RegistryError> {
    let property = store
        .property(id)
        .ok_or_else(|| RegistryError::PropertyNotFound(id.to_string()))?;
    if property.is_default {
        return Err(RegistryError::DefaultProperty {
            name: property.name.clone(),
            action: "reordered",
        });
    }
    Ok(property)
}

/// Swap a property with the adjacent non-default sibling
pub fn move_property(
    store: &mut Store,
    ctx: &TenantContext,
    id: &PropertyId,
    direction: MoveDirection,
) -> Result<(), RegistryError> {
    require_super(ctx)?;
    let entity_id = non_default(store, id)?.entity_id.clone();
    renumber_properties(store, &entity_id);
    let siblings = reorderable(store, &entity_id);
    let pos = siblings
        .iter()
        .position(|(p, _)| p == id)
        .ok_or_else(|| RegistryError::PropertyNotFound(id.to_string()))?;
    let (other, other_order) = neighbour(&siblings, pos, direction)?;
    let own_order = siblings[pos].1;

    if let Some(p) = store.properties.get_mut(id) {
        p.order = other_order;
    }
    if let Some(p) = store.properties.get_mut(&other) {
        p.order = own_order;
    }
    debug!(property = %id, %direction, "moved property");
    Ok(())
}

/// Move a property to a 1-based position among the reorderable set
///
/// Default properties keep their place; the reorderable properties are
/// redistributed over the slots they already occupied.
pub fn reorder_property(
    store: &mut Store,
    ctx: &TenantContext,
    id: &PropertyId,
    position: usize,
) -> Result<(), RegistryError> {
    require_super(ctx)?;
    let entity_id = non_default(store, id)?.entity_id.clone();
    renumber_properties(store, &entity_id);
    let siblings = reorderable(store, &entity_id);
    let slots: Vec<u32> = siblings.iter().map(|(_, o)| *o).collect();

    let mut ids: Vec<PropertyId> = siblings.into_iter().map(|(p, _)| p).collect();
    if let Some(pos) = ids.iter().position(|p| p == id) {
        let moved = ids.remove(pos);
        let target = position.saturating_sub(1).min(ids.len());
        ids.insert(target, moved);
    }
    for (pid, order) in ids.iter().zip(slots) {
        if let Some(p) = store.properties.get_mut(pid) {
            p.order = order;
        }
    }
    debug!(property = %id, position, "reordered property");
    Ok(())
}

// =========================================================================
// Options
// =========================================================================

fn select_property<'s>(store: &'s Store, id: &PropertyId) -> Result<&'s Property, RegistryError> {
    let property = store
        .property(id)
        .ok_or_else(|| RegistryError::PropertyNotFound(id.to_string()))?;
    if property.property_type != PropertyType::Select {
        return Err(RegistryError::NotSelect(property.name.clone()));
    }
    Ok(property)
}

/// Append one option to a SELECT property
pub fn add_option(
    store: &mut Store,
    ctx: &TenantContext,
    property_id: &PropertyId,
    new: NewOption,
) -> Result<OptionId, RegistryError> {
    require_super(ctx)?;
    let property = select_property(store, property_id)?;
    let mut built = build_options(store, property, vec![new], &[])?;
    let mut option = built.remove(0);
    option.order = property.options.iter().map(|o| o.order).max().unwrap_or(0) + 1;
    let id = option.id.clone();

    if let Some(p) = store.properties.get_mut(property_id) {
        debug!(property = %p.name, option = %option.value, "added option");
        p.options.push(option);
    }
    Ok(id)
}

/// Replace all options of a SELECT property
///
/// Options whose value (and parent scope) survive keep their id; values
/// pointing at dropped options are cleared. Dependent child options scoped
/// under a dropped option are removed along with their values.
pub fn set_options(
    store: &mut Store,
    ctx: &TenantContext,
    property_id: &PropertyId,
    options: Vec<NewOption>,
) -> Result<Vec<OptionId>, RegistryError> {
    require_super(ctx)?;
    let property = select_property(store, property_id)?;
    let built = build_options(store, property, options, &property.options)?;
    let ids: Vec<OptionId> = built.iter().map(|o| o.id.clone()).collect();
    let dropped: Vec<OptionId> = property
        .options
        .iter()
        .filter(|o| !ids.contains(&o.id))
        .map(|o| o.id.clone())
        .collect();
    if let Some(p) = store.properties.get_mut(property_id) {
        p.options = built;
    }
    let cleared = clear_dangling_options(store, property_id);
    drop_scoped_options(store, property_id, &dropped);
    info!(property = %property_id, cleared, dropped = dropped.len(), "replaced options");
    Ok(ids)
}

/// Remove one option; child options scoped under it go too
pub fn remove_option(
    store: &mut Store,
    ctx: &TenantContext,
    property_id: &PropertyId,
    option_id: &OptionId,
) -> Result<(), RegistryError> {
    require_super(ctx)?;
    let property = select_property(store, property_id)?;
    if property.option(option_id).is_none() {
        return Err(RegistryError::OptionNotFound(option_id.to_string()));
    }

    if let Some(p) = store.properties.get_mut(property_id) {
        p.options.retain(|o| &o.id != option_id);
    }
    clear_dangling_options(store, property_id);
    drop_scoped_options(store, property_id, std::slice::from_ref(option_id));
    debug!(property = %property_id, option = %option_id, "removed option");
    Ok(())
}

/// Remove child options scoped under `dropped` parent options, then clear
/// child values that pointed at them
fn drop_scoped_options(store: &mut Store, property_id: &PropertyId, dropped: &[OptionId]) {
    if dropped.is_empty() {
        return;
    }
    let children: Vec<PropertyId> = store
        .properties
        .values()
        .filter(|p| p.parent_id.as_ref() == Some(property_id))
        .map(|p| p.id.clone())
        .collect();
    for child in children {
        let mut removed = Vec::new();
        if let Some(p) = store.properties.get_mut(&child) {
            p.options.retain(|o| match &o.parent_id {
                Some(parent) if dropped.contains(parent) => {
                    removed.push(o.id.clone());
                    false
                }
                _ => true,
            });
        }
        clear_dangling_options(store, &child);
        // Grandchildren scoped under the removed options go too
        drop_scoped_options(store, &child, &removed);
    }
}
