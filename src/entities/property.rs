//! Property definitions - typed fields of an entity

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::identity::{EntityId, OptionId, PropertyId};

/// Field types
///
/// USER, ROLE and FORMULA can be declared but hold no values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Text,
    Number,
    Date,
    Boolean,
    Select,
    Entity,
    Media,
    User,
    Role,
    Formula,
}

impl PropertyType {
    pub fn all() -> &'static [PropertyType] {
        &[
            PropertyType::Text,
            PropertyType::Number,
            PropertyType::Date,
            PropertyType::Boolean,
            PropertyType::Select,
            PropertyType::Entity,
            PropertyType::Media,
            PropertyType::User,
            PropertyType::Role,
            PropertyType::Formula,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "TEXT",
            PropertyType::Number => "NUMBER",
            PropertyType::Date => "DATE",
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::Select => "SELECT",
            PropertyType::Entity => "ENTITY",
            PropertyType::Media => "MEDIA",
            PropertyType::User => "USER",
            PropertyType::Role => "ROLE",
            PropertyType::Formula => "FORMULA",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyType::all()
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("Unknown property type: {}", s))
    }
}

/// Well-known attribute names
pub mod attr {
    pub const PATTERN: &str = "pattern";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const PLACEHOLDER: &str = "placeholder";
    pub const EDITOR: &str = "editor";
    pub const DEFAULT_VALUE: &str = "defaultValue";
    pub const HINT_TEXT: &str = "hintText";
    pub const HELP_TEXT: &str = "helpText";
    pub const ROWS: &str = "rows";
    pub const STEP: &str = "step";
    pub const DECIMALS: &str = "decimals";
}

/// One free-form name/value attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAttribute {
    pub name: String,
    pub value: String,
}

impl PropertyAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One SELECT choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOption {
    pub id: OptionId,

    /// Option of the parent property this choice is scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<OptionId>,

    pub order: u32,

    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl PropertyOption {
    /// Display label (name, falling back to value)
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.value)
    }
}

/// A typed field belonging to one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub entity_id: EntityId,

    /// Parent SELECT property whose options scope this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PropertyId>,

    /// Entity referenced by an ENTITY property
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity_id: Option<EntityId>,

    pub order: u32,

    /// Machine key (camelCase, unique within the entity)
    pub name: String,

    pub title: String,

    #[serde(rename = "type")]
    pub property_type: PropertyType,

    /// System-provided: cannot be deleted, retyped or reordered
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_hidden: bool,
    /// Line-item field stored on detail rows
    #[serde(default)]
    pub is_detail: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<PropertyAttribute>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PropertyOption>,
}

impl Property {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Numeric attribute, ignoring values that do not parse
    pub fn numeric_attribute(&self, name: &str) -> Option<f64> {
        self.attribute(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn option(&self, id: &OptionId) -> Option<&PropertyOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    /// Find an option by id, value or name (case-insensitive for value/name)
    pub fn find_option(&self, needle: &str) -> Option<&PropertyOption> {
        let needle = needle.trim();
        self.options.iter().find(|o| {
            o.id.as_str() == needle
                || o.value.eq_ignore_ascii_case(needle)
                || o.name
                    .as_deref()
                    .map(|n| n.eq_ignore_ascii_case(needle))
                    .unwrap_or(false)
        })
    }

    /// Options selectable under the given parent selection, in order
    pub fn options_under(&self, parent: Option<&OptionId>) -> Vec<&PropertyOption> {
        let mut options: Vec<&PropertyOption> = self
            .options
            .iter()
            .filter(|o| match (&o.parent_id, self.parent_id.is_some()) {
                (Some(p), true) => Some(p) == parent,
                _ => true,
            })
            .collect();
        options.sort_by_key(|o| o.order);
        options
    }
}
