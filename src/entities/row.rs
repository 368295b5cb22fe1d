//! Rows and their EAV values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::context::Actor;
use crate::core::identity::{AccountId, EntityId, OptionId, PropertyId, RowId, StateId, TenantId};
use crate::entities::entity::Folio;
use crate::entities::sharing::{RowPermission, Visibility};

/// Metadata of a stored file (the bytes live elsewhere)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub name: String,

    /// Storage key or URL of the file
    pub file: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

impl MediaRef {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            title: None,
            mime_type: None,
            size: None,
            public_url: None,
        }
    }
}

/// Physical slot a value occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageSlot {
    Text,
    Number,
    Date,
    Boolean,
    /// Reference to an option or another row
    Id,
    Media,
}

impl StorageSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageSlot::Text => "text",
            StorageSlot::Number => "number",
            StorageSlot::Date => "date",
            StorageSlot::Boolean => "boolean",
            StorageSlot::Id => "id",
            StorageSlot::Media => "media",
        }
    }
}

impl fmt::Display for StorageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored cell value; exactly one slot is populated by construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
    RelationRef(RowId),
    OptionRef(OptionId),
    MediaRefs(Vec<MediaRef>),
}

impl Value {
    pub fn slot(&self) -> StorageSlot {
        match self {
            Value::Text(_) => StorageSlot::Text,
            Value::Number(_) => StorageSlot::Number,
            Value::Date(_) => StorageSlot::Date,
            Value::Boolean(_) => StorageSlot::Boolean,
            Value::RelationRef(_) | Value::OptionRef(_) => StorageSlot::Id,
            Value::MediaRefs(_) => StorageSlot::Media,
        }
    }

    /// Blank text and empty media lists count as unset
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Text(s) => s.trim().is_empty(),
            Value::MediaRefs(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn as_option(&self) -> Option<&OptionId> {
        match self {
            Value::OptionRef(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RowId> {
        match self {
            Value::RelationRef(id) => Some(id),
            _ => None,
        }
    }
}

/// The EAV cell: one property's value on one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowValue {
    pub row_id: RowId,
    pub property_id: PropertyId,
    pub value: Value,
}

/// One record instance of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub entity_id: EntityId,
    pub tenant_id: TenantId,

    /// Set on detail rows (line items)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RowId>,

    /// Position among the parent's detail rows (0 for top-level rows)
    #[serde(default)]
    pub order: u32,

    /// Top-level rows only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folio: Option<Folio>,

    pub created_by: Actor,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_account_id: Option<AccountId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_state_id: Option<StateId>,

    #[serde(default)]
    pub visibility: Visibility,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<RowPermission>,

    /// Incremented by every value write, transition and sharing change
    #[serde(default)]
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row {
    pub fn is_detail(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Folio for display ("—" for detail rows)
    pub fn display_folio(&self) -> String {
        self.folio
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "—".to_string())
    }
}
