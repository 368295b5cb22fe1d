//! Activity log records and API access records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::context::Actor;
use crate::core::identity::{ApiKeyId, EntityId, LogId, RowId, TenantId, UserId};

/// Kind of activity recorded against a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Created,
    Updated,
    Deleted,
    Comment,
    WorkflowTransition,
    Shared,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Created => "created",
            LogAction::Updated => "updated",
            LogAction::Deleted => "deleted",
            LogAction::Comment => "comment",
            LogAction::WorkflowTransition => "workflow_transition",
            LogAction::Shared => "shared",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(LogAction::Created),
            "updated" => Ok(LogAction::Updated),
            "deleted" => Ok(LogAction::Deleted),
            "comment" => Ok(LogAction::Comment),
            "workflow_transition" => Ok(LogAction::WorkflowTransition),
            "shared" => Ok(LogAction::Shared),
            _ => Err(format!("Unknown log action: {}", s)),
        }
    }
}

/// A reaction on a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub actor: Actor,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only activity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub id: LogId,
    pub row_id: RowId,

    /// None for system-generated entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,

    pub action: LogAction,

    #[serde(default)]
    pub details: serde_json::Value,

    pub created_at: DateTime<Utc>,

    /// Soft deletion of comments
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
}

/// HTTP-ish method of an API call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
            ApiMethod::Put => "PUT",
            ApiMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApiMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(ApiMethod::Get),
            "POST" => Ok(ApiMethod::Post),
            "PUT" => Ok(ApiMethod::Put),
            "DELETE" => Ok(ApiMethod::Delete),
            _ => Err(format!("Unknown API method: {}", s)),
        }
    }
}

/// CRUD flags of an API key on one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyEntityPermission {
    pub entity_id: EntityId,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

impl ApiKeyEntityPermission {
    pub fn allows(&self, method: ApiMethod) -> bool {
        match method {
            ApiMethod::Get => self.read,
            ApiMethod::Post => self.create,
            ApiMethod::Put => self.update,
            ApiMethod::Delete => self.delete,
        }
    }
}

/// An API key; only the SHA-256 hash of its secret is kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub tenant_id: TenantId,
    pub alias: String,
    pub key_hash: String,
    pub created_by: UserId,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entities: Vec<ApiKeyEntityPermission>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn permission_for(&self, entity_id: &EntityId) -> Option<&ApiKeyEntityPermission> {
        self.entities.iter().find(|p| &p.entity_id == entity_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// One API call, successful or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyLog {
    pub api_key_id: ApiKeyId,
    pub method: ApiMethod,
    pub endpoint: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_permission_allows() {
        let perm = ApiKeyEntityPermission {
            entity_id: EntityId::new(),
            create: true,
            read: true,
            update: false,
            delete: false,
        };
        assert!(perm.allows(ApiMethod::Get));
        assert!(perm.allows(ApiMethod::Post));
        assert!(!perm.allows(ApiMethod::Put));
        assert!(!perm.allows(ApiMethod::Delete));
    }

    #[test]
    fn test_log_action_roundtrip() {
        for action in [
            LogAction::Created,
            LogAction::Updated,
            LogAction::Deleted,
            LogAction::Comment,
            LogAction::WorkflowTransition,
            LogAction::Shared,
        ] {
            assert_eq!(action.as_str().parse::<LogAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_api_key_expiry() {
        let now = Utc::now();
        let mut key = ApiKey {
            id: ApiKeyId::new(),
            tenant_id: TenantId::from("acme"),
            alias: "ci".to_string(),
            key_hash: String::new(),
            created_by: UserId::from("alice"),
            active: true,
            expires_at: None,
            entities: vec![],
            created_at: now,
        };
        assert!(!key.is_expired(now));
        key.expires_at = Some(now - chrono::Duration::minutes(1));
        assert!(key.is_expired(now));
    }
}
