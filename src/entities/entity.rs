//! Entity definition - a user-defined record type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::identity::EntityId;
use crate::entities::sharing::Visibility;

/// Feature switches of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityFlags {
    /// Shown as a top-level feature in navigation
    pub is_feature: bool,

    /// Rows are reachable through the API-key surface
    pub has_api: bool,

    /// Inactive entities reject new rows
    pub active: bool,

    /// Every row must name a linked account
    pub requires_linked_accounts: bool,

    pub has_tags: bool,
    pub has_comments: bool,
    pub has_tasks: bool,
    pub has_workflow: bool,
}

impl Default for EntityFlags {
    fn default() -> Self {
        Self {
            is_feature: false,
            has_api: false,
            active: true,
            requires_linked_accounts: false,
            has_tags: false,
            has_comments: true,
            has_tasks: false,
            has_workflow: false,
        }
    }
}

/// A user-defined record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    /// Machine name (unique)
    pub name: String,

    /// URL-safe name (unique), used by the API and public links
    pub slug: String,

    pub title: String,
    pub title_plural: String,

    pub order: u32,

    /// Folio prefix, e.g. "CON" for `CON-0001`
    pub prefix: String,

    #[serde(default)]
    pub flags: EntityFlags,

    /// Visibility applied to newly created rows
    #[serde(default)]
    pub default_visibility: Visibility,

    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Format the folio for the given sequence number
    pub fn folio(&self, number: u64) -> Folio {
        Folio {
            prefix: self.prefix.clone(),
            number,
        }
    }
}

/// Human-readable sequential row identifier (prefix + number)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Folio {
    pub prefix: String,
    pub number: u64,
}

impl fmt::Display for Folio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}", self.prefix, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folio_format() {
        let folio = Folio {
            prefix: "CON".to_string(),
            number: 7,
        };
        assert_eq!(folio.to_string(), "CON-0007");

        let big = Folio {
            prefix: "INV".to_string(),
            number: 123456,
        };
        assert_eq!(big.to_string(), "INV-123456");
    }

    #[test]
    fn test_default_flags() {
        let flags = EntityFlags::default();
        assert!(flags.active);
        assert!(flags.has_comments);
        assert!(!flags.has_api);
        assert!(!flags.has_workflow);
    }

    #[test]
    fn test_flags_partial_yaml() {
        let flags: EntityFlags = serde_yml::from_str("has_api: true\nhas_workflow: true\n").unwrap();
        assert!(flags.has_api);
        assert!(flags.has_workflow);
        assert!(flags.active);
    }
}
