//! Identifier types
//!
//! Records created by this crate (entities, properties, rows, ...) get
//! ULID-based ids carrying a short type prefix, e.g.
//! `ROW-01KCWY20F01B21V0G4E835NW3J`. Principals (tenants, users, roles,
//! groups, linked accounts) are owned by the surrounding application and are
//! kept as opaque strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Errors from parsing an identifier string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("Empty identifier")]
    Empty,

    #[error("Expected a {expected}- identifier, got '{id}'")]
    WrongPrefix { expected: &'static str, id: String },

    #[error("Invalid ULID in '{0}'")]
    InvalidUlid(String),
}

macro_rules! generated_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh identifier
            pub fn new() -> Self {
                Self(format!("{}-{}", $prefix, Ulid::new()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.is_empty() {
                    return Err(IdParseError::Empty);
                }
                let ulid_part = s
                    .strip_prefix(concat!($prefix, "-"))
                    .ok_or_else(|| IdParseError::WrongPrefix {
                        expected: $prefix,
                        id: s.to_string(),
                    })?;
                Ulid::from_string(ulid_part)
                    .map_err(|_| IdParseError::InvalidUlid(s.to_string()))?;
                Ok(Self(s.to_string()))
            }
        }
    };
}

macro_rules! principal_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

generated_id!(
    /// Identifier of an entity definition
    EntityId,
    "ENT"
);
generated_id!(
    /// Identifier of a property definition
    PropertyId,
    "PROP"
);
generated_id!(
    /// Identifier of a SELECT option
    OptionId,
    "OPT"
);
generated_id!(
    /// Identifier of a row (record instance)
    RowId,
    "ROW"
);
generated_id!(
    /// Identifier of a workflow state
    StateId,
    "WFS"
);
generated_id!(
    /// Identifier of a workflow step (allowed transition)
    StepId,
    "WFT"
);
generated_id!(
    /// Identifier of an activity log entry
    LogId,
    "LOG"
);
generated_id!(
    /// Identifier of an API key
    ApiKeyId,
    "KEY"
);

principal_id!(
    /// Tenant (account/workspace) owning rows
    TenantId
);
principal_id!(
    /// Application user
    UserId
);
principal_id!(
    /// Role assigned to users
    RoleId
);
principal_id!(
    /// User group
    GroupId
);
principal_id!(
    /// Linked account required by some entities
    AccountId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_has_prefix() {
        let id = RowId::new();
        assert!(id.as_str().starts_with("ROW-"));
        assert_eq!(id.as_str().len(), 4 + 26);
    }

    #[test]
    fn test_generated_id_parse_roundtrip() {
        let id = EntityId::new();
        let parsed: EntityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_generated_id_rejects_wrong_prefix() {
        let row = RowId::new();
        let err = row.as_str().parse::<EntityId>().unwrap_err();
        assert!(matches!(err, IdParseError::WrongPrefix { expected: "ENT", .. }));
        assert_eq!("".parse::<RowId>().unwrap_err(), IdParseError::Empty);
        assert!(matches!(
            "ROW-notaulid".parse::<RowId>().unwrap_err(),
            IdParseError::InvalidUlid(_)
        ));
    }

    #[test]
    fn test_principal_ids_are_opaque() {
        let tenant = TenantId::from("acme");
        assert_eq!(tenant.as_str(), "acme");
        assert_eq!(UserId::new("u-1").to_string(), "u-1");
    }
}
