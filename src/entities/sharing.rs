//! Row visibility and permission grants

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::identity::{GroupId, RoleId, TenantId, UserId};

/// Sharing mode of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Tenant,
    Roles,
    Groups,
    Users,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Tenant => "tenant",
            Visibility::Roles => "roles",
            Visibility::Groups => "groups",
            Visibility::Users => "users",
            Visibility::Public => "public",
        }
    }

    /// Modes that enumerate explicit principals
    pub fn needs_targets(&self) -> bool {
        matches!(
            self,
            Visibility::Roles | Visibility::Groups | Visibility::Users
        )
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "tenant" => Ok(Visibility::Tenant),
            "roles" => Ok(Visibility::Roles),
            "groups" => Ok(Visibility::Groups),
            "users" => Ok(Visibility::Users),
            "public" => Ok(Visibility::Public),
            _ => Err(format!("Unknown visibility: {}", s)),
        }
    }
}

/// Principal a grant applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    Tenant(TenantId),
    Role(RoleId),
    Group(GroupId),
    User(UserId),
}

/// A grant record on a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowPermission {
    pub principal: Principal,
    pub can_comment: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl RowPermission {
    /// Grant with the default flags (comment and update, no delete)
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            can_comment: true,
            can_update: true,
            can_delete: false,
        }
    }
}

/// Effective rights of a caller on a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RowAccess {
    pub can_read: bool,
    pub can_comment: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl RowAccess {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            can_read: true,
            can_comment: true,
            can_update: true,
            can_delete: true,
        }
    }

    pub fn read_only() -> Self {
        Self {
            can_read: true,
            ..Self::default()
        }
    }

    /// Read access plus the flags of a grant
    pub fn from_grant(grant: &RowPermission) -> Self {
        Self {
            can_read: true,
            can_comment: grant.can_comment,
            can_update: grant.can_update,
            can_delete: grant.can_delete,
        }
    }

    pub fn union(self, other: RowAccess) -> Self {
        Self {
            can_read: self.can_read || other.can_read,
            can_comment: self.can_comment || other.can_comment,
            can_update: self.can_update || other.can_update,
            can_delete: self.can_delete || other.can_delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_parse_roundtrip() {
        for v in [
            Visibility::Private,
            Visibility::Tenant,
            Visibility::Roles,
            Visibility::Groups,
            Visibility::Users,
            Visibility::Public,
        ] {
            assert_eq!(v.to_string().parse::<Visibility>().unwrap(), v);
        }
        assert!("everyone".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_needs_targets() {
        assert!(Visibility::Groups.needs_targets());
        assert!(Visibility::Users.needs_targets());
        assert!(Visibility::Roles.needs_targets());
        assert!(!Visibility::Tenant.needs_targets());
        assert!(!Visibility::Public.needs_targets());
    }

    #[test]
    fn test_default_grant_flags() {
        let grant = RowPermission::new(Principal::Tenant(TenantId::from("acme")));
        assert!(grant.can_comment);
        assert!(grant.can_update);
        assert!(!grant.can_delete);
    }

    #[test]
    fn test_access_union() {
        let a = RowAccess::read_only();
        let b = RowAccess {
            can_update: true,
            ..RowAccess::none()
        };
        let merged = a.union(b);
        assert!(merged.can_read && merged.can_update);
        assert!(!merged.can_delete);
    }
}
