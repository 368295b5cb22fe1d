//! Caller context passed into every row-level operation
//!
//! There is no ambient session: the presentation layer, the API gateway and
//! the CLI each build a [`TenantContext`] and hand it to the core.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::identity::{ApiKeyId, GroupId, RoleId, TenantId, UserId};

/// Who performed a mutation (row creator, log author)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(UserId),
    ApiKey(ApiKeyId),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "{}", id),
            Actor::ApiKey(id) => write!(f, "api:{}", id),
        }
    }
}

/// An authenticated user with the principals it can be matched against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
    pub groups: Vec<GroupId>,
    /// Holds a super-role (bypasses row visibility)
    pub is_super: bool,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            groups: Vec::new(),
            is_super: false,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn super_user(mut self) -> Self {
        self.is_super = true;
        self
    }
}

/// The identity behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(UserIdentity),
    ApiKey(ApiKeyId),
}

/// Request-scoped tenant and caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Option<TenantId>,
    pub caller: Caller,
}

impl TenantContext {
    /// A signed-in user acting inside a tenant
    pub fn user(tenant_id: impl Into<TenantId>, identity: UserIdentity) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            caller: Caller::User(identity),
        }
    }

    /// An API key acting for the tenant that owns it
    pub fn api_key(tenant_id: TenantId, key_id: ApiKeyId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            caller: Caller::ApiKey(key_id),
        }
    }

    /// Unauthenticated visitor (public links)
    pub fn anonymous() -> Self {
        Self {
            tenant_id: None,
            caller: Caller::Anonymous,
        }
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.caller, Caller::Anonymous)
    }

    pub fn is_super(&self) -> bool {
        matches!(&self.caller, Caller::User(identity) if identity.is_super)
    }

    /// The actor recorded for mutations, if the caller is authenticated
    pub fn actor(&self) -> Option<Actor> {
        match &self.caller {
            Caller::Anonymous => None,
            Caller::User(identity) => Some(Actor::User(identity.user_id.clone())),
            Caller::ApiKey(key_id) => Some(Actor::ApiKey(key_id.clone())),
        }
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        match &self.caller {
            Caller::User(identity) => Some(identity),
            _ => None,
        }
    }

    /// Whether the caller is an authenticated member of `tenant`
    pub fn is_member_of(&self, tenant: &TenantId) -> bool {
        self.is_authenticated() && self.tenant_id.as_ref() == Some(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_actor() {
        let ctx = TenantContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert!(ctx.actor().is_none());
        assert!(!ctx.is_member_of(&TenantId::from("acme")));
    }

    #[test]
    fn test_user_context_membership() {
        let ctx = TenantContext::user("acme", UserIdentity::new("alice"));
        assert!(ctx.is_member_of(&TenantId::from("acme")));
        assert!(!ctx.is_member_of(&TenantId::from("globex")));
        assert_eq!(ctx.actor(), Some(Actor::User(UserId::from("alice"))));
        assert!(!ctx.is_super());
    }

    #[test]
    fn test_super_user_flag() {
        let ctx = TenantContext::user("acme", UserIdentity::new("root").super_user());
        assert!(ctx.is_super());
    }

    #[test]
    fn test_actor_display() {
        let key = ApiKeyId::new();
        assert_eq!(Actor::User(UserId::from("bob")).to_string(), "bob");
        assert_eq!(Actor::ApiKey(key.clone()).to_string(), format!("api:{}", key));
    }
}
