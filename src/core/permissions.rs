//! Row permission resolver and sharing
//!
//! [`resolve`] turns a row's visibility and grants into effective rights for
//! one caller. It is pure and total: every (row, caller) pair yields a
//! [`RowAccess`], never an error.

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::core::activity;
use crate::core::context::{Caller, TenantContext};
use crate::core::identity::{GroupId, RoleId, RowId, UserId};
use crate::core::store::Store;
use crate::entities::{LogAction, Principal, Row, RowAccess, RowPermission, Visibility};

/// Errors from sharing operations
#[derive(Debug, Error, PartialEq)]
pub enum ShareError {
    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Detail rows share the visibility of their parent")]
    DetailRow,

    #[error("Only the creator of the row or a super-role may change its sharing")]
    PermissionDenied,

    #[error("Visibility '{0}' needs at least one target")]
    UnsavableShareConfig(Visibility),
}

/// Effective rights of `ctx` on `row`
///
/// Detail rows should be resolved through [`resolve_in`], which looks at the
/// parent row.
pub fn resolve(row: &Row, ctx: &TenantContext) -> RowAccess {
    let member = ctx.is_member_of(&row.tenant_id);

    if ctx.actor().as_ref() == Some(&row.created_by) {
        return RowAccess::full();
    }
    match &ctx.caller {
        Caller::User(identity) if identity.is_super && member => return RowAccess::full(),
        // Keys are gated per entity and method before they reach a row
        Caller::ApiKey(_) if member => return RowAccess::full(),
        _ => {}
    }

    let mut access = match row.visibility {
        Visibility::Private => return RowAccess::none(),
        Visibility::Public => RowAccess::read_only(),
        _ => RowAccess::none(),
    };
    let identity = ctx.identity();
    for grant in &row.permissions {
        let matches = match &grant.principal {
            Principal::Tenant(tenant) => member && tenant == &row.tenant_id,
            Principal::Role(role) => {
                member && identity.is_some_and(|i| i.roles.contains(role))
            }
            Principal::Group(group) => {
                member && identity.is_some_and(|i| i.groups.contains(group))
            }
            Principal::User(user) => identity.is_some_and(|i| &i.user_id == user),
        };
        if matches {
            access = access.union(RowAccess::from_grant(grant));
        }
    }
    access
}

/// Resolve a stored row; detail rows inherit the rights on their parent
pub fn resolve_in(store: &Store, row: &Row, ctx: &TenantContext) -> RowAccess {
    let mut root = row;
    while let Some(parent) = root.parent_id.as_ref().and_then(|p| store.row(p)) {
        root = parent;
    }
    resolve(root, ctx)
}

/// Sharing request as posted by the sharing endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub visibility: Visibility,
    pub roles: Vec<RoleId>,
    pub groups: Vec<GroupId>,
    pub users: Vec<UserId>,
    pub can_comment: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl ShareRequest {
    /// Request with the default grant flags (comment, update)
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            roles: Vec::new(),
            groups: Vec::new(),
            users: Vec::new(),
            can_comment: true,
            can_update: true,
            can_delete: false,
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

    pub fn with_users(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.users.extend(users);
        self
    }

    pub fn with_flags(mut self, comment: bool, update: bool, delete: bool) -> Self {
        self.can_comment = comment;
        self.can_update = update;
        self.can_delete = delete;
        self
    }

    /// Principals this request grants to, for the given tenant
    fn principals(&self, row: &Row) -> Vec<Principal> {
        match self.visibility {
            Visibility::Private => Vec::new(),
            Visibility::Tenant | Visibility::Public => {
                vec![Principal::Tenant(row.tenant_id.clone())]
            }
            Visibility::Roles => self.roles.iter().cloned().map(Principal::Role).collect(),
            Visibility::Groups => self.groups.iter().cloned().map(Principal::Group).collect(),
            Visibility::Users => self.users.iter().cloned().map(Principal::User).collect(),
        }
    }

    /// Whether the request can be persisted at all
    pub fn check(&self) -> Result<(), ShareError> {
        let empty = match self.visibility {
            Visibility::Roles => self.roles.is_empty(),
            Visibility::Groups => self.groups.is_empty(),
            Visibility::Users => self.users.is_empty(),
            _ => false,
        };
        if empty {
            Err(ShareError::UnsavableShareConfig(self.visibility))
        } else {
            Ok(())
        }
    }
}

/// Grants built for a row's default visibility at creation time
pub fn default_grants(row: &Row, visibility: Visibility) -> Vec<RowPermission> {
    ShareRequest::new(visibility)
        .principals(row)
        .into_iter()
        .map(RowPermission::new)
        .collect()
}

/// Replace a row's visibility and grants
///
/// The request is checked before anything is touched, so a rejected
/// request leaves visibility and grants exactly as they were.
pub fn share(
    store: &mut Store,
    ctx: &TenantContext,
    row_id: &RowId,
    request: ShareRequest,
) -> Result<RowAccess, ShareError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| ShareError::RowNotFound(row_id.to_string()))?;
    if row.is_detail() {
        return Err(ShareError::DetailRow);
    }
    let owner = ctx.actor().as_ref() == Some(&row.created_by);
    let super_member = ctx.is_super() && ctx.is_member_of(&row.tenant_id);
    if !(owner || super_member) {
        return Err(ShareError::PermissionDenied);
    }
    request.check()?;

    let permissions: Vec<RowPermission> = request
        .principals(row)
        .into_iter()
        .map(|principal| RowPermission {
            principal,
            can_comment: request.can_comment,
            can_update: request.can_update,
            can_delete: request.can_delete,
        })
        .collect();
    let grants = permissions.len();

    let Some(row) = store.rows.get_mut(row_id) else {
        return Err(ShareError::RowNotFound(row_id.to_string()));
    };
    row.visibility = request.visibility;
    row.permissions = permissions;
    row.version += 1;
    row.updated_at = Utc::now();
    let access = resolve(row, ctx);

    activity::record(
        store,
        row_id,
        ctx.actor(),
        LogAction::Shared,
        json!({ "visibility": request.visibility, "grants": grants }),
    );
    info!(row = %row_id, visibility = %request.visibility, grants, "shared row");
    Ok(access)
}

/// Public link of a row
pub fn public_url(server_url: &str, entity_slug: &str, row_id: &RowId) -> String {
    format!(
        "{}/public/{}/{}",
        server_url.trim_end_matches('/'),
        entity_slug,
        row_id
    )
}

/// Public link of a stored row, only when it is shared publicly
pub fn public_link(store: &Store, server_url: &str, row_id: &RowId) -> Option<String> {
    let row = store.row(row_id)?;
    if row.visibility != Visibility::Public {
        return None;
    }
    let entity = store.entity(&row.entity_id)?;
    Some(public_url(server_url, &entity.slug, row_id))
}

/// Row behind a public link; anything not publicly shared is not found
pub fn public_row<'s>(
    store: &'s Store,
    entity_slug: &str,
    row_id: &RowId,
) -> Result<&'s Row, ShareError> {
    let entity = store
        .entity_by_slug(entity_slug)
        .ok_or_else(|| ShareError::EntityNotFound(entity_slug.to_string()))?;
    store
        .row(row_id)
        .filter(|r| r.entity_id == entity.id && r.visibility == Visibility::Public)
        .ok_or_else(|| ShareError::RowNotFound(row_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{Actor, UserIdentity};
    use crate::core::identity::{EntityId, TenantId};

    fn row(visibility: Visibility, permissions: Vec<RowPermission>) -> Row {
        let now = Utc::now();
        Row {
            id: RowId::new(),
            entity_id: EntityId::new(),
            tenant_id: TenantId::from("acme"),
            parent_id: None,
            order: 0,
            folio: None,
            created_by: Actor::User(UserId::from("alice")),
            linked_account_id: None,
            workflow_state_id: None,
            visibility,
            permissions,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn user(name: &str) -> TenantContext {
        TenantContext::user("acme", UserIdentity::new(name))
    }

    #[test]
    fn test_private_row() {
        let r = row(Visibility::Private, vec![]);
        assert_eq!(resolve(&r, &user("bob")), RowAccess::none());
        assert_eq!(resolve(&r, &user("alice")), RowAccess::full());

        let admin = TenantContext::user("acme", UserIdentity::new("root").super_user());
        assert_eq!(resolve(&r, &admin), RowAccess::full());

        let foreign_admin = TenantContext::user("globex", UserIdentity::new("root").super_user());
        assert_eq!(resolve(&r, &foreign_admin), RowAccess::none());
    }

    #[test]
    fn test_tenant_row_follows_grant_flags() {
        let r = row(
            Visibility::Tenant,
            vec![RowPermission::new(Principal::Tenant(TenantId::from("acme")))],
        );
        let access = resolve(&r, &user("bob"));
        assert!(access.can_read && access.can_comment && access.can_update);
        assert!(!access.can_delete);

        let outsider = TenantContext::user("globex", UserIdentity::new("bob"));
        assert_eq!(resolve(&r, &outsider), RowAccess::none());
    }

    #[test]
    fn test_group_row_only_enumerated() {
        let mut grant = RowPermission::new(Principal::Group(GroupId::from("legal")));
        grant.can_update = false;
        let r = row(Visibility::Groups, vec![grant]);

        let legal = TenantContext::user(
            "acme",
            UserIdentity::new("carol").with_groups([GroupId::from("legal")]),
        );
        let access = resolve(&r, &legal);
        assert!(access.can_read && access.can_comment);
        assert!(!access.can_update);

        assert_eq!(resolve(&r, &user("dave")), RowAccess::none());
    }

    #[test]
    fn test_public_row_anonymous_reads() {
        let r = row(
            Visibility::Public,
            vec![RowPermission::new(Principal::Tenant(TenantId::from("acme")))],
        );
        assert_eq!(resolve(&r, &TenantContext::anonymous()), RowAccess::read_only());

        let outsider = TenantContext::user("globex", UserIdentity::new("eve"));
        assert_eq!(resolve(&r, &outsider), RowAccess::read_only());
        assert!(resolve(&r, &user("bob")).can_update);
    }

    #[test]
    fn test_empty_target_list_rejected() {
        assert_eq!(
            ShareRequest::new(Visibility::Groups).check(),
            Err(ShareError::UnsavableShareConfig(Visibility::Groups))
        );
        assert_eq!(
            ShareRequest::new(Visibility::Users).check(),
            Err(ShareError::UnsavableShareConfig(Visibility::Users))
        );
        assert!(ShareRequest::new(Visibility::Tenant).check().is_ok());
    }

    #[test]
    fn test_public_url() {
        let id = RowId::new();
        assert_eq!(
            public_url("https://eb.example.com/", "contracts", &id),
            format!("https://eb.example.com/public/contracts/{}", id)
        );
    }
}
