//! Activity log recorder
//!
//! Append-only history of row mutations, comments and workflow transitions.
//! The only in-place changes allowed are reactions on comments and the
//! soft-delete flag, which hides a comment's text from formatting.

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::core::context::{Actor, TenantContext};
use crate::core::identity::{LogId, RowId};
use crate::core::permissions;
use crate::core::store::Store;
use crate::entities::{Log, LogAction, Reaction};

#[derive(Debug, Error, PartialEq)]
pub enum ActivityError {
    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Log entry not found: {0}")]
    LogNotFound(String),

    #[error("Log entry {0} is not a comment")]
    NotAComment(String),

    #[error("Comment {0} has been deleted")]
    CommentDeleted(String),

    #[error("Comments are disabled for this entity")]
    CommentsDisabled,

    #[error("Comment text is empty")]
    EmptyComment,

    #[error("Permission denied: cannot {0}")]
    PermissionDenied(&'static str),
}

/// Append one entry to the log
pub fn record(
    store: &mut Store,
    row_id: &RowId,
    actor: Option<Actor>,
    action: LogAction,
    details: serde_json::Value,
) -> LogId {
    let log = Log {
        id: LogId::new(),
        row_id: row_id.clone(),
        actor,
        action,
        details,
        created_at: Utc::now(),
        is_deleted: false,
        reactions: Vec::new(),
    };
    let id = log.id.clone();
    debug!(row = %row_id, action = %action, log = %id, "recorded activity");
    store.logs.push(log);
    id
}

/// Post a comment on a row
pub fn add_comment(
    store: &mut Store,
    ctx: &TenantContext,
    row_id: &RowId,
    text: &str,
) -> Result<LogId, ActivityError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| ActivityError::RowNotFound(row_id.to_string()))?;
    let comments_enabled = store
        .entity(&row.entity_id)
        .is_some_and(|e| e.flags.has_comments);
    if !comments_enabled {
        return Err(ActivityError::CommentsDisabled);
    }
    if !permissions::resolve_in(store, row, ctx).can_comment {
        return Err(ActivityError::PermissionDenied("comment"));
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(ActivityError::EmptyComment);
    }
    Ok(record(
        store,
        row_id,
        ctx.actor(),
        LogAction::Comment,
        json!({ "text": text }),
    ))
}

/// Comment entry the caller may at least see
fn visible_comment<'s>(
    store: &'s Store,
    ctx: &TenantContext,
    log_id: &LogId,
) -> Result<&'s Log, ActivityError> {
    let log = store
        .log(log_id)
        .ok_or_else(|| ActivityError::LogNotFound(log_id.to_string()))?;
    if log.action != LogAction::Comment {
        return Err(ActivityError::NotAComment(log_id.to_string()));
    }
    let readable = store
        .row(&log.row_id)
        .map(|row| permissions::resolve_in(store, row, ctx).can_read)
        .unwrap_or(false);
    if !readable {
        return Err(ActivityError::PermissionDenied("read this comment"));
    }
    Ok(log)
}

/// React to a comment; reacting twice with the same kind is a no-op
///
/// Returns whether a reaction was added.
pub fn add_reaction(
    store: &mut Store,
    ctx: &TenantContext,
    log_id: &LogId,
    kind: &str,
) -> Result<bool, ActivityError> {
    let actor = ctx.actor().ok_or(ActivityError::PermissionDenied("react"))?;
    let log = visible_comment(store, ctx, log_id)?;
    if log.is_deleted {
        return Err(ActivityError::CommentDeleted(log_id.to_string()));
    }
    if log
        .reactions
        .iter()
        .any(|r| r.actor == actor && r.kind == kind)
    {
        return Ok(false);
    }
    if let Some(log) = store.log_mut(log_id) {
        log.reactions.push(Reaction {
            actor,
            kind: kind.to_string(),
            created_at: Utc::now(),
        });
    }
    Ok(true)
}

/// Withdraw the caller's reaction; returns whether one was removed
pub fn remove_reaction(
    store: &mut Store,
    ctx: &TenantContext,
    log_id: &LogId,
    kind: &str,
) -> Result<bool, ActivityError> {
    let actor = ctx.actor().ok_or(ActivityError::PermissionDenied("react"))?;
    visible_comment(store, ctx, log_id)?;
    let Some(log) = store.log_mut(log_id) else {
        return Err(ActivityError::LogNotFound(log_id.to_string()));
    };
    let before = log.reactions.len();
    log.reactions.retain(|r| !(r.actor == actor && r.kind == kind));
    Ok(log.reactions.len() != before)
}

/// Soft-delete a comment (its author or a super-role of the row's tenant)
pub fn delete_comment(
    store: &mut Store,
    ctx: &TenantContext,
    log_id: &LogId,
) -> Result<(), ActivityError> {
    let log = visible_comment(store, ctx, log_id)?;
    let author = ctx.actor().is_some() && ctx.actor() == log.actor;
    let super_member = ctx.is_super()
        && store
            .row(&log.row_id)
            .is_some_and(|row| ctx.is_member_of(&row.tenant_id));
    if !(author || super_member) {
        return Err(ActivityError::PermissionDenied("delete this comment"));
    }
    if let Some(log) = store.log_mut(log_id) {
        log.is_deleted = true;
        debug!(log = %log_id, "deleted comment");
    }
    Ok(())
}

/// Log entries of a row the caller can read, oldest first
pub fn history<'s>(
    store: &'s Store,
    ctx: &TenantContext,
    row_id: &RowId,
) -> Result<Vec<&'s Log>, ActivityError> {
    let row = store
        .row(row_id)
        .ok_or_else(|| ActivityError::RowNotFound(row_id.to_string()))?;
    if !permissions::resolve_in(store, row, ctx).can_read {
        return Err(ActivityError::PermissionDenied("read this row"));
    }
    Ok(store.logs_of(row_id))
}

/// One-line human summary of a log entry
pub fn format_log(log: &Log) -> String {
    let actor = log
        .actor
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "system".to_string());
    let detail = |key: &str| {
        log.details
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let summary = match log.action {
        LogAction::Comment if log.is_deleted => "deleted a comment".to_string(),
        LogAction::Comment => format!("commented: {}", detail("text").unwrap_or_default()),
        LogAction::Created => match detail("folio") {
            Some(folio) => format!("created {}", folio),
            None => "created the row".to_string(),
        },
        LogAction::Updated => {
            let names: Vec<&str> = log
                .details
                .get("changed")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|n| n.as_str()).collect())
                .unwrap_or_default();
            if names.is_empty() {
                "updated the row".to_string()
            } else {
                format!("changed {}", names.join(", "))
            }
        }
        LogAction::Deleted => "deleted the row".to_string(),
        LogAction::WorkflowTransition => format!(
            "{}: {} -> {}",
            detail("action").unwrap_or_default(),
            detail("from").unwrap_or_else(|| "(none)".to_string()),
            detail("to").unwrap_or_default()
        ),
        LogAction::Shared => format!(
            "shared with {}",
            detail("visibility").unwrap_or_else(|| "nobody".to_string())
        ),
    };

    let reactions = if log.reactions.is_empty() || log.is_deleted {
        String::new()
    } else {
        format!(" [{} reactions]", log.reactions.len())
    };
    format!(
        "{} {} {}{}",
        log.created_at.format("%Y-%m-%d %H:%M"),
        actor,
        summary,
        reactions
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{EntityId, TenantId, UserId};
    use crate::entities::{Entity, EntityFlags, Row, Visibility};
    use crate::core::context::UserIdentity;

    fn setup(has_comments: bool) -> (Store, RowId) {
        let mut store = Store::new();
        let entity_id = EntityId::new();
        let now = Utc::now();
        store.entities.insert(
            entity_id.clone(),
            Entity {
                id: entity_id.clone(),
                name: "Contract".to_string(),
                slug: "contracts".to_string(),
                title: "Contract".to_string(),
                title_plural: "Contracts".to_string(),
                order: 1,
                prefix: "CON".to_string(),
                flags: EntityFlags {
                    has_comments,
                    ..EntityFlags::default()
                },
                default_visibility: Visibility::Private,
                created_at: now,
            },
        );
        let row_id = RowId::new();
        store.rows.insert(
            row_id.clone(),
            Row {
                id: row_id.clone(),
                entity_id,
                tenant_id: TenantId::from("acme"),
                parent_id: None,
                order: 0,
                folio: None,
                created_by: Actor::User(UserId::from("alice")),
                linked_account_id: None,
                workflow_state_id: None,
                visibility: Visibility::Private,
                permissions: vec![],
                version: 0,
                created_at: now,
                updated_at: now,
            },
        );
        (store, row_id)
    }

    fn alice() -> TenantContext {
        TenantContext::user("acme", UserIdentity::new("alice"))
    }

    #[test]
    fn test_comment_and_reactions() {
        let (mut store, row) = setup(true);
        let ctx = alice();
        let comment = add_comment(&mut store, &ctx, &row, "Looks good").unwrap();

        assert!(add_reaction(&mut store, &ctx, &comment, "thumbsup").unwrap());
        assert!(!add_reaction(&mut store, &ctx, &comment, "thumbsup").unwrap());
        assert_eq!(store.log(&comment).unwrap().reactions.len(), 1);

        assert!(remove_reaction(&mut store, &ctx, &comment, "thumbsup").unwrap());
        assert!(!remove_reaction(&mut store, &ctx, &comment, "thumbsup").unwrap());
    }

    #[test]
    fn test_comments_disabled() {
        let (mut store, row) = setup(false);
        assert_eq!(
            add_comment(&mut store, &alice(), &row, "hi"),
            Err(ActivityError::CommentsDisabled)
        );
    }

    #[test]
    fn test_private_row_blocks_other_commenters() {
        let (mut store, row) = setup(true);
        let bob = TenantContext::user("acme", UserIdentity::new("bob"));
        assert_eq!(
            add_comment(&mut store, &bob, &row, "hi"),
            Err(ActivityError::PermissionDenied("comment"))
        );
        assert!(store.logs_of(&row).is_empty());
    }

    #[test]
    fn test_soft_delete_hides_text() {
        let (mut store, row) = setup(true);
        let ctx = alice();
        let comment = add_comment(&mut store, &ctx, &row, "secret plan").unwrap();
        assert!(format_log(store.log(&comment).unwrap()).contains("secret plan"));

        delete_comment(&mut store, &ctx, &comment).unwrap();
        let log = store.log(&comment).unwrap();
        assert!(log.is_deleted);
        assert!(!format_log(log).contains("secret plan"));
        assert_eq!(history(&store, &ctx, &row).unwrap().len(), 1);

        assert_eq!(
            add_reaction(&mut store, &ctx, &comment, "heart"),
            Err(ActivityError::CommentDeleted(comment.to_string()))
        );
    }

    #[test]
    fn test_format_transition() {
        let (mut store, row) = setup(true);
        let id = record(
            &mut store,
            &row,
            Some(Actor::User(UserId::from("alice"))),
            LogAction::WorkflowTransition,
            json!({ "action": "Send", "from": "Draft", "to": "Sent" }),
        );
        let line = format_log(store.log(&id).unwrap());
        assert!(line.ends_with("alice Send: Draft -> Sent"));
    }
}
