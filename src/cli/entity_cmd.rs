//! Shared command infrastructure
//!
//! Every command runs inside a [`Session`]: the project database loaded into
//! a store, the layered config, and the caller context built from the global
//! options. Mutating commands call [`Session::save`] once at the end.

use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::parse_assignment;
use crate::cli::GlobalOpts;
use crate::core::cache::Database;
use crate::core::config::Config;
use crate::core::context::{TenantContext, UserIdentity};
use crate::core::identity::{GroupId, RoleId, RowId, TenantId, UserId};
use crate::core::project::Project;
use crate::core::relations;
use crate::core::rows::{self, ValueInput};
use crate::core::store::Store;
use crate::entities::{Entity, Property, PropertyType, Row};

pub struct Session {
    pub project: Project,
    pub config: Config,
    pub store: Store,
    pub ctx: TenantContext,
    db: Database,
}

impl Session {
    /// Discover the project and load its store
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = Project::discover().map_err(|e| miette::miette!("{}", e))?;
        let config = Config::load();
        let db = Database::open(&project.database_path()).into_diagnostic()?;
        let store = db.load().into_diagnostic()?;
        let ctx = build_context(global, &config);
        Ok(Self {
            project,
            config,
            store,
            ctx,
            db,
        })
    }

    /// Persist the store
    pub fn save(&mut self) -> Result<()> {
        self.db.save(&self.store).into_diagnostic()
    }
}

/// Caller context from the global options and config
///
/// The user comes from `--user`, else the configured `user`; with neither
/// the caller is anonymous. A user holding any of the configured super
/// roles gets super rights in the chosen tenant.
pub fn build_context(global: &GlobalOpts, config: &Config) -> TenantContext {
    let user = match global.user.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => UserId::from(name),
        _ => match &config.user {
            Some(user) => user.clone(),
            None => return TenantContext::anonymous(),
        },
    };
    let tenant = global
        .tenant
        .clone()
        .map(TenantId::from)
        .or_else(|| config.default_tenant.clone())
        .unwrap_or_else(|| TenantId::from("default"));

    let roles: Vec<RoleId> = global.roles.iter().map(|r| RoleId::from(r.as_str())).collect();
    let groups = global.groups.iter().map(|g| GroupId::from(g.as_str()));
    let is_super = roles.iter().any(|r| config.is_super_role(r));

    let mut identity = UserIdentity::new(user)
        .with_roles(roles)
        .with_groups(groups);
    if is_super {
        identity = identity.super_user();
    }
    TenantContext::user(tenant, identity)
}

// =========================================================================
// Lookups
// =========================================================================

pub fn resolve_entity<'s>(store: &'s Store, slug: &str) -> Result<&'s Entity> {
    store
        .entity_by_slug(slug)
        .ok_or_else(|| miette::miette!("Unknown entity '{}'", slug))
}

pub fn resolve_property<'s>(store: &'s Store, entity: &Entity, name: &str) -> Result<&'s Property> {
    store
        .property_by_name(&entity.id, name)
        .ok_or_else(|| miette::miette!("Entity '{}' has no property '{}'", entity.slug, name))
}

/// Find a row by id or by folio (e.g. `CON-0001`) in the caller's tenant
pub fn resolve_row(store: &Store, ctx: &TenantContext, reference: &str) -> Result<RowId> {
    let reference = reference.trim();
    if let Ok(id) = reference.parse::<RowId>() {
        return Ok(id);
    }
    let matches: Vec<&Row> = store
        .rows
        .values()
        .filter(|r| r.folio.as_ref().is_some_and(|f| f.to_string().eq_ignore_ascii_case(reference)))
        .filter(|r| ctx.tenant().map_or(true, |t| &r.tenant_id == t))
        .collect();
    match matches.as_slice() {
        [row] => Ok(row.id.clone()),
        [] => Err(miette::miette!("No row '{}'", reference)),
        _ => Err(miette::miette!(
            "Folio '{}' is ambiguous; use the row id",
            reference
        )),
    }
}

/// Turn `name=value` arguments into value inputs
///
/// ENTITY values may name the related row by folio; it is looked up among
/// the relation's candidates in the caller's tenant.
pub fn value_inputs(
    store: &Store,
    ctx: &TenantContext,
    entity: &Entity,
    detail: bool,
    assignments: &[String],
) -> Result<Vec<ValueInput>> {
    let mut pairs = Vec::with_capacity(assignments.len());
    for item in assignments {
        let (name, raw) = parse_assignment(item)?;
        let property = resolve_property(store, entity, &name)?;
        let raw = if property.property_type == PropertyType::Entity
            && !raw.trim().is_empty()
            && raw.parse::<RowId>().is_err()
        {
            let tenant = ctx
                .tenant()
                .ok_or_else(|| miette::miette!("A tenant is needed to look up '{}'", raw))?;
            relations::candidates(store, &property.id, tenant)
                .into_diagnostic()?
                .into_iter()
                .find(|r| r.display_folio().eq_ignore_ascii_case(raw.trim()))
                .map(|r| r.id.to_string())
                .ok_or_else(|| miette::miette!("No '{}' row matches '{}'", property.name, raw))?
        } else {
            raw
        };
        pairs.push((name, raw));
    }
    rows::inputs_from_text(store, &entity.id, detail, &pairs).into_diagnostic()
}
