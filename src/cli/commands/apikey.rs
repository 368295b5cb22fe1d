//! `eb apikey` command - API keys and keyed calls

use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use crate::cli::entity_cmd::{resolve_entity, resolve_row};
use crate::cli::output::{print_list, Listing};
use crate::cli::{GlobalOpts, Session};
use crate::core::api::{self, ApiGateway, ApiRequest, NewApiKey};
use crate::core::context::TenantContext;
use crate::core::identity::{ApiKeyId, RowId};
use crate::core::store::Store;
use crate::entities::{ApiKeyEntityPermission, ApiMethod};

#[derive(Subcommand, Debug)]
pub enum ApiKeyCommands {
    /// Create a key; the secret is printed once
    New(NewArgs),

    /// List the keys of your tenant
    List,

    /// Deactivate a key
    Revoke(KeyArg),

    /// Calls made with a key
    Calls(KeyArg),

    /// Make a keyed call, as the HTTP surface would
    Call(CallArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Display name of the key
    pub alias: String,

    /// Entity access as slug:flags, flags from c r u d (repeatable)
    #[arg(long = "entity", short = 'e', required = true)]
    pub entities: Vec<String>,

    /// Expiry as YYYY-MM-DD or RFC 3339
    #[arg(long)]
    pub expires: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct KeyArg {
    /// API key id
    pub key: ApiKeyId,
}

#[derive(clap::Args, Debug)]
pub struct CallArgs {
    /// HTTP method (GET, POST, PUT, DELETE)
    pub method: ApiMethod,

    /// Entity slug
    pub entity: String,

    /// Row id or folio
    pub row: Option<String>,

    /// JSON body: {"values": {...}, "linkedAccountId": "..."}
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Key secret
    #[arg(long, env = "EB_API_KEY", hide_env_values = true)]
    pub key: String,
}

/// Parse `slug:crud` into a permission on the named entity
pub fn parse_entity_access(store: &Store, spec: &str) -> Result<ApiKeyEntityPermission> {
    let (slug, flags) = spec
        .split_once(':')
        .ok_or_else(|| miette::miette!("Expected slug:flags (e.g. contracts:cr), got '{}'", spec))?;
    let entity = resolve_entity(store, slug.trim())?;
    let mut permission = ApiKeyEntityPermission {
        entity_id: entity.id.clone(),
        create: false,
        read: false,
        update: false,
        delete: false,
    };
    for flag in flags.trim().chars() {
        match flag.to_ascii_lowercase() {
            'c' => permission.create = true,
            'r' => permission.read = true,
            'u' => permission.update = true,
            'd' => permission.delete = true,
            other => return Err(miette::miette!("Unknown access flag '{}' (use c, r, u, d)", other)),
        }
    }
    Ok(permission)
}

/// Parse an expiry; a bare date expires at its start (UTC)
pub fn parse_expiry(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text.trim()) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| miette::miette!("Invalid expiry '{}' (use YYYY-MM-DD)", text))
}

fn access_flags(permission: &ApiKeyEntityPermission) -> String {
    [
        (permission.create, 'c'),
        (permission.read, 'r'),
        (permission.update, 'u'),
        (permission.delete, 'd'),
    ]
    .iter()
    .filter(|(on, _)| *on)
    .map(|(_, c)| *c)
    .collect()
}

/// Run an apikey subcommand
pub fn run(cmd: ApiKeyCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ApiKeyCommands::New(args) => run_new(args, global),
        ApiKeyCommands::List => run_list(global),
        ApiKeyCommands::Revoke(args) => run_revoke(args, global),
        ApiKeyCommands::Calls(args) => run_calls(args, global),
        ApiKeyCommands::Call(args) => run_call(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let entities = args
        .entities
        .iter()
        .map(|spec| parse_entity_access(&session.store, spec))
        .collect::<Result<Vec<_>>>()?;
    let expires_at = args.expires.as_deref().map(parse_expiry).transpose()?;

    let issued = api::create_api_key(
        &mut session.store,
        &session.ctx,
        NewApiKey {
            alias: args.alias.clone(),
            entities,
            expires_at,
        },
    )
    .into_diagnostic()?;
    session.save()?;

    if global.quiet {
        println!("{}", issued.secret);
    } else {
        println!(
            "{} Created API key {} ({})",
            style("✓").green(),
            style(&args.alias).cyan(),
            style(&issued.id).dim()
        );
        println!();
        println!("  Secret: {}", style(&issued.secret).bold());
        println!(
            "  {}",
            style("Store it now; it cannot be shown again.").yellow()
        );
    }
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let tenant = session
        .ctx
        .tenant()
        .ok_or_else(|| miette::miette!("A tenant is needed to list API keys"))?;
    if !session.ctx.is_super() {
        return Err(miette::miette!("{}", api::ApiError::PermissionDenied));
    }
    let keys = session.store.api_keys_of(tenant);
    if keys.is_empty() {
        if !global.quiet {
            println!("No API keys.");
        }
        return Ok(());
    }

    let now = Utc::now();
    let mut listing = Listing::new(["id", "alias", "status", "entities", "expires", "calls"]);
    let mut records = Vec::with_capacity(keys.len());
    for key in &keys {
        let status = if !key.active {
            "revoked"
        } else if key.is_expired(now) {
            "expired"
        } else {
            "active"
        };
        let entities: Vec<String> = key
            .entities
            .iter()
            .map(|p| {
                let slug = session
                    .store
                    .entity(&p.entity_id)
                    .map(|e| e.slug.clone())
                    .unwrap_or_else(|| p.entity_id.to_string());
                format!("{}:{}", slug, access_flags(p))
            })
            .collect();
        let calls = session.store.api_logs_of(&key.id).len();
        listing.push([
            key.id.to_string(),
            key.alias.clone(),
            status.to_string(),
            entities.join(" "),
            key.expires_at.map(|e| e.to_rfc3339()).unwrap_or_default(),
            calls.to_string(),
        ]);
        records.push(json!({
            "id": key.id.to_string(),
            "alias": key.alias,
            "status": status,
            "entities": entities,
            "expiresAt": key.expires_at,
            "calls": calls,
        }));
    }
    print_list(global.format, &listing, &serde_json::Value::Array(records))
}

fn run_revoke(args: KeyArg, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    api::deactivate_api_key(&mut session.store, &session.ctx, &args.key).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!("{} Revoked {}", style("✓").green(), style(&args.key).cyan());
    }
    Ok(())
}

fn run_calls(args: KeyArg, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let key = session
        .store
        .api_key(&args.key)
        .filter(|k| session.ctx.is_super() && session.ctx.is_member_of(&k.tenant_id))
        .ok_or_else(|| miette::miette!("{}", api::ApiError::KeyNotFound(args.key.to_string())))?;
    let calls = session.store.api_logs_of(&key.id);

    let mut listing = Listing::new(["at", "method", "endpoint", "status", "error"]);
    for call in &calls {
        listing.push([
            call.created_at.to_rfc3339(),
            call.method.to_string(),
            call.endpoint.clone(),
            call.status.to_string(),
            call.error.clone().unwrap_or_default(),
        ]);
    }
    let records = serde_json::to_value(&calls).into_diagnostic()?;
    print_list(global.format, &listing, &records)
}

fn run_call(args: CallArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;

    let mut request = ApiRequest::new(args.method, &args.entity);
    if let Some(row) = &args.row {
        let id = match row.parse::<RowId>() {
            Ok(id) => id,
            Err(_) => {
                let key = api::authenticate(&session.store, &args.key, Utc::now()).into_diagnostic()?;
                let ctx = TenantContext::api_key(key.tenant_id.clone(), key.id.clone());
                resolve_row(&session.store, &ctx, row)?
            }
        };
        request = request.row(id);
    }
    if let Some(data) = &args.data {
        let body: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| miette::miette!("Invalid JSON body: {}", e))?;
        request = request.body(body);
    }

    let response = ApiGateway::new(&mut session.store).dispatch(&args.key, &request);
    session.save()?;

    println!("{}", serde_json::to_string_pretty(&response.body).into_diagnostic()?);
    if response.is_success() {
        Ok(())
    } else {
        Err(miette::miette!("{} {} returned {}", args.method, request.endpoint(), response.status))
    }
}
