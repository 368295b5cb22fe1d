//! `eb row` command - Row CRUD, detail rows and references

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use crate::cli::entity_cmd::{resolve_entity, resolve_row, value_inputs};
use crate::cli::helpers::truncate_str;
use crate::cli::output::{print_list, print_record, Listing};
use crate::cli::{GlobalOpts, Session};
use crate::core::api::row_json;
use crate::core::context::TenantContext;
use crate::core::identity::AccountId;
use crate::core::permissions;
use crate::core::relations;
use crate::core::rows::{self, NewRow, SetOutcome};
use crate::core::store::Store;
use crate::core::workflow::WorkflowEngine;
use crate::entities::Row;

#[derive(Subcommand, Debug)]
pub enum RowCommands {
    /// Create a row from name=value pairs
    New(NewArgs),

    /// List the rows of an entity you can read
    List(ListArgs),

    /// Show a row with its values and detail rows
    Show(RowArg),

    /// Change values of a row
    Set(SetArgs),

    /// Delete a row with its detail rows
    Delete(RowArg),

    /// Detail (line) rows of a row
    #[command(subcommand)]
    Detail(DetailCommands),

    /// Rows whose relations point at this row
    Refs(RowArg),
}

#[derive(Subcommand, Debug)]
pub enum DetailCommands {
    /// Append a detail row
    Add(DetailAddArgs),

    /// List detail rows in line order
    List(RowArg),

    /// Remove a detail row
    Remove(RowArg),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Entity slug
    pub entity: String,

    /// Values as name=value
    pub values: Vec<String>,

    /// Linked account of the row
    #[arg(long)]
    pub account: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Entity slug
    pub entity: String,

    /// Only rows in this workflow state (title)
    #[arg(long, short = 's')]
    pub state: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show count only
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct RowArg {
    /// Row id or folio
    pub row: String,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Row id or folio
    pub row: String,

    /// Values as name=value (empty value clears)
    #[arg(required = true)]
    pub values: Vec<String>,

    /// Fail unless the row is still at this version
    #[arg(long)]
    pub if_version: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct DetailAddArgs {
    /// Parent row id or folio
    pub row: String,

    /// Detail values as name=value
    pub values: Vec<String>,
}

/// Run a row subcommand
pub fn run(cmd: RowCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        RowCommands::New(args) => run_new(args, global),
        RowCommands::List(args) => run_list(args, global),
        RowCommands::Show(args) => run_show(args, global),
        RowCommands::Set(args) => run_set(args, global),
        RowCommands::Delete(args) => run_delete(args, global),
        RowCommands::Detail(cmd) => run_detail(cmd, global),
        RowCommands::Refs(args) => run_refs(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.entity)?;
    let entity_id = entity.id.clone();
    let values = value_inputs(&session.store, &session.ctx, entity, false, &args.values)?;

    let new = NewRow {
        values,
        linked_account_id: args.account.map(AccountId::from),
        details: Vec::new(),
    };
    let id = rows::create_row(&mut session.store, &session.ctx, &entity_id, new).into_diagnostic()?;
    session.save()?;

    let folio = session
        .store
        .row(&id)
        .map(|r| r.display_folio())
        .unwrap_or_default();
    if global.quiet {
        println!("{}", id);
    } else {
        println!(
            "{} Created {} ({})",
            style("✓").green(),
            style(&folio).cyan(),
            style(&id).dim()
        );
    }
    Ok(())
}

/// Workflow state title, or empty when the entity has no workflow
fn state_label(store: &Store, row: &Row) -> String {
    WorkflowEngine::new(store, &row.entity_id)
        .ok()
        .filter(|engine| engine.is_enabled())
        .map(|engine| engine.state_title(row.workflow_state_id.as_ref()))
        .unwrap_or_default()
}

fn row_listing(store: &Store, ctx: &TenantContext, found: &[&Row]) -> Result<(Listing, serde_json::Value)> {
    let columns: Vec<String> = match found.first() {
        Some(first) => rows::formatted_values(store, ctx, &first.id)
            .into_diagnostic()?
            .into_iter()
            .map(|v| v.name)
            .collect(),
        None => Vec::new(),
    };

    let mut headers = vec!["id".to_string(), "folio".to_string(), "state".to_string()];
    headers.extend(columns.iter().cloned());
    let mut listing = Listing::new(headers);
    let mut records = Vec::with_capacity(found.len());

    for row in found {
        let formatted = rows::formatted_values(store, ctx, &row.id).into_diagnostic()?;
        let mut cells = vec![row.id.to_string(), row.display_folio(), state_label(store, row)];
        cells.extend(formatted.into_iter().map(|v| truncate_str(&v.text, 30)));
        listing.push(cells);
        records.push(row_json(store, row));
    }
    Ok((listing, serde_json::Value::Array(records)))
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.entity)?;
    let mut found = rows::list_rows(&session.store, &session.ctx, &entity.id).into_diagnostic()?;

    if let Some(state) = &args.state {
        found.retain(|r| state_label(&session.store, r).eq_ignore_ascii_case(state));
    }
    if let Some(limit) = args.limit {
        found.truncate(limit);
    }

    if args.count {
        println!("{}", found.len());
        return Ok(());
    }
    if found.is_empty() {
        if !global.quiet {
            println!("No {} found.", entity.title_plural);
        }
        return Ok(());
    }

    let (listing, records) = row_listing(&session.store, &session.ctx, &found)?;
    print_list(global.format, &listing, &records)
}

fn run_show(args: RowArg, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;
    let row = rows::get_row(&session.store, &session.ctx, &id).into_diagnostic()?;
    let access = permissions::resolve_in(&session.store, row, &session.ctx);

    let formatted: serde_json::Map<String, serde_json::Value> =
        rows::formatted_values(&session.store, &session.ctx, &id)
            .into_diagnostic()?
            .into_iter()
            .map(|v| (v.name, serde_json::Value::String(v.text)))
            .collect();
    let details: Vec<serde_json::Value> = rows::detail_rows(&session.store, &session.ctx, &id)
        .into_diagnostic()?
        .into_iter()
        .map(|d| row_json(&session.store, d))
        .collect();

    let mut record = row_json(&session.store, row);
    if let Some(object) = record.as_object_mut() {
        object.insert("display".to_string(), serde_json::Value::Object(formatted));
        object.insert("visibility".to_string(), json!(row.visibility.as_str()));
        object.insert("access".to_string(), json!(access));
        if !details.is_empty() {
            object.insert("details".to_string(), serde_json::Value::Array(details));
        }
        if let Some(url) = permissions::public_link(&session.store, session.config.server_url(), &id) {
            object.insert("publicUrl".to_string(), json!(url));
        }
    }
    print_record(global.format, id.as_str(), &record)
}

fn report_outcome(outcome: &SetOutcome, global: &GlobalOpts) {
    if global.quiet {
        return;
    }
    if outcome.changed.is_empty() {
        println!("{} Nothing changed", style("·").dim());
        return;
    }
    println!(
        "{} Changed {} (version {})",
        style("✓").green(),
        style(outcome.changed.join(", ")).cyan(),
        outcome.version
    );
    if !outcome.cleared.is_empty() {
        println!(
            "  {} cleared dependent {}",
            style("!").yellow(),
            outcome.cleared.join(", ")
        );
    }
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;
    let row = rows::get_row(&session.store, &session.ctx, &id).into_diagnostic()?;
    let detail = row.is_detail();
    let entity = session
        .store
        .entity(&row.entity_id)
        .ok_or_else(|| miette::miette!("Entity of row {} is gone", id))?;
    let inputs = value_inputs(&session.store, &session.ctx, entity, detail, &args.values)?;

    let outcome = match args.if_version {
        Some(version) => {
            rows::set_values_if_version(&mut session.store, &session.ctx, &id, version, inputs)
        }
        None => rows::set_values(&mut session.store, &session.ctx, &id, inputs),
    }
    .into_diagnostic()?;
    session.save()?;

    report_outcome(&outcome, global);
    Ok(())
}

fn run_delete(args: RowArg, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;
    let removed = rows::delete_row(&mut session.store, &session.ctx, &id).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Deleted {} ({} rows removed)",
            style("✓").green(),
            style(&args.row).cyan(),
            removed.len()
        );
    }
    Ok(())
}

fn run_detail(cmd: DetailCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    match cmd {
        DetailCommands::Add(args) => {
            let parent = resolve_row(&session.store, &session.ctx, &args.row)?;
            let row = rows::get_row(&session.store, &session.ctx, &parent).into_diagnostic()?;
            let entity = session
                .store
                .entity(&row.entity_id)
                .ok_or_else(|| miette::miette!("Entity of row {} is gone", parent))?;
            let inputs = value_inputs(&session.store, &session.ctx, entity, true, &args.values)?;
            let id = rows::add_detail_row(&mut session.store, &session.ctx, &parent, inputs)
                .into_diagnostic()?;
            session.save()?;
            if global.quiet {
                println!("{}", id);
            } else {
                println!("{} Added detail row {}", style("✓").green(), style(&id).cyan());
            }
        }
        DetailCommands::List(args) => {
            let parent = resolve_row(&session.store, &session.ctx, &args.row)?;
            let found = rows::detail_rows(&session.store, &session.ctx, &parent).into_diagnostic()?;
            if found.is_empty() {
                if !global.quiet {
                    println!("No detail rows.");
                }
                return Ok(());
            }
            let (listing, records) = row_listing(&session.store, &session.ctx, &found)?;
            print_list(global.format, &listing, &records)?;
        }
        DetailCommands::Remove(args) => {
            let id = resolve_row(&session.store, &session.ctx, &args.row)?;
            rows::remove_detail_row(&mut session.store, &session.ctx, &id).into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                println!("{} Removed detail row {}", style("✓").green(), style(&id).cyan());
            }
        }
    }
    Ok(())
}

fn run_refs(args: RowArg, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;
    rows::get_row(&session.store, &session.ctx, &id).into_diagnostic()?;

    let found: Vec<_> = relations::referencing_rows(&session.store, &id)
        .into_iter()
        .filter(|(row, _)| permissions::resolve_in(&session.store, row, &session.ctx).can_read)
        .collect();
    if found.is_empty() {
        if !global.quiet {
            println!("No rows reference {}.", args.row);
        }
        return Ok(());
    }

    let mut listing = Listing::new(["id", "folio", "entity", "property"]);
    let mut records = Vec::with_capacity(found.len());
    for (row, property) in &found {
        let entity = session
            .store
            .entity(&row.entity_id)
            .map(|e| e.slug.clone())
            .unwrap_or_default();
        listing.push([
            row.id.to_string(),
            row.display_folio(),
            entity.clone(),
            property.name.clone(),
        ]);
        records.push(json!({
            "id": row.id.to_string(),
            "folio": row.display_folio(),
            "entity": entity,
            "property": property.name,
        }));
    }
    print_list(global.format, &listing, &serde_json::Value::Array(records))
}
