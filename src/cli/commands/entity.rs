//! `eb entity` command - Entity (record type) management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use crate::cli::entity_cmd::resolve_entity;
use crate::cli::helpers::{read_input, yes_no};
use crate::cli::output::{print_list, print_record, Listing};
use crate::cli::{GlobalOpts, Session, VisibilityArg};
use crate::core::definition::{self, Definition};
use crate::core::registry::{self, EntityUpdate, MoveDirection, NewEntity};
use crate::entities::{Entity, EntityFlags};

#[derive(Subcommand, Debug)]
pub enum EntityCommands {
    /// Define a new entity
    New(NewArgs),

    /// List entities in display order
    List,

    /// Show an entity with its properties and workflow
    Show(ShowArgs),

    /// Change an entity's names, prefix, flags or default visibility
    Update(UpdateArgs),

    /// Delete an entity with all its properties, rows and workflow
    Delete(DeleteArgs),

    /// Move an entity one place up or down
    Move(MoveArgs),

    /// Write entity definitions as YAML
    Export(ExportArgs),

    /// Create entities from a YAML definition file
    Import(ImportArgs),
}

/// Feature flags shared by `new`
#[derive(clap::Args, Debug, Default)]
pub struct FlagArgs {
    /// Rows move through a workflow
    #[arg(long)]
    pub workflow: bool,

    /// Expose rows through API keys
    #[arg(long)]
    pub api: bool,

    /// Rows must name a linked account
    #[arg(long)]
    pub linked_accounts: bool,

    /// Entity is an optional feature module
    #[arg(long)]
    pub feature: bool,

    #[arg(long)]
    pub tags: bool,

    #[arg(long)]
    pub tasks: bool,

    /// Disable comments on rows
    #[arg(long)]
    pub no_comments: bool,

    /// Create the entity inactive
    #[arg(long)]
    pub inactive: bool,
}

impl FlagArgs {
    fn to_flags(&self) -> EntityFlags {
        EntityFlags {
            is_feature: self.feature,
            has_api: self.api,
            active: !self.inactive,
            requires_linked_accounts: self.linked_accounts,
            has_tags: self.tags,
            has_comments: !self.no_comments,
            has_tasks: self.tasks,
            has_workflow: self.workflow,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Entity name (e.g. Contract)
    pub name: String,

    /// URL slug, lowercase words joined by dashes (e.g. contracts)
    pub slug: String,

    /// Folio prefix, uppercase (e.g. CON)
    pub prefix: String,

    /// Singular display title (defaults to the name)
    #[arg(long)]
    pub title: Option<String>,

    /// Plural display title
    #[arg(long)]
    pub plural: Option<String>,

    /// Visibility given to new rows
    #[arg(long, value_enum, default_value = "private")]
    pub visibility: VisibilityArg,

    #[command(flatten)]
    pub flags: FlagArgs,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Entity slug
    pub slug: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Entity slug
    pub slug: String,

    #[arg(long)]
    pub name: Option<String>,

    /// New slug
    #[arg(long = "new-slug")]
    pub new_slug: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub plural: Option<String>,

    /// New folio prefix (existing folios keep theirs)
    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long, value_enum)]
    pub visibility: Option<VisibilityArg>,

    #[arg(long)]
    pub workflow: Option<bool>,

    #[arg(long)]
    pub api: Option<bool>,

    #[arg(long)]
    pub active: Option<bool>,

    #[arg(long)]
    pub comments: Option<bool>,

    #[arg(long)]
    pub linked_accounts: Option<bool>,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Entity slug
    pub slug: String,
}

#[derive(clap::Args, Debug)]
pub struct MoveArgs {
    /// Entity slug
    pub slug: String,

    /// up or down
    pub direction: MoveDirection,
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Entity slugs to export (all when omitted)
    pub slugs: Vec<String>,

    /// Write to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<std::path::PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// YAML definition file, or - for stdin
    pub file: String,
}

/// Run an entity subcommand
pub fn run(cmd: EntityCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        EntityCommands::New(args) => run_new(args, global),
        EntityCommands::List => run_list(global),
        EntityCommands::Show(args) => run_show(args, global),
        EntityCommands::Update(args) => run_update(args, global),
        EntityCommands::Delete(args) => run_delete(args, global),
        EntityCommands::Move(args) => run_move(args, global),
        EntityCommands::Export(args) => run_export(args, global),
        EntityCommands::Import(args) => run_import(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;

    let mut new = NewEntity::new(&args.name, &args.slug, &args.prefix)
        .with_flags(args.flags.to_flags())
        .with_default_visibility(args.visibility.into());
    if args.title.is_some() || args.plural.is_some() {
        let title = args.title.clone().unwrap_or_else(|| new.title.clone());
        let plural = args.plural.clone().unwrap_or_else(|| format!("{}s", title));
        new = new.titled(title, plural);
    }

    let id = registry::create_entity(&mut session.store, &session.ctx, new).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Created entity {} ({})",
            style("✓").green(),
            style(&args.name).cyan(),
            style(&id).dim()
        );
    }
    Ok(())
}

fn entity_json(session: &Session, entity: &Entity) -> serde_json::Value {
    let properties: Vec<serde_json::Value> = session
        .store
        .properties_of(&entity.id)
        .into_iter()
        .map(|p| {
            json!({
                "name": p.name,
                "title": p.title,
                "type": p.property_type.as_str(),
                "required": p.is_required,
                "detail": p.is_detail,
            })
        })
        .collect();
    let states: Vec<&str> = session
        .store
        .states_of(&entity.id)
        .into_iter()
        .map(|s| s.title.as_str())
        .collect();
    json!({
        "id": entity.id.to_string(),
        "name": entity.name,
        "slug": entity.slug,
        "title": entity.title,
        "titlePlural": entity.title_plural,
        "prefix": entity.prefix,
        "defaultVisibility": entity.default_visibility.as_str(),
        "flags": entity.flags,
        "properties": properties,
        "workflowStates": states,
    })
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let entities = session.store.entities();

    if entities.is_empty() {
        if !global.quiet {
            println!("No entities defined.");
        }
        return Ok(());
    }

    let mut listing = Listing::new(["slug", "name", "prefix", "rows", "workflow", "api", "active"]);
    let mut records = Vec::with_capacity(entities.len());
    for entity in &entities {
        let rows = session
            .ctx
            .tenant()
            .map(|t| session.store.rows_of(&entity.id, t).len())
            .unwrap_or(0);
        listing.push([
            entity.slug.clone(),
            entity.name.clone(),
            entity.prefix.clone(),
            rows.to_string(),
            yes_no(entity.flags.has_workflow).to_string(),
            yes_no(entity.flags.has_api).to_string(),
            yes_no(entity.flags.active).to_string(),
        ]);
        records.push(entity_json(&session, entity));
    }
    print_list(global.format, &listing, &serde_json::Value::Array(records))
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.slug)?;
    print_record(global.format, entity.id.as_str(), &entity_json(&session, entity))
}

fn run_update(args: UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.slug)?;
    let id = entity.id.clone();

    let mut flags = entity.flags.clone();
    let mut flags_changed = false;
    for (arg, flag) in [
        (args.workflow, &mut flags.has_workflow),
        (args.api, &mut flags.has_api),
        (args.active, &mut flags.active),
        (args.comments, &mut flags.has_comments),
        (args.linked_accounts, &mut flags.requires_linked_accounts),
    ] {
        if let Some(value) = arg {
            *flag = value;
            flags_changed = true;
        }
    }

    let update = EntityUpdate {
        name: args.name,
        slug: args.new_slug,
        title: args.title,
        title_plural: args.plural,
        prefix: args.prefix,
        flags: flags_changed.then_some(flags),
        default_visibility: args.visibility.map(Into::into),
    };
    registry::update_entity(&mut session.store, &session.ctx, &id, update).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!("{} Updated entity {}", style("✓").green(), style(&id).cyan());
    }
    Ok(())
}

fn run_delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = resolve_entity(&session.store, &args.slug)?.id.clone();
    let report = registry::delete_entity(&mut session.store, &session.ctx, &id).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Deleted entity {} ({} properties, {} rows, {} values, {} states, {} steps)",
            style("✓").green(),
            style(&args.slug).cyan(),
            report.properties,
            report.rows,
            report.values,
            report.states,
            report.steps
        );
    }
    Ok(())
}

fn run_move(args: MoveArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = resolve_entity(&session.store, &args.slug)?.id.clone();
    registry::move_entity(&mut session.store, &session.ctx, &id, args.direction).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Moved {} {}",
            style("✓").green(),
            style(&args.slug).cyan(),
            args.direction
        );
    }
    Ok(())
}

fn run_export(args: ExportArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let document = definition::export(&session.store, &args.slugs).into_diagnostic()?;
    let yaml = document.to_yaml().into_diagnostic()?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, yaml).into_diagnostic()?;
            if !global.quiet {
                println!(
                    "{} Exported {} entities to {}",
                    style("✓").green(),
                    document.entities.len(),
                    style(path.display()).cyan()
                );
            }
        }
        None => print!("{}", yaml),
    }
    Ok(())
}

fn run_import(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let text = read_input(&args.file)?;
    let document = Definition::from_yaml(&text).into_diagnostic()?;
    let report = definition::import(&mut session.store, &session.ctx, &document).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Imported {} entities, {} properties, {} states, {} steps",
            style("✓").green(),
            report.entities,
            report.properties,
            report.states,
            report.steps
        );
    }
    Ok(())
}
