//! `eb prop` command - Property management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use crate::cli::entity_cmd::{resolve_entity, resolve_property};
use crate::cli::helpers::{parse_assignment, yes_no};
use crate::cli::output::{print_list, Listing};
use crate::cli::{GlobalOpts, Session};
use crate::core::registry::{self, MoveDirection, NewOption, NewProperty, PropertyUpdate};
use crate::entities::{PropertyAttribute, PropertyType};

#[derive(Subcommand, Debug)]
pub enum PropCommands {
    /// Add a property to an entity
    Add(AddArgs),

    /// List the properties of an entity
    List(ListArgs),

    /// Change a property
    Update(UpdateArgs),

    /// Move a property up or down, or to a position
    Move(MoveArgs),

    /// Delete a property and all its values
    Delete(DeleteArgs),

    /// Manage the options of a SELECT property
    #[command(subcommand)]
    Option(OptionCommands),
}

#[derive(Subcommand, Debug)]
pub enum OptionCommands {
    /// List options in order
    List(PropRef),

    /// Append an option
    Add(OptionAddArgs),

    /// Replace all options (surviving values keep their identity)
    Set(OptionSetArgs),

    /// Remove an option and the choices scoped under it
    Remove(OptionRemoveArgs),
}

/// Entity slug and property name
#[derive(clap::Args, Debug)]
pub struct PropRef {
    /// Entity slug
    pub entity: String,

    /// Property name
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Entity slug
    pub entity: String,

    /// Property name in camelCase
    pub name: String,

    /// Property type
    #[arg(long = "type", short = 't')]
    pub property_type: PropertyType,

    /// Display title (defaults to the name)
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub required: bool,

    #[arg(long)]
    pub hidden: bool,

    /// Property of detail (line) rows
    #[arg(long)]
    pub detail: bool,

    /// Related entity slug (ENTITY properties)
    #[arg(long)]
    pub related: Option<String>,

    /// Parent SELECT property this one depends on
    #[arg(long)]
    pub depends_on: Option<String>,

    /// Attribute as name=value (repeatable)
    #[arg(long = "attr")]
    pub attributes: Vec<String>,

    /// Option as [parent/]value[:Name] (repeatable)
    #[arg(long = "option")]
    pub options: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Entity slug
    pub entity: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: PropRef,

    /// New name
    #[arg(long = "rename")]
    pub rename: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    /// Change the type (clears stored values)
    #[arg(long = "type")]
    pub property_type: Option<PropertyType>,

    #[arg(long)]
    pub related: Option<String>,

    #[arg(long)]
    pub required: Option<bool>,

    #[arg(long)]
    pub hidden: Option<bool>,

    /// Attribute to set as name=value (repeatable)
    #[arg(long = "attr")]
    pub attributes: Vec<String>,

    /// Attribute name to remove (repeatable)
    #[arg(long = "unset-attr")]
    pub remove: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct MoveArgs {
    #[command(flatten)]
    pub target: PropRef,

    /// up or down
    #[arg(conflicts_with = "to")]
    pub direction: Option<MoveDirection>,

    /// Zero-based position among the entity's own properties
    #[arg(long)]
    pub to: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: PropRef,
}

#[derive(clap::Args, Debug)]
pub struct OptionAddArgs {
    #[command(flatten)]
    pub target: PropRef,

    /// Option as [parent/]value[:Name]
    pub option: String,

    #[arg(long)]
    pub color: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct OptionSetArgs {
    #[command(flatten)]
    pub target: PropRef,

    /// Options as [parent/]value[:Name], in order
    #[arg(required = true)]
    pub options: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct OptionRemoveArgs {
    #[command(flatten)]
    pub target: PropRef,

    /// Option value, name or id
    pub option: String,
}

/// Parse `[parent/]value[:Name]`
pub fn parse_option_spec(spec: &str) -> Result<NewOption> {
    let (parent, rest) = match spec.split_once('/') {
        Some((parent, rest)) => (Some(parent.trim()), rest),
        None => (None, spec),
    };
    let (value, name) = match rest.split_once(':') {
        Some((value, name)) => (value.trim(), Some(name.trim())),
        None => (rest.trim(), None),
    };
    if value.is_empty() {
        return Err(miette::miette!("Empty option value in '{}'", spec));
    }
    let mut option = NewOption::new(value);
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        option = option.named(name);
    }
    if let Some(parent) = parent.filter(|p| !p.is_empty()) {
        option = option.under(parent);
    }
    Ok(option)
}

fn parse_attributes(items: &[String]) -> Result<Vec<PropertyAttribute>> {
    items
        .iter()
        .map(|item| {
            let (name, value) = parse_assignment(item)?;
            Ok(PropertyAttribute::new(name, value))
        })
        .collect()
}

/// Run a prop subcommand
pub fn run(cmd: PropCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        PropCommands::Add(args) => run_add(args, global),
        PropCommands::List(args) => run_list(args, global),
        PropCommands::Update(args) => run_update(args, global),
        PropCommands::Move(args) => run_move(args, global),
        PropCommands::Delete(args) => run_delete(args, global),
        PropCommands::Option(cmd) => run_option(cmd, global),
    }
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.entity)?;

    let title = args.title.clone().unwrap_or_else(|| args.name.clone());
    let mut new = NewProperty::new(&args.name, title, args.property_type);
    new.is_required = args.required;
    new.is_hidden = args.hidden;
    new.is_detail = args.detail;
    new.attributes = parse_attributes(&args.attributes)?;
    for spec in &args.options {
        new = new.option(parse_option_spec(spec)?);
    }
    if let Some(slug) = &args.related {
        new = new.relates_to(resolve_entity(&session.store, slug)?.id.clone());
    }
    if let Some(parent) = &args.depends_on {
        new = new.depends_on(resolve_property(&session.store, entity, parent)?.id.clone());
    }

    let entity_id = entity.id.clone();
    registry::add_property(&mut session.store, &session.ctx, &entity_id, new).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Added {} property {} to {}",
            style("✓").green(),
            args.property_type,
            style(&args.name).cyan(),
            args.entity
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.entity)?;
    let properties = registry::properties_of(&session.store, &entity.id).into_diagnostic()?;

    let mut listing = Listing::new(["name", "title", "type", "required", "hidden", "detail", "system"]);
    let mut records = Vec::with_capacity(properties.len());
    for p in &properties {
        listing.push([
            p.name.clone(),
            p.title.clone(),
            p.property_type.to_string(),
            yes_no(p.is_required).to_string(),
            yes_no(p.is_hidden).to_string(),
            yes_no(p.is_detail).to_string(),
            yes_no(p.is_default).to_string(),
        ]);
        records.push(json!({
            "id": p.id.to_string(),
            "name": p.name,
            "title": p.title,
            "type": p.property_type.as_str(),
            "required": p.is_required,
            "hidden": p.is_hidden,
            "detail": p.is_detail,
            "system": p.is_default,
            "attributes": p.attributes,
            "options": p.options,
        }));
    }
    print_list(global.format, &listing, &serde_json::Value::Array(records))
}

fn run_update(args: UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.target.entity)?;
    let id = resolve_property(&session.store, entity, &args.target.name)?.id.clone();
    let related_entity_id = match &args.related {
        Some(slug) => Some(resolve_entity(&session.store, slug)?.id.clone()),
        None => None,
    };

    let update = PropertyUpdate {
        name: args.rename,
        title: args.title,
        property_type: args.property_type,
        related_entity_id,
        is_required: args.required,
        is_hidden: args.hidden,
        set_attributes: parse_attributes(&args.attributes)?,
        remove_attributes: args.remove,
    };
    registry::update_property(&mut session.store, &session.ctx, &id, update).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Updated property {}",
            style("✓").green(),
            style(&args.target.name).cyan()
        );
    }
    Ok(())
}

fn run_move(args: MoveArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.target.entity)?;
    let id = resolve_property(&session.store, entity, &args.target.name)?.id.clone();

    match (args.direction, args.to) {
        (Some(direction), _) => {
            registry::move_property(&mut session.store, &session.ctx, &id, direction)
                .into_diagnostic()?
        }
        (None, Some(position)) => {
            registry::reorder_property(&mut session.store, &session.ctx, &id, position)
                .into_diagnostic()?
        }
        (None, None) => return Err(miette::miette!("Give a direction (up/down) or --to <position>")),
    }
    session.save()?;

    if !global.quiet {
        println!("{} Moved {}", style("✓").green(), style(&args.target.name).cyan());
    }
    Ok(())
}

fn run_delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let entity = resolve_entity(&session.store, &args.target.entity)?;
    let id = resolve_property(&session.store, entity, &args.target.name)?.id.clone();
    registry::delete_property(&mut session.store, &session.ctx, &id).into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        println!(
            "{} Deleted property {}",
            style("✓").green(),
            style(&args.target.name).cyan()
        );
    }
    Ok(())
}

fn run_option(cmd: OptionCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let target = match &cmd {
        OptionCommands::List(target) => target,
        OptionCommands::Add(args) => &args.target,
        OptionCommands::Set(args) => &args.target,
        OptionCommands::Remove(args) => &args.target,
    };
    let entity = resolve_entity(&session.store, &target.entity)?;
    let property = resolve_property(&session.store, entity, &target.name)?;
    let property_id = property.id.clone();
    let name = property.name.clone();

    match cmd {
        OptionCommands::List(_) => {
            let parent = property.parent_id.as_ref().and_then(|p| session.store.property(p));
            let mut listing = Listing::new(["value", "name", "color", "parent"]);
            for option in &property.options {
                let parent_value = option
                    .parent_id
                    .as_ref()
                    .and_then(|id| parent.and_then(|p| p.option(id)))
                    .map(|o| o.value.clone())
                    .unwrap_or_default();
                listing.push([
                    option.value.clone(),
                    option.name.clone().unwrap_or_default(),
                    option.color.clone().unwrap_or_default(),
                    parent_value,
                ]);
            }
            let records = serde_json::to_value(&property.options).into_diagnostic()?;
            return print_list(global.format, &listing, &records);
        }
        OptionCommands::Add(args) => {
            let mut option = parse_option_spec(&args.option)?;
            if let Some(color) = args.color {
                option = option.colored(color);
            }
            registry::add_option(&mut session.store, &session.ctx, &property_id, option)
                .into_diagnostic()?;
        }
        OptionCommands::Set(args) => {
            let options = args
                .options
                .iter()
                .map(|spec| parse_option_spec(spec.as_str()))
                .collect::<Result<Vec<_>>>()?;
            registry::set_options(&mut session.store, &session.ctx, &property_id, options)
                .into_diagnostic()?;
        }
        OptionCommands::Remove(args) => {
            let option_id = property
                .find_option(&args.option)
                .map(|o| o.id.clone())
                .ok_or_else(|| miette::miette!("No option '{}'", args.option))?;
            registry::remove_option(&mut session.store, &session.ctx, &property_id, &option_id)
                .into_diagnostic()?;
        }
    }
    session.save()?;

    if !global.quiet {
        println!("{} Updated options of {}", style("✓").green(), style(&name).cyan());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option_spec() {
        let plain = parse_option_spec("draft").unwrap();
        assert_eq!(plain, NewOption::new("draft"));

        let named = parse_option_spec("mx/cdmx:Mexico City").unwrap();
        assert_eq!(named, NewOption::new("cdmx").named("Mexico City").under("mx"));

        assert!(parse_option_spec("mx/").is_err());
    }
}
