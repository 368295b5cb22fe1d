//! `eb workflow` command - States, steps and row transitions

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use crate::cli::entity_cmd::{resolve_entity, resolve_row};
use crate::cli::output::{print_list, Listing};
use crate::cli::{GlobalOpts, Session};
use crate::core::identity::{EntityId, StateId};
use crate::core::store::Store;
use crate::core::workflow::{self, WorkflowEngine};

#[derive(Subcommand, Debug)]
pub enum WorkflowCommands {
    /// Manage the states of an entity's workflow
    #[command(subcommand)]
    State(StateCommands),

    /// Manage the steps (transitions) of an entity's workflow
    #[command(subcommand)]
    Step(StepCommands),

    /// Steps a row can take from its current state
    Next(RowArg),

    /// Move a row along the step with this action
    Run(RunArgs),
}

#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Add a state
    Add(StateAddArgs),

    /// List states in order
    List(EntityArg),

    /// Remove a state and the steps touching it
    Remove(StateRemoveArgs),
}

#[derive(Subcommand, Debug)]
pub enum StepCommands {
    /// Add a step
    Add(StepAddArgs),

    /// List steps in order
    List(EntityArg),

    /// Remove a step
    Remove(StepRemoveArgs),
}

#[derive(clap::Args, Debug)]
pub struct EntityArg {
    /// Entity slug
    pub entity: String,
}

#[derive(clap::Args, Debug)]
pub struct RowArg {
    /// Row id or folio
    pub row: String,
}

#[derive(clap::Args, Debug)]
pub struct StateAddArgs {
    /// Entity slug
    pub entity: String,

    /// State title
    pub title: String,

    /// Display color (e.g. #00aa00)
    #[arg(long)]
    pub color: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct StateRemoveArgs {
    /// Entity slug
    pub entity: String,

    /// State title
    pub title: String,
}

#[derive(clap::Args, Debug)]
pub struct StepAddArgs {
    /// Entity slug
    pub entity: String,

    /// Action label shown to users (e.g. Approve)
    pub action: String,

    /// Target state title
    #[arg(long)]
    pub to: String,

    /// Source state title (omit for the initial step)
    #[arg(long)]
    pub from: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct StepRemoveArgs {
    /// Entity slug
    pub entity: String,

    /// Action label
    pub action: String,

    /// Source state title, when the action leaves several states
    #[arg(long)]
    pub from: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Row id or folio
    pub row: String,

    /// Action of the step to take
    pub action: String,
}

/// Run a workflow subcommand
pub fn run(cmd: WorkflowCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        WorkflowCommands::State(cmd) => run_state(cmd, global),
        WorkflowCommands::Step(cmd) => run_step(cmd, global),
        WorkflowCommands::Next(args) => run_next(args, global),
        WorkflowCommands::Run(args) => run_transition(args, global),
    }
}

fn state_by_title(store: &Store, entity_id: &EntityId, title: &str) -> Result<StateId> {
    store
        .states_of(entity_id)
        .into_iter()
        .find(|s| s.title.eq_ignore_ascii_case(title.trim()))
        .map(|s| s.id.clone())
        .ok_or_else(|| miette::miette!("No workflow state '{}'", title))
}

fn run_state(cmd: StateCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    match cmd {
        StateCommands::Add(args) => {
            let entity_id = resolve_entity(&session.store, &args.entity)?.id.clone();
            workflow::add_state(&mut session.store, &session.ctx, &entity_id, &args.title, args.color)
                .into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                println!("{} Added state {}", style("✓").green(), style(&args.title).cyan());
            }
        }
        StateCommands::List(args) => {
            let entity = resolve_entity(&session.store, &args.entity)?;
            let engine = WorkflowEngine::new(&session.store, &entity.id).into_diagnostic()?;
            let states = engine.states();
            let mut listing = Listing::new(["title", "color"]);
            for state in &states {
                listing.push([state.title.clone(), state.color.clone().unwrap_or_default()]);
            }
            let records = serde_json::to_value(&states).into_diagnostic()?;
            print_list(global.format, &listing, &records)?;
        }
        StateCommands::Remove(args) => {
            let entity_id = resolve_entity(&session.store, &args.entity)?.id.clone();
            let state = state_by_title(&session.store, &entity_id, &args.title)?;
            let reset = workflow::remove_state(&mut session.store, &session.ctx, &state)
                .into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                println!(
                    "{} Removed state {} ({} rows reset)",
                    style("✓").green(),
                    style(&args.title).cyan(),
                    reset
                );
            }
        }
    }
    Ok(())
}

fn run_step(cmd: StepCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    match cmd {
        StepCommands::Add(args) => {
            let entity_id = resolve_entity(&session.store, &args.entity)?.id.clone();
            let to = state_by_title(&session.store, &entity_id, &args.to)?;
            let from = match &args.from {
                Some(title) => Some(state_by_title(&session.store, &entity_id, title)?),
                None => None,
            };
            workflow::add_step(
                &mut session.store,
                &session.ctx,
                &entity_id,
                from.as_ref(),
                &to,
                &args.action,
            )
            .into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                println!(
                    "{} Added step {} ({} -> {})",
                    style("✓").green(),
                    style(&args.action).cyan(),
                    args.from.as_deref().unwrap_or("start"),
                    args.to
                );
            }
        }
        StepCommands::List(args) => {
            let entity = resolve_entity(&session.store, &args.entity)?;
            let engine = WorkflowEngine::new(&session.store, &entity.id).into_diagnostic()?;
            let steps = engine.steps();
            let mut listing = Listing::new(["action", "from", "to"]);
            let mut records = Vec::with_capacity(steps.len());
            for step in &steps {
                let from = match &step.from_state_id {
                    Some(id) => engine.state_title(Some(id)),
                    None => "start".to_string(),
                };
                let to = engine.state_title(Some(&step.to_state_id));
                listing.push([step.action.clone(), from.clone(), to.clone()]);
                records.push(json!({ "id": step.id.to_string(), "action": step.action, "from": from, "to": to }));
            }
            print_list(global.format, &listing, &serde_json::Value::Array(records))?;
        }
        StepCommands::Remove(args) => {
            let entity_id = resolve_entity(&session.store, &args.entity)?.id.clone();
            let from = match &args.from {
                Some(title) => Some(state_by_title(&session.store, &entity_id, title)?),
                None => None,
            };
            let matching: Vec<_> = session
                .store
                .steps_of(&entity_id)
                .into_iter()
                .filter(|s| s.action.eq_ignore_ascii_case(&args.action))
                .filter(|s| from.is_none() || s.from_state_id == from)
                .map(|s| s.id.clone())
                .collect();
            let step = match matching.as_slice() {
                [step] => step.clone(),
                [] => return Err(miette::miette!("No step '{}'", args.action)),
                _ => {
                    return Err(miette::miette!(
                        "Several steps are named '{}'; pass --from",
                        args.action
                    ))
                }
            };
            workflow::remove_step(&mut session.store, &session.ctx, &step).into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                println!("{} Removed step {}", style("✓").green(), style(&args.action).cyan());
            }
        }
    }
    Ok(())
}

fn run_next(args: RowArg, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;
    let steps = workflow::row_next_steps(&session.store, &session.ctx, &id).into_diagnostic()?;

    if steps.is_empty() {
        if !global.quiet {
            println!("No steps leave the current state.");
        }
        return Ok(());
    }

    let mut listing = Listing::new(["action", "to"]);
    let mut records = Vec::with_capacity(steps.len());
    for step in &steps {
        let to = session
            .store
            .state(&step.to_state_id)
            .map(|s| s.title.clone())
            .unwrap_or_default();
        listing.push([step.action.clone(), to.clone()]);
        records.push(json!({ "id": step.id.to_string(), "action": step.action, "to": to }));
    }
    print_list(global.format, &listing, &serde_json::Value::Array(records))
}

fn run_transition(args: RunArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;
    let state = workflow::transition_by_action(&mut session.store, &session.ctx, &id, &args.action)
        .into_diagnostic()?;
    session.save()?;

    if !global.quiet {
        let title = session
            .store
            .state(&state)
            .map(|s| s.title.clone())
            .unwrap_or_default();
        println!(
            "{} {} is now {}",
            style("✓").green(),
            style(&args.row).cyan(),
            style(title).yellow()
        );
    }
    Ok(())
}
