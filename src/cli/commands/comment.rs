//! `eb comment` command - Comments and reactions

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::entity_cmd::resolve_row;
use crate::cli::{GlobalOpts, Session};
use crate::core::activity;
use crate::core::identity::LogId;

#[derive(Subcommand, Debug)]
pub enum CommentCommands {
    /// Comment on a row
    Add(AddArgs),

    /// React to a comment (e.g. thumbsup)
    React(ReactArgs),

    /// Withdraw your reaction
    Unreact(ReactArgs),

    /// Delete a comment (author or tenant super-role)
    Delete(DeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Row id or folio
    pub row: String,

    /// Comment text
    pub text: String,
}

#[derive(clap::Args, Debug)]
pub struct ReactArgs {
    /// Comment log id
    pub comment: LogId,

    /// Reaction kind
    pub kind: String,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Comment log id
    pub comment: LogId,
}

/// Run a comment subcommand
pub fn run(cmd: CommentCommands, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    match cmd {
        CommentCommands::Add(args) => {
            let row = resolve_row(&session.store, &session.ctx, &args.row)?;
            let id = activity::add_comment(&mut session.store, &session.ctx, &row, &args.text)
                .into_diagnostic()?;
            session.save()?;
            if global.quiet {
                println!("{}", id);
            } else {
                println!("{} Commented ({})", style("✓").green(), style(&id).dim());
            }
        }
        CommentCommands::React(args) => {
            let added = activity::add_reaction(&mut session.store, &session.ctx, &args.comment, &args.kind)
                .into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                if added {
                    println!("{} Reacted {}", style("✓").green(), style(&args.kind).cyan());
                } else {
                    println!("{} Already reacted {}", style("·").dim(), args.kind);
                }
            }
        }
        CommentCommands::Unreact(args) => {
            let removed =
                activity::remove_reaction(&mut session.store, &session.ctx, &args.comment, &args.kind)
                    .into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                if removed {
                    println!("{} Removed reaction {}", style("✓").green(), style(&args.kind).cyan());
                } else {
                    println!("{} No {} reaction to remove", style("·").dim(), args.kind);
                }
            }
        }
        CommentCommands::Delete(args) => {
            activity::delete_comment(&mut session.store, &session.ctx, &args.comment)
                .into_diagnostic()?;
            session.save()?;
            if !global.quiet {
                println!("{} Deleted comment {}", style("✓").green(), style(&args.comment).dim());
            }
        }
    }
    Ok(())
}
