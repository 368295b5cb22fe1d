//! `eb init` command - Create a project

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::GlobalOpts;
use crate::core::cache::Database;
use crate::core::project::Project;

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current directory)
    pub path: Option<PathBuf>,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let root = match args.path {
        Some(path) => path,
        None => std::env::current_dir().into_diagnostic()?,
    };
    std::fs::create_dir_all(&root).into_diagnostic()?;

    let project = Project::init(&root).map_err(|e| miette::miette!("{}", e))?;
    Database::open(&project.database_path()).into_diagnostic()?;

    if !global.quiet {
        println!(
            "{} Initialized project in {}",
            style("✓").green(),
            style(project.eb_dir().display()).cyan()
        );
        println!();
        println!(
            "Define your first entity with: {}",
            style("eb entity new <name> <slug> <PREFIX> --user <you> --role <super-role>").yellow()
        );
    }
    Ok(())
}
