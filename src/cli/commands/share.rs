//! `eb share` command - Row visibility and grants

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::entity_cmd::resolve_row;
use crate::cli::{GlobalOpts, Session, VisibilityArg};
use crate::core::identity::{GroupId, RoleId, UserId};
use crate::core::permissions::{self, ShareRequest};

#[derive(clap::Args, Debug)]
pub struct ShareArgs {
    /// Row id or folio
    pub row: String,

    /// New visibility
    #[arg(value_enum)]
    pub visibility: VisibilityArg,

    /// Role to share with (roles visibility, repeatable)
    #[arg(long = "with-role", value_delimiter = ',')]
    pub roles: Vec<String>,

    /// Group to share with (groups visibility, repeatable)
    #[arg(long = "with-group", value_delimiter = ',')]
    pub groups: Vec<String>,

    /// User to share with (users visibility, repeatable)
    #[arg(long = "with-user", value_delimiter = ',')]
    pub users: Vec<String>,

    /// Grantees may not comment
    #[arg(long)]
    pub no_comment: bool,

    /// Grantees may not update values
    #[arg(long)]
    pub no_update: bool,

    /// Grantees may delete the row
    #[arg(long)]
    pub allow_delete: bool,
}

pub fn run(args: ShareArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;

    let request = ShareRequest::new(args.visibility.into())
        .with_roles(args.roles.iter().map(|r| RoleId::from(r.as_str())))
        .with_groups(args.groups.iter().map(|g| GroupId::from(g.as_str())))
        .with_users(args.users.iter().map(|u| UserId::from(u.as_str())))
        .with_flags(!args.no_comment, !args.no_update, args.allow_delete);
    let visibility = request.visibility;

    permissions::share(&mut session.store, &session.ctx, &id, request).into_diagnostic()?;
    session.save()?;

    let link = permissions::public_link(&session.store, session.config.server_url(), &id);
    if global.quiet {
        if let Some(url) = link {
            println!("{}", url);
        }
        return Ok(());
    }
    println!(
        "{} {} is now {}",
        style("✓").green(),
        style(&args.row).cyan(),
        style(visibility).yellow()
    );
    if let Some(url) = link {
        println!("  Public link: {}", style(url).underlined());
    }
    Ok(())
}
