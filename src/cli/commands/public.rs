//! `eb public` command - Read a publicly shared row
//!
//! Works without a user; only rows shared as public are visible.

use miette::{IntoDiagnostic, Result};

use crate::cli::output::print_record;
use crate::cli::{GlobalOpts, Session};
use crate::core::api::row_json;
use crate::core::identity::RowId;
use crate::core::permissions;

#[derive(clap::Args, Debug)]
pub struct PublicArgs {
    /// Entity slug from the public link
    pub entity: String,

    /// Row id from the public link
    pub row: RowId,
}

pub fn run(args: PublicArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let row = permissions::public_row(&session.store, &args.entity, &args.row).into_diagnostic()?;
    print_record(global.format, row.id.as_str(), &row_json(&session.store, row))
}
