//! `eb log` command - Activity history of a row
//!
//! Shows creation, value changes, transitions, sharing and comments in
//! the order they happened.

use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use crate::cli::entity_cmd::resolve_row;
use crate::cli::output::{effective_format, print_list, Listing};
use crate::cli::{GlobalOpts, OutputFormat, Session};
use crate::core::activity::{self, format_log};
use crate::entities::{Log, LogAction};

#[derive(clap::Args, Debug)]
pub struct LogArgs {
    /// Row id or folio
    pub row: String,

    /// Only comments
    #[arg(long)]
    pub comments: bool,

    /// Limit to the most recent N entries
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

pub fn run(args: LogArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id = resolve_row(&session.store, &session.ctx, &args.row)?;
    let mut entries = activity::history(&session.store, &session.ctx, &id).into_diagnostic()?;

    if args.comments {
        entries.retain(|log| log.action == LogAction::Comment);
    }
    if let Some(limit) = args.limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    if entries.is_empty() {
        if !global.quiet {
            println!("No activity.");
        }
        return Ok(());
    }

    match effective_format(global.format, true) {
        OutputFormat::Table | OutputFormat::Auto if console::Term::stdout().is_term() => {
            for log in &entries {
                println!("{}", table_line(log));
                if !log.reactions.is_empty() && !log.is_deleted {
                    let kinds: Vec<&str> = log.reactions.iter().map(|r| r.kind.as_str()).collect();
                    println!("    {}", style(kinds.join(" ")).yellow());
                }
            }
            Ok(())
        }
        format => {
            let mut listing = Listing::new(["id", "at", "action", "summary"]);
            let mut records = Vec::with_capacity(entries.len());
            for log in &entries {
                listing.push([
                    log.id.to_string(),
                    log.created_at.to_rfc3339(),
                    log.action.to_string(),
                    format_log(log),
                ]);
                records.push(json_record(log));
            }
            print_list(format, &listing, &serde_json::Value::Array(records))
        }
    }
}

/// Table line; [`format_log`] already leads with the timestamp
fn table_line(log: &Log) -> String {
    format!("{}  {}", style(log.id.as_str()).dim(), format_log(log))
}

fn json_record(log: &Log) -> serde_json::Value {
    // Deleted comments keep their text in the store only
    let details = if log.is_deleted {
        serde_json::Value::Null
    } else {
        log.details.clone()
    };
    json!({
        "id": log.id.to_string(),
        "at": log.created_at,
        "action": log.action.as_str(),
        "actor": log.actor.as_ref().map(|a| a.to_string()),
        "summary": format_log(log),
        "details": details,
        "reactions": log.reactions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{LogId, RowId};
    use chrono::{TimeZone, Utc};

    fn comment(is_deleted: bool) -> Log {
        Log {
            id: LogId::new(),
            row_id: RowId::new(),
            actor: None,
            action: LogAction::Comment,
            details: json!({ "text": "SecretText" }),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            is_deleted,
            reactions: Vec::new(),
        }
    }

    #[test]
    fn test_table_line_has_one_timestamp() {
        let line = table_line(&comment(false));
        assert_eq!(line.matches("2024-03-01 09:30").count(), 1);
        assert!(line.contains("SecretText"));
    }

    #[test]
    fn test_json_record_hides_deleted_comment() {
        let record = json_record(&comment(true));
        assert_eq!(record["details"], serde_json::Value::Null);
        assert_eq!(record["summary"].as_str().map(|s| s.contains("deleted a comment")), Some(true));
        assert!(!record.to_string().contains("SecretText"));

        let record = json_record(&comment(false));
        assert_eq!(record["details"]["text"], "SecretText");
    }
}
