//! Output formatting utilities
//!
//! Lists render as a bordered table on a terminal and as TSV when piped.
//! Single records default to YAML.

use console::Term;
use miette::{IntoDiagnostic, Result};
use serde_json::Value as Json;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat, is_list: bool) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if is_list {
                if Term::stdout().is_term() {
                    OutputFormat::Table
                } else {
                    OutputFormat::Tsv
                }
            } else {
                OutputFormat::Yaml
            }
        }
        other => other,
    }
}

/// Rows of text cells under a header
#[derive(Debug, Clone, Default)]
pub struct Listing {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Listing {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Bordered table for terminals
    pub fn render(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().cloned());
        for row in &self.rows {
            builder.push_record(row.iter().cloned());
        }
        let mut table = builder.build();
        table.with(Style::sharp());
        table.to_string()
    }

    /// Delimited text with a header line
    pub fn delimited(&self, delimiter: u8) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());
        writer.write_record(&self.headers).into_diagnostic()?;
        for row in &self.rows {
            writer.write_record(row).into_diagnostic()?;
        }
        let bytes = writer.into_inner().map_err(|e| miette::miette!("{}", e))?;
        String::from_utf8(bytes).into_diagnostic()
    }

    /// First column of every row
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().filter_map(|r| r.first().map(String::as_str))
    }
}

/// Print a list in the requested format
///
/// `records` is the structured form used for JSON and YAML output.
pub fn print_list(format: OutputFormat, listing: &Listing, records: &Json) -> Result<()> {
    match effective_format(format, true) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(records).into_diagnostic()?);
        }
        OutputFormat::Id => {
            for id in listing.ids() {
                println!("{}", id);
            }
        }
        OutputFormat::Csv => print!("{}", listing.delimited(b',')?),
        OutputFormat::Tsv => print!("{}", listing.delimited(b'\t')?),
        OutputFormat::Table | OutputFormat::Auto => println!("{}", listing.render()),
    }
    Ok(())
}

/// Print a single record in the requested format
pub fn print_record(format: OutputFormat, id: &str, record: &Json) -> Result<()> {
    match effective_format(format, false) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(record).into_diagnostic()?);
        }
        OutputFormat::Yaml | OutputFormat::Auto => {
            print!("{}", serde_yml::to_string(record).into_diagnostic()?);
        }
        OutputFormat::Id => println!("{}", id),
        format => {
            let mut listing = Listing::new(["field", "value"]);
            if let Json::Object(fields) = record {
                for (key, value) in fields {
                    listing.push([key.clone(), cell(value)]);
                }
            }
            print_list(format, &listing, record)?;
        }
    }
    Ok(())
}

/// Flatten a JSON value into one table cell
pub fn cell(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
