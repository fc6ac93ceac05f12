use std::{collections::BTreeSet, path::PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    aggregate::FilterCriteria,
    io_utils,
    mapping::{self, MappingOverrides},
    normalize::{self, DefaultingPolicy},
    source::SourceOptions,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Estimate classroom CO2e footprints from survey exports",
    long_about = None
)]
pub struct Cli {
    /// YAML config with keyword table, coefficients and policies
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print totals, category sums, daily trend and team ranking
    Report(ReportArgs),
    /// Write the per-response table with emission columns as CSV
    Compute(ComputeArgs),
    /// Show or save the survey-column to canonical-field mapping
    Mapping(MappingArgs),
    /// Preview the first rows of the raw survey export
    Preview(PreviewArgs),
    /// Show the active coefficient set or write a full config file
    Coefficients(CoefficientsArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Survey export file, or a directory when --sheet names a file inside it ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// File inside the --input directory to read
    #[arg(long)]
    pub sheet: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the export (defaults to utf-8; e.g. euc-kr)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

impl SourceArgs {
    pub fn options(&self) -> Result<SourceOptions> {
        Ok(SourceOptions {
            delimiter: self.delimiter,
            encoding: io_utils::resolve_encoding(self.input_encoding.as_deref())?,
        })
    }
}

#[derive(Debug, Args)]
pub struct OverrideArgs {
    /// YAML file of `field: column` selections (`field: null` unmaps a field)
    #[arg(long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// Inline selection such as `team=모둠`; an empty column unmaps the field
    #[arg(long = "map", action = clap::ArgAction::Append)]
    pub assignments: Vec<String>,
}

impl OverrideArgs {
    pub fn load(&self) -> Result<MappingOverrides> {
        mapping::load_overrides(self.mapping.as_deref(), &self.assignments)
    }
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Earliest response date to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Latest response date to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Grades to include
    #[arg(long = "grade", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub grades: Vec<String>,
    /// Classes to include
    #[arg(long = "class", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub classes: Vec<String>,
    /// Teams to include
    #[arg(long = "team", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub teams: Vec<String>,
}

impl FilterArgs {
    pub fn criteria(&self) -> FilterCriteria {
        let set = |values: &[String]| -> BTreeSet<String> {
            values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };
        FilterCriteria {
            from: self.from,
            to: self.to,
            grades: set(&self.grades),
            classes: set(&self.classes),
            teams: set(&self.teams),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub overrides: OverrideArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormat,
    /// How malformed cells are handled (overrides the config)
    #[arg(long, value_enum)]
    pub defaulting: Option<DefaultingPolicy>,
    /// Also list the grade/class/team values available for filtering
    #[arg(long = "show-options")]
    pub show_options: bool,
}

#[derive(Debug, Args)]
pub struct ComputeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub overrides: OverrideArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter to use for output (defaults to comma)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// How malformed cells are handled (overrides the config)
    #[arg(long, value_enum)]
    pub defaulting: Option<DefaultingPolicy>,
}

#[derive(Debug, Args)]
pub struct MappingArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub overrides: OverrideArgs,
    /// Write the resolved mapping as YAML instead of printing it
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct CoefficientsArgs {
    /// Write the full active configuration as YAML to this path
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    normalize::parse_survey_date(value).ok_or_else(|| format!("'{value}' is not a date"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_aliases_resolve() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("、").is_err());
    }

    #[test]
    fn filter_flags_build_criteria() {
        let cli = Cli::parse_from([
            "co2e-survey",
            "report",
            "-i",
            "survey.csv",
            "--from",
            "2024-05-01",
            "--team",
            "A,B",
            "--team",
            "C",
        ]);
        let Commands::Report(args) = cli.command else {
            panic!("expected report command");
        };
        let criteria = args.filters.criteria();
        assert_eq!(criteria.from, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(criteria.to, None);
        assert_eq!(criteria.teams.len(), 3);
        assert!(criteria.grades.is_empty());
    }
}
