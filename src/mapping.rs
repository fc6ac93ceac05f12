//! Canonical-field to survey-column assignments and user overrides.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    cli::MappingArgs,
    config::Config,
    error::MappingError,
    fields::CanonicalField,
    matcher, source, table,
};

/// One optional raw column label per canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    columns: BTreeMap<CanonicalField, Option<String>>,
}

impl FieldMapping {
    pub fn unmapped() -> Self {
        Self {
            columns: CanonicalField::ALL
                .into_iter()
                .map(|field| (field, None))
                .collect(),
        }
    }

    pub fn column(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).and_then(|c| c.as_deref())
    }

    pub fn set(&mut self, field: CanonicalField, column: Option<String>) {
        self.columns.insert(field, column);
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, Option<&str>)> + '_ {
        CanonicalField::ALL
            .into_iter()
            .map(move |field| (field, self.column(field)))
    }

    pub fn unmapped_fields(&self) -> Vec<CanonicalField> {
        self.iter()
            .filter(|(_, column)| column.is_none())
            .map(|(field, _)| field)
            .collect()
    }

    /// Columns referenced by more than one field, in field order.
    pub fn duplicate_columns(&self) -> Vec<(String, Vec<CanonicalField>)> {
        self.iter()
            .filter_map(|(field, column)| column.map(|c| (c.to_string(), field)))
            .into_group_map()
            .into_iter()
            .filter(|(_, fields)| fields.len() > 1)
            .sorted_by_key(|(_, fields)| fields[0])
            .collect()
    }

    /// Mapped labels that the header row does not contain.
    pub fn missing_columns<S: AsRef<str>>(&self, headers: &[S]) -> Vec<(CanonicalField, String)> {
        self.iter()
            .filter_map(|(field, column)| {
                let column = column?;
                (!headers.iter().any(|h| h.as_ref() == column))
                    .then(|| (field, column.to_string()))
            })
            .collect()
    }

    pub fn apply_overrides(&mut self, overrides: &MappingOverrides) {
        for (field, column) in &overrides.entries {
            self.set(*field, column.clone());
        }
    }

    pub fn enforce(&self, policy: DuplicatePolicy) -> Result<(), MappingError> {
        for (column, fields) in self.duplicate_columns() {
            match policy {
                DuplicatePolicy::Warn => warn!(
                    "Column '{column}' feeds {} fields ({}); each reads the same values",
                    fields.len(),
                    fields.iter().map(|f| f.name()).join(", ")
                ),
                DuplicatePolicy::Reject => {
                    return Err(MappingError::DuplicateColumn { column, fields });
                }
            }
        }
        Ok(())
    }
}

/// What to do when one survey column is selected for several fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    #[default]
    Warn,
    Reject,
}

/// User column selections layered over the guessed mapping.
///
/// `None` pins a field to "unmapped" even when a keyword would match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingOverrides {
    entries: BTreeMap<CanonicalField, Option<String>>,
}

impl MappingOverrides {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, field: CanonicalField, column: Option<String>) {
        self.entries.insert(field, column);
    }

    /// Parses `field=column` assignments; an empty column unmaps the field.
    pub fn parse_assignments(assignments: &[String]) -> Result<Self> {
        let mut overrides = Self::default();
        for assignment in assignments {
            let (field, column) = assignment.split_once('=').ok_or_else(|| {
                anyhow!("Mapping override '{assignment}' must look like field=column")
            })?;
            let field: CanonicalField = field.trim().parse()?;
            let column = column.trim();
            overrides.insert(field, (!column.is_empty()).then(|| column.to_string()));
        }
        Ok(overrides)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
        let raw: BTreeMap<String, Option<String>> = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing mapping YAML {path:?}"))?;
        let mut overrides = Self::default();
        for (name, column) in raw {
            let field: CanonicalField = name.parse()?;
            let column = column.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
            overrides.insert(field, column);
        }
        Ok(overrides)
    }

    /// Later entries win over earlier ones.
    pub fn merge(mut self, other: MappingOverrides) -> Self {
        self.entries.extend(other.entries);
        self
    }
}

pub fn load_overrides(file: Option<&Path>, assignments: &[String]) -> Result<MappingOverrides> {
    let from_file = match file {
        Some(path) => MappingOverrides::load(path)
            .with_context(|| format!("Loading mapping overrides from {path:?}"))?,
        None => MappingOverrides::default(),
    };
    Ok(from_file.merge(MappingOverrides::parse_assignments(assignments)?))
}

pub fn execute(args: &MappingArgs, config: &Config) -> Result<()> {
    let options = args.source.options()?;
    let raw = source::fetch_table(&args.source.input, args.source.sheet.as_deref(), &options)?;
    let mut mapping = matcher::guess_mapping(&raw.headers, &config.keywords);
    let overrides = args.overrides.load()?;
    mapping.apply_overrides(&overrides);
    mapping.enforce(config.duplicates)?;

    if let Some(path) = &args.output {
        let file = File::create(path).with_context(|| format!("Creating mapping file {path:?}"))?;
        serde_yaml::to_writer(file, &mapping).context("Writing mapping YAML")?;
        info!("Mapping for {} field(s) written to {path:?}", CanonicalField::ALL.len());
        return Ok(());
    }

    let headers = vec!["field".to_string(), "column".to_string()];
    let rows = mapping
        .iter()
        .map(|(field, column)| {
            vec![
                field.name().to_string(),
                column.unwrap_or("(unmapped)").to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!(
        "Matched {} of {} field(s) using keyword table '{}'",
        CanonicalField::ALL.len() - mapping.unmapped_fields().len(),
        CanonicalField::ALL.len(),
        config.keywords.version
    );
    Ok(())
}
