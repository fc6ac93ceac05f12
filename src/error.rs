//! Typed failures callers may want to match on.
//!
//! Command handlers wrap these in `anyhow` with context; library callers can
//! downcast to tell an unreachable source from an empty one.

use thiserror::Error;

use crate::fields::CanonicalField;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{source_id}' is unreachable: {reason}")]
    Unreachable { source_id: String, reason: String },
    #[error("source '{source_id}' could not be read: {reason}")]
    Unreadable { source_id: String, reason: String },
    #[error("source '{source_id}' contains no survey responses")]
    Empty { source_id: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("unknown canonical field '{0}'")]
    UnknownField(String),
    #[error("column '{column}' is mapped to more than one field: {}", join_fields(.fields))]
    DuplicateColumn {
        column: String,
        fields: Vec<CanonicalField>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("line {row}: value '{value}' in column '{column}' is not a valid {field}")]
    Malformed {
        row: usize,
        field: CanonicalField,
        column: String,
        value: String,
    },
}

fn join_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|field| field.name())
        .collect::<Vec<_>>()
        .join(", ")
}
