//! Builds canonical survey records from raw cells through a field mapping.
//!
//! Normalization runs in two visible stages. [`parse_cell`] turns one raw
//! cell into a typed value, a blank, or a malformed marker; a
//! [`DefaultingPolicy`] then decides what a malformed cell becomes. The
//! lenient policy (the default) turns every malformed cell into the field's
//! neutral value so a half-filled survey never stops the dashboard; the strict
//! policy reports the first malformed cell instead.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::NormalizeError,
    fields::{CanonicalField, FieldKind},
    mapping::FieldMapping,
    source::RawTable,
};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

/// One survey response in canonical form. Numeric fields are never negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub date: Option<NaiveDate>,
    pub grade: String,
    pub class: String,
    pub team: String,
    pub anon_id: String,
    pub youtube_min: f64,
    pub streaming_min: f64,
    pub sns_min: f64,
    pub messenger_min: f64,
    pub video_meeting_min: f64,
    pub mobile_data_mb: f64,
    pub commute_mode: String,
    pub commute_km: f64,
    pub lunch_type: String,
    pub delivery_used: String,
    pub pet_bottles: f64,
    pub disposable_cups: f64,
    pub recycle_bags: f64,
    pub digital_cleanup_min: f64,
    pub youtube_hr: f64,
    pub streaming_hr: f64,
    pub sns_hr: f64,
    pub messenger_hr: f64,
    pub video_meeting_hr: f64,
}

impl CanonicalRecord {
    fn assign(&mut self, field: CanonicalField, value: ParsedCell) {
        match value {
            ParsedCell::Date(date) => {
                if field == CanonicalField::Date {
                    self.date = Some(date);
                }
            }
            ParsedCell::Text(text) => {
                if let Some(slot) = self.text_slot(field) {
                    *slot = text;
                }
            }
            ParsedCell::Number(number) => {
                if let Some(slot) = self.number_slot(field) {
                    *slot = number;
                }
            }
        }
    }

    fn text_slot(&mut self, field: CanonicalField) -> Option<&mut String> {
        Some(match field {
            CanonicalField::Grade => &mut self.grade,
            CanonicalField::Class => &mut self.class,
            CanonicalField::Team => &mut self.team,
            CanonicalField::AnonId => &mut self.anon_id,
            CanonicalField::CommuteMode => &mut self.commute_mode,
            CanonicalField::LunchType => &mut self.lunch_type,
            CanonicalField::DeliveryUsed => &mut self.delivery_used,
            _ => return None,
        })
    }

    fn number_slot(&mut self, field: CanonicalField) -> Option<&mut f64> {
        Some(match field {
            CanonicalField::YoutubeMin => &mut self.youtube_min,
            CanonicalField::StreamingMin => &mut self.streaming_min,
            CanonicalField::SnsMin => &mut self.sns_min,
            CanonicalField::MessengerMin => &mut self.messenger_min,
            CanonicalField::VideoMeetingMin => &mut self.video_meeting_min,
            CanonicalField::MobileDataMb => &mut self.mobile_data_mb,
            CanonicalField::CommuteKm => &mut self.commute_km,
            CanonicalField::PetBottles => &mut self.pet_bottles,
            CanonicalField::DisposableCups => &mut self.disposable_cups,
            CanonicalField::RecycleBags => &mut self.recycle_bags,
            CanonicalField::DigitalCleanupMin => &mut self.digital_cleanup_min,
            _ => return None,
        })
    }

    /// Fills the `*_hr` fields from their `*_min` counterparts.
    pub fn derive_hours(&mut self) {
        self.youtube_hr = self.youtube_min / 60.0;
        self.streaming_hr = self.streaming_min / 60.0;
        self.sns_hr = self.sns_min / 60.0;
        self.messenger_hr = self.messenger_min / 60.0;
        self.video_meeting_hr = self.video_meeting_min / 60.0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCell {
    Date(NaiveDate),
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    Parsed(ParsedCell),
    Blank,
    Malformed,
}

pub fn parse_cell(kind: FieldKind, raw: &str) -> CellOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellOutcome::Blank;
    }
    let parsed = match kind {
        FieldKind::Date => parse_survey_date(trimmed).map(ParsedCell::Date),
        FieldKind::Categorical { lowercase: true } => {
            Some(ParsedCell::Text(trimmed.to_lowercase()))
        }
        FieldKind::Categorical { lowercase: false } => {
            Some(ParsedCell::Text(trimmed.to_string()))
        }
        FieldKind::Numeric => parse_quantity(trimmed).map(ParsedCell::Number),
    };
    parsed.map_or(CellOutcome::Malformed, CellOutcome::Parsed)
}

/// Accepts plain and thousands-separated numbers; rejects negatives and non-finite values.
pub fn parse_quantity(value: &str) -> Option<f64> {
    let cleaned = value
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>();
    let parsed: f64 = cleaned.parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    // folds -0.0 into 0.0
    Some(if parsed == 0.0 { 0.0 } else { parsed })
}

/// Parses the date part of form timestamps, including `2024. 5. 6 오후 2:30:00`.
pub fn parse_survey_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(parsed.date());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.date_naive());
    }
    parse_dotted_date(value).or_else(|| {
        let first = value.split_whitespace().next()?;
        (first != value)
            .then(|| DATE_FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(first, fmt).ok()))
            .flatten()
    })
}

fn parse_dotted_date(value: &str) -> Option<NaiveDate> {
    if !value.contains('.') {
        return None;
    }
    let mut parts = value
        .split(|c: char| c == '.' || c.is_whitespace())
        .filter(|part| !part.is_empty());
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum DefaultingPolicy {
    #[default]
    Lenient,
    Strict,
}

/// Where a cell came from, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct CellLocation<'a> {
    pub row: usize,
    pub field: CanonicalField,
    pub column: &'a str,
    pub value: &'a str,
}

impl DefaultingPolicy {
    /// `Ok(None)` means the field keeps its neutral default.
    pub fn settle(
        self,
        outcome: CellOutcome,
        at: CellLocation<'_>,
    ) -> Result<Option<ParsedCell>, NormalizeError> {
        match (outcome, self) {
            (CellOutcome::Parsed(value), _) => Ok(Some(value)),
            (CellOutcome::Blank, _) => Ok(None),
            (CellOutcome::Malformed, DefaultingPolicy::Lenient) => {
                debug!(
                    "Line {}: '{}' in column '{}' is not a valid {}; using default",
                    at.row, at.value, at.column, at.field
                );
                Ok(None)
            }
            (CellOutcome::Malformed, DefaultingPolicy::Strict) => Err(NormalizeError::Malformed {
                row: at.row,
                field: at.field,
                column: at.column.to_string(),
                value: at.value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub records: Vec<CanonicalRecord>,
    /// Cells that fell back to a default under the lenient policy.
    pub malformed_cells: usize,
}

/// Lenient normalization; malformed input never fails.
pub fn normalize(raw: &RawTable, mapping: &FieldMapping) -> Vec<CanonicalRecord> {
    normalize_with(raw, mapping, DefaultingPolicy::Lenient)
        .map(|table| table.records)
        .unwrap_or_default()
}

pub fn normalize_with(
    raw: &RawTable,
    mapping: &FieldMapping,
    policy: DefaultingPolicy,
) -> Result<NormalizedTable, NormalizeError> {
    let columns = CanonicalField::ALL
        .into_iter()
        .filter_map(|field| {
            let label = mapping.column(field)?;
            raw.column_index(label).map(|idx| (field, label, idx))
        })
        .collect::<Vec<_>>();

    let mut malformed_cells = 0usize;
    let mut records = Vec::with_capacity(raw.len());
    for row_idx in 0..raw.len() {
        let mut record = CanonicalRecord::default();
        for &(field, label, column_idx) in &columns {
            let value = raw.cell(row_idx, column_idx);
            let outcome = parse_cell(field.kind(), value);
            if outcome == CellOutcome::Malformed {
                malformed_cells += 1;
            }
            let location = CellLocation {
                row: raw.line(row_idx),
                field,
                column: label,
                value,
            };
            if let Some(parsed) = policy.settle(outcome, location)? {
                record.assign(field, parsed);
            }
        }
        record.derive_hours();
        records.push(record);
    }

    if malformed_cells > 0 {
        info!("{malformed_cells} malformed cell(s) replaced with defaults");
    }
    Ok(NormalizedTable {
        records,
        malformed_cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn mapping(pairs: &[(CanonicalField, &str)]) -> FieldMapping {
        let mut mapping = FieldMapping::unmapped();
        for (field, column) in pairs {
            mapping.set(*field, Some(column.to_string()));
        }
        mapping
    }

    #[test]
    fn parse_survey_date_accepts_form_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_survey_date("2024-05-06"), Some(expected));
        assert_eq!(parse_survey_date("2024/05/06 14:30:00"), Some(expected));
        assert_eq!(parse_survey_date("5/6/2024 14:30:00"), Some(expected));
        assert_eq!(parse_survey_date("2024. 5. 6 오후 2:30:00"), Some(expected));
        assert_eq!(parse_survey_date("2024-05-06T14:30:00+09:00"), Some(expected));
        assert_eq!(parse_survey_date("2024-05-06 2:30 PM"), Some(expected));
        assert_eq!(parse_survey_date("지난주 월요일"), None);
        assert_eq!(parse_survey_date("2024. 13. 40"), None);
    }

    #[test]
    fn parse_quantity_rejects_garbage_and_negatives() {
        assert_eq!(parse_quantity("120"), Some(120.0));
        assert_eq!(parse_quantity("1,024"), Some(1024.0));
        assert_eq!(parse_quantity(" 2.5 "), Some(2.5));
        assert_eq!(parse_quantity("-0"), Some(0.0));
        assert_eq!(parse_quantity("-3"), None);
        assert_eq!(parse_quantity("NaN"), None);
        assert_eq!(parse_quantity("inf"), None);
        assert_eq!(parse_quantity("두 시간"), None);
    }

    #[test]
    fn parse_cell_lowercases_lookup_categoricals_only() {
        assert_eq!(
            parse_cell(FieldKind::Categorical { lowercase: true }, " Car "),
            CellOutcome::Parsed(ParsedCell::Text("car".to_string()))
        );
        assert_eq!(
            parse_cell(FieldKind::Categorical { lowercase: false }, "Team A"),
            CellOutcome::Parsed(ParsedCell::Text("Team A".to_string()))
        );
        assert_eq!(parse_cell(FieldKind::Numeric, "   "), CellOutcome::Blank);
        assert_eq!(parse_cell(FieldKind::Numeric, "many"), CellOutcome::Malformed);
    }

    #[test]
    fn normalize_fills_defaults_for_unmapped_and_garbage() {
        let table = raw(
            &["날짜", "유튜브(분)", "교통", "팀"],
            &[&["2024-05-06", "90", "BUS", "A"], &["언젠가", "많이", "", "B"]],
        );
        let mapping = mapping(&[
            (CanonicalField::Date, "날짜"),
            (CanonicalField::YoutubeMin, "유튜브(분)"),
            (CanonicalField::CommuteMode, "교통"),
            (CanonicalField::Team, "팀"),
            (CanonicalField::LunchType, "없는 열"),
        ]);
        let normalized = normalize_with(&table, &mapping, DefaultingPolicy::Lenient).unwrap();
        assert_eq!(normalized.malformed_cells, 2);

        let first = &normalized.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 5, 6));
        assert_eq!(first.youtube_min, 90.0);
        assert_eq!(first.youtube_hr, 1.5);
        assert_eq!(first.commute_mode, "bus");
        assert_eq!(first.lunch_type, "");

        let second = &normalized.records[1];
        assert_eq!(second.date, None);
        assert_eq!(second.youtube_min, 0.0);
        assert_eq!(second.team, "B");
    }

    #[test]
    fn strict_policy_reports_first_malformed_cell() {
        let table = raw(&["통학 거리"], &[&["3"], &["멀다"]]);
        let mapping = mapping(&[(CanonicalField::CommuteKm, "통학 거리")]);
        let err = normalize_with(&table, &mapping, DefaultingPolicy::Strict).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::Malformed {
                row: 3,
                field: CanonicalField::CommuteKm,
                column: "통학 거리".to_string(),
                value: "멀다".to_string(),
            }
        );
    }

    #[test]
    fn strict_policy_reports_the_file_line() {
        let table = RawTable::with_lines(
            vec!["학년".to_string(), "통학 거리".to_string()],
            vec![
                (2, vec!["2".to_string(), "3".to_string()]),
                (4, vec!["2".to_string(), "멀다".to_string()]),
            ],
        );
        let mapping = mapping(&[(CanonicalField::CommuteKm, "통학 거리")]);
        let err = normalize_with(&table, &mapping, DefaultingPolicy::Strict).unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed { row: 4, .. }));
    }

    #[test]
    fn double_mapped_column_feeds_both_fields() {
        let table = raw(&["영상(분)"], &[&["60"]]);
        let mapping = mapping(&[
            (CanonicalField::YoutubeMin, "영상(분)"),
            (CanonicalField::StreamingMin, "영상(분)"),
        ]);
        let records = normalize(&table, &mapping);
        assert_eq!(records[0].youtube_hr, 1.0);
        assert_eq!(records[0].streaming_hr, 1.0);
    }
}
