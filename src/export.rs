//! The `compute` command: the per-response table with derived hours and
//! emission columns, written as CSV.

use anyhow::{Context, Result};
use log::info;

use crate::{
    aggregate,
    cli::ComputeArgs,
    config::Config,
    emission::ComputedRecord,
    fields::CanonicalField,
    io_utils,
    pipeline::{Dashboard, RefreshRequest},
    report,
};

const HOUR_COLUMNS: [&str; 5] = [
    "youtube_hr",
    "streaming_hr",
    "sns_hr",
    "messenger_hr",
    "video_meeting_hr",
];

const EMISSION_COLUMNS: [&str; 5] = [
    "co2e_digital",
    "co2e_commute",
    "co2e_consumption",
    "co2e_meal",
    "co2e_total",
];

pub fn execute(args: &ComputeArgs, config: &Config) -> Result<()> {
    let config = report::with_defaulting(config, args.defaulting);
    let dashboard = Dashboard::new(config, args.source.options()?);
    let overrides = args.overrides.load()?;
    let refresh = dashboard.refresh(&RefreshRequest {
        source_id: &args.source.input,
        sheet: args.source.sheet.as_deref(),
        overrides: &overrides,
    })?;
    let records = aggregate::filter(&refresh.records, &args.filters.criteria());

    let delimiter = args.output_delimiter.unwrap_or(b',');
    let mut writer = io_utils::open_csv_writer(args.output.as_deref(), delimiter)?;
    writer
        .write_record(header_row())
        .context("Writing output headers")?;
    for (idx, computed) in records.iter().enumerate() {
        writer
            .write_record(record_row(computed))
            .with_context(|| format!("Writing output row {}", idx + 1))?;
    }
    writer.flush().context("Flushing output")?;
    info!(
        "Wrote {} of {} response(s) with emission columns",
        records.len(),
        refresh.records.len()
    );
    Ok(())
}

pub fn header_row() -> Vec<String> {
    CanonicalField::ALL
        .iter()
        .map(|field| field.name())
        .chain(HOUR_COLUMNS)
        .chain(EMISSION_COLUMNS)
        .map(str::to_string)
        .collect()
}

pub fn record_row(computed: &ComputedRecord) -> Vec<String> {
    let r = &computed.record;
    let e = &computed.emissions;
    let mut row = CanonicalField::ALL
        .iter()
        .map(|field| field_value(computed, *field))
        .collect::<Vec<_>>();
    row.extend(
        [
            r.youtube_hr,
            r.streaming_hr,
            r.sns_hr,
            r.messenger_hr,
            r.video_meeting_hr,
            e.digital(),
            e.commute(),
            e.consumption(),
            e.meal(),
            e.total(),
        ]
        .into_iter()
        .map(format_quantity),
    );
    row
}

fn field_value(computed: &ComputedRecord, field: CanonicalField) -> String {
    let r = &computed.record;
    let number = match field {
        CanonicalField::Date => {
            return r
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
        }
        CanonicalField::Grade => return r.grade.clone(),
        CanonicalField::Class => return r.class.clone(),
        CanonicalField::Team => return r.team.clone(),
        CanonicalField::AnonId => return r.anon_id.clone(),
        CanonicalField::CommuteMode => return r.commute_mode.clone(),
        CanonicalField::LunchType => return r.lunch_type.clone(),
        CanonicalField::DeliveryUsed => return r.delivery_used.clone(),
        CanonicalField::YoutubeMin => r.youtube_min,
        CanonicalField::StreamingMin => r.streaming_min,
        CanonicalField::SnsMin => r.sns_min,
        CanonicalField::MessengerMin => r.messenger_min,
        CanonicalField::VideoMeetingMin => r.video_meeting_min,
        CanonicalField::MobileDataMb => r.mobile_data_mb,
        CanonicalField::CommuteKm => r.commute_km,
        CanonicalField::PetBottles => r.pet_bottles,
        CanonicalField::DisposableCups => r.disposable_cups,
        CanonicalField::RecycleBags => r.recycle_bags,
        CanonicalField::DigitalCleanupMin => r.digital_cleanup_min,
    };
    format_quantity(number)
}

/// Shortest text that parses back to the same `f64`, so written subtotals
/// add up to the written total. Rounding belongs to the text report.
pub fn format_quantity(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}
