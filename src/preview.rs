use anyhow::Result;
use log::info;

use crate::{cli::PreviewArgs, source, table};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let options = args.source.options()?;
    let raw = source::fetch_table(&args.source.input, args.source.sheet.as_deref(), &options)?;
    let rows = raw
        .rows
        .iter()
        .take(args.rows)
        .map(|row| {
            (0..raw.headers.len())
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    table::print_table(&raw.headers, &rows);
    info!(
        "Displayed {} of {} row(s) from {:?}",
        rows.len(),
        raw.len(),
        args.source.input
    );
    Ok(())
}
