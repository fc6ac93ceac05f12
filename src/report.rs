//! The `report` command: headline figures, category sums, daily trend and
//! team ranking, rendered as text tables or a single JSON document.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::{
    aggregate::{self, FilterOptions},
    cli::{ReportArgs, ReportFormat},
    config::Config,
    mapping::FieldMapping,
    normalize::DefaultingPolicy,
    pipeline::{Dashboard, DashboardView, RefreshRequest},
    table,
};

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    coefficient_version: &'a str,
    keyword_version: &'a str,
    mapping: &'a FieldMapping,
    malformed_cells: usize,
    undecodable_cells: usize,
    #[serde(flatten)]
    view: &'a DashboardView,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<FilterOptions>,
}

pub fn execute(args: &ReportArgs, config: &Config) -> Result<()> {
    let config = with_defaulting(config, args.defaulting);
    let dashboard = Dashboard::new(config, args.source.options()?);
    let overrides = args.overrides.load()?;
    let refresh = dashboard.refresh(&RefreshRequest {
        source_id: &args.source.input,
        sheet: args.source.sheet.as_deref(),
        overrides: &overrides,
    })?;

    let criteria = args.filters.criteria();
    let view = refresh.view(&criteria);
    let options = args
        .show_options
        .then(|| aggregate::filter_options(&refresh.records));

    match args.format {
        ReportFormat::Text => print!("{}", render_text(&view, options.as_ref())),
        ReportFormat::Json => {
            let document = ReportDocument {
                coefficient_version: &dashboard.config().coefficients.version,
                keyword_version: &dashboard.config().keywords.version,
                mapping: &refresh.mapping,
                malformed_cells: refresh.malformed_cells,
                undecodable_cells: refresh.undecodable_cells,
                view: &view,
                options,
            };
            let json = serde_json::to_string_pretty(&document).context("Serializing report")?;
            println!("{json}");
        }
    }
    info!(
        "Reported {} of {} response(s)",
        view.kpis.record_count,
        refresh.records.len()
    );
    Ok(())
}

pub(crate) fn with_defaulting(config: &Config, defaulting: Option<DefaultingPolicy>) -> Config {
    let mut config = config.clone();
    if let Some(policy) = defaulting {
        config.defaulting = policy;
    }
    config
}

pub fn render_text(view: &DashboardView, options: Option<&FilterOptions>) -> String {
    let mut out = String::new();
    let kpis = &view.kpis;
    section(
        &mut out,
        "Summary (kg CO2e)",
        &["total", "per_person", "digital_share_pct", "records"],
        vec![vec![
            kg(kpis.total),
            kg(kpis.per_person_average),
            format!("{:.1}", kpis.digital_share_pct),
            kpis.record_count.to_string(),
        ]],
    );

    let c = &view.categories;
    section(
        &mut out,
        "Category totals",
        &["category", "co2e_kg"],
        [
            ("digital", c.co2e_digital),
            ("commute", c.co2e_commute),
            ("consumption", c.co2e_consumption),
            ("meal", c.co2e_meal),
        ]
        .into_iter()
        .map(|(name, value)| vec![name.to_string(), kg(value)])
        .collect(),
    );

    section(
        &mut out,
        "Daily trend",
        &["date", "co2e_total", "co2e_digital"],
        view.trend
            .iter()
            .map(|point| {
                vec![
                    point.date.format("%Y-%m-%d").to_string(),
                    kg(point.co2e_total),
                    kg(point.co2e_digital),
                ]
            })
            .collect(),
    );

    section(
        &mut out,
        "Team ranking (lowest first)",
        &[
            "rank",
            "team",
            "co2e_total",
            "co2e_digital",
            "co2e_commute",
            "co2e_consumption",
            "co2e_meal",
        ],
        view.ranking
            .iter()
            .enumerate()
            .map(|(idx, rollup)| {
                let t = &rollup.totals;
                vec![
                    (idx + 1).to_string(),
                    rollup.team.clone(),
                    kg(t.co2e_total),
                    kg(t.co2e_digital),
                    kg(t.co2e_commute),
                    kg(t.co2e_consumption),
                    kg(t.co2e_meal),
                ]
            })
            .collect(),
    );

    if let Some(options) = options {
        let dates = match (options.first_date, options.last_date) {
            (Some(first), Some(last)) => format!("{first} .. {last}"),
            _ => String::new(),
        };
        section(
            &mut out,
            "Filter options",
            &["filter", "values"],
            vec![
                vec!["grade".to_string(), options.grades.join(", ")],
                vec!["class".to_string(), options.classes.join(", ")],
                vec!["team".to_string(), options.teams.join(", ")],
                vec!["date".to_string(), dates],
            ],
        );
    }
    out
}

fn section(out: &mut String, title: &str, headers: &[&str], rows: Vec<Vec<String>>) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "{title}");
    let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    out.push_str(&table::render_table(&headers, &rows));
}

fn kg(value: f64) -> String {
    format!("{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{CategoryTotals, Kpis, TeamRollup};

    #[test]
    fn text_report_lists_every_section() {
        let view = DashboardView {
            kpis: Kpis {
                total: 4.62,
                per_person_average: 2.31,
                digital_share_pct: 3.46,
                record_count: 2,
            },
            categories: CategoryTotals::default(),
            trend: Vec::new(),
            ranking: vec![TeamRollup {
                team: "B".to_string(),
                totals: CategoryTotals {
                    co2e_total: 0.5,
                    co2e_meal: 0.5,
                    ..CategoryTotals::default()
                },
            }],
        };
        let text = render_text(&view, None);
        assert!(text.starts_with("Summary (kg CO2e)\n"));
        assert!(text.contains("4.62"));
        assert!(text.contains("3.5"));
        assert!(text.contains("Team ranking (lowest first)"));
        assert!(!text.contains("Filter options"));
    }

    #[test]
    fn defaulting_flag_overrides_config() {
        let config = Config::default();
        let strict = with_defaulting(&config, Some(DefaultingPolicy::Strict));
        assert_eq!(strict.defaulting, DefaultingPolicy::Strict);
        assert_eq!(with_defaulting(&config, None), config);
    }
}
