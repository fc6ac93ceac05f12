//! One refresh cycle: fetch, match, normalize, compute.
//!
//! The fetch is the only slow step and goes through the [`TableCache`]; the
//! rest is recomputed from the cached snapshot every time, which is cheap.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::{
    aggregate::{self, CategoryTotals, FilterCriteria, Kpis, TeamRollup, TrendPoint},
    config::Config,
    emission::{self, ComputedRecord},
    mapping::{FieldMapping, MappingOverrides},
    matcher,
    normalize,
    source::{self, RawTable, SourceKey, SourceOptions, TableCache},
};

pub struct RefreshRequest<'a> {
    pub source_id: &'a str,
    pub sheet: Option<&'a str>,
    pub overrides: &'a MappingOverrides,
}

/// Output of one cycle, ready for filtering and aggregation.
#[derive(Debug, Clone)]
pub struct Refresh {
    pub raw: Arc<RawTable>,
    pub mapping: FieldMapping,
    pub records: Vec<ComputedRecord>,
    pub malformed_cells: usize,
    /// Cells with bytes invalid in the input encoding, decoded with U+FFFD.
    pub undecodable_cells: usize,
}

/// Everything the presentation layer draws for one filter selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub kpis: Kpis,
    pub categories: CategoryTotals,
    pub trend: Vec<TrendPoint>,
    pub ranking: Vec<TeamRollup>,
}

impl Refresh {
    pub fn view(&self, criteria: &FilterCriteria) -> DashboardView {
        let filtered = aggregate::filter(&self.records, criteria);
        DashboardView {
            kpis: aggregate::summarize(&filtered),
            categories: aggregate::category_totals(&filtered),
            trend: aggregate::group_by_date(&filtered),
            ranking: aggregate::group_by_team(&filtered),
        }
    }
}

pub struct Dashboard {
    config: Config,
    options: SourceOptions,
    cache: TableCache,
}

impl Dashboard {
    pub fn new(config: Config, options: SourceOptions) -> Self {
        let cache = TableCache::new(config.cache_ttl());
        Self {
            config,
            options,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    pub fn refresh(&self, request: &RefreshRequest<'_>) -> Result<Refresh> {
        let key = SourceKey::new(request.source_id, request.sheet);
        let raw = self.cache.get_or_fetch(&key, || {
            source::fetch_table(request.source_id, request.sheet, &self.options)
        })?;

        let mut mapping = matcher::guess_mapping(&raw.headers, &self.config.keywords);
        mapping.apply_overrides(request.overrides);
        mapping.enforce(self.config.duplicates)?;
        for (field, column) in mapping.missing_columns(&raw.headers) {
            warn!("Column '{column}' selected for '{field}' is not in the table; using defaults");
        }
        let unmapped = mapping.unmapped_fields();
        if !unmapped.is_empty() {
            info!(
                "{} field(s) not reported by this survey: {}",
                unmapped.len(),
                unmapped.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
            );
        }

        let normalized = normalize::normalize_with(&raw, &mapping, self.config.defaulting)
            .with_context(|| format!("Normalizing responses from {:?}", request.source_id))?;
        let records = emission::compute_table(normalized.records, &self.config.coefficients);
        info!(
            "Computed CO2e for {} response(s) with coefficient set '{}'",
            records.len(),
            self.config.coefficients.version
        );
        let undecodable_cells = raw.undecodable_cells();
        Ok(Refresh {
            raw,
            mapping,
            records,
            malformed_cells: normalized.malformed_cells,
            undecodable_cells,
        })
    }
}
