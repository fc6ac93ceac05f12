//! Filtering, headline figures and rollups over computed survey records.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::emission::{ComputedRecord, EmissionBreakdown};

/// Empty sets and absent bounds mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub grades: BTreeSet<String>,
    pub classes: BTreeSet<String>,
    pub teams: BTreeSet<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.from.is_none()
            && self.to.is_none()
            && self.grades.is_empty()
            && self.classes.is_empty()
            && self.teams.is_empty()
    }

    fn has_date_bound(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn matches(&self, computed: &ComputedRecord) -> bool {
        let record = &computed.record;
        let date_ok = if self.has_date_bound() {
            record.date.is_some_and(|date| {
                self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
            })
        } else {
            true
        };
        date_ok
            && member(&self.grades, &record.grade)
            && member(&self.classes, &record.class)
            && member(&self.teams, &record.team)
    }
}

fn member(allowed: &BTreeSet<String>, value: &str) -> bool {
    allowed.is_empty() || allowed.contains(value)
}

pub fn filter(records: &[ComputedRecord], criteria: &FilterCriteria) -> Vec<ComputedRecord> {
    records
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect()
}

/// Distinct non-blank values offered for each membership filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub grades: Vec<String>,
    pub classes: Vec<String>,
    pub teams: Vec<String>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

pub fn filter_options(records: &[ComputedRecord]) -> FilterOptions {
    let distinct = |pick: fn(&ComputedRecord) -> &str| {
        records
            .iter()
            .map(pick)
            .filter(|value| !value.is_empty())
            .unique()
            .sorted()
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    let (first_date, last_date) = match records.iter().filter_map(|r| r.record.date).minmax() {
        itertools::MinMaxResult::NoElements => (None, None),
        itertools::MinMaxResult::OneElement(date) => (Some(date), Some(date)),
        itertools::MinMaxResult::MinMax(min, max) => (Some(min), Some(max)),
    };
    FilterOptions {
        grades: distinct(|r| r.record.grade.as_str()),
        classes: distinct(|r| r.record.class.as_str()),
        teams: distinct(|r| r.record.team.as_str()),
        first_date,
        last_date,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub total: f64,
    pub per_person_average: f64,
    pub digital_share_pct: f64,
    pub record_count: usize,
}

/// Headline figures. The per-person average is a mean of per-respondent sums;
/// responses without an `anon_id` count toward the total but not toward it.
pub fn summarize(records: &[ComputedRecord]) -> Kpis {
    let sums: EmissionBreakdown = records.iter().map(|r| r.emissions).sum();
    let per_person = records
        .iter()
        .filter(|r| !r.record.anon_id.is_empty())
        .map(|r| (r.record.anon_id.as_str(), r.emissions.total()))
        .into_grouping_map()
        .sum();
    let per_person_average = if per_person.is_empty() {
        0.0
    } else {
        per_person.values().sum::<f64>() / per_person.len() as f64
    };
    let digital_share_pct = if sums.total() > 0.0 {
        100.0 * sums.digital() / sums.total()
    } else {
        0.0
    };
    Kpis {
        total: sums.total(),
        per_person_average,
        digital_share_pct,
        record_count: records.len(),
    }
}

/// Sub-total sums across the table, for the category bar series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub co2e_digital: f64,
    pub co2e_commute: f64,
    pub co2e_consumption: f64,
    pub co2e_meal: f64,
    pub co2e_total: f64,
}

impl From<EmissionBreakdown> for CategoryTotals {
    fn from(sums: EmissionBreakdown) -> Self {
        Self {
            co2e_digital: sums.digital(),
            co2e_commute: sums.commute(),
            co2e_consumption: sums.consumption(),
            co2e_meal: sums.meal(),
            co2e_total: sums.total(),
        }
    }
}

pub fn category_totals(records: &[ComputedRecord]) -> CategoryTotals {
    records
        .iter()
        .map(|r| r.emissions)
        .sum::<EmissionBreakdown>()
        .into()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub co2e_total: f64,
    pub co2e_digital: f64,
}

/// Daily sums in ascending date order; undated responses are left out.
pub fn group_by_date(records: &[ComputedRecord]) -> Vec<TrendPoint> {
    let mut days: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for computed in records {
        if let Some(date) = computed.record.date {
            let entry = days.entry(date).or_default();
            entry.0 += computed.emissions.total();
            entry.1 += computed.emissions.digital();
        }
    }
    days.into_iter()
        .map(|(date, (co2e_total, co2e_digital))| TrendPoint {
            date,
            co2e_total,
            co2e_digital,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRollup {
    pub team: String,
    #[serde(flatten)]
    pub totals: CategoryTotals,
}

/// Per-team sums ranked lowest footprint first. Ties keep the order in which
/// teams first appear; responses without a team are left out.
pub fn group_by_team(records: &[ComputedRecord]) -> Vec<TeamRollup> {
    let mut order: Vec<&str> = Vec::new();
    let mut sums: HashMap<&str, EmissionBreakdown> = HashMap::new();
    for computed in records {
        let team = computed.record.team.as_str();
        if team.is_empty() {
            continue;
        }
        let entry = sums.entry(team).or_insert_with(|| {
            order.push(team);
            EmissionBreakdown::default()
        });
        *entry = *entry + computed.emissions;
    }
    order
        .into_iter()
        .map(|team| TeamRollup {
            team: team.to_string(),
            totals: sums.get(team).copied().unwrap_or_default().into(),
        })
        .sorted_by(|a, b| a.totals.co2e_total.total_cmp(&b.totals.co2e_total))
        .collect()
}
