//! Coefficient-based CO2e estimation for canonical survey records.
//!
//! The coefficients are classroom estimates, kept fixed and versioned so that
//! cohorts and weeks stay comparable. Category lookups go through closed enums
//! whose `Unknown` variant carries the fallback coefficient.

use serde::{Deserialize, Serialize};

use crate::normalize::CanonicalRecord;

pub const DEFAULT_COEFFICIENT_VERSION: &str = "classroom-v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommuteMode {
    Subway,
    Bus,
    Car,
    Carpool,
    Walk,
    Bike,
    Unknown,
}

impl CommuteMode {
    /// Maps a lower-cased survey answer onto a mode.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "subway" | "metro" | "지하철" | "전철" => CommuteMode::Subway,
            "bus" | "버스" => CommuteMode::Bus,
            "car" | "자동차" | "자가용" | "승용차" => CommuteMode::Car,
            "carpool" | "카풀" => CommuteMode::Carpool,
            "walk" | "도보" | "걷기" => CommuteMode::Walk,
            "bike" | "bicycle" | "자전거" => CommuteMode::Bike,
            _ => CommuteMode::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LunchType {
    Veg,
    Mixed,
    Meat,
    Unknown,
}

impl LunchType {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "veg" | "vegetarian" | "vegan" | "채식" => LunchType::Veg,
            "mixed" | "혼합" | "일반" => LunchType::Mixed,
            "meat" | "육식" | "고기" => LunchType::Meat,
            _ => LunchType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalCoefficients {
    pub youtube_per_hr: f64,
    pub streaming_per_hr: f64,
    pub sns_per_hr: f64,
    pub messenger_per_hr: f64,
    pub video_meeting_per_hr: f64,
    pub mobile_data_per_gb: f64,
}

/// kg CO2e per km travelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommuteCoefficients {
    pub subway: f64,
    pub bus: f64,
    pub car: f64,
    pub carpool: f64,
    pub walk: f64,
    pub bike: f64,
}

impl CommuteCoefficients {
    pub fn per_km(&self, mode: CommuteMode) -> f64 {
        match mode {
            CommuteMode::Subway => self.subway,
            CommuteMode::Bus => self.bus,
            CommuteMode::Car => self.car,
            CommuteMode::Carpool => self.carpool,
            CommuteMode::Walk => self.walk,
            CommuteMode::Bike => self.bike,
            CommuteMode::Unknown => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionCoefficients {
    pub pet_bottle: f64,
    pub disposable_cup: f64,
    pub delivery: f64,
    /// Answers counted as "used delivery", compared lower-cased.
    pub delivery_yes: Vec<String>,
}

impl ConsumptionCoefficients {
    pub fn delivery_used(&self, answer: &str) -> bool {
        let answer = answer.trim().to_lowercase();
        !answer.is_empty() && self.delivery_yes.iter().any(|yes| yes.to_lowercase() == answer)
    }
}

/// kg CO2e per lunch; unknown answers are charged as mixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealCoefficients {
    pub veg: f64,
    pub mixed: f64,
    pub meat: f64,
}

impl MealCoefficients {
    pub fn per_meal(&self, lunch: LunchType) -> f64 {
        match lunch {
            LunchType::Veg => self.veg,
            LunchType::Meat => self.meat,
            LunchType::Mixed | LunchType::Unknown => self.mixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSet {
    pub version: String,
    pub digital: DigitalCoefficients,
    pub commute: CommuteCoefficients,
    pub consumption: ConsumptionCoefficients,
    pub meal: MealCoefficients,
}

impl Default for CoefficientSet {
    fn default() -> Self {
        Self {
            version: DEFAULT_COEFFICIENT_VERSION.to_string(),
            digital: DigitalCoefficients {
                youtube_per_hr: 0.08,
                streaming_per_hr: 0.08,
                sns_per_hr: 0.04,
                messenger_per_hr: 0.02,
                video_meeting_per_hr: 0.15,
                mobile_data_per_gb: 0.05,
            },
            commute: CommuteCoefficients {
                subway: 0.04,
                bus: 0.08,
                car: 0.18,
                carpool: 0.09,
                walk: 0.0,
                bike: 0.0,
            },
            consumption: ConsumptionCoefficients {
                pet_bottle: 0.08,
                disposable_cup: 0.03,
                delivery: 0.5,
                delivery_yes: ["yes", "y", "예", "맞음", "했다", "사용"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
            meal: MealCoefficients {
                veg: 0.5,
                mixed: 1.2,
                meat: 2.0,
            },
        }
    }
}

impl CoefficientSet {
    /// Every numeric coefficient as `category.name`, in display order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        let d = &self.digital;
        let c = &self.commute;
        let s = &self.consumption;
        let m = &self.meal;
        vec![
            ("digital.youtube_per_hr", d.youtube_per_hr),
            ("digital.streaming_per_hr", d.streaming_per_hr),
            ("digital.sns_per_hr", d.sns_per_hr),
            ("digital.messenger_per_hr", d.messenger_per_hr),
            ("digital.video_meeting_per_hr", d.video_meeting_per_hr),
            ("digital.mobile_data_per_gb", d.mobile_data_per_gb),
            ("commute.subway", c.subway),
            ("commute.bus", c.bus),
            ("commute.car", c.car),
            ("commute.carpool", c.carpool),
            ("commute.walk", c.walk),
            ("commute.bike", c.bike),
            ("consumption.pet_bottle", s.pet_bottle),
            ("consumption.disposable_cup", s.disposable_cup),
            ("consumption.delivery", s.delivery),
            ("meal.veg", m.veg),
            ("meal.mixed", m.mixed),
            ("meal.meat", m.meat),
        ]
    }
}

/// Per-record CO2e sub-totals; the total is always their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EmissionBreakdown {
    #[serde(rename = "co2e_digital")]
    digital: f64,
    #[serde(rename = "co2e_commute")]
    commute: f64,
    #[serde(rename = "co2e_consumption")]
    consumption: f64,
    #[serde(rename = "co2e_meal")]
    meal: f64,
    #[serde(rename = "co2e_total")]
    total: f64,
}

impl EmissionBreakdown {
    pub fn new(digital: f64, commute: f64, consumption: f64, meal: f64) -> Self {
        Self {
            digital,
            commute,
            consumption,
            meal,
            total: digital + commute + consumption + meal,
        }
    }

    pub fn digital(&self) -> f64 {
        self.digital
    }

    pub fn commute(&self) -> f64 {
        self.commute
    }

    pub fn consumption(&self) -> f64 {
        self.consumption
    }

    pub fn meal(&self) -> f64 {
        self.meal
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

impl std::ops::Add for EmissionBreakdown {
    type Output = EmissionBreakdown;

    fn add(self, other: EmissionBreakdown) -> EmissionBreakdown {
        EmissionBreakdown::new(
            self.digital + other.digital,
            self.commute + other.commute,
            self.consumption + other.consumption,
            self.meal + other.meal,
        )
    }
}

impl std::iter::Sum for EmissionBreakdown {
    fn sum<I: Iterator<Item = EmissionBreakdown>>(iter: I) -> Self {
        iter.fold(EmissionBreakdown::default(), |acc, item| acc + item)
    }
}

pub fn compute(record: &CanonicalRecord, coefficients: &CoefficientSet) -> EmissionBreakdown {
    let d = &coefficients.digital;
    let digital = record.youtube_hr * d.youtube_per_hr
        + record.streaming_hr * d.streaming_per_hr
        + record.sns_hr * d.sns_per_hr
        + record.messenger_hr * d.messenger_per_hr
        + record.video_meeting_hr * d.video_meeting_per_hr
        + (record.mobile_data_mb / 1024.0) * d.mobile_data_per_gb;

    let mode = CommuteMode::from_label(&record.commute_mode);
    let commute = record.commute_km * coefficients.commute.per_km(mode);

    let c = &coefficients.consumption;
    let delivery = if c.delivery_used(&record.delivery_used) {
        c.delivery
    } else {
        0.0
    };
    let consumption =
        record.pet_bottles * c.pet_bottle + record.disposable_cups * c.disposable_cup + delivery;

    let meal = coefficients
        .meal
        .per_meal(LunchType::from_label(&record.lunch_type));

    EmissionBreakdown::new(digital, commute, consumption, meal)
}

/// A canonical record paired with its emission estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedRecord {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    #[serde(flatten)]
    pub emissions: EmissionBreakdown,
}

pub fn compute_table(
    records: Vec<CanonicalRecord>,
    coefficients: &CoefficientSet,
) -> Vec<ComputedRecord> {
    records
        .into_iter()
        .map(|record| {
            let emissions = compute(&record, coefficients);
            ComputedRecord { record, emissions }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn record() -> CanonicalRecord {
        CanonicalRecord::default()
    }

    #[test]
    fn reference_record_totals_4_12() {
        let mut r = record();
        r.youtube_min = 120.0;
        r.commute_km = 10.0;
        r.commute_mode = "car".to_string();
        r.pet_bottles = 2.0;
        r.lunch_type = "meat".to_string();
        r.derive_hours();

        let e = compute(&r, &CoefficientSet::default());
        assert!((e.digital() - 0.16).abs() < EPS);
        assert!((e.commute() - 1.8).abs() < EPS);
        assert!((e.consumption() - 0.16).abs() < EPS);
        assert!((e.meal() - 2.0).abs() < EPS);
        assert!((e.total() - 4.12).abs() < EPS);
    }

    #[test]
    fn unknown_commute_mode_emits_nothing() {
        let mut r = record();
        r.commute_km = 42.0;
        r.commute_mode = "hoverboard".to_string();
        assert_eq!(compute(&r, &CoefficientSet::default()).commute(), 0.0);
    }

    #[test]
    fn blank_lunch_is_charged_as_mixed() {
        let mut r = record();
        r.commute_km = 7.0;
        assert!((compute(&r, &CoefficientSet::default()).meal() - 1.2).abs() < EPS);
        r.lunch_type = "pizza".to_string();
        assert!((compute(&r, &CoefficientSet::default()).meal() - 1.2).abs() < EPS);
    }

    #[test]
    fn delivery_vocabulary_adds_half_a_kilo() {
        let coefficients = CoefficientSet::default();
        for answer in ["yes", "Y", "예", "맞음", "했다", "사용"] {
            let mut r = record();
            r.delivery_used = answer.to_lowercase();
            let e = compute(&r, &coefficients);
            assert!((e.consumption() - 0.5).abs() < EPS, "answer {answer}");
        }
        for answer in ["", "no", "아니오", "yes please"] {
            let mut r = record();
            r.delivery_used = answer.to_string();
            assert_eq!(compute(&r, &coefficients).consumption(), 0.0, "answer {answer}");
        }
    }

    #[test]
    fn korean_mode_and_lunch_labels_resolve() {
        assert_eq!(CommuteMode::from_label("지하철"), CommuteMode::Subway);
        assert_eq!(CommuteMode::from_label("자전거"), CommuteMode::Bike);
        assert_eq!(LunchType::from_label("채식"), LunchType::Veg);
        assert_eq!(LunchType::from_label(""), LunchType::Unknown);
    }

    #[test]
    fn carpool_is_half_a_car() {
        let c = CoefficientSet::default().commute;
        assert!((c.per_km(CommuteMode::Carpool) * 2.0 - c.per_km(CommuteMode::Car)).abs() < EPS);
    }

    #[test]
    fn mobile_data_is_charged_per_gigabyte() {
        let mut r = record();
        r.mobile_data_mb = 2048.0;
        assert!((compute(&r, &CoefficientSet::default()).digital() - 0.1).abs() < EPS);
    }

    #[test]
    fn summed_breakdowns_keep_total_consistent() {
        let a = EmissionBreakdown::new(0.1, 0.2, 0.3, 0.4);
        let b = EmissionBreakdown::new(1.0, 0.0, 0.5, 1.2);
        let sum: EmissionBreakdown = [a, b].into_iter().sum();
        let parts = sum.digital() + sum.commute() + sum.consumption() + sum.meal();
        assert!((sum.total() - parts).abs() < EPS);
        assert!((sum.total() - 3.7).abs() < EPS);
    }
}
