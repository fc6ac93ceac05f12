use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use co2e_survey::aggregate::{self, FilterCriteria};
use co2e_survey::config::Config;
use co2e_survey::emission::{self, CoefficientSet};
use co2e_survey::mapping::MappingOverrides;
use co2e_survey::matcher::{self, KeywordTable};
use co2e_survey::normalize;
use co2e_survey::pipeline::{Dashboard, RefreshRequest};
use co2e_survey::source::{self, SourceOptions};
use tempfile::TempDir;

fn generate_survey(rows: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join("survey.csv");
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(
        file,
        "{}",
        [
            "타임스탬프,학년,반,모둠,익명 ID,유튜브 시청(분)",
            "통학 수단,통학 거리(km),점심 식단,배달 음식 이용,페트병 개수",
        ]
        .join(",")
    )
    .expect("header");
    for i in 0..rows {
        let mode = match i % 4 {
            0 => "car",
            1 => "버스",
            2 => "walk",
            _ => "지하철",
        };
        let lunch = match i % 3 {
            0 => "veg",
            1 => "mixed",
            _ => "meat",
        };
        let day = (i % 28) + 1;
        writeln!(
            file,
            "2024-05-{day:02},{},{},{},s{i},{},{mode},{},{lunch},{},{}",
            i % 3 + 1,
            i % 5 + 1,
            (b'A' + (i % 8) as u8) as char,
            i % 240,
            i % 15,
            if i % 2 == 0 { "예" } else { "아니오" },
            i % 4
        )
        .expect("row");
    }
    (temp_dir, csv_path)
}

fn bench_compute(c: &mut Criterion) {
    let (_dir, csv_path) = generate_survey(20_000);
    let raw = source::fetch_table(csv_path.to_str().unwrap(), None, &SourceOptions::default())
        .expect("fetch");
    let mapping = matcher::guess_mapping(&raw.headers, &KeywordTable::default());
    let coefficients = CoefficientSet::default();

    c.bench_function("normalize_and_compute_20k", |b| {
        b.iter(|| {
            let records = normalize::normalize(&raw, &mapping);
            emission::compute_table(records, &coefficients)
        })
    });

    let records = emission::compute_table(normalize::normalize(&raw, &mapping), &coefficients);
    let criteria = FilterCriteria {
        teams: ["A", "C", "E"].into_iter().map(str::to_string).collect(),
        ..FilterCriteria::default()
    };
    c.bench_function("filter_and_aggregate_20k", |b| {
        b.iter(|| {
            let filtered = aggregate::filter(&records, &criteria);
            (
                aggregate::summarize(&filtered),
                aggregate::group_by_date(&filtered),
                aggregate::group_by_team(&filtered),
            )
        })
    });
}

fn bench_refresh(c: &mut Criterion) {
    let (_dir, csv_path) = generate_survey(5_000);
    let source_id = csv_path.to_str().unwrap().to_string();
    let overrides = MappingOverrides::default();

    c.bench_function("refresh_cold_5k", |b| {
        b.iter_batched(
            || Dashboard::new(Config::default(), SourceOptions::default()),
            |dashboard| {
                dashboard
                    .refresh(&RefreshRequest {
                        source_id: &source_id,
                        sheet: None,
                        overrides: &overrides,
                    })
                    .expect("refresh")
            },
            BatchSize::LargeInput,
        )
    });

    let dashboard = Dashboard::new(Config::default(), SourceOptions::default());
    c.bench_function("refresh_cached_5k", |b| {
        b.iter(|| {
            dashboard
                .refresh(&RefreshRequest {
                    source_id: &source_id,
                    sheet: None,
                    overrides: &overrides,
                })
                .expect("refresh")
        })
    });
}

criterion_group!(benches, bench_compute, bench_refresh);
criterion_main!(benches);
