//! Criterion benchmarks for report aggregation.
//!
//! Replays synthetic observation streams of increasing size into an
//! [`Aggregator`] and finalizes the report.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use typebench::adapters::mock::valid_outcome;
use typebench::domain::models::{
    CellId, CellRecord, Observation, Position, ReportStatus, RequestKind, RequestOutcome, Sample,
    SymbolKind,
};
use typebench::services::stats::summarize_nanos;
use typebench::services::{Aggregator, PackageMeta, ReportMeta};

const CHECKERS: &[&str] = &["pyright", "pyrefly", "ty", "zuban"];

fn meta(packages: usize) -> ReportMeta {
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    ReportMeta {
        run_id: Uuid::nil(),
        timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap(),
        date,
        seed_date: date,
        status: ReportStatus::Complete,
        stop_reason: None,
        checkers: CHECKERS.iter().map(ToString::to_string).collect(),
        versions: BTreeMap::new(),
        packages: (0..packages)
            .map(|i| PackageMeta {
                name: format!("pkg{i}"),
                github_url: None,
                ranking: u32::try_from(i + 1).ok(),
                has_inline_annotations: Some(i % 2 == 0),
            })
            .collect(),
        configured_package_count: packages,
        runs_per_package: 10,
        samples_per_run: 5,
        request_kind: RequestKind::Definition,
        include_raw: true,
    }
}

fn outcomes(packages: usize, runs: u32, samples: u32) -> (Vec<Observation>, Vec<CellRecord>) {
    let mut observations = Vec::new();
    let mut cells = Vec::new();
    for p in 0..packages {
        for checker in CHECKERS {
            for run in 0..runs {
                let cell = CellId::new(format!("pkg{p}"), *checker, run);
                for s in 0..samples {
                    let outcome = if (p + s as usize) % 7 == 0 {
                        RequestOutcome::Timeout
                    } else {
                        valid_outcome()
                    };
                    observations.push(Observation {
                        cell: cell.clone(),
                        sample_index: s,
                        sample: Sample {
                            file: "pkg/core.py".into(),
                            position: Position::new(s, 4),
                            token: "os".to_string(),
                            kind: SymbolKind::ImportedName,
                        },
                        latency: Duration::from_micros(u64::from(run * 997 + s * 131) + 500),
                        outcome,
                    });
                }
                cells.push(CellRecord::completed(cell, samples));
            }
        }
    }
    (observations, cells)
}

fn bench_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    for packages in [10_usize, 50, 200] {
        let (observations, cells) = outcomes(packages, 10, 5);
        let meta = meta(packages);
        group.bench_with_input(
            BenchmarkId::new("record_and_finalize", packages),
            &packages,
            |b, _| {
                b.iter(|| {
                    let mut aggregator = Aggregator::new();
                    for observation in &observations {
                        aggregator.record_observation(observation.clone());
                    }
                    for cell in &cells {
                        aggregator.record_cell(cell.clone());
                    }
                    black_box(aggregator.finalize(&meta))
                });
            },
        );
    }
    group.finish();
}

fn bench_latency_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_summary");
    for n in [10_u64, 1_000, 100_000] {
        let latencies: Vec<u64> = (0..n).map(|i| (i * 7_919) % 250_000_000 + 1).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &latencies, |b, l| {
            b.iter(|| black_box(summarize_nanos(black_box(l))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_finalize, bench_latency_summary);
criterion_main!(benches);
