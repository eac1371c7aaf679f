//! Criterion benchmarks for sample selection.
//!
//! Measures the lexical scan of Python sources and a full seeded draw over a
//! synthetic package on disk.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use typebench::domain::models::{Package, PackageSpec};
use typebench::services::sample_selector::{collect_occurrences, scan_sources, select_samples};

fn module(functions: usize) -> String {
    let mut source = String::from(
        "import os\nimport json\nfrom collections import OrderedDict, defaultdict\n\n",
    );
    for i in 0..functions {
        source.push_str(&format!(
            "def handler_{i}(path, payload):\n    \"\"\"Handle {i}.\"\"\"\n    data = OrderedDict()\n    data[path] = json.dumps(payload)  # encode\n    return os.path.join(path, str(len(data)))\n\n"
        ));
    }
    source
}

fn bench_occurrences(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect_occurrences");
    for functions in [10_usize, 100, 1_000] {
        let source = module(functions);
        group.bench_with_input(BenchmarkId::from_parameter(functions), &source, |b, s| {
            b.iter(|| black_box(collect_occurrences(black_box(s))));
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..50 {
        let path = dir.path().join(format!("pkg/mod_{i}.py"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, module(20)).unwrap();
    }
    let scan = scan_sources(dir.path()).unwrap();
    let package = Package {
        spec: PackageSpec::local("synthetic", dir.path(), 1),
        root: dir.path().to_path_buf(),
        candidate_files: scan.candidate_files,
        has_inline_annotations: scan.has_inline_annotations,
    };
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    let mut group = c.benchmark_group("select_samples");
    for count in [5_usize, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let set = select_samples(&package, date, count, 50).unwrap();
                black_box(set.iter().count())
            });
        });
    }
    group.finish();

    c.bench_function("scan_sources", |b| {
        b.iter(|| black_box(scan_sources(dir.path()).unwrap()));
    });
}

criterion_group!(benches, bench_occurrences, bench_select);
criterion_main!(benches);
