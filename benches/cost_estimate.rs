use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use wpforge::batch::spreadsheet;
use wpforge::config::Config;
use wpforge::db::ProjectSettings;
use wpforge::pipeline::{CostEstimator, idempotency_key};

fn bench_estimates(c: &mut Criterion) {
    let estimator = CostEstimator::from_config(&Config::default());
    let settings = ProjectSettings {
        word_count: 2_000,
        ..ProjectSettings::default()
    };

    c.bench_function("cost/estimate_post", |b| {
        b.iter(|| black_box(estimator.estimate_post(black_box(&settings)).total_usd));
    });

    c.bench_function("cost/estimate_batch_500", |b| {
        b.iter(|| black_box(estimator.estimate_batch(black_box(&settings), 500).total_usd));
    });
}

fn bench_keys_and_sheets(c: &mut Criterion) {
    c.bench_function("idempotency/key", |b| {
        b.iter(|| {
            black_box(idempotency_key(
                "wordpress.publish",
                black_box(["post-0001", "artifact-0002", "artifact-0003"]),
            ))
        });
    });

    let mut csv = String::from("keyword,title,scheduled_for\n");
    for i in 0..1_000 {
        csv.push_str(&format!("keyword {i},Title {i},\n"));
    }
    c.bench_function("spreadsheet/parse_1000_rows", |b| {
        b.iter(|| {
            let sheet = spreadsheet::parse_csv(black_box(csv.as_bytes())).expect("parse csv");
            black_box(sheet.rows.len());
        });
    });
}

criterion_group!(benches, bench_estimates, bench_keys_and_sheets);
criterion_main!(benches);
