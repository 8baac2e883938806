use calamine::{Data, Range};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use snfkpi::dataset::compute_results;
use snfkpi::prelude::*;
use snfkpi::schema::layout;
use snfkpi::statistics::{linear_trend, pearson};

fn text(s: &str) -> Data {
    Data::String(s.to_string())
}

// Twelve months of a facility sheet with every mapped ledger and census line filled
fn synthetic_sheet(seed: f64) -> Range<Data> {
    let finance_labels: Vec<&str> = snfkpi::schema::REVENUE_LINES.iter()
        .chain(snfkpi::schema::EXPENSE_LINES.iter())
        .map(|line| line.label)
        .collect();
    let census_start = layout::FINANCE_FIRST_ROW + finance_labels.len() as u32 + 2;
    let census_labels: Vec<&str> = snfkpi::schema::CENSUS_LINES.iter()
        .map(|line| line.label)
        .chain(["Operational Beds", "Licensed Beds"])
        .collect();

    let last_row = census_start + census_labels.len() as u32 + 1;
    let mut range = Range::new((0, 0), (last_row, layout::LAST_PERIOD_COL));

    for month in 0..12u32 {
        let col = layout::FIRST_PERIOD_COL + month;
        range.set_value((layout::DATE_ROW, col), text(&format!("2025-{:02}", month + 1)));
    }

    for (i, label) in finance_labels.iter().enumerate() {
        let row = layout::FINANCE_FIRST_ROW + i as u32;
        range.set_value((row, layout::LABEL_COL), text(label));
        for month in 0..12u32 {
            let amount = seed * 1_000.0 + (i as f64 + 1.0) * 500.0 + month as f64 * 25.0;
            range.set_value((row, layout::FIRST_PERIOD_COL + month), Data::Float(amount));
        }
    }

    range.set_value((census_start, layout::LABEL_COL), text(layout::CENSUS_SENTINEL));
    for (i, label) in census_labels.iter().enumerate() {
        let row = census_start + 1 + i as u32;
        range.set_value((row, layout::LABEL_COL), text(label));
        for month in 0..12u32 {
            range.set_value((row, layout::FIRST_PERIOD_COL + month), Data::Float(60.0 + i as f64 * 10.0));
        }
    }
    range
}

fn synthetic_upload(facilities: usize) -> Vec<(String, Range<Data>)> {
    (0..facilities)
        .map(|i| (format!("{} (Facility {})", 100 + i, i), synthetic_sheet(i as f64)))
        .collect()
}

fn benchmark_parse_sheets(c: &mut Criterion) {
    let reader = WorkbookReader::new();
    let mut group = c.benchmark_group("parse_sheets");

    for facilities in [1usize, 10, 50] {
        let sheets = synthetic_upload(facilities);
        group.bench_with_input(BenchmarkId::from_parameter(facilities), &sheets, |b, sheets| {
            b.iter(|| {
                let facts = reader.parse_sheets(black_box(sheets.clone()), "bench.xlsx");
                assert!(facts.is_ok());
            })
        });
    }
    group.finish();
}

fn benchmark_compute_results(c: &mut Criterion) {
    let reader = WorkbookReader::new();
    let registry = KpiRegistry::standard();
    let mut group = c.benchmark_group("compute_results");
    group.sample_size(20);

    for facilities in [10usize, 50] {
        let facts = match reader.parse_sheets(synthetic_upload(facilities), "bench.xlsx") {
            Ok(facts) => facts,
            Err(e) => panic!("synthetic upload failed to parse: {}", e),
        };

        group.bench_with_input(BenchmarkId::new("sequential", facilities), &facts, |b, facts| {
            b.iter(|| compute_results(black_box(facts), &registry, Some(1)))
        });
        group.bench_with_input(BenchmarkId::new("parallel", facilities), &facts, |b, facts| {
            b.iter(|| compute_results(black_box(facts), &registry, None))
        });
    }
    group.finish();
}

fn benchmark_statistics(c: &mut Criterion) {
    let values: Vec<f64> = (0..120).map(|i| 250.0 + i as f64 * 1.5 + (i % 7) as f64).collect();
    let xs: Vec<Option<f64>> = values.iter().map(|v| Some(*v)).collect();
    let ys: Vec<Option<f64>> = values.iter().enumerate()
        .map(|(i, v)| if i % 11 == 0 { None } else { Some(v * 0.4 + 3.0) })
        .collect();

    c.bench_function("linear_trend_120_months", |b| {
        b.iter(|| linear_trend(black_box(&values)))
    });

    c.bench_function("pearson_120_months", |b| {
        b.iter(|| pearson(black_box(&xs), black_box(&ys)))
    });
}

criterion_group!(
    benches,
    benchmark_parse_sheets,
    benchmark_compute_results,
    benchmark_statistics
);
criterion_main!(benches);
