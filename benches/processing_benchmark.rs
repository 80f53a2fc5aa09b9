use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use chrono::Local;
use meds_processor::models::{
    DatasetAttributes, DepthPressureCode, MedsRow, PartitionDataset, PartitionKey,
    PartitionScheme,
};
use meds_processor::processors::{IntegrityChecker, PartitionAccumulator, ProfileGrouper};

// Casts of `levels` rows each, rows of neighbouring casts interleaved
fn create_test_rows(casts: usize, levels: usize) -> Vec<MedsRow> {
    let mut rows = Vec::with_capacity(casts * levels);

    for level in 0..levels {
        for cast in 0..casts {
            rows.push(MedsRow {
                row: rows.len() + 1,
                data_type: "CD".to_string(),
                cr_number: format!("18HU{:05}", cast / 50),
                stn_number: cast.to_string(),
                source_id: "1".to_string(),
                obs_year: 1990 + (cast % 30) as i32,
                obs_month: 1 + (cast % 12) as u32,
                obs_day: 1 + (cast % 28) as u32,
                obs_time: ((cast % 24) * 100) as u32,
                q_date_time: Some(1),
                longitude: -60.0 - (cast as f64) * 0.01,
                latitude: 70.0 + (cast as f64) * 0.01,
                q_pos: Some(1),
                d_p_code: if cast % 3 == 0 {
                    DepthPressureCode::Pressure
                } else {
                    DepthPressureCode::Depth
                },
                depth_press: (level * 5) as f64,
                dp_flag: Some(1),
                temp: Some(4.0 - level as f64 * 0.05),
                q_temp: Some(1),
                psal: Some(32.0 + level as f64 * 0.01),
                q_psal: Some(1),
            });
        }
    }

    rows
}

fn benchmark_profile_grouper(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile_grouper");

    for casts in [100, 1000] {
        let rows = create_test_rows(casts, 50);
        group.bench_with_input(BenchmarkId::from_parameter(casts), &rows, |b, rows| {
            b.iter(|| {
                let grouper = ProfileGrouper::new();
                black_box(grouper.group_rows(rows.clone()).unwrap())
            })
        });
    }

    group.finish();
}

fn benchmark_accumulator(c: &mut Criterion) {
    let rows = create_test_rows(1000, 20);
    let chunks: Vec<Vec<MedsRow>> = rows.chunks(5000).map(|chunk| chunk.to_vec()).collect();

    c.bench_function("accumulate_chunks", |b| {
        b.iter(|| {
            let grouper = ProfileGrouper::new();
            let mut accumulator = PartitionAccumulator::new(PartitionScheme::default());
            for chunk in &chunks {
                let groups = grouper.group_rows(chunk.clone()).unwrap();
                accumulator.add_groups(groups).unwrap();
            }
            black_box(accumulator.drain())
        })
    });
}

fn benchmark_integrity_checker(c: &mut Criterion) {
    let groups = ProfileGrouper::new()
        .group_rows(create_test_rows(2000, 30))
        .unwrap();
    let dataset = PartitionDataset::from_groups(
        PartitionKey::new(1916, 2021).unwrap(),
        groups,
        DatasetAttributes::created("MEDS_2021", "bench.csv", Local::now()),
    );

    c.bench_function("integrity_checker", |b| {
        b.iter(|| {
            let checker = IntegrityChecker::new();
            black_box(checker.verify(&dataset).unwrap())
        })
    });
}

criterion_group!(
    benches,
    benchmark_profile_grouper,
    benchmark_accumulator,
    benchmark_integrity_checker
);
criterion_main!(benches);
