use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neglect_forecast::feature_engineering::{compute_lag_features, PanelRow, SnapshotRow};
use neglect_forecast::projection::{ProjectionState, TemporalProjector};
use neglect_forecast::training::{EnsembleTrainer, TrainingConfig};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

fn create_panel(n_countries: usize, seed: u64) -> Vec<PanelRow> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut rows = Vec::new();
    for c in 0..n_countries {
        let iso3 = format!("C{:02}", c);
        let base_funded: f64 = rng.gen_range(20.0..80.0);
        for year in 2012..=2023 {
            let t = (year - 2012) as f64;
            let funded = (base_funded - 1.5 * t + rng.gen_range(-5.0..5.0)).clamp(0.0, 100.0);
            let fgi = 100.0 - funded;
            let pin = rng.gen_range(5.0..60.0);
            rows.push(PanelRow {
                fgi_score: fgi,
                cmi_score: fgi * rng.gen_range(0.7..1.0),
                cbpf_share: rng.gen_range(0.0..0.3),
                pin_pct_pop: pin,
                log_req_usd: rng.gen_range(17.0..23.0),
                log_cbpf: rng.gen_range(10.0..19.0),
                funded_pct: funded,
                n_clusters: rng.gen_range(3..12) as f64,
                neglect_score: 0.6 * fgi + 0.4 * pin,
                ..PanelRow::new(iso3, year)
            });
        }
    }
    rows
}

fn trained_projector(panel: &[PanelRow]) -> TemporalProjector {
    let config = TrainingConfig::new().with_cv_folds(3).with_estimator_scale(0.1);
    EnsembleTrainer::new(config)
        .unwrap()
        .train(panel)
        .unwrap()
        .projector()
        .unwrap()
}

fn latest_snapshots(panel: &[PanelRow]) -> Vec<SnapshotRow> {
    compute_lag_features(panel)
        .unwrap()
        .iter()
        .filter(|r| r.year() == 2023)
        .map(|r| r.to_snapshot_row())
        .collect()
}

fn bench_single_projection(c: &mut Criterion) {
    let panel = create_panel(12, 42);
    let projector = trained_projector(&panel);
    let snapshots = latest_snapshots(&panel);
    let state = ProjectionState::from_map(&snapshots[0].features);

    let mut group = c.benchmark_group("project");
    for n_steps in [4usize, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::new("quarterly", n_steps), n_steps, |b, &n| {
            b.iter(|| projector.project(black_box(&state), n, 0.25).unwrap())
        });
    }
    group.finish();
}

fn bench_batch_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("project_batch");
    group.sample_size(20);

    for n_countries in [10usize, 40].iter() {
        let panel = create_panel(*n_countries, 7);
        let projector = trained_projector(&panel);
        let snapshots = latest_snapshots(&panel);
        group.bench_with_input(BenchmarkId::new("countries", n_countries), &snapshots, |b, rows| {
            b.iter(|| projector.project_batch(black_box(rows), 8, 0.25).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_projection, bench_batch_projection);
criterion_main!(benches);
