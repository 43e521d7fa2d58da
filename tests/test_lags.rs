//! Integration test: panel → lags → dataset → scaler

use neglect_forecast::feature_engineering::{
    build_temporal_forecast_dataset, compute_lag_features, enrich_snapshot_with_lags, fit_temporal_scaler,
    ClusterEfficiency, FeatureBuilder, FundingRecord, PanelRow, TemporalFeature, N_TEMPORAL_FEATURES,
    TEMPORAL_FEATURE_COLS,
};
use neglect_forecast::ForecastError;
use std::collections::HashMap;

fn row(iso3: &str, year: i32, fgi: f64, funded: f64, neglect: f64) -> PanelRow {
    PanelRow {
        fgi_score: fgi,
        funded_pct: funded,
        cbpf_share: fgi / 1000.0,
        pin_pct_pop: fgi / 10.0,
        log_cbpf: 10.0,
        neglect_score: neglect,
        ..PanelRow::new(iso3, year)
    }
}

fn funding(iso3: &str, year: i32, req: f64, funded: f64, pin: Option<f64>) -> FundingRecord {
    FundingRecord {
        country_iso3: iso3.to_string(),
        year,
        plan_name: format!("{} HRP {}", iso3, year),
        req_usd: req,
        funded_usd: funded,
        cbpf_total_usd: Some(1_000_000.0),
        fgi_score: 100.0 - funded / req.max(1.0) * 100.0,
        cmi_score: 40.0,
        cbpf_share: 0.05,
        pin,
    }
}

#[test]
fn test_single_year_country_cold_start() {
    let rows = compute_lag_features(&[row("HTI", 2022, 63.0, 37.0, 50.0)]).unwrap();
    let r = &rows[0];
    assert_eq!(r.get(TemporalFeature::FgiScoreLag1), 63.0);
    assert_eq!(r.get(TemporalFeature::FgiScoreLag2), 63.0);
    assert_eq!(r.get(TemporalFeature::FundedPctLag1), 37.0);
    assert_eq!(r.delta_fgi_1yr(), 0.0);
    assert_eq!(r.delta_funded_pct_1yr(), 0.0);
    assert_eq!(r.trend_fgi_2yr(), 0.0);
}

#[test]
fn test_lags_are_per_country_and_order_independent() {
    let panel = vec![
        row("YEM", 2021, 70.0, 30.0, 60.0),
        row("SDN", 2020, 40.0, 60.0, 30.0),
        row("YEM", 2019, 50.0, 50.0, 40.0),
        row("SDN", 2021, 44.0, 56.0, 35.0),
        row("YEM", 2020, 60.0, 40.0, 50.0),
    ];
    let rows = compute_lag_features(&panel).unwrap();

    let keys: Vec<(&str, i32)> = rows.iter().map(|r| (r.country_iso3(), r.year())).collect();
    assert_eq!(
        keys,
        vec![("SDN", 2020), ("SDN", 2021), ("YEM", 2019), ("YEM", 2020), ("YEM", 2021)]
    );

    // SDN 2020 must not see YEM history
    assert_eq!(rows[0].get(TemporalFeature::FgiScoreLag1), 40.0);
    assert_eq!(rows[1].get(TemporalFeature::FgiScoreLag1), 40.0);
    assert_eq!(rows[1].get(TemporalFeature::FgiScoreLag2), 40.0);

    let yem_2021 = &rows[4];
    assert_eq!(yem_2021.get(TemporalFeature::FgiScoreLag1), 60.0);
    assert_eq!(yem_2021.get(TemporalFeature::FgiScoreLag2), 50.0);
    assert_eq!(yem_2021.delta_fgi_1yr(), 10.0);
    assert_eq!(yem_2021.trend_fgi_2yr(), 10.0);
    assert_eq!(yem_2021.delta_funded_pct_1yr(), -10.0);
}

#[test]
fn test_duplicate_country_year_rejected() {
    let panel = vec![row("SDN", 2020, 40.0, 60.0, 30.0), row("SDN", 2020, 41.0, 59.0, 31.0)];
    assert!(matches!(compute_lag_features(&panel), Err(ForecastError::ValidationError(_))));
}

#[test]
fn test_dataset_pairs_and_min_year() {
    let panel: Vec<PanelRow> = (2013..=2020)
        .map(|y| row("SOM", y, 30.0 + (y - 2013) as f64, 50.0, (y - 2000) as f64))
        .collect();
    let rows = compute_lag_features(&panel).unwrap();

    let one = build_temporal_forecast_dataset(&rows, 1, 2015);
    // base years 2015..=2019 have a next year
    assert_eq!(one.years(), vec![2015, 2016, 2017, 2018, 2019]);
    assert_eq!(one.y.to_vec(), vec![16.0, 17.0, 18.0, 19.0, 20.0]);
    assert_eq!(one.x.ncols(), N_TEMPORAL_FEATURES);

    let two = build_temporal_forecast_dataset(&rows, 2, 2015);
    assert_eq!(two.len(), 4);
    assert_eq!(two.y[0], 17.0);
    assert_eq!(two.n_countries(), 1);
}

#[test]
fn test_scaler_records_schema() {
    let panel: Vec<PanelRow> = (2015..=2020).map(|y| row("AFG", y, y as f64 - 1990.0, 50.0, 1.0)).collect();
    let rows = compute_lag_features(&panel).unwrap();
    let (scaler, scaled) = fit_temporal_scaler(&rows).unwrap();

    assert_eq!(scaler.columns().len(), N_TEMPORAL_FEATURES);
    assert!(scaler.assert_columns(&TEMPORAL_FEATURE_COLS).is_ok());
    assert_eq!(scaled.nrows(), 6);
    // fgi 25..=30: median 27.5, IQR 2.5
    let fgi = TemporalFeature::FgiScore.index();
    assert!((scaled[[0, fgi]] - (25.0 - 27.5) / 2.5).abs() < 1e-9);
    // constant column keeps scale 1
    let funded = TemporalFeature::FundedPct.index();
    assert_eq!(scaled[[0, funded]], 0.0);
}

#[test]
fn test_snapshot_enrichment() {
    let history = vec![
        row("SDN", 2021, 40.0, 60.0, 30.0),
        row("SDN", 2022, 45.0, 55.0, 35.0),
        row("YEM", 2022, 70.0, 30.0, 60.0),
    ];
    let snapshot = vec![
        row("SDN", 2023, 50.0, 50.0, 0.0),
        row("YEM", 2023, 75.0, 25.0, 0.0),
        row("HTI", 2023, 65.0, 35.0, 0.0),
    ];
    let enriched = enrich_snapshot_with_lags(&snapshot, &history);

    let sdn = &enriched[0];
    assert_eq!(sdn.get(TemporalFeature::FgiScoreLag1), 45.0);
    assert_eq!(sdn.get(TemporalFeature::FgiScoreLag2), 40.0);
    assert_eq!(sdn.get(TemporalFeature::FundedPctLag1), 55.0);
    assert_eq!(sdn.trend_fgi_2yr(), 5.0);

    // only the latest year is known: lag2 repeats lag1
    let yem = &enriched[1];
    assert_eq!(yem.get(TemporalFeature::FgiScoreLag1), 70.0);
    assert_eq!(yem.get(TemporalFeature::FgiScoreLag2), 70.0);

    // no history: own values
    let hti = &enriched[2];
    assert_eq!(hti.get(TemporalFeature::FgiScoreLag1), 65.0);
    assert_eq!(hti.delta_fgi_1yr(), 0.0);

    let snap = hti.to_snapshot_row();
    assert_eq!(snap.country_iso3, "HTI");
    assert_eq!(snap.features.len(), N_TEMPORAL_FEATURES);
}

#[test]
fn test_feature_builder_to_lags() {
    let mut population = HashMap::new();
    population.insert("SDN".to_string(), 40_000_000.0);

    let records = vec![
        funding("SDN", 2021, 2.0e9, 1.0e9, Some(10_000_000.0)),
        funding("SDN", 2022, 2.0e9, 0.5e9, Some(12_000_000.0)),
        funding("CAF", 2022, 0.0, 0.0, None),
    ];
    let efficiency = vec![
        ClusterEfficiency {
            country_iso3: "SDN".into(),
            cluster_name: "Health".into(),
            bbr_z_score: 1.5,
            bbr_anomaly: true,
        },
        ClusterEfficiency {
            country_iso3: "SDN".into(),
            cluster_name: "WASH".into(),
            bbr_z_score: -0.5,
            bbr_anomaly: false,
        },
    ];

    let panel = FeatureBuilder::new(population).build_panel(&records, &efficiency);
    assert_eq!(panel.len(), 3);
    assert!(panel.iter().all(|r| (0.0..=100.0).contains(&r.neglect_score)));

    let caf = panel.iter().find(|r| r.country_iso3 == "CAF").unwrap();
    assert_eq!(caf.funded_pct, 0.0);
    assert_eq!(caf.pin_pct_pop, 0.0);
    assert_eq!(caf.req_per_pin, 0.0);

    let rows = compute_lag_features(&panel).unwrap();
    let sdn_2022 = rows.iter().find(|r| r.country_iso3() == "SDN" && r.year() == 2022).unwrap();
    assert_eq!(sdn_2022.get(TemporalFeature::FundedPctLag1), 50.0);
    assert_eq!(sdn_2022.delta_funded_pct_1yr(), -25.0);
    assert_eq!(sdn_2022.get(TemporalFeature::NClusters), 2.0);
}
