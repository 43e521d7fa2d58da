//! Lag engine and snapshot enrichment
//!
//! Lag features are computed per country over a year-ordered panel. Missing
//! history never produces gaps: a missing lag-1 repeats the current value
//! and a missing lag-2 repeats lag-1.

use super::panel::{LagFields, PanelRow, TemporalFeatureRow};
use crate::error::{ForecastError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Compute lag, delta and trend features for every row of a panel.
///
/// Rows are sorted by (country, year) before lags are taken, so the output
/// is in that order regardless of input order. Duplicate (country, year)
/// pairs are rejected because they make "previous year" ambiguous.
pub fn compute_lag_features(panel: &[PanelRow]) -> Result<Vec<TemporalFeatureRow>> {
    let mut sorted: Vec<&PanelRow> = panel.iter().collect();
    sorted.sort_by(|a, b| a.country_iso3.cmp(&b.country_iso3).then(a.year.cmp(&b.year)));

    for pair in sorted.windows(2) {
        if pair[0].country_iso3 == pair[1].country_iso3 && pair[0].year == pair[1].year {
            return Err(ForecastError::ValidationError(format!(
                "duplicate panel row for {} in {}",
                pair[0].country_iso3, pair[0].year
            )));
        }
    }

    let mut out = Vec::with_capacity(sorted.len());
    let mut start = 0;
    while start < sorted.len() {
        let country = &sorted[start].country_iso3;
        let end = sorted[start..]
            .iter()
            .position(|r| &r.country_iso3 != country)
            .map_or(sorted.len(), |offset| start + offset);

        let group = &sorted[start..end];
        for (i, row) in group.iter().enumerate() {
            let prev1 = i.checked_sub(1).map(|j| group[j]);
            let prev2 = i.checked_sub(2).map(|j| group[j]);
            let lags = LagFields::from_history(row, prev1, prev2);
            out.push(TemporalFeatureRow::new((*row).clone(), lags));
        }
        start = end;
    }

    debug!(rows = out.len(), "Computed temporal lag features");
    Ok(out)
}

/// Back-fill lag features for a single-year snapshot from a historical panel.
///
/// Lag-1 values come from the latest year present anywhere in `history`,
/// lag-2 of the gap score from the year before it, matched by country.
/// Countries without a match fall back to their own current value for
/// lag-1 and to lag-1 for lag-2.
pub fn enrich_snapshot_with_lags(snapshot: &[PanelRow], history: &[PanelRow]) -> Vec<TemporalFeatureRow> {
    let latest_year = match history.iter().map(|r| r.year).max() {
        Some(y) => y,
        None => {
            return snapshot
                .iter()
                .map(|r| TemporalFeatureRow::new(r.clone(), snapshot_fallback_lags(r, None, None)))
                .collect()
        }
    };

    let lag1_by_country: HashMap<&str, &PanelRow> = history
        .iter()
        .filter(|r| r.year == latest_year)
        .map(|r| (r.country_iso3.as_str(), r))
        .collect();
    let lag2_by_country: HashMap<&str, f64> = history
        .iter()
        .filter(|r| r.year == latest_year - 1)
        .map(|r| (r.country_iso3.as_str(), r.fgi_score))
        .collect();

    let enriched: Vec<TemporalFeatureRow> = snapshot
        .iter()
        .map(|row| {
            let key = row.country_iso3.as_str();
            let lags = snapshot_fallback_lags(
                row,
                lag1_by_country.get(key).copied(),
                lag2_by_country.get(key).copied(),
            );
            TemporalFeatureRow::new(row.clone(), lags)
        })
        .collect();

    debug!(
        rows = enriched.len(),
        latest_year,
        matched = snapshot.iter().filter(|r| lag1_by_country.contains_key(r.country_iso3.as_str())).count(),
        "Enriched snapshot with historical lags"
    );
    enriched
}

fn snapshot_fallback_lags(current: &PanelRow, lag1: Option<&PanelRow>, lag2_fgi: Option<f64>) -> LagFields {
    let pick = |hist: Option<f64>, own: f64| -> f64 {
        match hist {
            Some(v) if v.is_finite() => v,
            _ if own.is_finite() => own,
            _ => 0.0,
        }
    };

    let fgi_score_lag1 = pick(lag1.map(|r| r.fgi_score), current.fgi_score);
    LagFields {
        fgi_score_lag1,
        fgi_score_lag2: lag2_fgi.filter(|v| v.is_finite()).unwrap_or(fgi_score_lag1),
        funded_pct_lag1: pick(lag1.map(|r| r.funded_pct), current.funded_pct),
        cbpf_share_lag1: pick(lag1.map(|r| r.cbpf_share), current.cbpf_share),
        pin_pct_pop_lag1: pick(lag1.map(|r| r.pin_pct_pop), current.pin_pct_pop),
        log_cbpf_lag1: pick(lag1.map(|r| r.log_cbpf), current.log_cbpf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineering::schema::TemporalFeature;

    fn row(iso3: &str, year: i32, fgi: f64) -> PanelRow {
        PanelRow {
            fgi_score: fgi,
            funded_pct: 100.0 - fgi,
            cbpf_share: fgi / 1000.0,
            pin_pct_pop: fgi / 10.0,
            log_cbpf: fgi / 20.0,
            ..PanelRow::new(iso3, year)
        }
    }

    #[test]
    fn test_single_observation_cold_start() {
        let rows = compute_lag_features(&[row("AFG", 2020, 42.0)]).unwrap();
        let t = &rows[0];
        assert_eq!(t.get(TemporalFeature::FgiScoreLag1), 42.0);
        assert_eq!(t.get(TemporalFeature::FgiScoreLag2), 42.0);
        assert_eq!(t.delta_fgi_1yr(), 0.0);
        assert_eq!(t.delta_funded_pct_1yr(), 0.0);
        assert_eq!(t.delta_pin_pct_1yr(), 0.0);
        assert_eq!(t.trend_fgi_2yr(), 0.0);
    }

    #[test]
    fn test_three_year_rotation() {
        // Shuffled input; the engine orders by year itself
        let panel = vec![row("SOM", 2022, 70.0), row("SOM", 2020, 50.0), row("SOM", 2021, 60.0)];
        let rows = compute_lag_features(&panel).unwrap();
        let years: Vec<i32> = rows.iter().map(|r| r.year()).collect();
        assert_eq!(years, vec![2020, 2021, 2022]);

        let last = &rows[2];
        assert_eq!(last.lags.fgi_score_lag1, 60.0);
        assert_eq!(last.lags.fgi_score_lag2, 50.0);
        assert_eq!(last.lags.funded_pct_lag1, 40.0);
        assert_eq!(last.delta_fgi_1yr(), 10.0);
        assert_eq!(last.trend_fgi_2yr(), 10.0);

        let second = &rows[1];
        assert_eq!(second.lags.fgi_score_lag1, 50.0);
        assert_eq!(second.lags.fgi_score_lag2, 50.0);
    }

    #[test]
    fn test_countries_do_not_leak() {
        let panel = vec![row("AFG", 2020, 10.0), row("BDI", 2021, 90.0), row("AFG", 2021, 20.0)];
        let rows = compute_lag_features(&panel).unwrap();
        let bdi = rows.iter().find(|r| r.country_iso3() == "BDI").unwrap();
        assert_eq!(bdi.lags.fgi_score_lag1, 90.0);
        let afg = rows.iter().find(|r| r.country_iso3() == "AFG" && r.year() == 2021).unwrap();
        assert_eq!(afg.lags.fgi_score_lag1, 10.0);
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let panel = vec![row("AFG", 2020, 10.0), row("AFG", 2020, 11.0)];
        assert!(matches!(
            compute_lag_features(&panel),
            Err(ForecastError::ValidationError(_))
        ));
    }

    #[test]
    fn test_enrich_snapshot_from_history() {
        let history = vec![row("AFG", 2022, 40.0), row("AFG", 2023, 50.0), row("SYR", 2023, 30.0)];
        let snapshot = vec![row("AFG", 2024, 60.0), row("SYR", 2024, 35.0), row("UKR", 2024, 20.0)];
        let enriched = enrich_snapshot_with_lags(&snapshot, &history);

        let afg = &enriched[0];
        assert_eq!(afg.lags.fgi_score_lag1, 50.0);
        assert_eq!(afg.lags.fgi_score_lag2, 40.0);
        assert_eq!(afg.delta_fgi_1yr(), 10.0);
        assert_eq!(afg.trend_fgi_2yr(), 10.0);

        // SYR has no row for 2022: lag-2 repeats lag-1
        let syr = &enriched[1];
        assert_eq!(syr.lags.fgi_score_lag1, 30.0);
        assert_eq!(syr.lags.fgi_score_lag2, 30.0);

        // UKR has no history at all: cold start on its own values
        let ukr = &enriched[2];
        assert_eq!(ukr.lags.fgi_score_lag1, 20.0);
        assert_eq!(ukr.lags.fgi_score_lag2, 20.0);
        assert_eq!(ukr.lags.funded_pct_lag1, 80.0);
        assert_eq!(ukr.delta_fgi_1yr(), 0.0);
    }

    #[test]
    fn test_enrich_snapshot_nan_current_value() {
        let mut snap = row("MLI", 2024, 10.0);
        snap.funded_pct = f64::NAN;
        let enriched = enrich_snapshot_with_lags(&[snap], &[]);
        assert_eq!(enriched[0].lags.funded_pct_lag1, 0.0);
        assert_eq!(enriched[0].lags.fgi_score_lag1, 10.0);
    }
}
