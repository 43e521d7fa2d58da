//! Panel feature builder
//!
//! Turns cleaned funding and cluster-efficiency tables into [`PanelRow`]s and
//! computes the composite neglect score used as the forecast target.

use super::panel::PanelRow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Weights of the composite neglect score
pub const NEGLECT_WEIGHT_FGI: f64 = 0.35;
pub const NEGLECT_WEIGHT_CMI: f64 = 0.25;
pub const NEGLECT_WEIGHT_PIN: f64 = 0.20;
pub const NEGLECT_WEIGHT_CBPF: f64 = 0.10;
pub const NEGLECT_WEIGHT_BBR: f64 = 0.10;

/// One country-year funding record of the cleaned gold table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub country_iso3: String,
    pub year: i32,
    pub plan_name: String,
    pub req_usd: f64,
    pub funded_usd: f64,
    pub cbpf_total_usd: Option<f64>,
    pub fgi_score: f64,
    pub cmi_score: f64,
    pub cbpf_share: f64,
    /// People in need
    pub pin: Option<f64>,
}

/// One cluster-level efficiency record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEfficiency {
    pub country_iso3: String,
    pub cluster_name: String,
    pub bbr_z_score: f64,
    pub bbr_anomaly: bool,
}

/// Severity band of a funding-gap score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityBand {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityBand {
    pub fn from_fgi(fgi: f64) -> Self {
        if fgi >= 86.0 {
            SeverityBand::Critical
        } else if fgi >= 61.0 {
            SeverityBand::High
        } else if fgi >= 31.0 {
            SeverityBand::Medium
        } else {
            SeverityBand::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SeverityBand::Low => "LOW",
            SeverityBand::Medium => "MEDIUM",
            SeverityBand::High => "HIGH",
            SeverityBand::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-country aggregate of cluster efficiency rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BbrAggregate {
    median_z: f64,
    max_z: f64,
    n_anomalies: f64,
    n_clusters: f64,
}

/// Builds panel rows from cleaned source tables
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    population: HashMap<String, f64>,
}

impl FeatureBuilder {
    /// Create a builder with total population per country
    pub fn new(population: HashMap<String, f64>) -> Self {
        Self { population }
    }

    /// Build panel rows (with neglect scores) from funding and efficiency tables
    pub fn build_panel(&self, funding: &[FundingRecord], efficiency: &[ClusterEfficiency]) -> Vec<PanelRow> {
        let bbr = aggregate_bbr(efficiency);

        let mut rows: Vec<PanelRow> = funding
            .iter()
            .map(|rec| {
                let agg = bbr.get(&rec.country_iso3).copied().unwrap_or_default();
                let population = self
                    .population
                    .get(&rec.country_iso3)
                    .copied()
                    .filter(|p| p.is_finite())
                    .unwrap_or(0.0);
                let pin = finite_or_zero(rec.pin);
                let cbpf_total = finite_or_zero(rec.cbpf_total_usd);

                PanelRow {
                    country_iso3: rec.country_iso3.clone(),
                    year: rec.year,
                    fgi_score: rec.fgi_score,
                    cmi_score: rec.cmi_score,
                    cbpf_share: rec.cbpf_share,
                    pin_pct_pop: safe_ratio(pin, population, 100.0).clamp(0.0, 100.0),
                    log_req_usd: rec.req_usd.ln_1p(),
                    log_cbpf: cbpf_total.ln_1p(),
                    funded_pct: safe_ratio(rec.funded_usd, rec.req_usd, 100.0).clamp(0.0, 100.0),
                    cbpf_per_pin: safe_ratio(cbpf_total, pin, 1.0),
                    req_per_pin: safe_ratio(rec.req_usd, pin, 1.0),
                    bbr_median_z: agg.median_z,
                    bbr_max_z: agg.max_z,
                    n_cluster_anomalies: agg.n_anomalies,
                    n_clusters: agg.n_clusters,
                    neglect_score: 0.0,
                }
            })
            .collect();

        compute_neglect_scores(&mut rows);
        debug!(rows = rows.len(), countries = bbr.len(), "Built panel feature rows");
        rows
    }
}

/// Fill the composite neglect score of every row, normalising each component
/// over the whole table
pub fn compute_neglect_scores(rows: &mut [PanelRow]) {
    if rows.is_empty() {
        return;
    }
    let fgi = MinMax::over(rows.iter().map(|r| r.fgi_score));
    let cmi = MinMax::over(rows.iter().map(|r| r.cmi_score));
    let pin = MinMax::over(rows.iter().map(|r| r.pin_pct_pop));
    let cbpf = MinMax::over(rows.iter().map(|r| r.log_cbpf));
    let bbr = MinMax::over(rows.iter().map(|r| r.bbr_max_z.max(0.0)));

    for row in rows.iter_mut() {
        let score = NEGLECT_WEIGHT_FGI * fgi.norm(row.fgi_score)
            + NEGLECT_WEIGHT_CMI * cmi.norm(row.cmi_score)
            + NEGLECT_WEIGHT_PIN * pin.norm(row.pin_pct_pop)
            + NEGLECT_WEIGHT_CBPF * (1.0 - cbpf.norm(row.log_cbpf))
            + NEGLECT_WEIGHT_BBR * bbr.norm(row.bbr_max_z.max(0.0));
        row.neglect_score = score * 100.0;
    }
}

#[derive(Debug, Clone, Copy)]
struct MinMax {
    lo: f64,
    hi: f64,
}

impl MinMax {
    fn over(values: impl Iterator<Item = f64>) -> Self {
        let (lo, hi) = values
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if lo.is_finite() {
            Self { lo, hi }
        } else {
            Self { lo: 0.0, hi: 0.0 }
        }
    }

    fn norm(&self, v: f64) -> f64 {
        (v - self.lo) / (self.hi - self.lo + 1e-9)
    }
}

fn aggregate_bbr(efficiency: &[ClusterEfficiency]) -> BTreeMap<String, BbrAggregate> {
    let mut grouped: BTreeMap<&str, Vec<&ClusterEfficiency>> = BTreeMap::new();
    for rec in efficiency {
        grouped.entry(rec.country_iso3.as_str()).or_default().push(rec);
    }

    grouped
        .into_iter()
        .map(|(iso3, recs)| {
            let mut z: Vec<f64> = recs.iter().map(|r| r.bbr_z_score).filter(|v| v.is_finite()).collect();
            z.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let clusters: BTreeSet<&str> = recs.iter().map(|r| r.cluster_name.as_str()).collect();
            let agg = BbrAggregate {
                median_z: median_sorted(&z),
                max_z: z.last().copied().unwrap_or(0.0),
                n_anomalies: recs.iter().filter(|r| r.bbr_anomaly).count() as f64,
                n_clusters: clusters.len() as f64,
            };
            (iso3.to_string(), agg)
        })
        .collect()
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// `num / den * factor`, or 0 when the denominator is zero or not finite
fn safe_ratio(num: f64, den: f64, factor: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        return 0.0;
    }
    let v = num / den * factor;
    if v.is_finite() { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funding(iso3: &str, year: i32, fgi: f64, req: f64, funded: f64, pin: Option<f64>) -> FundingRecord {
        FundingRecord {
            country_iso3: iso3.to_string(),
            year,
            plan_name: format!("{} HRP {}", iso3, year),
            req_usd: req,
            funded_usd: funded,
            cbpf_total_usd: Some(1_000.0),
            fgi_score: fgi,
            cmi_score: fgi * 0.8,
            cbpf_share: 0.1,
            pin,
        }
    }

    fn cluster(iso3: &str, name: &str, z: f64, anomaly: bool) -> ClusterEfficiency {
        ClusterEfficiency {
            country_iso3: iso3.to_string(),
            cluster_name: name.to_string(),
            bbr_z_score: z,
            bbr_anomaly: anomaly,
        }
    }

    #[test]
    fn test_ratios_and_logs() {
        let pop = HashMap::from([("AFG".to_string(), 1_000.0)]);
        let builder = FeatureBuilder::new(pop);
        let rows = builder.build_panel(&[funding("AFG", 2022, 60.0, 200.0, 50.0, Some(100.0))], &[]);

        let r = &rows[0];
        assert!((r.pin_pct_pop - 10.0).abs() < 1e-12);
        assert!((r.funded_pct - 25.0).abs() < 1e-12);
        assert!((r.req_per_pin - 2.0).abs() < 1e-12);
        assert!((r.cbpf_per_pin - 10.0).abs() < 1e-12);
        assert!((r.log_req_usd - 200.0f64.ln_1p()).abs() < 1e-12);
        assert!((r.log_cbpf - 1_000.0f64.ln_1p()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_denominators_fill_zero() {
        let builder = FeatureBuilder::default();
        let rows = builder.build_panel(&[funding("YEM", 2022, 60.0, 0.0, 10.0, None)], &[]);
        let r = &rows[0];
        assert_eq!(r.pin_pct_pop, 0.0);
        assert_eq!(r.funded_pct, 0.0);
        assert_eq!(r.cbpf_per_pin, 0.0);
        assert_eq!(r.req_per_pin, 0.0);
    }

    #[test]
    fn test_funded_pct_clipped() {
        let builder = FeatureBuilder::default();
        let rows = builder.build_panel(&[funding("HTI", 2022, 10.0, 100.0, 250.0, None)], &[]);
        assert_eq!(rows[0].funded_pct, 100.0);
    }

    #[test]
    fn test_bbr_aggregates() {
        let eff = vec![
            cluster("SSD", "Health", 1.0, false),
            cluster("SSD", "Health", 3.0, true),
            cluster("SSD", "Education", -1.0, true),
        ];
        let builder = FeatureBuilder::default();
        let rows = builder.build_panel(&[funding("SSD", 2021, 70.0, 100.0, 40.0, Some(5.0))], &eff);
        let r = &rows[0];
        assert_eq!(r.bbr_median_z, 1.0);
        assert_eq!(r.bbr_max_z, 3.0);
        assert_eq!(r.n_cluster_anomalies, 2.0);
        assert_eq!(r.n_clusters, 2.0);
    }

    #[test]
    fn test_neglect_score_bounds() {
        let builder = FeatureBuilder::new(HashMap::from([
            ("AFG".to_string(), 1_000.0),
            ("SYR".to_string(), 2_000.0),
        ]));
        let rows = builder.build_panel(
            &[
                funding("AFG", 2022, 90.0, 100.0, 10.0, Some(500.0)),
                funding("SYR", 2022, 20.0, 100.0, 80.0, Some(100.0)),
            ],
            &[],
        );
        for r in &rows {
            assert!(r.neglect_score >= 0.0 && r.neglect_score <= 100.0);
        }
        assert!(rows[0].neglect_score > rows[1].neglect_score);
    }

    #[test]
    fn test_severity_band() {
        assert_eq!(SeverityBand::from_fgi(90.0), SeverityBand::Critical);
        assert_eq!(SeverityBand::from_fgi(86.0), SeverityBand::Critical);
        assert_eq!(SeverityBand::from_fgi(61.0), SeverityBand::High);
        assert_eq!(SeverityBand::from_fgi(31.0), SeverityBand::Medium);
        assert_eq!(SeverityBand::from_fgi(30.9), SeverityBand::Low);
        assert_eq!(serde_json::to_string(&SeverityBand::Critical).unwrap(), "\"CRITICAL\"");
        assert_eq!(SeverityBand::High.to_string(), "HIGH");
        assert!(SeverityBand::Critical > SeverityBand::Low);
    }
}
