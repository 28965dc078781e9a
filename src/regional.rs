//! C12 — Regional aggregator: fuses per-site MK results into a regional
//! trend-strength statistic with an inter-site-correlation correction.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::result::{RegionalResult, TrendDirection};
use crate::types::Observation;

/// One site's contribution to the regional aggregate.
pub struct SiteInput<'a> {
    pub s: f64,
    pub var_s: f64,
    pub confidence: f64,
    /// The site's own time series, used only for the pairwise correlation
    /// correction (aligned at common timestamps with other sites).
    pub series: &'a [Observation],
}

/// Pearson correlation of two site series restricted to their common
/// timestamps (exact floating match on `t`); `None` (treated as 0
/// correlation) when fewer than 2 timestamps overlap.
fn paired_correlation(a: &[Observation], b: &[Observation]) -> Option<f64> {
    use std::collections::HashMap;
    let b_by_t: HashMap<u64, f64> = b.iter().map(|o| (o.t.to_bits(), o.v)).collect();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for o in a {
        if let Some(&v) = b_by_t.get(&o.t.to_bits()) {
            xs.push(o.v);
            ys.push(v);
        }
    }
    if xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        num += (x - mean_x) * (y - mean_y);
        den_x += (x - mean_x).powi(2);
        den_y += (y - mean_y).powi(2);
    }
    let den = (den_x * den_y).sqrt();
    if den > 1e-12 {
        Some((num / den).clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Run the regional aggregation over `sites`.
pub fn regional_test(sites: &[SiteInput]) -> RegionalResult {
    let m = sites.len();
    if m == 0 {
        return RegionalResult {
            direction: TrendDirection::NotAnalysed,
            tau: f64::NAN,
            var_tau: f64::NAN,
            corrected_var_tau: f64::NAN,
            confidence: f64::NAN,
            n_sites: 0,
            notes: vec!["no sites supplied".to_string()],
        };
    }

    let pos = sites.iter().filter(|s| s.s > 0.0).count();
    let neg = sites.iter().filter(|s| s.s < 0.0).count();
    let modal_direction = if pos >= neg { TrendDirection::Increasing } else { TrendDirection::Decreasing };

    let matching: Vec<&SiteInput> = sites
        .iter()
        .filter(|s| match modal_direction {
            TrendDirection::Increasing => s.s > 0.0,
            _ => s.s < 0.0,
        })
        .collect();

    let weighted_match: f64 = matching.iter().map(|s| s.confidence).sum();
    let total_weight: f64 = sites.iter().map(|s| s.confidence).sum();
    let tau = if total_weight > 0.0 { weighted_match / total_weight } else { matching.len() as f64 / m as f64 };

    let var_tau = sites.iter().map(|s| s.confidence * (1.0 - s.confidence)).sum::<f64>() / (m as f64).powi(2);

    let mut corr_sum = 0.0;
    let mut pair_count = 0usize;
    for i in 0..m {
        for j in (i + 1)..m {
            if let Some(rho) = paired_correlation(sites[i].series, sites[j].series) {
                corr_sum += rho;
                pair_count += 1;
            }
        }
    }
    let _ = pair_count;
    let inflation = 1.0 + 2.0 * corr_sum / m as f64;
    let corrected_var_tau = (var_tau * inflation).max(var_tau.max(0.0));

    let confidence = if corrected_var_tau > 0.0 {
        let normal = Normal::new(0.0, 1.0).unwrap();
        normal.cdf((tau - 0.5) / corrected_var_tau.sqrt())
    } else {
        f64::NAN
    };

    let mut notes = Vec::new();
    if m < 2 {
        notes.push("regional aggregation with fewer than 2 sites has no correlation correction".to_string());
    }

    RegionalResult {
        direction: modal_direction,
        tau,
        var_tau,
        corrected_var_tau,
        confidence,
        n_sites: m,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanimous_sites_give_tau_one() {
        let series_a: Vec<Observation> = (0..10).map(|i| Observation::uncensored(i as f64, i as f64)).collect();
        let series_b: Vec<Observation> = (0..10).map(|i| Observation::uncensored(i as f64, i as f64 * 2.0)).collect();
        let sites = vec![
            SiteInput { s: 10.0, var_s: 5.0, confidence: 0.9, series: &series_a },
            SiteInput { s: 8.0, var_s: 5.0, confidence: 0.8, series: &series_b },
        ];
        let result = regional_test(&sites);
        assert!((result.tau - 1.0).abs() < 1e-9);
        assert_eq!(result.direction, TrendDirection::Increasing);
    }

    #[test]
    fn empty_sites_not_analysed() {
        let result = regional_test(&[]);
        assert_eq!(result.direction, TrendDirection::NotAnalysed);
    }
}
