//! C4 — CI engine: direct and interpolated rank-based intervals over the
//! pairwise-slope distribution.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::{CiMethod, TrendConfig};

/// `sorted_slopes` must already be sorted ascending. `var_s` is `None` when
/// unavailable (e.g. under surrogate testing), in which case the bootstrap
/// percentile fallback (`bootstrap_slopes`, if supplied) is used instead.
pub fn slope_ci(
    sorted_slopes: &[f64],
    var_s: Option<f64>,
    bootstrap_slopes: Option<&[f64]>,
    config: &TrendConfig,
) -> (f64, f64, Option<String>) {
    let n_pairs = sorted_slopes.len();
    if n_pairs == 0 {
        return (f64::NAN, f64::NAN, Some("insufficient data".to_string()));
    }

    if let Some(var_s) = var_s {
        if var_s.is_finite() && var_s >= 0.0 {
            let normal = Normal::new(0.0, 1.0).unwrap();
            let z = normal.inverse_cdf(1.0 - config.alpha / 2.0);
            let lo_pos = (n_pairs as f64 - z * var_s.sqrt()) / 2.0;
            let hi_pos = (n_pairs as f64 + z * var_s.sqrt()) / 2.0;

            return match config.ci_method {
                CiMethod::Direct => {
                    let lo_idx = lo_pos.round().clamp(1.0, n_pairs as f64) as usize;
                    let hi_idx = hi_pos.round().clamp(1.0, n_pairs as f64) as usize;
                    (sorted_slopes[lo_idx - 1], sorted_slopes[hi_idx - 1], None)
                }
                CiMethod::Lwp => {
                    (interp_at(sorted_slopes, lo_pos), interp_at(sorted_slopes, hi_pos), None)
                }
            };
        }
    }

    if let Some(boot) = bootstrap_slopes {
        if !boot.is_empty() {
            let mut b = boot.to_vec();
            b.sort_by(|a, c| a.partial_cmp(c).unwrap());
            let lo_idx = ((config.alpha / 2.0) * b.len() as f64).floor() as usize;
            let hi_idx = (((1.0 - config.alpha / 2.0) * b.len() as f64).ceil() as usize)
                .min(b.len() - 1);
            return (b[lo_idx.min(b.len() - 1)], b[hi_idx], None);
        }
    }

    (f64::NAN, f64::NAN, Some("Var(S) unavailable and no bootstrap distribution supplied".to_string()))
}

/// Linear interpolation between the floor and ceil ranks at `pos` (1-indexed,
/// clamped to `[1, n]`).
fn interp_at(sorted: &[f64], pos: f64) -> f64 {
    let n = sorted.len();
    let pos = pos.clamp(1.0, n as f64);
    let floor_idx = pos.floor() as usize;
    let ceil_idx = pos.ceil() as usize;
    if floor_idx == ceil_idx {
        return sorted[floor_idx - 1];
    }
    let frac = pos - floor_idx as f64;
    sorted[floor_idx - 1] * (1.0 - frac) + sorted[ceil_idx - 1] * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_ci_clamps_to_bounds() {
        let slopes: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let config = TrendConfig::default();
        let (lo, hi, note) = slope_ci(&slopes, Some(1000.0), None, &config);
        assert!(note.is_none());
        assert!(lo >= 1.0 && hi <= 20.0);
        assert!(lo <= hi);
    }

    #[test]
    fn missing_variance_falls_back_to_bootstrap() {
        let slopes: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let boot: Vec<f64> = (1..=100).map(|v| v as f64 / 10.0).collect();
        let config = TrendConfig::default();
        let (lo, hi, note) = slope_ci(&slopes, None, Some(&boot), &config);
        assert!(note.is_none());
        assert!(lo < hi);
    }

    #[test]
    fn nothing_available_gives_nan_with_note() {
        let slopes: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let config = TrendConfig::default();
        let (lo, hi, note) = slope_ci(&slopes, None, None, &config);
        assert!(lo.is_nan() && hi.is_nan());
        assert!(note.is_some());
    }
}
