//! C6 — Autocorrelation module: ACF1 estimation, Yue-Wang effective-sample-
//! size correction, and moving-block bootstraps (detrended-residual for
//! p-values, pairs for CIs).

use rand::Rng;

use crate::config::TrendConfig;
use crate::mk::{mk_test, order_by_time};
use crate::rng::rng_from_seed;
use crate::slope::estimate_slope;
use crate::types::Observation;

/// Detrend via ordinary-Sen slope on centered time, returning residuals.
pub fn detrend(obs: &[Observation], config: &TrendConfig) -> Vec<f64> {
    let mean_t: f64 = obs.iter().map(|o| o.t).sum::<f64>() / obs.len() as f64;
    let centered: Vec<Observation> = obs.iter().map(|o| Observation { t: o.t - mean_t, ..*o }).collect();
    let slope_outcome = estimate_slope(&centered, config);
    let beta = if slope_outcome.slope.is_finite() { slope_outcome.slope } else { 0.0 };
    centered.iter().map(|o| o.v - beta * o.t).collect()
}

/// Lag-1 autocorrelation of `residuals`.
pub fn acf1(residuals: &[f64]) -> f64 {
    let n = residuals.len();
    if n < 3 {
        return 0.0;
    }
    let mean = residuals.iter().sum::<f64>() / n as f64;
    let var: f64 = residuals.iter().map(|r| (r - mean).powi(2)).sum();
    if var <= 0.0 {
        return 0.0;
    }
    let cov: f64 = (0..n - 1).map(|i| (residuals[i] - mean) * (residuals[i + 1] - mean)).sum();
    (cov / var).clamp(-0.999, 0.999)
}

/// Full ACF up to `max_lag`.
pub fn acf(residuals: &[f64], max_lag: usize) -> Vec<f64> {
    let n = residuals.len();
    let mean = residuals.iter().sum::<f64>() / n as f64;
    let var: f64 = residuals.iter().map(|r| (r - mean).powi(2)).sum();
    (1..=max_lag.min(n.saturating_sub(1)))
        .map(|k| {
            if var <= 0.0 {
                0.0
            } else {
                let cov: f64 = (0..n - k).map(|i| (residuals[i] - mean) * (residuals[i + k] - mean)).sum();
                cov / var
            }
        })
        .collect()
}

/// Yue-Wang effective sample size: `n * (1 - rho1) / (1 + rho1)`, clamped to
/// `[1, n]`.
pub fn effective_n(n: usize, rho1: f64) -> f64 {
    let n_eff = n as f64 * (1.0 - rho1) / (1.0 + rho1);
    n_eff.clamp(1.0, n as f64)
}

/// Auto block-size selection: smallest lag at which `|ACF|` falls below
/// `threshold`, floored at 1, capped at `n/5`.
pub fn auto_block_size(residuals: &[f64], threshold: f64) -> usize {
    let n = residuals.len();
    let cap = (n / 5).max(1);
    let values = acf(residuals, cap);
    for (lag, &rho) in values.iter().enumerate() {
        if rho.abs() < threshold {
            return (lag + 1).max(1).min(cap);
        }
    }
    cap
}

/// Draw one moving-block-bootstrap null series of length `n` from
/// `residuals`, by concatenating randomly chosen blocks of consecutive
/// residuals with replacement.
fn draw_block_series(residuals: &[f64], block_size: usize, n: usize, rng: &mut impl Rng) -> Vec<f64> {
    let m = residuals.len();
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let start = rng.gen_range(0..m);
        for k in 0..block_size {
            if out.len() >= n {
                break;
            }
            out.push(residuals[(start + k) % m]);
        }
    }
    out
}

/// Detrended-residual moving-block bootstrap p-value: resample blocks of the
/// detrended residuals (no trend reconstructed) and recompute S on
/// `(null_series, original_t)`.
pub fn block_bootstrap_p_value(
    obs: &[Observation],
    config: &TrendConfig,
) -> (f64, usize) {
    let mut ordered = obs.to_vec();
    order_by_time(&mut ordered);
    let residuals = detrend(&ordered, config);
    let n = ordered.len();
    let block_size = config.block_size.unwrap_or_else(|| auto_block_size(&residuals, 0.1));

    let observed = mk_test(&ordered, config).s.abs();
    let mut rng = rng_from_seed(config.random_state);
    let mut exceed = 0usize;
    for _ in 0..config.n_bootstrap {
        let null_vals = draw_block_series(&residuals, block_size, n, &mut rng);
        let null_obs: Vec<Observation> = ordered
            .iter()
            .zip(null_vals.iter())
            .map(|(o, &v)| Observation::uncensored(o.t, v))
            .collect();
        let s_boot = mk_test(&null_obs, config).s.abs();
        if s_boot >= observed {
            exceed += 1;
        }
    }
    let p = (exceed as f64 + 1.0) / (config.n_bootstrap as f64 + 1.0);
    (p, block_size)
}

/// Pairs bootstrap for slope CIs: resample `(t, v, flags)` blocks, sort by
/// `t` within each resample, recompute the slope.
pub fn pairs_bootstrap_slope_ci(
    obs: &[Observation],
    config: &TrendConfig,
) -> (f64, f64) {
    let n = obs.len();
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }
    let block_size = config.block_size.unwrap_or(1).max(1);
    let mut rng = rng_from_seed(config.random_state.wrapping_add(0xB10_C5));
    let mut slopes = Vec::with_capacity(config.n_bootstrap);
    for _ in 0..config.n_bootstrap {
        let mut resample = Vec::with_capacity(n);
        while resample.len() < n {
            let start = rng.gen_range(0..n);
            for k in 0..block_size {
                if resample.len() >= n {
                    break;
                }
                resample.push(obs[(start + k) % n]);
            }
        }
        resample.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap());
        let outcome = estimate_slope(&resample, config);
        if outcome.slope.is_finite() {
            slopes.push(outcome.slope);
        }
    }
    if slopes.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    slopes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let lo_idx = ((config.alpha / 2.0) * slopes.len() as f64).floor() as usize;
    let hi_idx = (((1.0 - config.alpha / 2.0) * slopes.len() as f64).ceil() as usize)
        .min(slopes.len() - 1);
    (slopes[lo_idx.min(slopes.len() - 1)], slopes[hi_idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acf1_of_white_noise_is_small() {
        let residuals = vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let r = acf1(&residuals);
        assert!(r.abs() <= 1.0);
    }

    #[test]
    fn effective_n_clamped() {
        assert!(effective_n(10, 0.99) >= 1.0);
        assert!(effective_n(10, -0.99) <= 10.0);
    }

    #[test]
    fn auto_block_size_within_cap() {
        let residuals: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).sin()).collect();
        let bs = auto_block_size(&residuals, 0.1);
        assert!(bs >= 1 && bs <= 10);
    }
}
