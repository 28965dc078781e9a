//! C3 — Slope kernel: ordinary Sen, LWP-compatibility, Akritas-Theil-Sen
//! (root-find), and stochastic pair-sampled slope estimators.

use rand::seq::index::sample;
use rand::Rng;

use crate::config::{SlopeMethod, TrendConfig};
use crate::mk::{compare, tie_epsilon, Comparison};
use crate::rng::rng_from_seed;
use crate::types::{CensorFlag, Observation};

#[derive(Debug, Clone)]
pub struct SlopeOutcome {
    pub slope: f64,
    pub intercept: f64,
    /// Sorted pairwise-slope set backing the CI engine (C4). Empty when the
    /// stochastic-pair method drew from a subsample rather than materializing
    /// every slope, or when the method short-circuited on insufficient data.
    pub pairwise_slopes: Vec<f64>,
    pub notes: Vec<String>,
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn median_of(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    median(&v)
}

/// Substitute censored values for ordinary-Sen-style slope computation:
/// `v * lt_mult` for left-censored, `v * gt_mult` for right-censored.
fn substituted_values(obs: &[Observation], lt_mult: f64, gt_mult: f64) -> Vec<f64> {
    obs.iter()
        .map(|o| match o.censor {
            CensorFlag::None => o.v,
            CensorFlag::Left => o.v * lt_mult,
            CensorFlag::Right => o.v * gt_mult,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmbiguousRule {
    Nan,
    Lwp,
}

fn ordinary_sen(
    obs: &[Observation],
    lt_mult: f64,
    gt_mult: f64,
    ambiguous_rule: AmbiguousRule,
) -> SlopeOutcome {
    let n = obs.len();
    let mut notes = Vec::new();
    if n < 2 {
        return SlopeOutcome {
            slope: f64::NAN,
            intercept: f64::NAN,
            pairwise_slopes: Vec::new(),
            notes: vec!["insufficient data".to_string()],
        };
    }

    let subst = substituted_values(obs, lt_mult, gt_mult);
    let values: Vec<f64> = obs.iter().map(|o| o.v).collect();
    let eps = tie_epsilon(&values, crate::config::TieBreakMethod::Robust);

    let mut slopes = Vec::with_capacity(n * (n - 1) / 2);
    let mut censor_influenced = false;
    for i in 0..n {
        for j in (i + 1)..n {
            if (obs[j].t - obs[i].t).abs() < f64::EPSILON {
                continue;
            }
            let ambiguous = matches!(compare(&obs[i], &obs[j], eps), Comparison::Tie)
                && (obs[i].is_censored() || obs[j].is_censored())
                && !(obs[i].censor == CensorFlag::None && obs[j].censor == CensorFlag::None);
            if ambiguous {
                match ambiguous_rule {
                    AmbiguousRule::Nan => continue,
                    AmbiguousRule::Lwp => slopes.push(0.0),
                }
                continue;
            }
            if obs[i].is_censored() || obs[j].is_censored() {
                censor_influenced = true;
            }
            slopes.push((subst[j] - subst[i]) / (obs[j].t - obs[i].t));
        }
    }

    if slopes.is_empty() {
        return SlopeOutcome {
            slope: f64::NAN,
            intercept: f64::NAN,
            pairwise_slopes: Vec::new(),
            notes: vec!["insufficient data".to_string()],
        };
    }

    slopes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let slope = median(&slopes);

    if slope == 0.0 && slopes.iter().all(|&s| s == 0.0) {
        notes.push("tied values".to_string());
    }
    if censor_influenced {
        notes.push("Sen slope influenced by left-censored values".to_string());
    }

    let intercept = median_of(&values) - slope * median_of(&obs.iter().map(|o| o.t).collect::<Vec<_>>());

    SlopeOutcome { slope, intercept, pairwise_slopes: slopes, notes }
}

fn stochastic_pair_slope(obs: &[Observation], config: &TrendConfig) -> SlopeOutcome {
    let n = obs.len();
    if n < 2 {
        return SlopeOutcome {
            slope: f64::NAN,
            intercept: f64::NAN,
            pairwise_slopes: Vec::new(),
            notes: vec!["insufficient data".to_string()],
        };
    }
    let subst = substituted_values(obs, config.lt_mult, config.gt_mult);
    let mut rng = rng_from_seed(config.random_state);
    let k = config.stochastic_k.min(n * (n - 1) / 2).max(1);

    let mut slopes = Vec::with_capacity(k);
    let mut attempts = 0;
    while slopes.len() < k && attempts < k * 10 {
        attempts += 1;
        let idx: Vec<usize> = sample(&mut rng, n, 2).into_vec();
        let (mut i, mut j) = (idx[0], idx[1]);
        if i > j {
            std::mem::swap(&mut i, &mut j);
        }
        let dt = obs[j].t - obs[i].t;
        if dt.abs() < f64::EPSILON {
            continue;
        }
        slopes.push((subst[j] - subst[i]) / dt);
    }
    let _ = rng.gen::<u8>(); // keep rng "used" shape consistent across calls

    slopes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let slope = median(&slopes);
    let intercept = median_of(&obs.iter().map(|o| o.v).collect::<Vec<_>>())
        - slope * median_of(&obs.iter().map(|o| o.t).collect::<Vec<_>>());

    SlopeOutcome {
        slope,
        intercept,
        pairwise_slopes: slopes,
        notes: vec!["stochastic-pair sampled slope".to_string()],
    }
}

/// Censored Kendall S of the residuals `v_i - beta * t_i`, used as the
/// root-finding target for ATS.
fn residual_s(obs: &[Observation], beta: f64) -> f64 {
    let n = obs.len();
    let residuals: Vec<Observation> = obs
        .iter()
        .map(|o| Observation { v: o.v - beta * o.t, ..*o })
        .collect();
    let values: Vec<f64> = residuals.iter().map(|o| o.v).collect();
    let eps = tie_epsilon(&values, crate::config::TieBreakMethod::Robust);
    let mut s = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            match compare(&residuals[i], &residuals[j], eps) {
                Comparison::Greater => s += 1.0,
                Comparison::Less => s -= 1.0,
                Comparison::Tie => {}
            }
        }
    }
    s
}

/// Turnbull nonparametric intercept estimator: EM iteration over residual
/// intervals until the total-variation change drops below `tol`, capped at
/// `max_iter`. Returns the median of the estimated survival distribution.
fn turnbull_intercept(residuals: &[Observation], max_iter: usize, tol: f64) -> (f64, bool) {
    // Build Turnbull bins from the residual intervals: point observations are
    // degenerate [v, v] bins; left-censored are (-inf, v]; right-censored
    // are [v, +inf).
    let mut bounds: Vec<f64> = residuals.iter().map(|o| o.v).collect();
    bounds.sort_by(|a, b| a.partial_cmp(b).unwrap());
    bounds.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
    if bounds.is_empty() {
        return (f64::NAN, true);
    }
    let m = bounds.len();
    // mass on each bin, initialized uniform
    let mut mass = vec![1.0 / m as f64; m];
    let mut converged = false;

    for _ in 0..max_iter {
        let mut new_mass = vec![0.0; m];
        for o in residuals {
            let membership: Vec<bool> = bounds
                .iter()
                .map(|&b| match o.censor {
                    CensorFlag::None => (b - o.v).abs() < 1e-9,
                    CensorFlag::Left => b <= o.v + 1e-9,
                    CensorFlag::Right => b >= o.v - 1e-9,
                })
                .collect();
            let total: f64 = membership
                .iter()
                .zip(mass.iter())
                .filter(|(&m_, _)| m_)
                .map(|(_, &p)| p)
                .sum();
            if total <= 0.0 {
                continue;
            }
            for (k, &is_member) in membership.iter().enumerate() {
                if is_member {
                    new_mass[k] += mass[k] / total;
                }
            }
        }
        let n = residuals.len() as f64;
        for v in new_mass.iter_mut() {
            *v /= n;
        }
        let tv: f64 = new_mass
            .iter()
            .zip(mass.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        mass = new_mass;
        if tv < tol {
            converged = true;
            break;
        }
    }

    // Median of the estimated distribution over `bounds`.
    let mut cum = 0.0;
    for (i, &p) in mass.iter().enumerate() {
        cum += p;
        if cum >= 0.5 {
            return (bounds[i], converged);
        }
    }
    (*bounds.last().unwrap(), converged)
}

fn ats_slope(obs: &[Observation], config: &TrendConfig) -> SlopeOutcome {
    let n = obs.len();
    let n_uncensored_unique = {
        let mut vs: Vec<f64> = obs
            .iter()
            .filter(|o| !o.is_censored())
            .map(|o| o.v)
            .collect();
        vs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        vs.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
        vs.len()
    };
    if n_uncensored_unique < 2 {
        return SlopeOutcome {
            slope: f64::NAN,
            intercept: f64::NAN,
            pairwise_slopes: Vec::new(),
            notes: vec!["insufficient data".to_string()],
        };
    }

    let seed = ordinary_sen(obs, config.lt_mult, config.gt_mult, AmbiguousRule::Nan).slope;
    let seed = if seed.is_finite() { seed } else { 0.0 };

    let mut notes = Vec::new();
    let f = |b: f64| residual_s(obs, b);

    let mut lo = seed - 1.0_f64.max(seed.abs() * 0.1);
    let mut hi = seed + 1.0_f64.max(seed.abs() * 0.1);
    let mut s_lo = f(lo);
    let mut s_hi = f(hi);
    let mut bracketed = s_lo.signum() != s_hi.signum() && s_lo != 0.0 && s_hi != 0.0;
    let mut expansions = 0;
    while !bracketed && expansions < 40 {
        let width = hi - lo;
        lo -= width;
        hi += width;
        s_lo = f(lo);
        s_hi = f(hi);
        bracketed = s_lo.signum() != s_hi.signum() && s_lo != 0.0 && s_hi != 0.0;
        expansions += 1;
    }

    let beta = if bracketed {
        let mut a = lo;
        let mut b = hi;
        let mut fa = s_lo;
        let mut mid = (a + b) / 2.0;
        for _ in 0..200 {
            mid = (a + b) / 2.0;
            let fm = f(mid);
            if fm.abs() <= 1.0 || (b - a).abs() < 1e-9 {
                break;
            }
            if fm.signum() == fa.signum() {
                a = mid;
                fa = fm;
            } else {
                b = mid;
            }
        }
        mid
    } else {
        // No sign change found: report the beta on a dense grid minimizing |S|.
        notes.push("ATS root-find did not bracket a sign change; reporting grid-minimum".to_string());
        let grid_n = 2000;
        let mut best_b = seed;
        let mut best_abs = f64::INFINITY;
        for i in 0..=grid_n {
            let b = lo + (hi - lo) * (i as f64) / (grid_n as f64);
            let fv = f(b).abs();
            if fv < best_abs {
                best_abs = fv;
                best_b = b;
            }
        }
        best_b
    };

    let residuals: Vec<Observation> = obs
        .iter()
        .map(|o| Observation { v: o.v - beta * o.t, ..*o })
        .collect();
    let (intercept_resid, converged) = turnbull_intercept(&residuals, 200, 1e-6);
    if !converged {
        notes.push("Turnbull EM did not reach convergence tolerance within the iteration cap".to_string());
    }
    let intercept = intercept_resid;

    let _ = n;
    SlopeOutcome { slope: beta, intercept, pairwise_slopes: Vec::new(), notes }
}

/// ATS bootstrap confidence interval: resample observation indices with
/// replacement, redo the root-find on each resample, take percentile bounds.
pub fn ats_bootstrap_ci(
    obs: &[Observation],
    config: &TrendConfig,
    n_boot: usize,
) -> (f64, f64) {
    let n = obs.len();
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }
    let mut rng = rng_from_seed(config.random_state.wrapping_add(0xA75_B007));
    let mut betas = Vec::with_capacity(n_boot);
    for _ in 0..n_boot {
        let mut resample: Vec<Observation> = (0..n)
            .map(|_| obs[rng.gen_range(0..n)])
            .collect();
        resample.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap());
        let outcome = ats_slope(&resample, config);
        if outcome.slope.is_finite() {
            betas.push(outcome.slope);
        }
    }
    if betas.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    betas.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let lo_idx = ((config.alpha / 2.0) * betas.len() as f64).floor() as usize;
    let hi_idx = (((1.0 - config.alpha / 2.0) * betas.len() as f64).ceil() as usize)
        .min(betas.len() - 1);
    (betas[lo_idx.min(betas.len() - 1)], betas[hi_idx])
}

/// Top-level slope estimation dispatch for `slope_method`.
pub fn estimate_slope(obs: &[Observation], config: &TrendConfig) -> SlopeOutcome {
    let n = obs.len() as u128;
    let pair_count = n * n.saturating_sub(1) / 2;
    if pair_count > config.max_pairs_allocation as u128 {
        let mut outcome = stochastic_pair_slope(obs, config);
        outcome
            .notes
            .push("pairwise-slope allocation over ceiling; switched to stochastic-pair".to_string());
        return outcome;
    }
    if obs.len() > config.stochastic_threshold && config.slope_method != SlopeMethod::Ats {
        return stochastic_pair_slope(obs, config);
    }
    match config.slope_method {
        SlopeMethod::Nan => ordinary_sen(obs, config.lt_mult, config.gt_mult, AmbiguousRule::Nan),
        SlopeMethod::Lwp => {
            let transformed = crate::mk::apply_lwp_mk_method(obs);
            ordinary_sen(&transformed, config.lt_mult, config.gt_mult, AmbiguousRule::Lwp)
        }
        SlopeMethod::Ats => ats_slope(obs, config),
        SlopeMethod::Stochastic => stochastic_pair_slope(obs, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;

    #[test]
    fn ordinary_sen_slope_of_line() {
        let obs: Vec<Observation> = (0..10)
            .map(|i| Observation::uncensored(i as f64, i as f64))
            .collect();
        let config = TrendConfig::default();
        let out = estimate_slope(&obs, &config);
        assert!((out.slope - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ats_requires_two_uncensored() {
        let obs = vec![
            Observation::left_censored(0.0, 5.0),
            Observation::left_censored(1.0, 5.0),
            Observation::uncensored(2.0, 6.0),
        ];
        let mut config = TrendConfig::default();
        config.slope_method = SlopeMethod::Ats;
        let out = estimate_slope(&obs, &config);
        assert!(out.slope.is_nan());
        assert!(out.notes.iter().any(|n| n == "insufficient data"));
    }

    #[test]
    fn tied_values_note() {
        let obs: Vec<Observation> = (0..5).map(|i| Observation::uncensored(i as f64, 3.0)).collect();
        let config = TrendConfig::default();
        let out = estimate_slope(&obs, &config);
        assert_eq!(out.slope, 0.0);
        assert!(out.notes.iter().any(|n| n == "tied values"));
    }

    #[test]
    fn over_cap_pair_allocation_switches_to_stochastic() {
        let obs: Vec<Observation> = (0..200).map(|i| Observation::uncensored(i as f64, i as f64)).collect();
        let mut config = TrendConfig::default();
        // 200 observations -> 19_900 pairs; cap below that forces the switch
        // without also tripping the (much higher) stochastic_threshold.
        config.max_pairs_allocation = 100;
        config.stochastic_threshold = 10_000;
        let out = estimate_slope(&obs, &config);
        assert!((out.slope - 1.0).abs() < 1e-6);
        assert!(out
            .notes
            .iter()
            .any(|n| n == "pairwise-slope allocation over ceiling; switched to stochastic-pair"));
    }
}
