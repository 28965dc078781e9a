//! C10b — Segmented driver: piecewise-OLS breakpoint search (the spec's
//! explicitly-permitted parametric-regression helper) seeds the segment
//! boundaries, then each segment gets its own independent MK+slope fit via
//! the core kernel. Breakpoint search is a greedy binary split refined by
//! an AIC/BIC stopping criterion, in the spirit of the peak/valley
//! trend-line search used elsewhere in the pack for breakpoint seeding.

use rand::Rng;

use crate::config::TrendConfig;
use crate::error::TrendError;
use crate::mk::order_by_time;
use crate::result::{SegmentResult, SegmentedResult};
use crate::rng::rng_from_seed;
use crate::types::{Observation, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionCriterion {
    Aic,
    Bic,
}

fn ols_fit(t: &[f64], v: &[f64]) -> (f64, f64, f64) {
    let n = t.len() as f64;
    if t.len() < 2 {
        let mean = v.iter().sum::<f64>() / v.len().max(1) as f64;
        return (0.0, mean, 0.0);
    }
    let mean_t = t.iter().sum::<f64>() / n;
    let mean_v = v.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (&ti, &vi) in t.iter().zip(v.iter()) {
        num += (ti - mean_t) * (vi - mean_v);
        den += (ti - mean_t).powi(2);
    }
    let slope = if den > 1e-12 { num / den } else { 0.0 };
    let intercept = mean_v - slope * mean_t;
    let sse: f64 = t.iter().zip(v.iter()).map(|(&ti, &vi)| (vi - (slope * ti + intercept)).powi(2)).sum();
    (slope, intercept, sse)
}

fn criterion_value(total_sse: f64, n: usize, n_params: usize, criterion: SelectionCriterion) -> f64 {
    let n = n as f64;
    if total_sse <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let log_term = n * (total_sse / n).ln();
    match criterion {
        SelectionCriterion::Aic => log_term + 2.0 * n_params as f64,
        SelectionCriterion::Bic => log_term + (n_params as f64) * n.ln(),
    }
}

/// Greedy binary breakpoint search: repeatedly split the segment whose
/// internal split most reduces total SSE, stopping once the selection
/// criterion stops improving or `max_breakpoints` is reached.
pub fn find_breakpoints(t: &[f64], v: &[f64], max_breakpoints: usize, criterion: SelectionCriterion) -> Vec<usize> {
    let n = t.len();
    if n < 6 || max_breakpoints == 0 {
        return Vec::new();
    }

    let mut cuts: Vec<usize> = vec![0, n];
    let total_sse = |cuts: &[usize]| -> f64 {
        cuts.windows(2).map(|w| ols_fit(&t[w[0]..w[1]], &v[w[0]..w[1]]).2).sum()
    };
    let mut current_score = criterion_value(total_sse(&cuts), n, 2 * (cuts.len() - 1), criterion);

    loop {
        if cuts.len() - 1 >= max_breakpoints + 1 {
            break;
        }
        let mut best_split: Option<(usize, usize, f64)> = None; // (segment_start, split_point, resulting_sse)
        for w in cuts.windows(2) {
            let (start, end) = (w[0], w[1]);
            if end - start < 6 {
                continue;
            }
            let mut best_local_sse = f64::INFINITY;
            let mut best_local_split = None;
            for split in (start + 3)..(end - 2) {
                let sse_left = ols_fit(&t[start..split], &v[start..split]).2;
                let sse_right = ols_fit(&t[split..end], &v[split..end]).2;
                let sse = sse_left + sse_right;
                if sse < best_local_sse {
                    best_local_sse = sse;
                    best_local_split = Some(split);
                }
            }
            if let Some(split) = best_local_split {
                let original_sse = ols_fit(&t[start..end], &v[start..end]).2;
                let reduction = original_sse - best_local_sse;
                if best_split.map_or(true, |(_, _, r)| reduction > r) {
                    best_split = Some((start, split, reduction));
                }
            }
        }

        match best_split {
            Some((_, split, _)) => {
                let mut candidate_cuts = cuts.clone();
                candidate_cuts.push(split);
                candidate_cuts.sort_unstable();
                let candidate_score =
                    criterion_value(total_sse(&candidate_cuts), n, 2 * (candidate_cuts.len() - 1), criterion);
                if candidate_score < current_score {
                    cuts = candidate_cuts;
                    current_score = candidate_score;
                } else {
                    break;
                }
            }
            None => break,
        }
    }

    cuts[1..cuts.len() - 1].to_vec()
}

/// Bootstrap-bagging CIs on breakpoint locations: resample the series `b`
/// times, rerun the finder on each resample (re-sorted by time), and report
/// the percentile spread per ordinal breakpoint position.
fn bagged_breakpoint_ci(
    t: &[f64],
    v: &[f64],
    max_breakpoints: usize,
    criterion: SelectionCriterion,
    n_bag: usize,
    seed: u64,
    alpha: f64,
) -> Vec<(f64, f64)> {
    let n = t.len();
    let mut rng = rng_from_seed(seed);
    let mut by_position: Vec<Vec<f64>> = vec![Vec::new(); max_breakpoints];

    for _ in 0..n_bag {
        let mut idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        idx.sort_unstable();
        let tb: Vec<f64> = idx.iter().map(|&i| t[i]).collect();
        let vb: Vec<f64> = idx.iter().map(|&i| v[i]).collect();
        let bps = find_breakpoints(&tb, &vb, max_breakpoints, criterion);
        for (pos, &bp_idx) in bps.iter().enumerate() {
            if pos < by_position.len() {
                by_position[pos].push(tb[bp_idx]);
            }
        }
    }

    by_position
        .into_iter()
        .map(|mut values| {
            if values.is_empty() {
                return (f64::NAN, f64::NAN);
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let lo_idx = ((alpha / 2.0) * values.len() as f64).floor() as usize;
            let hi_idx = (((1.0 - alpha / 2.0) * values.len() as f64).ceil() as usize).min(values.len() - 1);
            (values[lo_idx.min(values.len() - 1)], values[hi_idx])
        })
        .collect()
}

/// Run the segmented trend driver: seed breakpoints via piecewise-OLS,
/// then run the core kernel independently on each resulting segment.
pub fn segmented_trend_test(
    obs: &[Observation],
    max_breakpoints: usize,
    criterion: SelectionCriterion,
    bagging_reps: Option<usize>,
    config: &TrendConfig,
) -> Result<SegmentedResult, TrendError> {
    if obs.len() < config.min_size {
        return Ok(SegmentedResult {
            segments: Vec::new(),
            breakpoints: Vec::new(),
            breakpoint_ci: None,
            notes: vec!["insufficient data for segmentation".to_string()],
        });
    }

    let mut ordered = obs.to_vec();
    order_by_time(&mut ordered);
    let t: Vec<f64> = ordered.iter().map(|o| o.t).collect();
    let v: Vec<f64> = ordered.iter().map(|o| o.v).collect();

    let bp_indices = find_breakpoints(&t, &v, max_breakpoints, criterion);
    let breakpoints: Vec<f64> = bp_indices.iter().map(|&i| t[i]).collect();

    let first_t = *t.first().unwrap();
    let last_t = *t.last().unwrap();
    let mut bounds = vec![first_t];
    bounds.extend(breakpoints.iter().copied());
    bounds.push(last_t + last_t.abs().max(1.0) * 1e-9 + 1e-9);

    let mut segments = Vec::with_capacity(bounds.len() - 1);
    let mut notes = Vec::new();
    for w in bounds.windows(2) {
        let (start, end) = (w[0], w[1]);
        let window = Window { start, end };
        let subset: Vec<Observation> = ordered.iter().copied().filter(|o| window.contains(o.t)).collect();
        if subset.len() < 2 {
            notes.push(format!("segment [{:.3}, {:.3}) has fewer than 2 observations", start, end));
            continue;
        }
        let result = crate::trend_test(&subset, config);
        let subset_t: Vec<f64> = subset.iter().map(|o| o.t).collect();
        let subset_v: Vec<f64> = subset.iter().map(|o| o.v).collect();
        let (slope, intercept, _) = ols_fit(&subset_t, &subset_v);
        segments.push(SegmentResult { segment: window, result, predictor: (slope, intercept) });
    }

    let breakpoint_ci = bagging_reps.map(|b| {
        bagged_breakpoint_ci(&t, &v, max_breakpoints, criterion, b, config.random_state, config.alpha)
    });

    Ok(SegmentedResult { segments, breakpoints, breakpoint_ci, notes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_single_breakpoint_in_a_kinked_series() {
        let mut t = Vec::new();
        let mut v = Vec::new();
        for i in 0..20 {
            t.push(i as f64);
            v.push(i as f64);
        }
        for i in 20..40 {
            t.push(i as f64);
            v.push(20.0 - (i - 20) as f64);
        }
        let bps = find_breakpoints(&t, &v, 3, SelectionCriterion::Bic);
        assert!(!bps.is_empty());
        let bp_t = t[bps[0]];
        assert!((bp_t - 20.0).abs() < 5.0);
    }

    #[test]
    fn flat_series_finds_no_breakpoints() {
        let t: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let v: Vec<f64> = (0..30).map(|i| i as f64 * 2.0 + 1.0).collect();
        let bps = find_breakpoints(&t, &v, 3, SelectionCriterion::Bic);
        assert!(bps.is_empty());
    }

    #[test]
    fn segmented_test_produces_predictor_per_segment() {
        let mut obs = Vec::new();
        for i in 0..20 {
            obs.push(Observation::uncensored(i as f64, i as f64));
        }
        for i in 20..40 {
            obs.push(Observation::uncensored(i as f64, 20.0 - (i - 20) as f64));
        }
        let config = TrendConfig::default();
        let result = segmented_trend_test(&obs, 3, SelectionCriterion::Bic, None, &config).unwrap();
        assert!(!result.segments.is_empty());
        for seg in &result.segments {
            let predicted = seg.predictor.0 * seg.segment.center() + seg.predictor.1;
            assert!(predicted.is_finite());
        }
    }
}
