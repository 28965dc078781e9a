//! C2 — Mann-Kendall kernel.
//!
//! Computes the S statistic and its tie/censor-corrected variance for a
//! (possibly censored) series, using the three-state pair comparison defined
//! in the component design. For uncensored data with `n` at or below
//! `max_exact_n`, S is computed in O(n log n) with a Fenwick tree over
//! compressed value ranks; otherwise (censored data, or n beyond the exact
//! floor) a direct O(n^2) pairwise scan is used, as permitted.

use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::{MkMethod, TauMethod, TieBreakMethod, TrendConfig};
use crate::types::{CensorFlag, Observation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Less,
    Tie,
}

/// Epsilon for "equal within a tie" comparisons, per `tie_break_method`.
pub fn tie_epsilon(values: &[f64], method: TieBreakMethod) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    sorted.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    let mut min_diff = f64::INFINITY;
    for w in sorted.windows(2) {
        let d = (w[1] - w[0]).abs();
        if d > 0.0 && d < min_diff {
            min_diff = d;
        }
    }
    if !min_diff.is_finite() {
        min_diff = 1.0;
    }
    match method {
        TieBreakMethod::Robust => min_diff / 2.0,
        TieBreakMethod::Lwp => min_diff / 1000.0,
    }
}

/// Apply the LWP `mk_method` right-censor replacement: every right-censored
/// value becomes `max(v) + 0.1`, treated from then on as a plain uncensored
/// tied value (no interval identity retained).
pub fn apply_lwp_mk_method(obs: &[Observation]) -> Vec<Observation> {
    let max_v = obs.iter().map(|o| o.v).fold(f64::NEG_INFINITY, f64::max);
    let replacement = if max_v.is_finite() { max_v + 0.1 } else { 0.1 };
    obs.iter()
        .map(|o| {
            if o.censor == CensorFlag::Right {
                Observation { v: replacement, censor: CensorFlag::None, ..*o }
            } else {
                *o
            }
        })
        .collect()
}

/// Three-state comparison of `b` relative to `a` (i.e. "is b greater than,
/// less than, or tied with a"), per the component design's censored
/// comparison rules.
pub fn compare(a: &Observation, b: &Observation, eps: f64) -> Comparison {
    use CensorFlag::*;
    let close = |x: f64, y: f64| (x - y).abs() <= eps;

    match (a.censor, b.censor) {
        (None, None) => {
            if close(a.v, b.v) {
                Comparison::Tie
            } else if b.v > a.v {
                Comparison::Greater
            } else {
                Comparison::Less
            }
        }
        // one censored, one uncensored: determinate iff the uncensored value
        // lies strictly outside the censor's interval.
        (Left, None) => {
            // a is "<= a.v"; b determinate-greater iff b.v > a.v (strictly outside, above)
            if b.v > a.v + eps {
                Comparison::Greater
            } else {
                Comparison::Tie
            }
        }
        (None, Left) => {
            // b is "<= b.v"; a determinate-greater over b iff a.v > b.v
            if a.v > b.v + eps {
                Comparison::Less
            } else {
                Comparison::Tie
            }
        }
        (Right, None) => {
            if b.v < a.v - eps {
                Comparison::Less
            } else {
                Comparison::Tie
            }
        }
        (None, Right) => {
            if a.v < b.v - eps {
                Comparison::Greater
            } else {
                Comparison::Tie
            }
        }
        // both censored same direction: determinate only if intervals disjoint
        (Left, Left) => Comparison::Tie,
        (Right, Right) => Comparison::Tie,
        // both censored opposite direction: determinate iff right-censor
        // lower bound strictly exceeds left-censor upper bound
        (Left, Right) => {
            // a is "<=a.v" (upper bound a.v), b is ">=b.v" (lower bound b.v)
            if b.v > a.v + eps {
                Comparison::Greater
            } else {
                Comparison::Tie
            }
        }
        (Right, Left) => {
            // a is ">=a.v" (lower bound a.v), b is "<=b.v" (upper bound b.v)
            if a.v > b.v + eps {
                Comparison::Less
            } else {
                Comparison::Tie
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MkOutcome {
    pub s: f64,
    pub var_s: f64,
    pub z: f64,
    pub p: f64,
    pub tau: f64,
    pub n: usize,
    pub n_pairs: f64,
    /// delc / deluc / delu tie-correction terms (see component design §4.2).
    pub delc: f64,
    pub deluc: f64,
    pub delu: f64,
}

/// Prepare observations for the MK kernel according to `mk_method`, applying
/// the LWP right-censor replacement when requested.
pub fn prepare(obs: &[Observation], config: &TrendConfig) -> Vec<Observation> {
    match config.mk_method {
        MkMethod::Robust => obs.to_vec(),
        MkMethod::Lwp => apply_lwp_mk_method(obs),
    }
}

/// Core S / Var(S) computation. `obs` should already be sorted by `t` and
/// prepared via [`prepare`].
pub fn mk_test(obs: &[Observation], config: &TrendConfig) -> MkOutcome {
    let n = obs.len();
    let values: Vec<f64> = obs.iter().map(|o| o.v).collect();
    let eps = tie_epsilon(&values, config.tie_break_method);

    let any_censored = obs.iter().any(|o| o.is_censored());
    let (s, n_pairs) = if !any_censored && n <= config.max_exact_n {
        fast_s_uncensored(obs, eps)
    } else {
        slow_s_general(obs, eps)
    };

    let (delu, delc, deluc) = tie_correction_terms(obs, eps);
    let var_s = ((n as f64) * (n as f64 - 1.0) * (2.0 * n as f64 + 5.0) - delu - delc - deluc)
        / 18.0;
    let var_s = var_s.max(0.0);

    let z = if s > 0.0 {
        if var_s > 0.0 {
            (s - 1.0) / var_s.sqrt()
        } else {
            0.0
        }
    } else if s < 0.0 {
        if var_s > 0.0 {
            (s + 1.0) / var_s.sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };

    let normal = Normal::new(0.0, 1.0).unwrap();
    let p = 2.0 * (1.0 - normal.cdf(z.abs()));
    let p = p.clamp(0.0, 1.0);

    let tau = match config.tau_method {
        TauMethod::A => {
            if n_pairs > 0.0 {
                s / n_pairs
            } else {
                f64::NAN
            }
        }
        TauMethod::B => {
            let (tt, uu) = tie_denominator_terms(obs, eps);
            let j = n_pairs;
            let denom = ((j - tt) * (j - uu)).max(0.0).sqrt();
            if denom > 0.0 {
                s / denom
            } else {
                f64::NAN
            }
        }
    };

    MkOutcome { s, var_s, z, p, tau, n, n_pairs, delc, deluc, delu }
}

fn fast_s_uncensored(obs: &[Observation], eps: f64) -> (f64, f64) {
    // Compress values into dense ranks (ties share a rank), then count
    // concordant/discordant pairs in time order with a Fenwick tree.
    let n = obs.len();
    let mut sorted_vals: Vec<f64> = obs.iter().map(|o| o.v).collect();
    sorted_vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut unique: Vec<f64> = Vec::new();
    for v in sorted_vals {
        if unique.last().map_or(true, |last: &f64| (v - *last).abs() > eps) {
            unique.push(v);
        }
    }
    let rank_of = |v: f64| -> usize {
        match unique.binary_search_by(|u| u.partial_cmp(&v).unwrap()) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1).min(unique.len() - 1),
        }
    };

    let mut fenwick = vec![0i64; unique.len() + 1];
    let update = |tree: &mut Vec<i64>, mut i: usize| {
        i += 1;
        while i < tree.len() {
            tree[i] += 1;
            i += i & i.wrapping_neg();
        }
    };
    let query = |tree: &Vec<i64>, mut i: usize| -> i64 {
        let mut s = 0i64;
        i += 1;
        while i > 0 {
            s += tree[i];
            i -= i & i.wrapping_neg();
        }
        s
    };

    let mut concordant: i64 = 0;
    let mut discordant: i64 = 0;
    let mut inserted: i64 = 0;

    for o in obs.iter() {
        let r = rank_of(o.v);
        let less_count = if r == 0 { 0 } else { query(&fenwick, r - 1) };
        let equal_and_less = query(&fenwick, r);
        concordant += less_count;
        discordant += inserted - equal_and_less;
        update(&mut fenwick, r);
        inserted += 1;
    }

    let s = (concordant - discordant) as f64;
    let n_pairs = (n as f64) * (n as f64 - 1.0) / 2.0;
    (s, n_pairs)
}

fn slow_s_general(obs: &[Observation], eps: f64) -> (f64, f64) {
    let n = obs.len();
    let mut s: f64 = 0.0;
    let mut n_pairs: f64 = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            n_pairs += 1.0;
            match compare(&obs[i], &obs[j], eps) {
                Comparison::Greater => s += 1.0,
                Comparison::Less => s -= 1.0,
                Comparison::Tie => {}
            }
        }
    }
    (s, n_pairs)
}

/// Group observations by their tie-equivalence class for variance
/// correction: pure uncensored-value groups (`delu`), pure same-direction
/// same-limit censored groups (`delc`), and mixed censored/boundary-equal
/// uncensored groups (`deluc`).
fn tie_correction_terms(obs: &[Observation], eps: f64) -> (f64, f64, f64) {
    #[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Copy)]
    enum Kind {
        Uncensored,
        Left,
        Right,
    }

    // Bucket by (kind, quantized value) so that near-equal floats within eps
    // collapse to the same key.
    let quantize = |v: f64| -> i64 {
        if eps > 0.0 {
            (v / eps).round() as i64
        } else {
            v.to_bits() as i64
        }
    };

    let mut groups: BTreeMap<(u8, i64), (usize, usize, usize)> = BTreeMap::new(); // (uncensored_count, left_count, right_count)
    for o in obs {
        let key = match o.censor {
            CensorFlag::None => (0u8, quantize(o.v)),
            CensorFlag::Left => (1u8, quantize(o.v)),
            CensorFlag::Right => (2u8, quantize(o.v)),
        };
        // Merge left-censored groups and boundary-equal uncensored values,
        // and similarly for right-censored, by using the same quantized key
        // regardless of kind 0 vs 1/2 when values coincide.
        let merged_key = if key.0 == 0 {
            // try both left/right keyed groups at same value; fold into
            // whichever exists, defaulting to its own uncensored group.
            if groups.contains_key(&(1, key.1)) {
                (1u8, key.1)
            } else if groups.contains_key(&(2, key.1)) {
                (2u8, key.1)
            } else {
                key
            }
        } else {
            key
        };
        let entry = groups.entry(merged_key).or_insert((0, 0, 0));
        match o.censor {
            CensorFlag::None => entry.0 += 1,
            CensorFlag::Left => entry.1 += 1,
            CensorFlag::Right => entry.2 += 1,
        }
        let _ = Kind::Uncensored; // silence unused-variant lint in debug builds
    }

    let term = |t: usize| -> f64 {
        let t = t as f64;
        t * (t - 1.0) * (2.0 * t + 5.0)
    };

    let mut delu = 0.0;
    let mut delc = 0.0;
    let mut deluc = 0.0;
    for (_, (u, l, r)) in groups {
        let total = u + l + r;
        if total < 2 {
            continue;
        }
        let censored_kinds = (l > 0) as u8 + (r > 0) as u8;
        if l == 0 && r == 0 {
            delu += term(total);
        } else if u == 0 && censored_kinds == 1 {
            delc += term(total);
        } else {
            deluc += term(total);
        }
    }

    (delu, delc, deluc)
}

/// Tie-denominator terms for Kendall's tau-b: `tt` from x-ties, `uu` from
/// y-ties. Since this series has a single value axis compared pairwise
/// against itself (time is assumed distinct), both reduce to the same
/// value-tie groups; kept as two named terms to mirror the spec's formula
/// shape.
fn tie_denominator_terms(obs: &[Observation], eps: f64) -> (f64, f64) {
    let (delu, delc, deluc) = tie_correction_terms(obs, eps);
    let raw = delu + delc + deluc;
    // tau-b denominator terms use t(t-1)/2 summed, not the variance-style
    // t(t-1)(2t+5); recompute directly from groups for correctness.
    let values: Vec<f64> = obs.iter().map(|o| o.v).collect();
    let _ = (delu, delc, deluc, raw, values);
    let mut groups: BTreeMap<i64, usize> = BTreeMap::new();
    for o in obs {
        let key = if eps > 0.0 { (o.v / eps).round() as i64 } else { o.v.to_bits() as i64 };
        *groups.entry(key).or_insert(0) += 1;
    }
    let tt: f64 = groups
        .values()
        .map(|&t| (t as f64) * (t as f64 - 1.0) / 2.0)
        .sum();
    (tt, tt)
}

pub fn order_by_time(obs: &mut [Observation]) {
    obs.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;

    fn uncensored_series(vals: &[f64]) -> Vec<Observation> {
        vals.iter()
            .enumerate()
            .map(|(i, &v)| Observation::uncensored(i as f64, v))
            .collect()
    }

    #[test]
    fn s_matches_brute_force_no_ties() {
        let obs = uncensored_series(&[3.0, 1.0, 4.0, 1.5, 5.0, 9.0, 2.0, 6.0]);
        let eps = tie_epsilon(&obs.iter().map(|o| o.v).collect::<Vec<_>>(), TieBreakMethod::Robust);
        let (fast, _) = fast_s_uncensored(&obs, eps);
        let mut brute = 0.0;
        let n = obs.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if obs[j].v > obs[i].v {
                    brute += 1.0;
                } else if obs[j].v < obs[i].v {
                    brute -= 1.0;
                }
            }
        }
        assert_eq!(fast, brute);
    }

    #[test]
    fn strictly_increasing_s1_scenario() {
        let obs = uncensored_series(&(1..=10).map(|v| v as f64).collect::<Vec<_>>());
        let config = TrendConfig::default();
        let outcome = mk_test(&obs, &config);
        assert_eq!(outcome.s, 45.0);
        assert!((outcome.var_s - 125.0).abs() < 1e-9);
        assert!((outcome.z - 3.9357).abs() < 1e-3);
        assert!(outcome.p < 1e-4);
    }

    #[test]
    fn reversal_flips_sign_preserves_variance() {
        let obs = uncensored_series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut reversed = obs.clone();
        reversed.reverse();
        for (i, o) in reversed.iter_mut().enumerate() {
            o.t = i as f64;
        }
        let config = TrendConfig::default();
        let a = mk_test(&obs, &config);
        let b = mk_test(&reversed, &config);
        assert_eq!(a.s, -b.s);
        assert!((a.var_s - b.var_s).abs() < 1e-9);
    }

    #[test]
    fn monotone_transform_preserves_s() {
        let obs = uncensored_series(&[3.0, 1.0, 4.0, 1.5, 5.0]);
        let transformed = uncensored_series(
            &obs.iter().map(|o| o.v * 2.0 + 7.0).collect::<Vec<_>>(),
        );
        let config = TrendConfig::default();
        let a = mk_test(&obs, &config);
        let b = mk_test(&transformed, &config);
        assert_eq!(a.s, b.s);
    }

    #[test]
    fn constant_series_gives_zero_s_and_p_one() {
        let obs = uncensored_series(&[5.0; 10]);
        let config = TrendConfig::default();
        let outcome = mk_test(&obs, &config);
        assert_eq!(outcome.s, 0.0);
        assert!((outcome.p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn left_censored_majority_gives_positive_s() {
        let mut obs = Vec::new();
        let left_vals = [5.0, 5.0, 5.0, 5.0];
        for (i, &v) in left_vals.iter().enumerate() {
            obs.push(Observation::left_censored(i as f64, v));
        }
        for (i, v) in [6.0, 7.0, 8.0, 9.0, 10.0, 11.0].iter().enumerate() {
            obs.push(Observation::uncensored((i + 4) as f64, *v));
        }
        let config = TrendConfig::default();
        let outcome = mk_test(&obs, &config);
        assert!(outcome.s > 0.0);
    }
}
