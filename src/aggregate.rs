//! C5 — Aggregator / preprocessor: tie-merge, thinning, and the `hicensor`
//! re-censoring rule. Both aggregation modes share the contract that the
//! output has at most one record per grid cell.

use std::collections::BTreeMap;

use crate::config::{Hicensor, ThinReducer, TieMergeMethod, TrendConfig};
use crate::types::{CensorFlag, Observation, Period};

/// Apply the `hicensor` rule: re-censor every value at or below the
/// threshold (explicit, or the observed maximum detection limit when
/// `Auto`) as left-censored at that limit.
pub fn apply_hicensor(obs: &[Observation], rule: Hicensor) -> Vec<Observation> {
    let threshold = match rule {
        Hicensor::Off => return obs.to_vec(),
        Hicensor::Threshold(t) => t,
        Hicensor::Auto => obs
            .iter()
            .filter(|o| o.censor != CensorFlag::None)
            .map(|o| o.v)
            .fold(f64::NEG_INFINITY, f64::max),
    };
    if !threshold.is_finite() {
        return obs.to_vec();
    }
    obs.iter()
        .map(|o| {
            if o.v <= threshold {
                Observation { v: threshold, censor: CensorFlag::Left, ..*o }
            } else {
                *o
            }
        })
        .collect()
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn merge_group(group: &[Observation], method: TieMergeMethod) -> Observation {
    let t = group[0].t;
    match method {
        TieMergeMethod::Median => {
            let mut vals: Vec<f64> = group.iter().map(|o| o.v).collect();
            let m = median(&mut vals);
            let censor = if group.iter().any(|o| o.censor != CensorFlag::None && (o.v - m).abs() < 1e-12)
            {
                group
                    .iter()
                    .find(|o| (o.v - m).abs() < 1e-12)
                    .map(|o| o.censor)
                    .unwrap_or(CensorFlag::None)
            } else {
                CensorFlag::None
            };
            Observation { t, v: m, censor, dy: None }
        }
        TieMergeMethod::RobustMedian => {
            let n = group.len();
            let mut by_limit: BTreeMap<i64, usize> = BTreeMap::new();
            for o in group.iter().filter(|o| o.censor == CensorFlag::Left) {
                *by_limit.entry(o.v.to_bits() as i64).or_insert(0) += 1;
            }
            if let Some((&limit_bits, &count)) = by_limit.iter().max_by_key(|(_, c)| **c) {
                if count * 2 > n {
                    let limit = f64::from_bits(limit_bits as u64);
                    return Observation { t, v: limit, censor: CensorFlag::Left, dy: None };
                }
            }
            let mut vals: Vec<f64> = group
                .iter()
                .filter(|o| o.censor == CensorFlag::None)
                .map(|o| o.v)
                .collect();
            if vals.is_empty() {
                vals = group.iter().map(|o| o.v).collect();
            }
            let m = median(&mut vals);
            Observation { t, v: m, censor: CensorFlag::None, dy: None }
        }
        TieMergeMethod::Middle => {
            let mean_t: f64 = group.iter().map(|o| o.t).sum::<f64>() / group.len() as f64;
            *group
                .iter()
                .min_by(|a, b| {
                    (a.t - mean_t).abs().partial_cmp(&(b.t - mean_t).abs()).unwrap()
                })
                .unwrap()
        }
        TieMergeMethod::MiddleLwp => {
            // Same selection rule, anchored on the group's own timestamp
            // (ties share one timestamp, so this degenerates to Middle).
            let mean_t: f64 = group.iter().map(|o| o.t).sum::<f64>() / group.len() as f64;
            *group
                .iter()
                .min_by(|a, b| {
                    (a.t - mean_t).abs().partial_cmp(&(b.t - mean_t).abs()).unwrap()
                })
                .unwrap()
        }
    }
}

/// Collapse observations sharing an identical timestamp into a single
/// record. Returns `(merged, discarded_index)` where `discarded_index` is
/// `true` because any tie-merge is a non-trivial aggregation (per the
/// alignment invariant).
pub fn tie_merge(obs: &[Observation], method: TieMergeMethod) -> Vec<Observation> {
    let mut by_t: BTreeMap<i64, Vec<Observation>> = BTreeMap::new();
    for o in obs {
        by_t.entry(o.t.to_bits() as i64).or_default().push(*o);
    }
    by_t.into_values().map(|group| merge_group(&group, method)).collect()
}

fn period_cell_key(t: f64, period: Period) -> i64 {
    let secs = period.approx_seconds();
    (t / secs).floor() as i64
}

fn period_center(cell: i64, period: Period) -> f64 {
    let secs = period.approx_seconds();
    (cell as f64 + 0.5) * secs
}

fn thin_group(group: &[Observation], cell: i64, period: Period, reducer: ThinReducer) -> Observation {
    let center_t = period_center(cell, period);
    match reducer {
        ThinReducer::Lwp => *group
            .iter()
            .min_by(|a, b| (a.t - center_t).abs().partial_cmp(&(b.t - center_t).abs()).unwrap())
            .unwrap(),
        ThinReducer::LwpMedian => {
            let mut vals: Vec<f64> = group.iter().map(|o| o.v).collect();
            let m = median(&mut vals);
            Observation { t: center_t, v: m, censor: CensorFlag::None, dy: None }
        }
        ThinReducer::LwpRobustMedian => {
            let n = group.len();
            let mut by_limit: BTreeMap<i64, usize> = BTreeMap::new();
            for o in group.iter().filter(|o| o.censor == CensorFlag::Left) {
                *by_limit.entry(o.v.to_bits() as i64).or_insert(0) += 1;
            }
            if let Some((&limit_bits, &count)) = by_limit.iter().max_by_key(|(_, c)| **c) {
                if count * 2 > n {
                    let limit = f64::from_bits(limit_bits as u64);
                    return Observation { t: center_t, v: limit, censor: CensorFlag::Left, dy: None };
                }
            }
            let mut vals: Vec<f64> = group
                .iter()
                .filter(|o| o.censor == CensorFlag::None)
                .map(|o| o.v)
                .collect();
            if vals.is_empty() {
                vals = group.iter().map(|o| o.v).collect();
            }
            let m = median(&mut vals);
            Observation { t: center_t, v: m, censor: CensorFlag::None, dy: None }
        }
    }
}

/// Subdivide the time axis into period cells, applying `reducer` within
/// each non-empty cell. Emits one record per cell, at the period-center
/// timestamp.
pub fn thin(obs: &[Observation], period: Period, reducer: ThinReducer) -> Vec<Observation> {
    let mut cells: BTreeMap<i64, Vec<Observation>> = BTreeMap::new();
    for o in obs {
        cells.entry(period_cell_key(o.t, period)).or_default().push(*o);
    }
    cells
        .into_iter()
        .map(|(cell, group)| thin_group(&group, cell, period, reducer))
        .collect()
}

/// Run the configured aggregation mode, plus `hicensor` pre-processing.
/// Returns `(aggregated, discarded_index)`. `discarded_index` is `true` for
/// any non-trivial (tie-merge or thin) aggregation — callers must then reject
/// pre-aggregation-length kwargs with an `Alignment` error (see `lib.rs`).
pub fn aggregate(obs: &[Observation], config: &TrendConfig) -> (Vec<Observation>, bool) {
    let obs = apply_hicensor(obs, config.hicensor);
    match config.agg_method {
        crate::config::AggMethod::None => (obs, false),
        crate::config::AggMethod::TieMerge(method) => (tie_merge(&obs, method), true),
        crate::config::AggMethod::Thin(reducer) => (thin(&obs, config.agg_period, reducer), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_merge_median_collapses_duplicates() {
        let obs = vec![
            Observation::uncensored(0.0, 1.0),
            Observation::uncensored(0.0, 3.0),
            Observation::uncensored(1.0, 5.0),
        ];
        let merged = tie_merge(&obs, TieMergeMethod::Median);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn hicensor_recensors_below_threshold() {
        let obs = vec![
            Observation::left_censored(0.0, 5.0),
            Observation::uncensored(1.0, 3.0),
            Observation::uncensored(2.0, 10.0),
        ];
        let out = apply_hicensor(&obs, Hicensor::Auto);
        assert_eq!(out[1].censor, CensorFlag::Left);
        assert_eq!(out[1].v, 5.0);
        assert_eq!(out[2].censor, CensorFlag::None);
    }
}
