//! C8 — Seasonal orchestrator: splits a series into per-season groups,
//! sums S and Var(S) across seasons meeting `min_per_season`, and derives
//! independent per-season surrogate ensembles and a seasonal Akritas-Theil-Sen
//! slope (root-finding the summed per-season residual S to zero).

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::TrendConfig;
use crate::mk::{compare, order_by_time, prepare, tie_epsilon, Comparison};
use crate::rng::season_seed;
use crate::surrogate::generate_ensemble;
use crate::types::{CalendarField, Observation, SeasonSpec};

/// Map a timestamp to its season index under `spec`. `Calendar` variants
/// interpret `t` as seconds-since-epoch (UTC civil calendar); `Numeric`
/// applies a plain modulus to the raw time axis.
pub fn season_index(t: f64, spec: SeasonSpec) -> i64 {
    match spec {
        SeasonSpec::Numeric { period } => {
            if period <= 0.0 {
                0
            } else {
                (t.rem_euclid(period) / period * period).floor() as i64
            }
        }
        SeasonSpec::Month => calendar_field(t, CalendarField::Month),
        SeasonSpec::Quarter => calendar_field(t, CalendarField::Quarter),
        SeasonSpec::DayOfWeek => calendar_field(t, CalendarField::DayOfWeek),
        SeasonSpec::IsoWeek => calendar_field(t, CalendarField::IsoWeek),
        SeasonSpec::DayOfYear => calendar_field(t, CalendarField::DayOfYear),
        SeasonSpec::Hour => calendar_field(t, CalendarField::Hour),
        SeasonSpec::Minute => calendar_field(t, CalendarField::Minute),
        SeasonSpec::Second => calendar_field(t, CalendarField::Second),
        SeasonSpec::Calendar(field) => calendar_field(t, field),
    }
}

fn calendar_field(t: f64, field: CalendarField) -> i64 {
    let secs = t.floor() as i64;
    let dt = match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(dt) => dt,
        None => return 0,
    };
    match field {
        CalendarField::Month => dt.month() as i64,
        CalendarField::Quarter => ((dt.month() - 1) / 3 + 1) as i64,
        CalendarField::DayOfWeek => dt.weekday().num_days_from_monday() as i64,
        CalendarField::IsoWeek => dt.iso_week().week() as i64,
        CalendarField::DayOfYear => dt.ordinal() as i64,
        CalendarField::Hour => dt.hour() as i64,
        CalendarField::Minute => dt.minute() as i64,
        CalendarField::Second => dt.second() as i64,
    }
}

/// Partition observations into season groups, each sorted by time.
pub fn split_by_season(obs: &[Observation], spec: SeasonSpec) -> BTreeMap<i64, Vec<Observation>> {
    let mut groups: BTreeMap<i64, Vec<Observation>> = BTreeMap::new();
    for &o in obs {
        groups.entry(season_index(o.t, spec)).or_default().push(o);
    }
    for g in groups.values_mut() {
        order_by_time(g);
    }
    groups
}

/// Raw (unsquared-denominator) S and tie-corrected Var(S) for one season's
/// observations, matching `mk::mk_test`'s internal accumulation but exposed
/// separately so the seasonal combiner can sum across seasons before
/// deriving Z/p.
fn season_s_and_var(obs: &[Observation], config: &TrendConfig) -> (f64, f64) {
    let outcome = crate::mk::mk_test(obs, config);
    (outcome.s, outcome.var_s)
}

/// Combined seasonal Kendall test: sums S and Var(S) across every season
/// with at least `min_per_season` observations, then derives Z/p from the
/// combined totals exactly as the single-season kernel does.
pub struct SeasonalMk {
    pub s: f64,
    pub var_s: f64,
    pub z: f64,
    pub p: f64,
    pub n_seasons_used: usize,
    pub n_seasons_skipped: usize,
}

pub fn seasonal_mk(obs: &[Observation], spec: SeasonSpec, config: &TrendConfig) -> SeasonalMk {
    let groups = split_by_season(obs, spec);
    let mut s_total = 0.0;
    let mut var_total = 0.0;
    let mut used = 0;
    let mut skipped = 0;
    for group in groups.values() {
        if group.len() < config.min_per_season {
            skipped += 1;
            continue;
        }
        let prepared = prepare(group, config);
        let (s, var_s) = season_s_and_var(&prepared, config);
        s_total += s;
        var_total += var_s;
        used += 1;
    }

    let z = if var_total > 0.0 {
        if s_total > 0.0 {
            (s_total - 1.0) / var_total.sqrt()
        } else if s_total < 0.0 {
            (s_total + 1.0) / var_total.sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };
    let normal = Normal::new(0.0, 1.0).unwrap();
    let p = (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0);

    SeasonalMk { s: s_total, var_s: var_total, z, p, n_seasons_used: used, n_seasons_skipped: skipped }
}

/// Residual S summed across seasons at a candidate slope `beta`, the root-
/// finding target for the seasonal ATS slope.
fn seasonal_residual_s(obs: &[Observation], spec: SeasonSpec, config: &TrendConfig, beta: f64) -> f64 {
    let groups = split_by_season(obs, spec);
    let mut total = 0.0;
    for group in groups.values() {
        if group.len() < config.min_per_season {
            continue;
        }
        let residuals: Vec<Observation> = group.iter().map(|o| Observation { v: o.v - beta * o.t, ..*o }).collect();
        let values: Vec<f64> = residuals.iter().map(|o| o.v).collect();
        let eps = tie_epsilon(&values, config.tie_break_method);
        let n = residuals.len();
        for i in 0..n {
            for j in (i + 1)..n {
                match compare(&residuals[i], &residuals[j], eps) {
                    Comparison::Greater => total += 1.0,
                    Comparison::Less => total -= 1.0,
                    Comparison::Tie => {}
                }
            }
        }
    }
    total
}

/// Seasonal Akritas-Theil-Sen slope: bracket-and-bisect root-find on the
/// seasonally-summed residual S, same fallback-to-grid-minimum behavior as
/// the single-season kernel when no sign change is found.
pub fn seasonal_ats_slope(obs: &[Observation], spec: SeasonSpec, config: &TrendConfig) -> (f64, Vec<String>) {
    let mut notes = Vec::new();
    let f = |b: f64| seasonal_residual_s(obs, spec, config, b);

    let seed = {
        let slope_obs = crate::slope::estimate_slope(obs, config).slope;
        if slope_obs.is_finite() { slope_obs } else { 0.0 }
    };

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

    if !bracketed {
        notes.push("seasonal ATS root-find did not bracket a sign change; reporting grid-minimum".to_string());
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
        return (best_b, notes);
    }

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
    (mid, notes)
}

/// Season-independent surrogate test: each season draws its own ensemble
/// from a seed derived from the caller seed and the season index, and the
/// null S statistic is the cross-season sum.
pub fn seasonal_surrogate_p_value(
    obs: &[Observation],
    spec: SeasonSpec,
    config: &TrendConfig,
) -> (f64, Vec<f64>) {
    let groups = split_by_season(obs, spec);
    let eligible: Vec<(&i64, &Vec<Observation>)> =
        groups.iter().filter(|(_, g)| g.len() >= config.min_per_season).collect();
    if eligible.is_empty() {
        return (f64::NAN, Vec::new());
    }

    let observed = seasonal_mk(obs, spec, config).s.abs();
    let mut per_season_ensembles: Vec<Vec<Vec<Observation>>> = Vec::with_capacity(eligible.len());
    for (&season_idx, group) in &eligible {
        let seed = season_seed(config.random_state, season_idx);
        let mut season_config = config.clone();
        season_config.random_state = seed;
        let (ensemble, _) = generate_ensemble(group, &season_config, config.n_surrogates);
        per_season_ensembles.push(ensemble);
    }

    let mut null_s = vec![0.0; config.n_surrogates];
    for ensemble in &per_season_ensembles {
        for (k, surrogate) in ensemble.iter().enumerate() {
            if k >= null_s.len() {
                break;
            }
            let prepared = prepare(surrogate, config);
            null_s[k] += crate::mk::mk_test(&prepared, config).s;
        }
    }

    let exceed = null_s.iter().filter(|&&s| s.abs() >= observed).count();
    let p = (exceed as f64 + 1.0) / (null_s.len() as f64 + 1.0);
    (p, null_s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_season_index_wraps() {
        assert_eq!(season_index(0.0, SeasonSpec::Numeric { period: 12.0 }), 0);
        assert_eq!(season_index(13.0, SeasonSpec::Numeric { period: 12.0 }), 1);
    }

    #[test]
    fn split_by_season_groups_all_observations() {
        let obs: Vec<Observation> = (0..24).map(|i| Observation::uncensored(i as f64, i as f64)).collect();
        let groups = split_by_season(&obs, SeasonSpec::Numeric { period: 12.0 });
        let total: usize = groups.values().map(|g| g.len()).sum();
        assert_eq!(total, obs.len());
    }

    #[test]
    fn seasonal_mk_sums_across_eligible_seasons() {
        let mut obs = Vec::new();
        for season in 0..3 {
            for year in 0..6 {
                let t = (year * 12 + season) as f64;
                obs.push(Observation::uncensored(t, year as f64 * 2.0 + season as f64 * 0.1));
            }
        }
        let mut config = TrendConfig::default();
        config.min_per_season = 5;
        let result = seasonal_mk(&obs, SeasonSpec::Numeric { period: 12.0 }, &config);
        assert_eq!(result.n_seasons_used, 3);
        assert!(result.s > 0.0);
    }
}
