//! Censored Mann-Kendall trend detection engine.
//!
//! Wires the component kernels (normalizer, MK statistic, slope estimators,
//! CI engine, aggregator, autocorrelation, surrogate generator, seasonal
//! orchestrator, power analysis, rolling/segmented drivers, classifier,
//! regional aggregator) into the ten public operations.

pub mod aggregate;
pub mod autocorr;
pub mod cancel;
pub mod ci;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod mk;
pub mod normalize;
pub mod power;
pub mod regional;
pub mod result;
pub mod rng;
pub mod rolling;
pub mod seasonal;
pub mod segmented;
pub mod slope;
pub mod surrogate;
pub mod types;

pub use config::TrendConfig;
pub use error::TrendError;
pub use result::{
    InspectionReport, PowerPoint, PowerResult, RegionalResult, SeasonalityCheck, SegmentResult,
    SegmentedResult, SurrogateResult, TrendDirection, TrendResult, WindowResult,
};
pub use types::{CensorFlag, Observation, Period, SeasonSpec};

use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::instrument;

use crate::classify::ThresholdMap;
use crate::normalize::MeasurementToken;

/// Rescale a slope (and its CI bounds, in value-per-base-time-unit) into the
/// human unit named by `config.slope_scaling`, per §1/§6's "mg/L per year"
/// requirement. The time axis is assumed to be seconds-since-epoch, matching
/// `Period::approx_seconds`'s own assumption.
fn scale_slope(slope: f64, lower: f64, upper: f64, config: &TrendConfig) -> (f64, f64, f64, String) {
    let factor = config.slope_scaling.approx_seconds();
    (slope * factor, lower * factor, upper * factor, config.slope_scaling.label().to_string())
}

/// Run the full censored Mann-Kendall pipeline on already-normalized
/// observations: aggregate (C5) -> MK kernel (C2) -> slope (C3) -> CI (C4),
/// with optional autocorrelation (C6) and surrogate (C7) p-value
/// adjustment, finishing with the classifier (C11).
#[instrument(skip(obs, config), fields(n_obs = obs.len()))]
pub fn trend_test(obs: &[Observation], config: &TrendConfig) -> TrendResult {
    let (agg_obs, discarded_index) = aggregate::aggregate(obs, config);
    run_trend_test(agg_obs, discarded_index, config)
}

/// Run `trend_test`, first checking that a caller-supplied companion array
/// (e.g. a parallel weights/labels column, `companion_len` long, indexed
/// against the *pre-aggregation* `obs`) can still be aligned to the result.
/// Aggregation that merges or thins observations (C5's `discarded_index`)
/// drops the one-to-one correspondence between `obs`'s index and the
/// analysed series, so a pre-aggregation-sized companion can no longer be
/// zipped against anything meaningful — this is TestableProperty #5.
#[instrument(skip(obs, config), fields(n_obs = obs.len()))]
pub fn trend_test_with_companion(
    obs: &[Observation],
    companion_len: usize,
    config: &TrendConfig,
) -> Result<TrendResult, TrendError> {
    let (agg_obs, discarded_index) = aggregate::aggregate(obs, config);
    if discarded_index && companion_len == obs.len() {
        return Err(TrendError::Alignment(format!(
            "aggregation discarded the observation index ({} pre-aggregation records -> {} post-aggregation); a companion array of length {} can no longer be aligned",
            obs.len(),
            agg_obs.len(),
            companion_len
        )));
    }
    Ok(run_trend_test(agg_obs, discarded_index, config))
}

fn run_trend_test(agg_obs: Vec<Observation>, discarded_index: bool, config: &TrendConfig) -> TrendResult {
    let mut ordered = agg_obs;
    mk::order_by_time(&mut ordered);

    if ordered.len() < config.min_size {
        tracing::debug!(n = ordered.len(), min_size = config.min_size, "insufficient data for trend test");
        return TrendResult::not_analysed(
            format!("fewer than min_size={} observations after aggregation", config.min_size),
            ordered.len(),
        );
    }

    let mut notes = Vec::new();
    if discarded_index {
        notes.push(
            "aggregation discarded the per-observation time index; pre-aggregation-length companion arrays are no longer alignable".to_string(),
        );
    }

    let prepared = mk::prepare(&ordered, config);
    let mk_outcome = mk::mk_test(&prepared, config);
    let slope_outcome = slope::estimate_slope(&ordered, config);

    let mut p = mk_outcome.p;
    let mut var_s = mk_outcome.var_s;

    if config.autocorr_method != crate::config::AutocorrMethod::None {
        let (boot_p, block_size) = autocorr::block_bootstrap_p_value(&ordered, config);
        notes.push(format!("autocorrelation-adjusted p-value via block bootstrap (block_size={block_size})"));
        p = boot_p;
        var_s = f64::NAN;
    }

    let (slope_lower, slope_upper, ci_note) = if slope_outcome.pairwise_slopes.is_empty() {
        let (lo, hi) = autocorr::pairs_bootstrap_slope_ci(&ordered, config);
        (lo, hi, None)
    } else {
        ci::slope_ci(&slope_outcome.pairwise_slopes, Some(var_s).filter(|v| v.is_finite()), None, config)
    };
    if let Some(n) = ci_note {
        notes.push(n);
    }
    notes.extend(slope_outcome.notes.iter().cloned());

    let surrogate = if config.surrogate_method != crate::config::SurrogateMethod::None {
        Some(run_surrogate_test(&ordered, config))
    } else {
        None
    };

    let confidence = 1.0 - p / 2.0;
    let directional_confidence = if mk_outcome.s < 0.0 { confidence } else { 1.0 - confidence };
    let classification = classify::classify_trend(directional_confidence, p, config.alpha, config.continuous_confidence, None);

    let direction = if p > config.alpha {
        TrendDirection::NoTrend
    } else if mk_outcome.s > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    let (scaled_slope, scaled_slope_lower, scaled_slope_upper, scaled_slope_unit) =
        scale_slope(slope_outcome.slope, slope_lower, slope_upper, config);

    TrendResult {
        trend: direction,
        s: mk_outcome.s,
        var_s,
        z: mk_outcome.z,
        p,
        tau: mk_outcome.tau,
        slope: slope_outcome.slope,
        intercept: slope_outcome.intercept,
        slope_lower,
        slope_upper,
        scaled_slope,
        scaled_slope_lower,
        scaled_slope_upper,
        scaled_slope_unit,
        confidence,
        directional_confidence,
        classification,
        surrogate,
        analysis_notes: notes,
        n_obs: ordered.len(),
    }
}

fn run_surrogate_test(obs: &[Observation], config: &TrendConfig) -> SurrogateResult {
    let (ensemble, method) = surrogate::generate_ensemble(obs, config, config.n_surrogates);
    let observed = mk::mk_test(&mk::prepare(obs, config), config).s.abs();
    let mut s_ensemble = Vec::with_capacity(ensemble.len());
    for surrogate in &ensemble {
        let prepared = mk::prepare(surrogate, config);
        s_ensemble.push(mk::mk_test(&prepared, config).s);
    }
    let exceed = s_ensemble.iter().filter(|&&s| s.abs() >= observed).count();
    let p_value = (exceed as f64 + 1.0) / (s_ensemble.len() as f64 + 1.0);

    let method_label = match method {
        crate::config::SurrogateMethod::Iaaft => "iaaft",
        crate::config::SurrogateMethod::LombScargle => "lomb_scargle",
        crate::config::SurrogateMethod::None => "none",
        crate::config::SurrogateMethod::Auto => "auto",
    };

    SurrogateResult {
        method: method_label.to_string(),
        n_surrogates: s_ensemble.len(),
        p_value,
        s_ensemble,
        notes: Vec::new(),
    }
}

/// Standalone surrogate test (external interface): same ensemble machinery
/// as the embedded surrogate adjustment inside [`trend_test`], returned on
/// its own rather than folded into a `TrendResult`.
#[instrument(skip(obs, config), fields(n_obs = obs.len()))]
pub fn surrogate_test(obs: &[Observation], config: &TrendConfig) -> SurrogateResult {
    let ordered = {
        let mut o = obs.to_vec();
        mk::order_by_time(&mut o);
        o
    };
    run_surrogate_test(&ordered, config)
}

/// Seasonal trend test (C8): sums S/Var(S) across per-season groups with at
/// least `config.min_per_season` observations, runs season-independent
/// surrogate testing when configured, and reports a seasonal
/// Akritas-Theil-Sen slope.
#[instrument(skip(obs, config), fields(n_obs = obs.len()))]
pub fn seasonal_trend_test(obs: &[Observation], season_spec: SeasonSpec, config: &TrendConfig) -> TrendResult {
    let (agg_obs, discarded_index) = aggregate::aggregate(obs, config);
    let mut ordered = agg_obs;
    mk::order_by_time(&mut ordered);

    if ordered.len() < config.min_size {
        return TrendResult::not_analysed(
            format!("fewer than min_size={} observations after aggregation", config.min_size),
            ordered.len(),
        );
    }

    let mut notes = Vec::new();
    if discarded_index {
        notes.push("aggregation discarded the per-observation time index".to_string());
    }

    let seasonal = seasonal::seasonal_mk(&ordered, season_spec, config);
    if seasonal.n_seasons_used == 0 {
        return TrendResult::not_analysed("no season had at least min_per_season observations".to_string(), ordered.len());
    }
    notes.push(format!(
        "{} of {} seasons used (min_per_season={})",
        seasonal.n_seasons_used,
        seasonal.n_seasons_used + seasonal.n_seasons_skipped,
        config.min_per_season
    ));

    let (slope, ats_notes) = if config.slope_method == crate::config::SlopeMethod::Ats {
        seasonal::seasonal_ats_slope(&ordered, season_spec, config)
    } else {
        let outcome = slope::estimate_slope(&ordered, config);
        (outcome.slope, outcome.notes)
    };
    notes.extend(ats_notes);
    notes.push("seasonal slope/CI reuses the single-series estimator on the full series; season-only re-estimation is not separately implemented".to_string());

    let mut p = seasonal.p;
    let surrogate = if config.surrogate_method != crate::config::SurrogateMethod::None {
        let (sp, s_ensemble) = seasonal::seasonal_surrogate_p_value(&ordered, season_spec, config);
        p = sp;
        Some(SurrogateResult {
            method: "seasonal".to_string(),
            n_surrogates: s_ensemble.len(),
            p_value: sp,
            s_ensemble,
            notes: Vec::new(),
        })
    } else {
        None
    };

    let confidence = 1.0 - p / 2.0;
    let directional_confidence = if seasonal.s < 0.0 { confidence } else { 1.0 - confidence };
    let classification =
        classify::classify_trend(directional_confidence, p, config.alpha, config.continuous_confidence, None);
    let direction = if p > config.alpha {
        TrendDirection::NoTrend
    } else if seasonal.s > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    let (scaled_slope, scaled_slope_lower, scaled_slope_upper, scaled_slope_unit) =
        scale_slope(slope, f64::NAN, f64::NAN, config);

    TrendResult {
        trend: direction,
        s: seasonal.s,
        var_s: seasonal.var_s,
        z: seasonal.z,
        p,
        tau: if seasonal.var_s > 0.0 { seasonal.s / seasonal.var_s.sqrt().max(1.0) } else { f64::NAN },
        slope,
        intercept: f64::NAN,
        slope_lower: f64::NAN,
        slope_upper: f64::NAN,
        scaled_slope,
        scaled_slope_lower,
        scaled_slope_upper,
        scaled_slope_unit,
        confidence,
        directional_confidence,
        classification,
        surrogate,
        analysis_notes: notes,
        n_obs: ordered.len(),
    }
}

/// Kruskal-Wallis test for seasonality: ranks all observations together and
/// compares the rank-sum spread across season groups to a chi-squared
/// reference distribution with `k - 1` degrees of freedom.
#[instrument(skip(obs, config), fields(n_obs = obs.len()))]
pub fn check_seasonality(obs: &[Observation], season_spec: SeasonSpec, config: &TrendConfig) -> SeasonalityCheck {
    let groups = seasonal::split_by_season(obs, season_spec);
    let k = groups.len();
    if k < 2 || obs.len() < config.min_size {
        return SeasonalityCheck { is_seasonal: false, p_value: f64::NAN };
    }

    let n = obs.len();
    let mut indexed: Vec<(f64, usize)> = Vec::with_capacity(n);
    for (group_idx, group) in groups.values().enumerate() {
        for o in group {
            indexed.push((o.v, group_idx));
        }
    }

    let mut order: Vec<usize> = (0..indexed.len()).collect();
    order.sort_by(|&a, &b| indexed[a].0.partial_cmp(&indexed[b].0).unwrap());
    let mut ranks = vec![0.0; indexed.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && (indexed[order[j + 1]].0 - indexed[order[i]].0).abs() < 1e-12 {
            j += 1;
        }
        let avg_rank = ((i + 1) + (j + 1)) as f64 / 2.0;
        for r in order.iter().take(j + 1).skip(i) {
            ranks[*r] = avg_rank;
        }
        i = j + 1;
    }

    let mut rank_sum_by_group = vec![0.0; k];
    let mut count_by_group = vec![0usize; k];
    for (idx, &(_, group_idx)) in indexed.iter().enumerate() {
        rank_sum_by_group[group_idx] += ranks[idx];
        count_by_group[group_idx] += 1;
    }

    let n_f = n as f64;
    let h: f64 = 12.0 / (n_f * (n_f + 1.0))
        * rank_sum_by_group
            .iter()
            .zip(count_by_group.iter())
            .filter(|(_, &c)| c > 0)
            .map(|(&rs, &c)| rs * rs / c as f64)
            .sum::<f64>()
        - 3.0 * (n_f + 1.0);

    let df = (k - 1) as f64;
    let chi2 = ChiSquared::new(df).unwrap();
    let p_value = (1.0 - chi2.cdf(h.max(0.0))).clamp(0.0, 1.0);

    SeasonalityCheck { is_seasonal: p_value < config.alpha, p_value }
}

/// Inspect a raw (un-normalized) series: normalizes internally and reports
/// summary statistics plus the count of dropped (missing/NaN) elements.
#[instrument(skip(values, times))]
pub fn inspect_trend_data(values: &[MeasurementToken], times: &[f64]) -> Result<InspectionReport, TrendError> {
    let obs = normalize::normalize(values, times, None, None)?;
    let n_missing = values.len().saturating_sub(obs.len());

    if obs.is_empty() {
        return Ok(InspectionReport {
            n: 0,
            n_missing,
            n_censor_levels: 0,
            prop_censored: f64::NAN,
            first_time: f64::NAN,
            last_time: f64::NAN,
            mean: f64::NAN,
            median: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
        });
    }

    let mut ordered = obs.clone();
    mk::order_by_time(&mut ordered);

    let n = ordered.len();
    let censored = ordered.iter().filter(|o| o.is_censored()).count();
    let mut censor_limits: Vec<i64> = ordered
        .iter()
        .filter(|o| o.is_censored())
        .map(|o| o.v.to_bits() as i64)
        .collect();
    censor_limits.sort_unstable();
    censor_limits.dedup();

    let mut vals: Vec<f64> = ordered.iter().map(|o| o.v).collect();
    let mean = vals.iter().sum::<f64>() / n as f64;
    let min = vals.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = if n % 2 == 1 { vals[n / 2] } else { (vals[n / 2 - 1] + vals[n / 2]) / 2.0 };

    Ok(InspectionReport {
        n,
        n_missing,
        n_censor_levels: censor_limits.len(),
        prop_censored: censored as f64 / n as f64,
        first_time: ordered.first().unwrap().t,
        last_time: ordered.last().unwrap().t,
        mean,
        median,
        min,
        max,
    })
}

/// Re-export of the classifier for direct use outside a full trend test.
pub fn classify_trend(cd: f64, p: f64, config: &TrendConfig, map: Option<&ThresholdMap>) -> String {
    classify::classify_trend(cd, p, config.alpha, config.continuous_confidence, map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlopeMethod;

    #[test]
    fn trend_test_detects_increasing_series() {
        let obs: Vec<Observation> = (1..=10).map(|i| Observation::uncensored(i as f64, i as f64)).collect();
        let config = TrendConfig::default();
        let result = trend_test(&obs, &config);
        assert_eq!(result.trend, TrendDirection::Increasing);
        assert!((result.s - 45.0).abs() < 1e-9);
    }

    #[test]
    fn trend_test_too_few_observations_is_not_analysed() {
        let obs = vec![Observation::uncensored(0.0, 1.0), Observation::uncensored(1.0, 2.0)];
        let config = TrendConfig::default();
        let result = trend_test(&obs, &config);
        assert_eq!(result.trend, TrendDirection::NotAnalysed);
    }

    #[test]
    fn seasonal_trend_test_runs_end_to_end() {
        let mut obs = Vec::new();
        for season in 0..4 {
            for year in 0..8 {
                let t = (year * 4 + season) as f64;
                obs.push(Observation::uncensored(t, year as f64 + season as f64 * 0.01));
            }
        }
        let mut config = TrendConfig::default();
        config.min_per_season = 5;
        let result = seasonal_trend_test(&obs, SeasonSpec::Numeric { period: 4.0 }, &config);
        assert_ne!(result.trend, TrendDirection::NotAnalysed);
    }

    #[test]
    fn check_seasonality_on_strongly_seasonal_data() {
        let mut obs = Vec::new();
        for cycle in 0..10 {
            for season in 0..4 {
                let t = (cycle * 4 + season) as f64;
                obs.push(Observation::uncensored(t, season as f64 * 10.0));
            }
        }
        let config = TrendConfig::default();
        let check = check_seasonality(&obs, SeasonSpec::Numeric { period: 4.0 }, &config);
        assert!(check.is_seasonal);
    }

    #[test]
    fn inspect_reports_missing_and_censored_counts() {
        let values: Vec<MeasurementToken> =
            vec![1.0.into(), "<5".into(), "NA".into(), 3.0.into()];
        let times = vec![0.0, 1.0, 2.0, 3.0];
        let report = inspect_trend_data(&values, &times).unwrap();
        assert_eq!(report.n, 3);
        assert_eq!(report.n_missing, 1);
        assert_eq!(report.n_censor_levels, 1);
    }

    #[test]
    fn ats_slope_method_is_selectable() {
        let obs: Vec<Observation> = (0..10).map(|i| Observation::uncensored(i as f64, i as f64 * 2.0)).collect();
        let mut config = TrendConfig::default();
        config.slope_method = SlopeMethod::Ats;
        let result = trend_test(&obs, &config);
        assert!((result.slope - 2.0).abs() < 0.5);
    }
}
