//! Result records returned by the public operations. `TrendResult` matches
//! the field list of the data-model's "Result record" verbatim; the rest are
//! its batch/variant forms (surrogate, power, rolling, segmented, regional).

use serde::{Deserialize, Serialize};

use crate::types::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    NoTrend,
    NotAnalysed,
}

impl TrendDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "Increasing",
            TrendDirection::Decreasing => "Decreasing",
            TrendDirection::NoTrend => "No Trend",
            TrendDirection::NotAnalysed => "not analysed",
        }
    }
}

/// One condition encountered during analysis, recorded verbatim in
/// `TrendResult::analysis_notes` and also emitted as a `tracing::debug!`
/// event at the point it was raised.
pub type AnalysisNote = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendResult {
    pub trend: TrendDirection,
    pub s: f64,
    pub var_s: f64,
    pub z: f64,
    pub p: f64,
    pub tau: f64,
    pub slope: f64,
    pub intercept: f64,
    pub slope_lower: f64,
    pub slope_upper: f64,
    /// `slope`/`slope_lower`/`slope_upper` rescaled into human units via
    /// `config.slope_scaling` (e.g. value-per-year when the time axis is
    /// seconds-since-epoch and `slope_scaling = Period::Year`).
    pub scaled_slope: f64,
    pub scaled_slope_lower: f64,
    pub scaled_slope_upper: f64,
    /// Unit suffix for the scaled fields above, e.g. `"per year"`.
    pub scaled_slope_unit: String,
    /// C = 1 - p/2
    pub confidence: f64,
    /// Cd = C if S < 0 else 1 - C
    pub directional_confidence: f64,
    pub classification: String,
    pub surrogate: Option<SurrogateResult>,
    pub analysis_notes: Vec<AnalysisNote>,
    pub n_obs: usize,
}

impl TrendResult {
    /// Construct the "could not run" sentinel result required by the
    /// error-handling design: `Insufficiency` is never fatal in isolation.
    pub fn not_analysed(note: impl Into<String>, n_obs: usize) -> Self {
        Self {
            trend: TrendDirection::NotAnalysed,
            s: f64::NAN,
            var_s: f64::NAN,
            z: f64::NAN,
            p: f64::NAN,
            tau: f64::NAN,
            slope: f64::NAN,
            intercept: f64::NAN,
            slope_lower: f64::NAN,
            slope_upper: f64::NAN,
            scaled_slope: f64::NAN,
            scaled_slope_lower: f64::NAN,
            scaled_slope_upper: f64::NAN,
            scaled_slope_unit: String::new(),
            confidence: f64::NAN,
            directional_confidence: f64::NAN,
            classification: "not analysed".to_string(),
            surrogate: None,
            analysis_notes: vec![note.into()],
            n_obs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurrogateResult {
    pub method: String,
    pub n_surrogates: usize,
    pub p_value: f64,
    /// S statistic computed for every surrogate, in deterministic index order.
    pub s_ensemble: Vec<f64>,
    pub notes: Vec<AnalysisNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerPoint {
    pub beta: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerResult {
    pub points: Vec<PowerPoint>,
    /// Minimum detectable trend at the target power (NaN if no crossing).
    pub mdt: f64,
    pub target_power: f64,
    pub notes: Vec<AnalysisNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: Window,
    pub center: f64,
    pub result: TrendResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResult {
    pub segment: Window,
    pub result: TrendResult,
    /// OLS-style predictor coefficients `(slope, intercept)` for this segment.
    pub predictor: (f64, f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentedResult {
    pub segments: Vec<SegmentResult>,
    pub breakpoints: Vec<f64>,
    /// Nonparametric (bagging) or parametric CI half-widths per breakpoint,
    /// `None` when neither was requested.
    pub breakpoint_ci: Option<Vec<(f64, f64)>>,
    pub notes: Vec<AnalysisNote>,
}

impl SegmentedResult {
    /// `predict(t)`: pick the segment containing `t` (clamping to the first
    /// or last segment outside the fitted range) and evaluate its line.
    pub fn predict(&self, t: f64) -> f64 {
        let seg = self
            .segments
            .iter()
            .find(|s| s.segment.contains(t))
            .or_else(|| self.segments.last())
            .or_else(|| self.segments.first());
        match seg {
            Some(s) => s.predictor.0 * t + s.predictor.1,
            None => f64::NAN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalResult {
    pub direction: TrendDirection,
    pub tau: f64,
    pub var_tau: f64,
    pub corrected_var_tau: f64,
    pub confidence: f64,
    pub n_sites: usize,
    pub notes: Vec<AnalysisNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalityCheck {
    pub is_seasonal: bool,
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    pub n: usize,
    pub n_missing: usize,
    pub n_censor_levels: usize,
    pub prop_censored: f64,
    pub first_time: f64,
    pub last_time: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}
