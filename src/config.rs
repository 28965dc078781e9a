//! `TrendConfig`: the exhaustive configuration surface named (non-exhaustively)
//! in the external-interfaces section. Mirrors the teacher's `CovarianceType`
//! enum-of-variants idiom, with a `Default` impl and `with_*` builder methods.

use serde::{Deserialize, Serialize};

use crate::types::Period;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreakMethod {
    /// epsilon = half the minimum positive difference of unique values
    Robust,
    /// epsilon = min-diff / 1000
    Lwp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MkMethod {
    /// right-censors keep their interval identity
    Robust,
    /// replace all `>v` with `max(v) + 0.1`, treat as uncensored ties
    Lwp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TauMethod {
    /// S / (n(n-1)/2)
    A,
    /// S / sqrt((J-tt)(J-uu)) with tie-corrected denominators
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlopeMethod {
    /// Ordinary Sen, ambiguous-censored pairs excluded from the median.
    Nan,
    /// LWP-compatibility: ambiguous pairs forced to 0, right-censors replaced
    /// as in `MkMethod::Lwp`.
    Lwp,
    /// Akritas-Theil-Sen root-find.
    Ats,
    /// Stochastic pair-sampled median, for large N.
    Stochastic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CiMethod {
    Direct,
    Lwp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieMergeMethod {
    Median,
    RobustMedian,
    Middle,
    MiddleLwp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThinReducer {
    Lwp,
    LwpMedian,
    LwpRobustMedian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggMethod {
    TieMerge(TieMergeMethod),
    Thin(ThinReducer),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutocorrMethod {
    None,
    Auto,
    BlockBootstrap,
    YueWang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurrogateMethod {
    None,
    Auto,
    Iaaft,
    LombScargle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Hicensor {
    Off,
    /// re-censor at the highest observed detection limit
    Auto,
    /// re-censor at this explicit threshold
    Threshold(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    pub alpha: f64,
    pub hicensor: Hicensor,
    pub lt_mult: f64,
    pub gt_mult: f64,
    pub slope_method: SlopeMethod,
    pub mk_method: MkMethod,
    pub tie_break_method: TieBreakMethod,
    pub tau_method: TauMethod,
    pub ci_method: CiMethod,
    pub agg_method: AggMethod,
    pub agg_period: Period,
    pub min_size: usize,
    pub min_per_season: usize,
    pub autocorr_method: AutocorrMethod,
    /// `None` = auto block-size selection.
    pub block_size: Option<usize>,
    pub n_bootstrap: usize,
    pub surrogate_method: SurrogateMethod,
    pub n_surrogates: usize,
    pub random_state: u64,
    pub slope_scaling: Period,
    pub continuous_confidence: bool,
    /// Stochastic-pair sampling threshold (n above which it kicks in).
    pub stochastic_threshold: usize,
    /// Number of sampled pairs for the stochastic slope estimator.
    pub stochastic_k: usize,
    /// Process-wide pairwise-slope array safety ceiling, in elements.
    pub max_pairs_allocation: usize,
    /// Exact-kernel complexity floor: n above this uses O(n^2) MK, not refused.
    pub max_exact_n: usize,
    /// Rolling driver refuses to compute more than this many windows.
    pub max_windows: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            hicensor: Hicensor::Off,
            lt_mult: 0.5,
            gt_mult: 1.1,
            slope_method: SlopeMethod::Nan,
            mk_method: MkMethod::Robust,
            tie_break_method: TieBreakMethod::Robust,
            tau_method: TauMethod::B,
            ci_method: CiMethod::Direct,
            agg_method: AggMethod::None,
            agg_period: Period::Year,
            min_size: 5,
            min_per_season: 5,
            autocorr_method: AutocorrMethod::None,
            block_size: None,
            n_bootstrap: 1000,
            surrogate_method: SurrogateMethod::None,
            n_surrogates: 500,
            random_state: 0,
            slope_scaling: Period::Year,
            continuous_confidence: true,
            stochastic_threshold: 5_000,
            stochastic_k: 100_000,
            max_pairs_allocation: 400_000_000 / 8, // ~400MB of f64
            max_exact_n: 50_000,
            max_windows: 10_000,
        }
    }
}

impl TrendConfig {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_slope_method(mut self, m: SlopeMethod) -> Self {
        self.slope_method = m;
        self
    }

    pub fn with_mk_method(mut self, m: MkMethod) -> Self {
        self.mk_method = m;
        self
    }

    pub fn with_tie_break_method(mut self, m: TieBreakMethod) -> Self {
        self.tie_break_method = m;
        self
    }

    pub fn with_ci_method(mut self, m: CiMethod) -> Self {
        self.ci_method = m;
        self
    }

    pub fn with_autocorr_method(mut self, m: AutocorrMethod) -> Self {
        self.autocorr_method = m;
        self
    }

    pub fn with_surrogate_method(mut self, m: SurrogateMethod) -> Self {
        self.surrogate_method = m;
        self
    }

    pub fn with_n_surrogates(mut self, k: usize) -> Self {
        self.n_surrogates = k;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_hicensor(mut self, h: Hicensor) -> Self {
        self.hicensor = h;
        self
    }

    pub fn with_continuous_confidence(mut self, v: bool) -> Self {
        self.continuous_confidence = v;
        self
    }
}
