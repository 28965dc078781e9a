//! Shared data types: the normalized observation record, censor flags,
//! season specifications and the window/segment primitives used by the
//! rolling and segmented drivers.

use serde::{Deserialize, Serialize};

/// Left/right censoring state of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CensorFlag {
    None,
    Left,
    Right,
}

impl CensorFlag {
    pub fn is_censored(&self) -> bool {
        !matches!(self, CensorFlag::None)
    }
}

/// A single normalized measurement on the real time axis.
///
/// `value` is the observed number; for a censored record it also doubles as
/// the detection limit. `dy` is an optional per-observation measurement
/// uncertainty, carried through from input but not consumed by the core
/// kernels (C2/C3) themselves — it is reserved for surrogate weighting and
/// collaborator use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub t: f64,
    pub v: f64,
    pub censor: CensorFlag,
    pub dy: Option<f64>,
}

impl Observation {
    pub fn uncensored(t: f64, v: f64) -> Self {
        Self { t, v, censor: CensorFlag::None, dy: None }
    }

    pub fn left_censored(t: f64, limit: f64) -> Self {
        Self { t, v: limit, censor: CensorFlag::Left, dy: None }
    }

    pub fn right_censored(t: f64, limit: f64) -> Self {
        Self { t, v: limit, censor: CensorFlag::Right, dy: None }
    }

    pub fn is_censored(&self) -> bool {
        self.censor.is_censored()
    }
}

/// Season extraction rule, producing an integer season index per observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SeasonSpec {
    Month,
    Quarter,
    DayOfWeek,
    IsoWeek,
    DayOfYear,
    Hour,
    Minute,
    Second,
    /// `t` is interpreted as seconds-since-epoch; calendar fields are taken
    /// from the UTC civil calendar.
    Calendar(CalendarField),
    /// `season = floor(t mod period)`, for unit-agnostic numeric time axes.
    Numeric { period: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CalendarField {
    Month,
    Quarter,
    DayOfWeek,
    IsoWeek,
    DayOfYear,
    Hour,
    Minute,
    Second,
}

/// A contiguous half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    pub fn center(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// A contiguous half-open interval produced by breakpoint search.
pub type Segment = Window;

/// Aggregation period for C5's thinning mode and for `slope_scaling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl Period {
    /// Approximate length in seconds, used only for grid-cell sizing when the
    /// time axis is a numeric (non-calendar) seconds-since-epoch axis.
    pub fn approx_seconds(&self) -> f64 {
        match self {
            Period::Year => 365.25 * 86_400.0,
            Period::Quarter => 365.25 * 86_400.0 / 4.0,
            Period::Month => 365.25 * 86_400.0 / 12.0,
            Period::Week => 7.0 * 86_400.0,
            Period::Day => 86_400.0,
            Period::Hour => 3_600.0,
            Period::Minute => 60.0,
            Period::Second => 1.0,
        }
    }

    /// Human-readable unit suffix for the scaled-slope magnitude, e.g.
    /// `"per year"` for a value-over-seconds slope scaled by `slope_scaling`.
    pub fn label(&self) -> &'static str {
        match self {
            Period::Year => "per year",
            Period::Quarter => "per quarter",
            Period::Month => "per month",
            Period::Week => "per week",
            Period::Day => "per day",
            Period::Hour => "per hour",
            Period::Minute => "per minute",
            Period::Second => "per second",
        }
    }
}
