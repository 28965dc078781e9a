use thiserror::Error;

/// Hard errors surfaced by the trend engine.
///
/// Per the error-handling design, only these three kinds ever short-circuit
/// a call with `Err`. Everything else (insufficient data, singular Turnbull
/// EM, surrogate synthesis of constant data, ...) is absorbed locally and
/// recorded as an analysis note on a returned `TrendResult` instead.
#[derive(Error, Debug)]
pub enum TrendError {
    /// Mismatched vector lengths, or a censored token that could not be parsed.
    #[error("input shape error: {0}")]
    InputShape(String),

    /// Aggregation discarded the time index needed to align a caller-supplied
    /// per-observation array (e.g. `dy`, an override censor vector).
    #[error("alignment error: {0}")]
    Alignment(String),

    /// A configured safety ceiling (pairwise-slope allocation, rolling window
    /// count, ...) was exceeded.
    #[error("safety ceiling exceeded: {0}")]
    Safety(String),
}
