//! C11 — Classifier: maps directional confidence to an ordinal trend label.
//! Thresholds apply to the confidence magnitude `max(Cd, 1-Cd)`, with a
//! direction suffix ("Increasing"/"Decreasing") appended based on which side
//! of 0.5 `Cd` falls on; the zero-threshold label is the symmetric neutral
//! band and is never suffixed. In binary mode the classifier ignores
//! confidence magnitude entirely and reports significance at `alpha`.
//!
//! The neutral band itself splits in two: a near-1 p-value means the data
//! actively supports "no trend" ("Stable"), while a middling p-value only
//! means the test couldn't tell either way ("As Likely as Not").

/// `p` above this, within the neutral magnitude band, reads as positive
/// evidence of no trend rather than mere inconclusiveness.
const STABLE_P_THRESHOLD: f64 = 0.9;

/// `(threshold, label)` pairs, checked in descending-threshold order. Must
/// include a `0.0` entry to catch the fallback.
pub type ThresholdMap = Vec<(f64, String)>;

pub fn default_threshold_map() -> ThresholdMap {
    vec![
        (0.95, "Highly Likely".to_string()),
        (0.90, "Very Likely".to_string()),
        (0.67, "Likely".to_string()),
        (0.0, "As Likely as Not".to_string()),
    ]
}

fn label_for_magnitude(magnitude: f64, map: &ThresholdMap) -> String {
    let mut sorted = map.clone();
    sorted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    for (threshold, label) in &sorted {
        if magnitude >= *threshold {
            return label.clone();
        }
    }
    sorted
        .last()
        .map(|(_, l)| l.clone())
        .unwrap_or_else(|| "As Likely as Not".to_string())
}

/// Classify a directional confidence `cd` into an ordinal label using
/// `map` (or the binary significance test when `continuous_confidence` is
/// false).
pub fn classify_trend(
    cd: f64,
    p: f64,
    alpha: f64,
    continuous_confidence: bool,
    map: Option<&ThresholdMap>,
) -> String {
    if !continuous_confidence {
        if p <= alpha {
            return if cd >= 0.5 { "Decreasing".to_string() } else { "Increasing".to_string() };
        }
        return "No Trend".to_string();
    }

    if cd.is_nan() {
        return "not analysed".to_string();
    }

    let owned_default;
    let map = match map {
        Some(m) => m,
        None => {
            owned_default = default_threshold_map();
            &owned_default
        }
    };

    let magnitude = cd.max(1.0 - cd);
    let base = label_for_magnitude(magnitude, map);
    if base == "As Likely as Not" || base.eq_ignore_ascii_case("stable") {
        if base == "As Likely as Not" && p >= STABLE_P_THRESHOLD {
            return "Stable".to_string();
        }
        return base;
    }
    if cd >= 0.5 {
        format!("{base} Decreasing")
    } else {
        format!("{base} Increasing")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_confidence_decreasing() {
        let label = classify_trend(0.97, 0.01, 0.05, true, None);
        assert_eq!(label, "Highly Likely Decreasing");
    }

    #[test]
    fn symmetric_increasing_label() {
        let label = classify_trend(0.03, 0.01, 0.05, true, None);
        assert_eq!(label, "Highly Likely Increasing");
    }

    #[test]
    fn neutral_band_has_no_direction_suffix() {
        let label = classify_trend(0.5, 0.8, 0.05, true, None);
        assert_eq!(label, "As Likely as Not");
    }

    #[test]
    fn constant_series_is_stable_not_ambiguous() {
        // S2: a flat series drives p all the way to 1, which is positive
        // evidence of no trend rather than a mere failure to decide.
        let label = classify_trend(0.5, 1.0, 0.05, true, None);
        assert_eq!(label, "Stable");
    }

    #[test]
    fn binary_mode_uses_alpha() {
        assert_eq!(classify_trend(0.9, 0.01, 0.05, false, None), "Decreasing");
        assert_eq!(classify_trend(0.9, 0.5, 0.05, false, None), "No Trend");
    }

    #[test]
    fn custom_map_is_respected() {
        let map: ThresholdMap = vec![(0.80, "Strong".to_string()), (0.0, "Weak".to_string())];
        assert_eq!(classify_trend(0.85, 0.01, 0.05, true, Some(&map)), "Strong Decreasing");
        assert_eq!(classify_trend(0.5, 0.5, 0.05, true, Some(&map)), "Weak");
    }
}
