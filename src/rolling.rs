//! C10a — Rolling driver: slides a fixed-width window across the time axis,
//! running the full trend kernel on each window's contents.

use crate::config::TrendConfig;
use crate::error::TrendError;
use crate::mk::order_by_time;
use crate::result::WindowResult;
use crate::types::{Observation, Window};

/// Build the half-open window boundaries: windows of width `window_width`
/// advancing by `step`, starting at the first observation's time. The
/// trailing window is adaptive — it ends exactly at the last observation's
/// time rather than overshooting — so it may be narrower than
/// `window_width`.
fn build_windows(first_t: f64, last_t: f64, window_width: f64, step: f64) -> Vec<Window> {
    let mut windows = Vec::new();
    let mut start = first_t;
    while start < last_t {
        let mut end = start + window_width;
        if end > last_t {
            end = last_t + f64::EPSILON.max(1e-9);
        }
        windows.push(Window { start, end });
        start += step;
    }
    windows
}

/// Run the rolling trend driver. Refuses with `TrendError::Safety` if the
/// window count would exceed `config.max_windows`.
pub fn rolling_trend_test(
    obs: &[Observation],
    window_width: f64,
    step: f64,
    config: &TrendConfig,
) -> Result<Vec<WindowResult>, TrendError> {
    if obs.is_empty() {
        return Ok(Vec::new());
    }
    let mut ordered = obs.to_vec();
    order_by_time(&mut ordered);
    let first_t = ordered.first().unwrap().t;
    let last_t = ordered.last().unwrap().t;

    if step <= 0.0 || window_width <= 0.0 {
        return Err(TrendError::InputShape("window_width and step must be positive".to_string()));
    }

    let windows = build_windows(first_t, last_t, window_width, step);
    if windows.len() > config.max_windows {
        return Err(TrendError::Safety(format!(
            "rolling driver would compute {} windows, exceeding max_windows={}",
            windows.len(),
            config.max_windows
        )));
    }

    let results = windows
        .into_iter()
        .map(|window| {
            let subset: Vec<Observation> = ordered.iter().copied().filter(|o| window.contains(o.t)).collect();
            let result = crate::trend_test(&subset, config);
            WindowResult { window, center: window.center(), result }
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_the_full_range() {
        let windows = build_windows(0.0, 100.0, 20.0, 10.0);
        assert!(!windows.is_empty());
        assert!(windows.last().unwrap().end >= 100.0 - 1e-6);
    }

    #[test]
    fn excessive_window_count_is_rejected() {
        let obs: Vec<Observation> = (0..1000).map(|i| Observation::uncensored(i as f64, i as f64)).collect();
        let mut config = TrendConfig::default();
        config.max_windows = 5;
        let result = rolling_trend_test(&obs, 2.0, 0.01, &config);
        assert!(matches!(result, Err(TrendError::Safety(_))));
    }

    #[test]
    fn rolling_on_linear_series_detects_increasing_trend_everywhere() {
        let obs: Vec<Observation> = (0..60).map(|i| Observation::uncensored(i as f64, i as f64)).collect();
        let config = TrendConfig::default();
        let results = rolling_trend_test(&obs, 20.0, 20.0, &config).unwrap();
        assert!(!results.is_empty());
        for r in &results {
            if r.result.n_obs >= config.min_size {
                assert!(r.result.slope > 0.0);
            }
        }
    }
}
