//! C1 — Censored-data normalizer.
//!
//! Parses a heterogeneous input sequence (plain numbers, a "missing" marker,
//! `"<n"` / `">n"` detection-limit tokens, or an explicit value/flag pair)
//! into the uniform `Observation` record. Never modifies its inputs in
//! place; always allocates a fresh `Vec<Observation>`.

use crate::error::TrendError;
use crate::types::{CensorFlag, Observation};

/// One raw input element before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementToken {
    Number(f64),
    Missing,
    LeftCensored(f64),
    RightCensored(f64),
    /// A string such as `"<5"`, `">100"`, `"12.3"`, `"ND"`, `"NA"`.
    Text(String),
}

impl From<f64> for MeasurementToken {
    fn from(v: f64) -> Self {
        MeasurementToken::Number(v)
    }
}

impl From<&str> for MeasurementToken {
    fn from(s: &str) -> Self {
        MeasurementToken::Text(s.to_string())
    }
}

fn parse_text(s: &str) -> Result<MeasurementToken, TrendError> {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("nd")
        || trimmed.eq_ignore_ascii_case("nan")
    {
        return Ok(MeasurementToken::Missing);
    }
    if let Some(rest) = trimmed.strip_prefix('<') {
        let v: f64 = rest.trim().parse().map_err(|_| {
            TrendError::InputShape(format!("unparsable left-censored token: {s:?}"))
        })?;
        return Ok(MeasurementToken::LeftCensored(v));
    }
    if let Some(rest) = trimmed.strip_prefix('>') {
        let v: f64 = rest.trim().parse().map_err(|_| {
            TrendError::InputShape(format!("unparsable right-censored token: {s:?}"))
        })?;
        return Ok(MeasurementToken::RightCensored(v));
    }
    let v: f64 = trimmed
        .parse()
        .map_err(|_| TrendError::InputShape(format!("unparsable numeric token: {s:?}")))?;
    Ok(MeasurementToken::Number(v))
}

/// Normalize `values`/`times` (and an optional parallel `flags` vector, e.g.
/// `"<"`/`">"`/`""`, used when value and censor-flag travel as two columns)
/// into `Observation`s. NaN times or NaN numeric values drop that
/// observation; a length mismatch between `values`, `times`, `flags`, or
/// `dy` is an `InputShape` error.
pub fn normalize(
    values: &[MeasurementToken],
    times: &[f64],
    flags: Option<&[&str]>,
    dy: Option<&[f64]>,
) -> Result<Vec<Observation>, TrendError> {
    if values.len() != times.len() {
        return Err(TrendError::InputShape(format!(
            "values length {} does not match times length {}",
            values.len(),
            times.len()
        )));
    }
    if let Some(f) = flags {
        if f.len() != values.len() {
            return Err(TrendError::InputShape(format!(
                "flags length {} does not match values length {}",
                f.len(),
                values.len()
            )));
        }
    }
    if let Some(d) = dy {
        if d.len() != values.len() {
            return Err(TrendError::InputShape(format!(
                "dy length {} does not match values length {}",
                d.len(),
                values.len()
            )));
        }
    }

    let mut out = Vec::with_capacity(values.len());
    for (i, tok) in values.iter().enumerate() {
        let t = times[i];
        if t.is_nan() {
            continue;
        }
        let resolved = match tok {
            MeasurementToken::Text(s) => parse_text(s)?,
            other => other.clone(),
        };

        let (v, censor) = match resolved {
            MeasurementToken::Number(v) => (v, CensorFlag::None),
            MeasurementToken::Missing => continue,
            MeasurementToken::LeftCensored(v) => (v, CensorFlag::Left),
            MeasurementToken::RightCensored(v) => (v, CensorFlag::Right),
            MeasurementToken::Text(_) => unreachable!("resolved above"),
        };
        if v.is_nan() {
            continue;
        }

        let censor = match flags.map(|f| f[i]) {
            Some("<") => CensorFlag::Left,
            Some(">") => CensorFlag::Right,
            Some("") | None => censor,
            Some(other) => {
                return Err(TrendError::InputShape(format!(
                    "unrecognized censor flag {other:?}"
                )))
            }
        };

        out.push(Observation { t, v, censor, dy: dy.map(|d| d[i]) });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numbers() {
        let vals: Vec<MeasurementToken> = vec![1.0.into(), 2.0.into(), 3.0.into()];
        let times = vec![0.0, 1.0, 2.0];
        let obs = normalize(&vals, &times, None, None).unwrap();
        assert_eq!(obs.len(), 3);
        assert!(obs.iter().all(|o| o.censor == CensorFlag::None));
    }

    #[test]
    fn parses_censored_tokens() {
        let vals: Vec<MeasurementToken> =
            vec!["<5".into(), ">100".into(), "12".into(), "ND".into()];
        let times = vec![0.0, 1.0, 2.0, 3.0];
        let obs = normalize(&vals, &times, None, None).unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].censor, CensorFlag::Left);
        assert_eq!(obs[0].v, 5.0);
        assert_eq!(obs[1].censor, CensorFlag::Right);
        assert_eq!(obs[1].v, 100.0);
        assert_eq!(obs[2].censor, CensorFlag::None);
    }

    #[test]
    fn rejects_length_mismatch() {
        let vals: Vec<MeasurementToken> = vec![1.0.into()];
        let times = vec![0.0, 1.0];
        assert!(matches!(
            normalize(&vals, &times, None, None),
            Err(TrendError::InputShape(_))
        ));
    }

    #[test]
    fn rejects_unparsable_token() {
        let vals: Vec<MeasurementToken> = vec!["oops".into()];
        let times = vec![0.0];
        assert!(matches!(
            normalize(&vals, &times, None, None),
            Err(TrendError::InputShape(_))
        ));
    }

    #[test]
    fn drops_nan_time() {
        let vals: Vec<MeasurementToken> = vec![1.0.into(), 2.0.into()];
        let times = vec![f64::NAN, 1.0];
        let obs = normalize(&vals, &times, None, None).unwrap();
        assert_eq!(obs.len(), 1);
    }
}
