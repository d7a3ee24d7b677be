//! Parsing of the JSON shapes an envelope can be written in.
//!
//! - flat breakpoints: `[[t, v], ...]`
//! - typed: `{"type": "cubic", "points": <list>}`
//! - compact: `[[[pct, v], ...], end_time, n_reps, interp?, time_dist?]`
//! - a list mixing flat breakpoints and compact entries

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{builder::CompactSpec, Breakpoint, EnvelopeKind};
use crate::{distribution::TimeDistribution, GrainScoreError, Result};

const CYCLE_MARKER: &str = "cycle";

/// Unit of the time axis of a curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    /// Times are seconds from the stream onset.
    #[default]
    Absolute,
    /// Times are fractions of the stream duration.
    Normalized,
}

/// One element of a parsed envelope description.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecEntry {
    Point(Breakpoint),
    Compact(CompactSpec),
}

/// A parsed but not yet expanded envelope description.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeSpec {
    /// Kind given by the `type` key of the object form.
    pub explicit_kind: Option<EnvelopeKind>,
    /// Time unit override given by the `time_unit` key of the object form.
    pub time_unit: Option<TimeMode>,
    pub entries: Vec<SpecEntry>,
}

impl EnvelopeSpec {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                if let Some(key) = map
                    .keys()
                    .find(|key| !matches!(key.as_str(), "type" | "points" | "time_unit"))
                {
                    return Err(GrainScoreError::envelope(format!(
                        "unexpected key `{key}` in envelope object"
                    )));
                }
                let points = map.get("points").ok_or_else(|| {
                    GrainScoreError::envelope("envelope object requires a `points` list")
                })?;
                let explicit_kind = match map.get("type") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(name)) => Some(name.parse()?),
                    Some(other) => {
                        return Err(GrainScoreError::envelope(format!(
                            "envelope type must be a string, got {other}"
                        )))
                    }
                };
                let time_unit = match map.get("time_unit") {
                    None | Some(Value::Null) => None,
                    Some(unit) => Some(serde_json::from_value(unit.clone())?),
                };
                Ok(Self {
                    explicit_kind,
                    time_unit,
                    entries: parse_entries(points)?,
                })
            }
            Value::Array(_) => Ok(Self {
                explicit_kind: None,
                time_unit: None,
                entries: parse_entries(value)?,
            }),
            other => Err(GrainScoreError::envelope(format!(
                "expected a breakpoint list or an envelope object, got {other}"
            ))),
        }
    }

    /// Interpolation to use: the explicit `type`, else the first compact
    /// entry that names one, else linear.
    pub fn kind(&self) -> EnvelopeKind {
        self.explicit_kind
            .or_else(|| {
                self.entries.iter().find_map(|entry| match entry {
                    SpecEntry::Compact(compact) => compact.interpolation,
                    SpecEntry::Point(_) => None,
                })
            })
            .unwrap_or_default()
    }

    /// Multiplies breakpoint times and compact end times by `factor`.
    pub fn scale_times(&mut self, factor: f64) {
        for entry in &mut self.entries {
            match entry {
                SpecEntry::Point(point) => point.time *= factor,
                SpecEntry::Compact(compact) => compact.end_time *= factor,
            }
        }
    }

    /// Multiplies breakpoint and pattern values by `factor`.
    pub fn scale_values(&mut self, factor: f64) {
        for entry in &mut self.entries {
            match entry {
                SpecEntry::Point(point) => point.value *= factor,
                SpecEntry::Compact(compact) => {
                    for (_, value) in &mut compact.pattern {
                        *value *= factor;
                    }
                }
            }
        }
    }

    /// Cheap shape check used to tell curve-valued settings from other JSON.
    pub fn looks_like(value: &Value) -> bool {
        match value {
            Value::Object(map) => map.contains_key("points"),
            Value::Array(items) => {
                !items.is_empty()
                    && (is_compact(items)
                        || items.iter().any(|item| match item {
                            Value::Array(inner) => is_compact(inner) || as_pair(inner).is_some(),
                            _ => false,
                        }))
            }
            _ => false,
        }
    }
}

fn parse_entries(value: &Value) -> Result<Vec<SpecEntry>> {
    let items = value.as_array().ok_or_else(|| {
        GrainScoreError::envelope(format!("envelope points must be a list, got {value}"))
    })?;
    if items.is_empty() {
        return Err(GrainScoreError::envelope("envelope points cannot be empty"));
    }
    if is_compact(items) {
        return Ok(vec![SpecEntry::Compact(parse_compact(items)?)]);
    }

    items
        .iter()
        .map(|item| match item {
            Value::String(marker) if marker.eq_ignore_ascii_case(CYCLE_MARKER) => {
                Err(GrainScoreError::UnsupportedCycleMarker)
            }
            Value::Array(inner) if is_compact(inner) => Ok(SpecEntry::Compact(parse_compact(inner)?)),
            Value::Array(inner) => as_pair(inner)
                .map(|(time, value)| SpecEntry::Point(Breakpoint::new(time, value)))
                .ok_or_else(|| invalid_breakpoint(item)),
            _ => Err(invalid_breakpoint(item)),
        })
        .collect()
}

fn invalid_breakpoint(item: &Value) -> GrainScoreError {
    GrainScoreError::envelope(format!("invalid breakpoint {item}, expected [time, value]"))
}

fn as_pair(items: &[Value]) -> Option<(f64, f64)> {
    match items {
        [time, value] => Some((time.as_f64()?, value.as_f64()?)),
        _ => None,
    }
}

/// `[pattern, end_time, n_reps, interp?, time_dist?]` where the pattern is a
/// (possibly empty) list of pairs and `n_reps` is an integer.
fn is_compact(items: &[Value]) -> bool {
    if !(3..=5).contains(&items.len()) {
        return false;
    }
    let pattern_ok = items[0].as_array().is_some_and(|pattern| {
        pattern
            .iter()
            .all(|p| p.as_array().is_some_and(|pair| pair.len() == 2))
    });
    let interp_ok = items
        .get(3)
        .map_or(true, |v| v.is_null() || v.is_string());
    let dist_ok = items
        .get(4)
        .map_or(true, |v| v.is_null() || v.is_string() || v.is_object());

    pattern_ok && items[1].is_number() && (items[2].is_i64() || items[2].is_u64()) && interp_ok && dist_ok
}

fn parse_compact(items: &[Value]) -> Result<CompactSpec> {
    let pattern = items[0]
        .as_array()
        .into_iter()
        .flatten()
        .map(|point| {
            point
                .as_array()
                .and_then(|pair| as_pair(pair))
                .ok_or_else(|| {
                    GrainScoreError::pattern(format!("invalid pattern point {point}, expected [pct, value]"))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let end_time = items[1]
        .as_f64()
        .ok_or_else(|| GrainScoreError::pattern("end_time must be a number"))?;
    let n_reps = items[2]
        .as_i64()
        .ok_or_else(|| GrainScoreError::pattern("n_reps must be an integer"))?;
    let n_reps = usize::try_from(n_reps)
        .map_err(|_| GrainScoreError::pattern(format!("n_reps must be >= 1, got {n_reps}")))?;

    let mut compact = CompactSpec::new(pattern, end_time, n_reps);
    if let Some(Value::String(name)) = items.get(3) {
        compact = compact.with_interpolation(name.parse()?);
    }
    if let Some(dist) = items.get(4) {
        compact = compact.with_distribution(TimeDistribution::from_value(dist)?);
    }
    Ok(compact)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn recognises_compact_shapes() {
        let compact = json!([[[0, 0], [100, 1]], 0.4, 4]);
        assert!(is_compact(compact.as_array().unwrap()));
        let with_interp = json!([[[0, 0], [100, 1]], 0.4, 4, "cubic"]);
        assert!(is_compact(with_interp.as_array().unwrap()));
        let empty_pattern = json!([[], 0.4, 4]);
        assert!(is_compact(empty_pattern.as_array().unwrap()));
    }

    #[test]
    fn rejects_non_compact_shapes() {
        for value in [
            json!([[0, 0], [1, 1], [2, 2]]),
            json!([[[0, 0]], "0.4", 4]),
            json!([[[0, 0]], 0.4, 4.5]),
            json!([[[0, 0]], 0.4, 4, 123]),
            json!(["points", 0.4, 4]),
            json!([1, 2, 3, 4, 5, 6]),
        ] {
            assert!(!is_compact(value.as_array().unwrap()), "{value}");
        }
    }

    #[test]
    fn object_form_sets_kind() {
        let spec = EnvelopeSpec::from_value(&json!({"type": "Step", "points": [[0, 1], [1, 2]]})).unwrap();
        assert_eq!(spec.kind(), EnvelopeKind::Step);
        assert_eq!(spec.entries.len(), 2);
    }

    #[test]
    fn compact_interp_sets_kind_unless_explicit() {
        let spec = EnvelopeSpec::from_value(&json!([[[0, 0], [100, 1]], 0.4, 4, "cubic"])).unwrap();
        assert_eq!(spec.kind(), EnvelopeKind::Cubic);

        let mixed = json!([[0, 0], [[[0, 0], [100, 1]], 1.0, 2, "step", "exp"]]);
        assert_eq!(EnvelopeSpec::from_value(&mixed).unwrap().kind(), EnvelopeKind::Step);

        let explicit = json!({"type": "linear", "points": [[[0, 0], [100, 1]], 0.4, 4, "cubic"]});
        assert_eq!(EnvelopeSpec::from_value(&explicit).unwrap().kind(), EnvelopeKind::Linear);
    }

    #[test]
    fn construction_errors() {
        assert!(EnvelopeSpec::from_value(&json!([])).is_err());
        assert!(EnvelopeSpec::from_value(&json!(4.0)).is_err());
        assert!(EnvelopeSpec::from_value(&json!([[0, 1, 2]])).is_err());
        assert!(EnvelopeSpec::from_value(&json!({"type": "spline", "points": [[0, 1]]})).is_err());
        assert!(EnvelopeSpec::from_value(&json!({"kind": "linear", "points": [[0, 1]]})).is_err());
        assert!(EnvelopeSpec::from_value(&json!([[[0, 0]], 1.0, -2])).is_err());
    }

    #[test]
    fn cycle_marker_is_refused() {
        let err = EnvelopeSpec::from_value(&json!([[0, 0], [1, 10], "cycle"])).unwrap_err();
        assert!(matches!(err, GrainScoreError::UnsupportedCycleMarker));
    }

    #[test]
    fn scaling_touches_the_right_axis() {
        let mut spec = EnvelopeSpec::from_value(&json!([[0.5, 2], [[[0, 1], [100, 3]], 1.0, 2]])).unwrap();
        spec.scale_times(10.0);
        spec.scale_values(0.5);
        match (&spec.entries[0], &spec.entries[1]) {
            (SpecEntry::Point(point), SpecEntry::Compact(compact)) => {
                assert_eq!(*point, Breakpoint::new(5.0, 1.0));
                assert_eq!(compact.end_time, 10.0);
                assert_eq!(compact.pattern, vec![(0.0, 0.5), (100.0, 1.5)]);
            }
            other => panic!("unexpected entries {other:?}"),
        }
    }

    #[test]
    fn time_unit_is_parsed() {
        let spec = EnvelopeSpec::from_value(&json!({"points": [[0, 1]], "time_unit": "normalized"})).unwrap();
        assert_eq!(spec.time_unit, Some(TimeMode::Normalized));
    }

    #[test]
    fn looks_like_detects_curves() {
        assert!(EnvelopeSpec::looks_like(&json!([[0, 1], [1, 2]])));
        assert!(EnvelopeSpec::looks_like(&json!({"points": []})));
        assert!(EnvelopeSpec::looks_like(&json!([[[0, 0], [100, 1]], 0.4, 4])));
        assert!(!EnvelopeSpec::looks_like(&json!(0.5)));
        assert!(!EnvelopeSpec::looks_like(&json!([])));
        assert!(!EnvelopeSpec::looks_like(&json!(["a", "b"])));
    }
}
