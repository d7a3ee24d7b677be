//! Piecewise curves over time.
//!
//! An [`Envelope`] is parsed once from one of several JSON shapes, expanded
//! into a single sorted breakpoint list and then evaluated or integrated many
//! times. Outside its breakpoints a curve holds its boundary values.

pub mod builder;
mod interpolation;
pub mod spec;
pub mod tangents;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use builder::{CompactSpec, DISCONTINUITY_OFFSET};
pub use spec::{EnvelopeSpec, SpecEntry, TimeMode};

use crate::{GrainScoreError, Result};
use interpolation::Segment;

/// A `(time, value)` anchor of a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub time: f64,
    pub value: f64,
}

impl Breakpoint {
    pub const fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// How values are produced between breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    #[default]
    Linear,
    /// Holds the value of the last breakpoint at or before `t`.
    Step,
    /// Monotone cubic Hermite (Fritsch–Carlson tangents).
    Cubic,
}

impl FromStr for EnvelopeKind {
    type Err = GrainScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "step" => Ok(Self::Step),
            "cubic" => Ok(Self::Cubic),
            _ => Err(GrainScoreError::UnknownInterpolation(s.to_string())),
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linear => "linear",
            Self::Step => "step",
            Self::Cubic => "cubic",
        };
        f.write_str(name)
    }
}

/// Immutable time-varying curve.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Envelope {
    segment: Segment,
}

impl Envelope {
    /// Parses and expands any supported JSON shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_spec(&EnvelopeSpec::from_value(value)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_spec(spec: &EnvelopeSpec) -> Result<Self> {
        let points = builder::expand_entries(&spec.entries)?;
        Ok(Self {
            segment: Segment::new(spec.kind(), points)?,
        })
    }

    pub fn from_breakpoints(
        kind: EnvelopeKind,
        points: impl IntoIterator<Item = (f64, f64)>,
    ) -> Result<Self> {
        let points = points
            .into_iter()
            .map(|(time, value)| Breakpoint::new(time, value))
            .collect();
        Ok(Self {
            segment: Segment::new(kind, points)?,
        })
    }

    /// A flat curve holding `value` everywhere.
    pub fn constant(value: f64) -> Self {
        Self {
            segment: Segment::from_sorted(EnvelopeKind::Linear, vec![Breakpoint::new(0.0, value)]),
        }
    }

    /// Whether `value` has the shape of an envelope description.
    pub fn looks_like(value: &Value) -> bool {
        EnvelopeSpec::looks_like(value)
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.segment.kind()
    }

    /// The fully expanded, sorted breakpoints.
    pub fn breakpoints(&self) -> &[Breakpoint] {
        self.segment.points()
    }

    pub fn start_time(&self) -> f64 {
        self.segment.start_time()
    }

    pub fn end_time(&self) -> f64 {
        self.segment.end_time()
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        self.segment.evaluate(t)
    }

    /// Signed area under the curve from `from` to `to`.
    pub fn integrate(&self, from: f64, to: f64) -> f64 {
        if from > to {
            return -self.integrate(to, from);
        }
        if from == to {
            return 0.0;
        }
        self.segment.integrate(from, to)
    }

    /// Copy of this curve with every value multiplied by `factor`.
    pub fn scale_values(&self, factor: f64) -> Self {
        let points = self
            .breakpoints()
            .iter()
            .map(|p| Breakpoint::new(p.time, p.value * factor))
            .collect();
        Self {
            segment: Segment::from_sorted(self.kind(), points),
        }
    }

    /// Copy of this curve stretched along the time axis.
    pub fn scale_times(&self, factor: f64) -> Result<Self> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(GrainScoreError::envelope(format!(
                "time scale factor must be positive and finite, got {factor}"
            )));
        }
        let points = self
            .breakpoints()
            .iter()
            .map(|p| Breakpoint::new(p.time * factor, p.value))
            .collect();
        Segment::new(self.kind(), points).map(|segment| Self { segment })
    }
}

impl TryFrom<Value> for Envelope {
    type Error = GrainScoreError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn env(value: Value) -> Envelope {
        Envelope::from_value(&value).unwrap()
    }

    /// Midpoint rule with 1000 cells. Exact for linear and step spans as long
    /// as every breakpoint falls on a cell boundary.
    fn quadrature(envelope: &Envelope, a: f64, b: f64) -> f64 {
        let steps = 1000;
        let h = (b - a) / steps as f64;
        (0..steps)
            .map(|i| envelope.evaluate(a + (i as f64 + 0.5) * h) * h)
            .sum()
    }

    fn relative_error(actual: f64, expected: f64) -> f64 {
        (actual - expected).abs() / expected.abs().max(1e-12)
    }

    #[test]
    fn holds_boundary_values() {
        for kind in ["linear", "step", "cubic"] {
            let e = env(json!({"type": kind, "points": [[1, 3], [2, 5], [4, -1]]}));
            assert_eq!(e.evaluate(-10.0), 3.0);
            assert_eq!(e.evaluate(0.999), 3.0);
            assert_eq!(e.evaluate(4.0001), -1.0);
            assert_eq!(e.evaluate(1e9), -1.0);
        }
    }

    #[test]
    fn linear_and_step_match_quadrature() {
        for kind in ["linear", "step"] {
            // cell width 0.002 puts every breakpoint on a cell boundary
            let e = env(json!({"type": kind, "points": [[0, 1], [0.3, 4], [0.6, 2], [1.2, 6]]}));
            let (a, b) = (-0.2, 1.8);
            let exact = e.integrate(a, b);
            assert!(
                relative_error(exact, quadrature(&e, a, b)) < 1e-6,
                "{kind}: {exact}"
            );
        }
    }

    #[test]
    fn integral_is_antisymmetric_and_additive() {
        for kind in ["linear", "step", "cubic"] {
            let e = env(json!({"type": kind, "points": [[0, 0], [1, 2], [2, 1], [3, 4]]}));
            assert_eq!(e.integrate(1.3, 1.3), 0.0);
            assert_eq!(e.integrate(0.2, 2.7), -e.integrate(2.7, 0.2));

            let whole = e.integrate(-0.5, 3.5);
            let parts = e.integrate(-0.5, 0.7) + e.integrate(0.7, 2.2) + e.integrate(2.2, 3.5);
            let tolerance = if kind == "cubic" { 1e-4 } else { 1e-12 };
            assert!(relative_error(parts, whole) < tolerance, "{kind}: {parts} vs {whole}");
        }
    }

    #[test]
    fn cubic_stays_within_monotone_neighbours() {
        let e = env(json!({"type": "cubic", "points": [[0, 0], [1, 0.1], [1.5, 5], [3, 5.2], [4, 9]]}));
        let points = e.breakpoints().to_vec();
        for pair in points.windows(2) {
            let (lo, hi) = (pair[0].value.min(pair[1].value), pair[0].value.max(pair[1].value));
            for step in 0..=100 {
                let t = pair[0].time + (pair[1].time - pair[0].time) * step as f64 / 100.0;
                let v = e.evaluate(t);
                assert!(v >= lo - 1e-12 && v <= hi + 1e-12, "t={t} v={v}");
            }
        }
    }

    #[test]
    fn cubic_integral_matches_fine_quadrature() {
        let e = env(json!({"type": "cubic", "points": [[0, 1], [1, 3], [2, 2.5], [3, 0]]}));
        let exact = e.integrate(0.0, 3.0);
        assert!(relative_error(exact, quadrature(&e, 0.0, 3.0)) < 1e-4);
    }

    #[test]
    fn compact_ramp_repeats_with_resets() {
        let e = env(json!([[[0, 0], [100, 1]], 0.4, 4]));
        assert_eq!(e.kind(), EnvelopeKind::Linear);
        assert_eq!(e.breakpoints().len(), 8);
        assert!((e.evaluate(0.05) - 0.5).abs() < 1e-9);
        assert!((e.evaluate(0.1) - 1.0).abs() < 1e-9);
        assert!(e.evaluate(0.1 + DISCONTINUITY_OFFSET).abs() < 1e-9);
        assert!((e.evaluate(0.15) - 0.5).abs() < 1e-4);
        // four ramps of area 0.05 each
        assert!((e.integrate(0.0, 0.4) - 0.2).abs() < 1e-5);
    }

    #[test]
    fn mixed_format_expands_in_order() {
        let e = env(json!([[0, 10], [0.3, 10], [[[0, 30], [100, 50]], 1.3, 5, "linear", "exponential"]]));
        let points = e.breakpoints();
        assert_eq!(points.len(), 12);
        assert_eq!(points[1], Breakpoint::new(0.3, 10.0));
        assert!((points[2].time - 0.300001).abs() < 1e-12);
        assert_eq!(points[2].value, 30.0);
        assert!((e.end_time() - 1.3).abs() < 1e-9);
        let first_cycle = points[3].time - 0.3;
        let last_cycle = points[11].time - points[10].time;
        assert!(first_cycle > last_cycle);
    }

    #[test]
    fn construction_errors_surface_early() {
        assert!(Envelope::from_value(&json!([])).is_err());
        assert!(Envelope::from_value(&json!({"type": "quadratic", "points": [[0, 1]]})).is_err());
        assert!(Envelope::from_value(&json!([[0, 1], [0, 2]])).is_err());
        assert!(Envelope::from_value(&json!([[[0, 0], [100, 1]], 0.4, 0])).is_err());
        assert!(Envelope::from_json_str("[[0, 1], [1, ").is_err());
    }

    #[test]
    fn deserializes_through_serde() {
        let e: Envelope = serde_json::from_str(r#"{"type": "step", "points": [[0, 2], [1, 4]]}"#).unwrap();
        assert_eq!(e.kind(), EnvelopeKind::Step);
        assert_eq!(e.integrate(0.0, 2.0), 2.0 + 4.0);
    }

    #[test]
    fn constant_and_scaled_curves() {
        let c = Envelope::constant(2.5);
        assert_eq!(c.evaluate(-3.0), 2.5);
        assert_eq!(c.integrate(0.0, 4.0), 10.0);

        let e = Envelope::from_breakpoints(EnvelopeKind::Cubic, [(0.0, 0.0), (1.0, 0.5), (2.0, 1.0)]).unwrap();
        let scaled = e.scale_values(10.0);
        assert_eq!(scaled.kind(), EnvelopeKind::Cubic);
        assert!((scaled.evaluate(0.7) - 10.0 * e.evaluate(0.7)).abs() < 1e-9);

        let stretched = e.scale_times(4.0).unwrap();
        assert_eq!(stretched.end_time(), 8.0);
        assert!((stretched.evaluate(2.8) - e.evaluate(0.7)).abs() < 1e-9);
        assert!(e.scale_times(0.0).is_err());
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(" CUBIC ".parse::<EnvelopeKind>().unwrap(), EnvelopeKind::Cubic);
        assert!("bezier".parse::<EnvelopeKind>().is_err());
        assert_eq!(EnvelopeKind::Step.to_string(), "step");
    }
}
