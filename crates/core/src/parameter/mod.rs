//! Constant-or-curve stream parameters with safety bounds and jitter.

use std::fmt;

use rand::Rng;
use serde_json::Value;

use crate::{
    diagnostics::{ClampEvent, Diagnostics},
    envelope::Envelope,
    GrainScoreError, Result,
};

/// A value that is either fixed or follows a curve over time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Constant(f64),
    Curve(Envelope),
}

impl ParamValue {
    /// Accepts a JSON number or any envelope shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(number) => number
                .as_f64()
                .map(Self::Constant)
                .ok_or_else(|| GrainScoreError::msg(format!("{number} is not a finite number"))),
            other => Envelope::from_value(other).map(Self::Curve),
        }
    }

    pub fn value_at(&self, t: f64) -> f64 {
        match self {
            Self::Constant(v) => *v,
            Self::Curve(envelope) => envelope.evaluate(t),
        }
    }

    /// Area under the value from `from` to `to`.
    pub fn integral(&self, from: f64, to: f64) -> f64 {
        match self {
            Self::Constant(v) => v * (to - from),
            Self::Curve(envelope) => envelope.integrate(from, to),
        }
    }

    pub fn is_curve(&self) -> bool {
        matches!(self, Self::Curve(_))
    }

    pub fn scale_values(&self, factor: f64) -> Self {
        match self {
            Self::Constant(v) => Self::Constant(v * factor),
            Self::Curve(envelope) => Self::Curve(envelope.scale_values(factor)),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<Envelope> for ParamValue {
    fn from(envelope: Envelope) -> Self {
        Self::Curve(envelope)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "{v:.3}"),
            Self::Curve(envelope) => write!(
                f,
                "{} curve [{:.3}..{:.3}]",
                envelope.kind(),
                envelope.start_time(),
                envelope.end_time()
            ),
        }
    }
}

/// Safety limits and jitter defaults of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterBounds {
    pub min: f64,
    pub max: f64,
    pub min_range: f64,
    pub max_range: f64,
    /// Jitter width used when no range is configured.
    pub default_jitter: f64,
}

impl ParameterBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_range: 0.0,
            max_range: 0.0,
            default_jitter: 0.0,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

pub const POINTER_SPEED: ParameterBounds = ParameterBounds::new(-100.0, 100.0);

/// Deviation is a fraction of the active window.
pub const POINTER_DEVIATION: ParameterBounds = ParameterBounds {
    min: 0.0,
    max: 1.0,
    min_range: 0.0,
    max_range: 1.0,
    default_jitter: 0.005,
};

pub const LOOP_DURATION: ParameterBounds = ParameterBounds::new(0.001, 1000.0);

/// A bounded parameter with optional additive jitter and probability gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    owner: String,
    value: ParamValue,
    bounds: ParameterBounds,
    range: Option<ParamValue>,
    /// Chance in percent that jitter applies.
    probability: Option<ParamValue>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>, bounds: ParameterBounds) -> Self {
        Self {
            name: name.into(),
            owner: String::from("unknown"),
            value: value.into(),
            bounds,
            range: None,
            probability: None,
        }
    }

    /// A parameter that never jitters.
    pub fn fixed(name: impl Into<String>, value: impl Into<ParamValue>, bounds: ParameterBounds) -> Self {
        Self::new(name, value, bounds).with_range(0.0)
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_range(mut self, range: impl Into<ParamValue>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn with_probability(mut self, probability: impl Into<ParamValue>) -> Self {
        self.probability = Some(probability.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    pub fn bounds(&self) -> ParameterBounds {
        self.bounds
    }

    /// The base value clamped to bounds, without jitter.
    pub fn base_at(&self, t: f64) -> f64 {
        self.bounds.clamp(self.value.value_at(t))
    }

    /// The base value clamped to bounds, reporting when it had to clip.
    pub fn bounded_at(&self, t: f64, diagnostics: &dyn Diagnostics) -> f64 {
        self.clamp(self.value.value_at(t), t, diagnostics)
    }

    /// Draws the value at `t`.
    ///
    /// The gate is drawn first (only when a probability is set), then the
    /// jitter (only when the range is positive), so a seeded generator always
    /// yields the same sequence.
    pub fn sample<R: Rng>(&self, t: f64, rng: &mut R, diagnostics: &dyn Diagnostics) -> f64 {
        let base = self.value.value_at(t);
        if !self.gate_open(t, rng) {
            return self.clamp(base, t, diagnostics);
        }

        let range = self.range_at(t);
        let value = if range > 0.0 {
            base + rng.gen_range(-0.5_f64..0.5) * range
        } else {
            base
        };
        self.clamp(value, t, diagnostics)
    }

    fn gate_open<R: Rng>(&self, t: f64, rng: &mut R) -> bool {
        match &self.probability {
            None => true,
            Some(probability) => rng.gen_range(0.0_f64..100.0) < probability.value_at(t),
        }
    }

    fn range_at(&self, t: f64) -> f64 {
        match &self.range {
            None => self.bounds.default_jitter,
            Some(range) => range
                .value_at(t)
                .clamp(self.bounds.min_range, self.bounds.max_range),
        }
    }

    fn clamp(&self, value: f64, t: f64, diagnostics: &dyn Diagnostics) -> f64 {
        let clamped = self.bounds.clamp(value);
        if clamped != value {
            diagnostics.clamp(ClampEvent {
                stream_id: self.owner.clone(),
                parameter: self.name.clone(),
                elapsed: t,
                raw: value,
                clamped,
                min: self.bounds.min,
                max: self.bounds.max,
                from_curve: self.value.is_curve(),
            });
        }
        clamped
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(range) = &self.range {
            write!(f, " ±{range}")?;
        }
        if let Some(probability) = &self.probability {
            write!(f, " @{probability}%")?;
        }
        Ok(())
    }
}
