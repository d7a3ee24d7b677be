//! Cycle-length distributions for repeated envelope patterns.
//!
//! A compact pattern repeated `n` times over a span of time does not have to
//! use equal cycles. Each [`TimeDistribution`] assigns a relative weight to
//! every repetition; the weights are normalised so the cycle durations always
//! add up to the full span.

use std::fmt;

use serde_json::Value;

use crate::{GrainScoreError, Result};

const AVAILABLE: &str = "exp, exponential, geo, geometric, linear, log, logarithmic, power";

/// Strategy used to split a span of time into pattern repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TimeDistribution {
    /// Equal cycle lengths.
    #[default]
    Linear,
    /// Cycle `i` weighs `rate^-i`. Rates above one accelerate.
    Exponential { rate: f64 },
    /// Cycle `i` weighs `log_base(i + 1) + 1`, so cycles grow longer.
    Logarithmic { base: f64 },
    /// Cycle `i` weighs `ratio^i`.
    Geometric { ratio: f64 },
    /// Cycle `i` weighs `(i + 1)^exponent`.
    Power { exponent: f64 },
}

/// Start offsets and durations of every repetition, relative to the start of
/// the span.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleLayout {
    pub starts: Vec<f64>,
    pub durations: Vec<f64>,
}

impl CycleLayout {
    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.durations.iter().sum()
    }
}

impl TimeDistribution {
    pub fn exponential(rate: f64) -> Result<Self> {
        if !(rate > 0.0) {
            return Err(GrainScoreError::pattern(format!(
                "exponential rate must be > 0, got {rate}"
            )));
        }
        Ok(Self::Exponential { rate })
    }

    pub fn logarithmic(base: f64) -> Result<Self> {
        if !(base > 1.0) {
            return Err(GrainScoreError::pattern(format!(
                "logarithmic base must be > 1, got {base}"
            )));
        }
        Ok(Self::Logarithmic { base })
    }

    pub fn geometric(ratio: f64) -> Result<Self> {
        if !(ratio > 0.0) {
            return Err(GrainScoreError::pattern(format!(
                "geometric ratio must be > 0, got {ratio}"
            )));
        }
        Ok(Self::Geometric { ratio })
    }

    pub fn power(exponent: f64) -> Result<Self> {
        if !exponent.is_finite() {
            return Err(GrainScoreError::pattern(format!(
                "power exponent must be finite, got {exponent}"
            )));
        }
        Ok(Self::Power { exponent })
    }

    /// Looks up a distribution by name (or alias) with its default parameters.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" | "exp" => Self::exponential(2.0),
            "logarithmic" | "log" => Self::logarithmic(2.0),
            "geometric" | "geo" => Self::geometric(1.5),
            "power" => Self::power(2.0),
            _ => Err(GrainScoreError::UnknownDistribution {
                name: name.to_string(),
                available: AVAILABLE.to_string(),
            }),
        }
    }

    /// Parses the optional fifth element of a compact pattern: `null`, a name,
    /// or an object such as `{"type": "geometric", "ratio": 1.2}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Linear),
            Value::String(name) => Self::from_name(name),
            Value::Object(map) => {
                let name = match map.get("type") {
                    None | Some(Value::Null) => "linear",
                    Some(Value::String(name)) => name.as_str(),
                    Some(other) => {
                        return Err(GrainScoreError::pattern(format!(
                            "distribution type must be a string, got {other}"
                        )))
                    }
                };
                let mut distribution = Self::from_name(name)?;
                for (key, raw) in map.iter().filter(|(key, _)| key.as_str() != "type") {
                    let number = raw.as_f64().ok_or_else(|| {
                        GrainScoreError::pattern(format!(
                            "distribution parameter `{key}` must be a number, got {raw}"
                        ))
                    })?;
                    distribution = distribution.with_parameter(key, number)?;
                }
                Ok(distribution)
            }
            other => Err(GrainScoreError::pattern(format!(
                "time distribution must be a string or an object, got {other}"
            ))),
        }
    }

    fn with_parameter(self, key: &str, value: f64) -> Result<Self> {
        match (self, key) {
            (Self::Exponential { .. }, "rate") => Self::exponential(value),
            (Self::Logarithmic { .. }, "base") => Self::logarithmic(value),
            (Self::Geometric { .. }, "ratio") => Self::geometric(value),
            (Self::Power { .. }, "exponent") => Self::power(value),
            _ => Err(GrainScoreError::pattern(format!(
                "parameter `{key}` is not valid for the {self} distribution"
            ))),
        }
    }

    /// Splits `total_time` into `n_reps` cycles.
    pub fn cycles(&self, total_time: f64, n_reps: usize) -> Result<CycleLayout> {
        if n_reps < 1 {
            return Err(GrainScoreError::pattern(format!(
                "n_reps must be >= 1, got {n_reps}"
            )));
        }
        if !(total_time > 0.0) {
            return Err(GrainScoreError::pattern(format!(
                "total time must be > 0, got {total_time}"
            )));
        }

        let weights: Vec<f64> = (0..n_reps).map(|i| self.weight(i)).collect();
        let sum: f64 = weights.iter().sum();
        let durations: Vec<f64> = weights.iter().map(|w| w / sum * total_time).collect();

        let mut starts = Vec::with_capacity(n_reps);
        let mut cursor = 0.0;
        for duration in &durations {
            starts.push(cursor);
            cursor += duration;
        }

        Ok(CycleLayout { starts, durations })
    }

    fn weight(&self, index: usize) -> f64 {
        let i = index as f64;
        match *self {
            Self::Linear => 1.0,
            Self::Exponential { rate } => rate.powf(-i),
            Self::Logarithmic { base } => (i + 1.0).ln() / base.ln() + 1.0,
            Self::Geometric { ratio } if (ratio - 1.0).abs() < 1e-6 => 1.0,
            Self::Geometric { ratio } => ratio.powf(i),
            Self::Power { exponent } => (i + 1.0).powf(exponent),
        }
    }
}

impl fmt::Display for TimeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Exponential { rate } => write!(f, "exponential(rate={rate})"),
            Self::Logarithmic { base } => write!(f, "logarithmic(base={base})"),
            Self::Geometric { ratio } => write!(f, "geometric(ratio={ratio})"),
            Self::Power { exponent } => write!(f, "power(exp={exponent})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn linear_cycles_are_uniform() {
        let layout = TimeDistribution::Linear.cycles(30.0, 5).unwrap();
        for (start, expected) in layout.starts.iter().zip([0.0, 6.0, 12.0, 18.0, 24.0]) {
            assert_close(*start, expected);
        }
        assert!(layout.durations.iter().all(|d| (d - 6.0).abs() < 1e-9));
    }

    #[test]
    fn exponential_accelerates_and_preserves_total() {
        let layout = TimeDistribution::from_name("exp").unwrap().cycles(30.0, 5).unwrap();
        assert!(layout.durations.windows(2).all(|w| w[0] > w[1]));
        assert_close(layout.total(), 30.0);
    }

    #[test]
    fn logarithmic_decelerates() {
        let layout = TimeDistribution::from_name("logarithmic")
            .unwrap()
            .cycles(10.0, 4)
            .unwrap();
        assert!(layout.durations.windows(2).all(|w| w[0] < w[1]));
        assert_close(layout.total(), 10.0);
    }

    #[test]
    fn geometric_ratio_follows_progression() {
        let dist = TimeDistribution::from_value(&json!({"type": "geometric", "ratio": 2.0})).unwrap();
        let layout = dist.cycles(7.0, 3).unwrap();
        assert_close(layout.durations[0], 1.0);
        assert_close(layout.durations[1], 2.0);
        assert_close(layout.durations[2], 4.0);
        assert_close(layout.starts[2], 3.0);
    }

    #[test]
    fn geometric_ratio_near_one_is_uniform() {
        let layout = TimeDistribution::geometric(1.0 + 1e-9).unwrap().cycles(4.0, 4).unwrap();
        assert!(layout.durations.iter().all(|d| (d - 1.0).abs() < 1e-12));
    }

    #[test]
    fn power_weights_grow() {
        let dist = TimeDistribution::from_value(&json!({"type": "power", "exponent": 1.0})).unwrap();
        let layout = dist.cycles(6.0, 3).unwrap();
        assert_close(layout.durations[0], 1.0);
        assert_close(layout.durations[2], 3.0);
    }

    #[test]
    fn single_cycle_spans_everything() {
        let layout = TimeDistribution::from_name("power").unwrap().cycles(10.0, 1).unwrap();
        assert_eq!(layout.starts, vec![0.0]);
        assert_close(layout.durations[0], 10.0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(TimeDistribution::Linear.cycles(1.0, 0).is_err());
        assert!(TimeDistribution::Linear.cycles(0.0, 3).is_err());
        assert!(TimeDistribution::from_name("zigzag").is_err());
        assert!(TimeDistribution::logarithmic(1.0).is_err());
        assert!(TimeDistribution::from_value(&json!({"type": "power", "ratio": 2.0})).is_err());
        assert!(TimeDistribution::from_value(&json!(3)).is_err());
    }

    #[test]
    fn null_defaults_to_linear() {
        assert_eq!(
            TimeDistribution::from_value(&Value::Null).unwrap(),
            TimeDistribution::Linear
        );
    }
}
