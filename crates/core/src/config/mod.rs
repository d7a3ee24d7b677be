use std::path::Path;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    diagnostics::{Diagnostics, TracingDiagnostics},
    envelope::{Envelope, EnvelopeSpec, TimeMode},
    parameter::{ParamValue, Parameter, POINTER_DEVIATION},
    pointer::{PointerController, PointerParams},
    GrainScoreError, Result,
};

/// Top-level description of one grain stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub stream_id: String,
    /// Length of the stream in seconds.
    pub duration: f64,
    /// Length of the source sample in seconds.
    pub sample_duration: f64,
    /// Unit of curve times; `normalized` curves span `0..1` of `duration`.
    #[serde(default)]
    pub time_mode: TimeMode,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub pointer: PointerSpec,
}

/// Pointer settings. Every value is a number or any envelope shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointerSpec {
    #[serde(default)]
    pub start: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_start: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_end: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_dur: Option<Value>,
    /// Unit of loop bound values; `normalized` bounds are fractions of the
    /// sample. Defaults to the stream's `time_mode`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_unit: Option<TimeMode>,
    /// A number, a curve, or `{ "value", "range", "probability" }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation: Option<Value>,
}

impl StreamConfig {
    pub fn new(stream_id: impl Into<String>, duration: f64, sample_duration: f64) -> Self {
        Self {
            stream_id: stream_id.into(),
            duration,
            sample_duration,
            time_mode: TimeMode::default(),
            seed: 0,
            pointer: PointerSpec::default(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if !(self.duration > 0.0 && self.duration.is_finite()) {
            return Err(GrainScoreError::parameter(
                "duration",
                format!("must be positive and finite, got {}", self.duration),
            ));
        }
        Ok(())
    }

    /// Resolves units and parses every pointer setting.
    pub fn pointer_params(&self) -> Result<PointerParams> {
        self.validate()?;
        let spec = &self.pointer;
        let loop_scale = match spec.loop_unit.unwrap_or(self.time_mode) {
            TimeMode::Normalized => self.sample_duration,
            TimeMode::Absolute => 1.0,
        };

        let mut params = PointerParams::new(self.stream_id.clone(), self.sample_duration).with_start(spec.start);
        if let Some(speed) = &spec.speed {
            params = params.with_speed(self.parse_value("speed", speed, 1.0)?);
        }
        // Passed through even without loop_start; the controller warns and
        // ignores them.
        if let Some(loop_start) = &spec.loop_start {
            params = params.with_loop_start(self.parse_value("loop_start", loop_start, loop_scale)?);
        }
        if let Some(loop_end) = &spec.loop_end {
            params = params.with_loop_end(self.parse_value("loop_end", loop_end, loop_scale)?);
        }
        if let Some(loop_dur) = &spec.loop_dur {
            params = params.with_loop_dur(self.parse_value("loop_dur", loop_dur, loop_scale)?);
        }
        if let Some(deviation) = &spec.deviation {
            params = params.with_deviation(self.parse_deviation(deviation)?);
        }
        Ok(params)
    }

    /// Controller seeded from `seed` that reports through `tracing`.
    pub fn build_pointer(&self) -> Result<PointerController> {
        self.build_pointer_with(Box::new(TracingDiagnostics))
    }

    pub fn build_pointer_with(&self, diagnostics: Box<dyn Diagnostics>) -> Result<PointerController> {
        let params = self.pointer_params()?;
        tracing::debug!(stream = %self.stream_id, seed = self.seed, "building pointer controller");
        PointerController::with_parts(params, StdRng::seed_from_u64(self.seed), diagnostics)
    }

    /// Parses a number or curve. Curve times follow the time mode, values are
    /// multiplied by `value_scale`.
    fn parse_value(&self, name: &str, value: &Value, value_scale: f64) -> Result<ParamValue> {
        if value.is_number() {
            return Ok(ParamValue::from_value(value)?.scale_values(value_scale));
        }
        if !Envelope::looks_like(value) {
            return Err(GrainScoreError::parameter(
                name,
                format!("expected a number or an envelope, got {value}"),
            ));
        }
        let mut spec = EnvelopeSpec::from_value(value)?;
        if spec.time_unit.unwrap_or(self.time_mode) == TimeMode::Normalized {
            spec.scale_times(self.duration);
        }
        if value_scale != 1.0 {
            spec.scale_values(value_scale);
        }
        Envelope::from_spec(&spec).map(ParamValue::Curve)
    }

    fn parse_deviation(&self, value: &Value) -> Result<Parameter> {
        let detailed = value.as_object().filter(|map| {
            ["value", "range", "probability"]
                .iter()
                .any(|key| map.contains_key(*key))
        });
        // A bare number or curve is taken literally; implicit jitter only
        // applies to the detailed form.
        let Some(map) = detailed else {
            return Ok(Parameter::fixed(
                "pointer_deviation",
                self.parse_value("pointer_deviation", value, 1.0)?,
                POINTER_DEVIATION,
            ));
        };

        if let Some(key) = map
            .keys()
            .find(|key| !matches!(key.as_str(), "value" | "range" | "probability"))
        {
            return Err(GrainScoreError::parameter(
                "pointer_deviation",
                format!("unexpected key `{key}`"),
            ));
        }
        let base = match map.get("value") {
            Some(v) => self.parse_value("pointer_deviation", v, 1.0)?,
            None => ParamValue::Constant(0.0),
        };
        let mut deviation = Parameter::new("pointer_deviation", base, POINTER_DEVIATION);
        if let Some(range) = map.get("range") {
            deviation = deviation.with_range(self.parse_value("pointer_deviation.range", range, 1.0)?);
        }
        if let Some(probability) = map.get("probability") {
            deviation = deviation.with_probability(self.parse_value("pointer_deviation.probability", probability, 1.0)?);
        }
        Ok(deviation)
    }
}
