//! Read-head position of a grain stream inside its source sample.
//!
//! The pointer sweeps linearly through the sample at a (possibly curved)
//! speed. An optional loop window overlays a phase accumulator on that sweep:
//! once inside the window the pointer keeps moving with the same increments
//! as the sweep, but wraps inside the window instead of leaving it.
//!
//! Loop phase transitions, evaluated on every [`PointerController::calculate`]:
//!
//! | phase        | condition                                    | action                                  | next         |
//! |--------------|----------------------------------------------|-----------------------------------------|--------------|
//! | `NotEntered` | dynamic window                               | enter at `loop_start(t)`                | `InLoop`     |
//! | `NotEntered` | static window, wrapped sweep in `[start,end)`| enter at the wrapped sweep position     | `InLoop`     |
//! | `NotEntered` | static window, sweep outside                 | return wrapped sweep, drift warning     | `NotEntered` |
//! | `InLoop`     | inside `[start,end)`                         | advance by the sweep increment          | `InLoop`     |
//! | `InLoop`     | outside, bounds moved since the last call    | snap to start (forward) or end (back)   | `InLoop`     |
//! | `InLoop`     | outside, bounds unchanged                    | wrap modulo the loop length             | `InLoop`     |
//!
//! Drift warnings are rate limited on simulated time, never wall-clock time.

use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    diagnostics::{Diagnostics, DynamicLoopEvent, LoopDriftEvent, LoopResetEvent, ResetTarget, TracingDiagnostics},
    parameter::{ParamValue, Parameter, LOOP_DURATION, POINTER_DEVIATION, POINTER_SPEED},
    GrainScoreError, Result,
};

/// Shortest loop used for wrapping and deviation scaling, in seconds.
pub const MIN_LOOP_LENGTH: f64 = 0.001;
/// Minimum simulated time between two drift warnings.
pub const DRIFT_LOG_INTERVAL: f64 = 5.0;
/// Distance kept from `loop_end` when snapping a backward-moving pointer.
const END_EPSILON: f64 = 1e-9;

/// Everything a controller needs to know about one stream's read head.
#[derive(Debug, Clone)]
pub struct PointerParams {
    pub stream_id: String,
    /// Sweep position at `elapsed = 0`, in seconds.
    pub start: f64,
    /// Sweep speed as a ratio of real time; negative values read backwards.
    pub speed: ParamValue,
    pub loop_start: Option<ParamValue>,
    pub loop_end: Option<ParamValue>,
    /// Takes precedence over `loop_end` when both are given.
    pub loop_dur: Option<ParamValue>,
    /// Per-grain offset as a fraction of the active window.
    pub deviation: Parameter,
    pub sample_duration: f64,
}

impl PointerParams {
    pub fn new(stream_id: impl Into<String>, sample_duration: f64) -> Self {
        let stream_id = stream_id.into();
        Self {
            deviation: Parameter::fixed("pointer_deviation", 0.0, POINTER_DEVIATION).with_owner(stream_id.clone()),
            stream_id,
            start: 0.0,
            speed: ParamValue::Constant(1.0),
            loop_start: None,
            loop_end: None,
            loop_dur: None,
            sample_duration,
        }
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    pub fn with_speed(mut self, speed: impl Into<ParamValue>) -> Self {
        self.speed = speed.into();
        self
    }

    pub fn with_loop_start(mut self, loop_start: impl Into<ParamValue>) -> Self {
        self.loop_start = Some(loop_start.into());
        self
    }

    pub fn with_loop_end(mut self, loop_end: impl Into<ParamValue>) -> Self {
        self.loop_end = Some(loop_end.into());
        self
    }

    pub fn with_loop_dur(mut self, loop_dur: impl Into<ParamValue>) -> Self {
        self.loop_dur = Some(loop_dur.into());
        self
    }

    pub fn with_deviation(mut self, deviation: Parameter) -> Self {
        self.deviation = deviation.with_owner(self.stream_id.clone());
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.sample_duration > 0.0 && self.sample_duration.is_finite()) {
            return Err(GrainScoreError::parameter(
                "sample_duration",
                format!("must be positive and finite, got {}", self.sample_duration),
            ));
        }
        if !self.start.is_finite() {
            return Err(GrainScoreError::parameter(
                "pointer_start",
                format!("must be finite, got {}", self.start),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum LoopExtent {
    End(ParamValue),
    Duration(Parameter),
}

#[derive(Debug, Clone)]
struct LoopWindow {
    start: ParamValue,
    extent: LoopExtent,
    /// The window start follows a curve, so the pointer enters immediately.
    dynamic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LoopBounds {
    start: f64,
    end: f64,
    length: f64,
}

impl LoopBounds {
    fn contains(&self, pos: f64) -> bool {
        self.start <= pos && pos < self.end
    }
}

impl LoopWindow {
    fn bounds_at(&self, t: f64, diagnostics: &dyn Diagnostics) -> LoopBounds {
        let start = self.start.value_at(t);
        let duration = match &self.extent {
            LoopExtent::Duration(duration) => duration.bounded_at(t, diagnostics),
            LoopExtent::End(end) => end.value_at(t) - start,
        };
        LoopBounds {
            start,
            end: start + duration,
            length: duration.max(MIN_LOOP_LENGTH),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LoopPhase {
    NotEntered,
    InLoop {
        position: f64,
        last_linear: f64,
        prev_start: f64,
        prev_end: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DriftLimiter {
    prev_loop_start: Option<f64>,
    prev_elapsed: Option<f64>,
    last_logged: f64,
    first_emitted: bool,
}

impl Default for DriftLimiter {
    fn default() -> Self {
        Self {
            prev_loop_start: None,
            prev_elapsed: None,
            last_logged: f64::NEG_INFINITY,
            first_emitted: false,
        }
    }
}

/// Computes where each grain of a stream reads from its sample.
///
/// One controller belongs to one stream. It is stateful when a loop is
/// configured, so grains must be calculated in onset order.
pub struct PointerController<R: Rng = StdRng> {
    stream_id: String,
    start: f64,
    speed: ParamValue,
    window: Option<LoopWindow>,
    deviation: Parameter,
    sample_duration: f64,
    rng: R,
    diagnostics: Box<dyn Diagnostics>,
    phase: LoopPhase,
    drift: DriftLimiter,
}

impl PointerController {
    /// Controller with a zero-seeded generator that reports through `tracing`.
    pub fn new(params: PointerParams) -> Result<Self> {
        Self::seeded(params, 0)
    }

    pub fn seeded(params: PointerParams, seed: u64) -> Result<Self> {
        Self::with_parts(params, StdRng::seed_from_u64(seed), Box::new(TracingDiagnostics))
    }
}

impl<R: Rng> PointerController<R> {
    pub fn with_parts(params: PointerParams, rng: R, diagnostics: Box<dyn Diagnostics>) -> Result<Self> {
        params.validate()?;
        let PointerParams {
            stream_id,
            start,
            speed,
            loop_start,
            loop_end,
            loop_dur,
            deviation,
            sample_duration,
        } = params;

        let window = match loop_start {
            Some(loop_start) => {
                let extent = match (loop_dur, loop_end) {
                    (Some(duration), _) => LoopExtent::Duration(
                        Parameter::fixed("loop_dur", duration, LOOP_DURATION).with_owner(stream_id.clone()),
                    ),
                    (None, Some(end)) => LoopExtent::End(end),
                    (None, None) => LoopExtent::End(ParamValue::Constant(sample_duration)),
                };
                Some(LoopWindow {
                    dynamic: loop_start.is_curve(),
                    start: loop_start,
                    extent,
                })
            }
            None => {
                if loop_end.is_some() || loop_dur.is_some() {
                    tracing::warn!(stream = %stream_id, "loop end or duration without loop_start is ignored");
                }
                None
            }
        };

        let controller = Self {
            stream_id,
            start,
            speed,
            window,
            deviation,
            sample_duration,
            rng,
            diagnostics,
            phase: LoopPhase::NotEntered,
            drift: DriftLimiter::default(),
        };
        controller.announce_dynamic_loop();
        Ok(controller)
    }

    fn announce_dynamic_loop(&self) {
        let Some(window) = self.window.as_ref().filter(|w| w.dynamic) else {
            return;
        };
        let bounds = window.bounds_at(0.0, self.diagnostics.as_ref());
        self.diagnostics.dynamic_loop(DynamicLoopEvent {
            stream_id: self.stream_id.clone(),
            loop_start: bounds.start,
            loop_end: bounds.end,
            start_overridden: (self.start - bounds.start).abs() > 1e-6,
            original_start: self.start,
        });
    }

    /// Read position, in `[0, sample_duration)`, of a grain starting
    /// `elapsed` seconds after the stream onset.
    ///
    /// Reverse grains read backwards from their start, so they are shifted
    /// forward by their own duration.
    pub fn calculate(&mut self, elapsed: f64, grain_duration: f64, reverse: bool) -> f64 {
        let linear = self.linear_position(elapsed);
        let (base, window) = if self.window.is_some() {
            self.apply_loop(linear, elapsed)
        } else {
            (wrap(linear, self.sample_duration), self.sample_duration)
        };

        let deviation = self
            .deviation
            .sample(elapsed, &mut self.rng, self.diagnostics.as_ref());
        let mut position = base + deviation * window;
        if reverse {
            position += grain_duration;
        }
        wrap(position, self.sample_duration)
    }

    /// Unwrapped sweep position: `start` plus the integral of the speed.
    fn linear_position(&self, elapsed: f64) -> f64 {
        self.start + self.speed.integral(0.0, elapsed)
    }

    /// Returns the loop-aware base position and the active window length.
    fn apply_loop(&mut self, linear: f64, elapsed: f64) -> (f64, f64) {
        let Some(window) = self.window.as_ref() else {
            return (wrap(linear, self.sample_duration), self.sample_duration);
        };
        let dynamic = window.dynamic;
        let bounds = window.bounds_at(elapsed, self.diagnostics.as_ref());

        match self.phase {
            LoopPhase::NotEntered => {
                let entry = if dynamic {
                    bounds.start
                } else {
                    let wrapped = wrap(linear, self.sample_duration);
                    if !bounds.contains(wrapped) {
                        let gap = self.entry_gap(wrapped, bounds, elapsed);
                        self.warn_drift(wrapped, gap, bounds, elapsed);
                        return (wrapped, self.sample_duration);
                    }
                    wrapped
                };
                tracing::trace!(stream = %self.stream_id, elapsed, entry, "pointer entered loop");
                self.phase = LoopPhase::InLoop {
                    position: entry,
                    last_linear: linear,
                    prev_start: bounds.start,
                    prev_end: bounds.end,
                };
                (entry, bounds.length)
            }
            LoopPhase::InLoop {
                position,
                last_linear,
                prev_start,
                prev_end,
            } => {
                let delta = linear - last_linear;
                let mut position = position + delta;
                let moved = prev_start != bounds.start || prev_end != bounds.end;

                if !bounds.contains(position) {
                    if moved {
                        let unclamped = position;
                        let target = if delta >= 0.0 {
                            ResetTarget::LoopStart
                        } else {
                            ResetTarget::LoopEnd
                        };
                        position = match target {
                            ResetTarget::LoopStart => bounds.start,
                            ResetTarget::LoopEnd => bounds.end - END_EPSILON,
                        };
                        if dynamic {
                            // Resets are expected while a dynamic window moves;
                            // only warn when the pointer keeps falling behind.
                            self.warn_drift(position, position - unclamped, bounds, elapsed);
                        } else {
                            self.diagnostics.loop_reset(LoopResetEvent {
                                stream_id: self.stream_id.clone(),
                                elapsed,
                                position,
                                loop_start: bounds.start,
                                loop_end: bounds.end,
                                target,
                            });
                        }
                    } else {
                        position = bounds.start + (position - bounds.start).rem_euclid(bounds.length);
                    }
                }

                self.phase = LoopPhase::InLoop {
                    position,
                    last_linear: linear,
                    prev_start: bounds.start,
                    prev_end: bounds.end,
                };
                (wrap(position, self.sample_duration), bounds.length)
            }
        }
    }

    /// Signed sweep distance from `pointer_pos` to the point where a static
    /// window would be entered, following the direction of travel.
    fn entry_gap(&self, pointer_pos: f64, bounds: LoopBounds, elapsed: f64) -> f64 {
        if self.speed_at(elapsed) >= 0.0 {
            if pointer_pos < bounds.start {
                bounds.start - pointer_pos
            } else {
                self.sample_duration - pointer_pos + bounds.start
            }
        } else if pointer_pos >= bounds.end {
            bounds.end - pointer_pos
        } else {
            bounds.end - self.sample_duration - pointer_pos
        }
    }

    /// `gap` is how far the pointer is from the window; the reported minimum
    /// speed follows the window and closes the gap before the next warning.
    fn warn_drift(&mut self, pointer_pos: f64, gap: f64, bounds: LoopBounds, elapsed: f64) {
        if elapsed - self.drift.last_logged < DRIFT_LOG_INTERVAL {
            return;
        }

        let drift_rate = match (self.drift.prev_loop_start, self.drift.prev_elapsed) {
            (Some(prev_start), Some(prev_elapsed)) if elapsed > prev_elapsed => {
                (bounds.start - prev_start) / (elapsed - prev_elapsed)
            }
            _ => 0.0,
        };
        self.drift.prev_loop_start = Some(bounds.start);
        self.drift.prev_elapsed = Some(elapsed);
        self.drift.last_logged = elapsed;
        let first = !self.drift.first_emitted;
        self.drift.first_emitted = true;

        self.diagnostics.loop_drift(LoopDriftEvent {
            stream_id: self.stream_id.clone(),
            elapsed,
            pointer_pos,
            loop_start: bounds.start,
            loop_end: bounds.end,
            speed: self.speed_at(elapsed),
            loop_start_drift_rate: drift_rate,
            min_speed: drift_rate + gap / DRIFT_LOG_INTERVAL,
            first,
        });
    }

    /// Forgets the loop state so the controller can be replayed from zero.
    pub fn reset(&mut self) {
        self.phase = LoopPhase::NotEntered;
        self.drift = DriftLimiter::default();
    }

    pub fn in_loop(&self) -> bool {
        matches!(self.phase, LoopPhase::InLoop { .. })
    }

    pub fn has_loop(&self) -> bool {
        self.window.is_some()
    }

    pub fn is_dynamic(&self) -> bool {
        self.window.as_ref().is_some_and(|w| w.dynamic)
    }

    /// Position inside the most recently seen loop window, from 0 to 1.
    pub fn loop_phase(&self) -> f64 {
        match self.phase {
            LoopPhase::InLoop {
                position,
                prev_start,
                prev_end,
                ..
            } if prev_end > prev_start => {
                let length = prev_end - prev_start;
                (position - prev_start).rem_euclid(length) / length
            }
            _ => 0.0,
        }
    }

    /// Instantaneous speed, limited to the pointer speed bounds.
    pub fn speed_at(&self, elapsed: f64) -> f64 {
        POINTER_SPEED.clamp(self.speed.value_at(elapsed))
    }

    pub fn sample_duration(&self) -> f64 {
        self.sample_duration
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

impl<R: Rng> fmt::Display for PointerController<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pointer[{}] start={:.3} speed={} sample={:.3}s",
            self.stream_id, self.start, self.speed, self.sample_duration
        )?;
        if let Some(window) = &self.window {
            let bounds = LoopWindow::bounds_at(window, 0.0, &NoDiagnostics);
            let mode = if window.dynamic { "dynamic" } else { "static" };
            write!(f, " loop={:.3}-{:.3} ({mode})", bounds.start, bounds.end)?;
        }
        write!(f, " deviation={}", self.deviation)
    }
}

impl<R: Rng> fmt::Debug for PointerController<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerController")
            .field("stream_id", &self.stream_id)
            .field("start", &self.start)
            .field("speed", &self.speed)
            .field("window", &self.window)
            .field("sample_duration", &self.sample_duration)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Discards events; used where a read-out must not report anything.
struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn clamp(&self, _: crate::diagnostics::ClampEvent) {}
    fn loop_drift(&self, _: LoopDriftEvent) {}
    fn loop_reset(&self, _: LoopResetEvent) {}
    fn dynamic_loop(&self, _: DynamicLoopEvent) {}
}

/// Wraps `position` into `[0, length)`.
fn wrap(position: f64, length: f64) -> f64 {
    let wrapped = position.rem_euclid(length);
    // rem_euclid can round up to `length` for tiny negative inputs
    if wrapped >= length {
        0.0
    } else {
        wrapped
    }
}
