//! Structured diagnostics raised while evaluating a stream.
//!
//! Nothing here is an error: clamps, loop resets and drift warnings describe
//! runtime corrections the controllers already applied. They are reported
//! through the [`Diagnostics`] trait so callers decide where they end up.

use std::{cell::RefCell, fmt, rc::Rc};

use serde::Serialize;

/// A parameter value was clipped to its safety bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClampEvent {
    pub stream_id: String,
    pub parameter: String,
    pub elapsed: f64,
    pub raw: f64,
    pub clamped: f64,
    pub min: f64,
    pub max: f64,
    /// Whether the base value came from a curve.
    pub from_curve: bool,
}

/// The pointer is outside a loop window it is expected to follow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopDriftEvent {
    pub stream_id: String,
    pub elapsed: f64,
    pub pointer_pos: f64,
    pub loop_start: f64,
    pub loop_end: f64,
    /// Instantaneous pointer speed.
    pub speed: f64,
    /// How fast `loop_start` moved since the previous warning, in seconds
    /// per second.
    pub loop_start_drift_rate: f64,
    /// Speed that keeps up with the window's drift and closes the current
    /// gap to it within one warning interval.
    pub min_speed: f64,
    pub first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetTarget {
    LoopStart,
    LoopEnd,
}

impl fmt::Display for ResetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoopStart => f.write_str("loop_start"),
            Self::LoopEnd => f.write_str("loop_end"),
        }
    }
}

/// A moving static loop left the pointer behind and it was snapped back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopResetEvent {
    pub stream_id: String,
    pub elapsed: f64,
    pub position: f64,
    pub loop_start: f64,
    pub loop_end: f64,
    pub target: ResetTarget,
}

/// A controller was built with a curve-valued loop start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicLoopEvent {
    pub stream_id: String,
    pub loop_start: f64,
    pub loop_end: f64,
    /// Whether the configured `start` differs from the initial loop start and
    /// is therefore ignored.
    pub start_overridden: bool,
    pub original_start: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    Clamp(ClampEvent),
    LoopDrift(LoopDriftEvent),
    LoopReset(LoopResetEvent),
    DynamicLoop(DynamicLoopEvent),
}

/// Sink for runtime diagnostics.
pub trait Diagnostics {
    fn clamp(&self, event: ClampEvent);
    fn loop_drift(&self, event: LoopDriftEvent);
    fn loop_reset(&self, event: LoopResetEvent);
    fn dynamic_loop(&self, event: DynamicLoopEvent);

    fn emit(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::Clamp(e) => self.clamp(e),
            DiagnosticEvent::LoopDrift(e) => self.loop_drift(e),
            DiagnosticEvent::LoopReset(e) => self.loop_reset(e),
            DiagnosticEvent::DynamicLoop(e) => self.dynamic_loop(e),
        }
    }
}

/// Forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn clamp(&self, e: ClampEvent) {
        // Clamps are routine for jittered values near a bound.
        tracing::debug!(
            stream = %e.stream_id,
            parameter = %e.parameter,
            elapsed = e.elapsed,
            raw = e.raw,
            clamped = e.clamped,
            min = e.min,
            max = e.max,
            from_curve = e.from_curve,
            "parameter clipped to bounds"
        );
    }

    fn loop_drift(&self, e: LoopDriftEvent) {
        tracing::warn!(
            stream = %e.stream_id,
            elapsed = e.elapsed,
            pointer = e.pointer_pos,
            loop_start = e.loop_start,
            loop_end = e.loop_end,
            speed = e.speed,
            drift_rate = e.loop_start_drift_rate,
            min_speed = e.min_speed,
            first = e.first,
            "pointer is outside the loop window"
        );
    }

    fn loop_reset(&self, e: LoopResetEvent) {
        tracing::warn!(
            stream = %e.stream_id,
            elapsed = e.elapsed,
            position = e.position,
            loop_start = e.loop_start,
            loop_end = e.loop_end,
            target = %e.target,
            "loop bounds moved past the pointer, position reset"
        );
    }

    fn dynamic_loop(&self, e: DynamicLoopEvent) {
        tracing::info!(
            stream = %e.stream_id,
            loop_start = e.loop_start,
            loop_end = e.loop_end,
            start_overridden = e.start_overridden,
            start = e.original_start,
            "dynamic loop: pointer enters the window immediately"
        );
    }
}

/// Per-kind event counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticSummary {
    pub clamps: usize,
    pub drifts: usize,
    pub resets: usize,
    pub dynamic_loops: usize,
}

impl DiagnosticSummary {
    pub fn total(&self) -> usize {
        self.clamps + self.drifts + self.resets + self.dynamic_loops
    }
}

/// Keeps every event in a shared buffer.
///
/// Clones share the buffer, so one handle can be given to a controller and
/// another kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnostics {
    events: Rc<RefCell<Vec<DiagnosticEvent>>>,
    forward: bool,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forwards events to [`TracingDiagnostics`].
    pub fn with_tracing(mut self) -> Self {
        self.forward = true;
        self
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn summary(&self) -> DiagnosticSummary {
        self.events
            .borrow()
            .iter()
            .fold(DiagnosticSummary::default(), |mut summary, event| {
                match event {
                    DiagnosticEvent::Clamp(_) => summary.clamps += 1,
                    DiagnosticEvent::LoopDrift(_) => summary.drifts += 1,
                    DiagnosticEvent::LoopReset(_) => summary.resets += 1,
                    DiagnosticEvent::DynamicLoop(_) => summary.dynamic_loops += 1,
                }
                summary
            })
    }

    fn record(&self, event: DiagnosticEvent) {
        if self.forward {
            TracingDiagnostics.emit(event.clone());
        }
        self.events.borrow_mut().push(event);
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn clamp(&self, event: ClampEvent) {
        self.record(DiagnosticEvent::Clamp(event));
    }

    fn loop_drift(&self, event: LoopDriftEvent) {
        self.record(DiagnosticEvent::LoopDrift(event));
    }

    fn loop_reset(&self, event: LoopResetEvent) {
        self.record(DiagnosticEvent::LoopReset(event));
    }

    fn dynamic_loop(&self, event: DynamicLoopEvent) {
        self.record(DiagnosticEvent::DynamicLoop(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_event(elapsed: f64) -> LoopResetEvent {
        LoopResetEvent {
            stream_id: "s1".into(),
            elapsed,
            position: 2.0,
            loop_start: 2.0,
            loop_end: 4.0,
            target: ResetTarget::LoopStart,
        }
    }

    #[test]
    fn recording_shares_buffer_between_clones() {
        let diagnostics = RecordingDiagnostics::new();
        let handle = diagnostics.clone();
        diagnostics.loop_reset(reset_event(1.0));
        diagnostics.emit(DiagnosticEvent::LoopReset(reset_event(2.0)));

        assert_eq!(handle.len(), 2);
        assert_eq!(handle.summary().resets, 2);
        assert_eq!(handle.summary().total(), 2);

        handle.clear();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn summary_counts_each_kind() {
        let diagnostics = RecordingDiagnostics::new().with_tracing();
        diagnostics.dynamic_loop(DynamicLoopEvent {
            stream_id: "s1".into(),
            loop_start: 0.0,
            loop_end: 1.0,
            start_overridden: false,
            original_start: 0.0,
        });
        diagnostics.clamp(ClampEvent {
            stream_id: "s1".into(),
            parameter: "pointer_deviation".into(),
            elapsed: 0.0,
            raw: -0.1,
            clamped: 0.0,
            min: 0.0,
            max: 1.0,
            from_curve: false,
        });
        assert_eq!(
            diagnostics.summary(),
            DiagnosticSummary {
                clamps: 1,
                drifts: 0,
                resets: 0,
                dynamic_loops: 1,
            }
        );
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_value(DiagnosticEvent::LoopReset(reset_event(0.5))).unwrap();
        assert_eq!(json["kind"], "loop_reset");
        assert_eq!(json["target"], "loop_start");
    }
}
