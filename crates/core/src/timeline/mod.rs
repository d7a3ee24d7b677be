use rand::Rng;
use serde::Serialize;

use crate::{pointer::PointerController, GrainScoreError, Result};

/// A grain as handed to score assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrainEvent {
    pub onset: f64,
    pub duration: f64,
    /// Read position in the source sample, in seconds.
    pub position: f64,
    pub reverse: bool,
}

impl GrainEvent {
    pub fn new(onset: f64, duration: f64, position: f64, reverse: bool) -> Self {
        Self {
            onset,
            duration,
            position,
            reverse,
        }
    }
}

/// Evenly spaced onsets `0, interval, 2 * interval, ...` below `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetSchedule {
    interval: f64,
    duration: f64,
}

impl OnsetSchedule {
    pub fn new(interval: f64, duration: f64) -> Result<Self> {
        if !(interval > 0.0 && interval.is_finite()) {
            return Err(GrainScoreError::parameter(
                "interval",
                format!("must be positive and finite, got {interval}"),
            ));
        }
        if !(duration >= 0.0 && duration.is_finite()) {
            return Err(GrainScoreError::parameter(
                "duration",
                format!("must be non-negative and finite, got {duration}"),
            ));
        }
        Ok(Self { interval, duration })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Onsets are computed by multiplication so long schedules do not drift.
    pub fn onsets(&self) -> impl Iterator<Item = f64> {
        let Self { interval, duration } = *self;
        (0u64..)
            .map(move |i| i as f64 * interval)
            .take_while(move |onset| *onset < duration)
    }

    pub fn len(&self) -> usize {
        self.onsets().count()
    }

    pub fn is_empty(&self) -> bool {
        self.duration <= 0.0
    }
}

/// Runs `pointer` over every onset of `schedule`, in order. Onsets only
/// grow, so the pointer always sees simulated time moving forward.
pub fn trace_grains<R: Rng>(
    pointer: &mut PointerController<R>,
    schedule: &OnsetSchedule,
    grain_duration: f64,
    reverse: bool,
) -> Vec<GrainEvent> {
    schedule
        .onsets()
        .map(|onset| {
            let position = pointer.calculate(onset, grain_duration, reverse);
            GrainEvent::new(onset, grain_duration, position, reverse)
        })
        .collect()
}
