//! Piecewise evaluation and integration over a sorted breakpoint list.

use super::{tangents::fritsch_carlson, Breakpoint, EnvelopeKind};
use crate::{GrainScoreError, Result};

/// Subintervals used by composite Simpson integration of a cubic span.
const SIMPSON_STEPS: usize = 10;

/// A validated, sorted run of breakpoints bound to one interpolation kind.
///
/// Outside `[start_time, end_time]` the segment holds its boundary values, both
/// for evaluation and integration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Segment {
    kind: EnvelopeKind,
    points: Vec<Breakpoint>,
    /// One tangent per breakpoint for cubic segments, empty otherwise.
    tangents: Vec<f64>,
}

impl Segment {
    /// Sorts and validates `points`, then precomputes the interpolation context.
    pub fn new(kind: EnvelopeKind, mut points: Vec<Breakpoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(GrainScoreError::envelope(
                "an envelope needs at least one breakpoint",
            ));
        }
        if let Some(bad) = points
            .iter()
            .find(|p| !p.time.is_finite() || !p.value.is_finite())
        {
            return Err(GrainScoreError::envelope(format!(
                "breakpoint [{}, {}] is not finite",
                bad.time, bad.value
            )));
        }

        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        if let Some(pair) = points.windows(2).find(|pair| pair[1].time <= pair[0].time) {
            return Err(GrainScoreError::envelope(format!(
                "breakpoint times must be strictly increasing, found {} twice",
                pair[0].time
            )));
        }

        Ok(Self::from_sorted(kind, points))
    }

    /// Builds a segment from points already known to be sorted and distinct.
    pub(crate) fn from_sorted(kind: EnvelopeKind, points: Vec<Breakpoint>) -> Self {
        let tangents = match kind {
            EnvelopeKind::Cubic => fritsch_carlson(&points),
            EnvelopeKind::Linear | EnvelopeKind::Step => Vec::new(),
        };
        Self {
            kind,
            points,
            tangents,
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    pub fn points(&self) -> &[Breakpoint] {
        &self.points
    }

    fn first(&self) -> Breakpoint {
        self.points[0]
    }

    fn last(&self) -> Breakpoint {
        self.points[self.points.len() - 1]
    }

    pub fn start_time(&self) -> f64 {
        self.first().time
    }

    pub fn end_time(&self) -> f64 {
        self.last().time
    }

    /// Index `i` of the span `[points[i], points[i + 1]]` containing `t`.
    /// Only meaningful for `start_time() <= t < end_time()`.
    fn span_index(&self, t: f64) -> usize {
        self.points
            .partition_point(|p| p.time <= t)
            .saturating_sub(1)
            .min(self.points.len().saturating_sub(2))
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let first = self.first();
        let last = self.last();
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        let i = self.span_index(t);
        let (p0, p1) = (self.points[i], self.points[i + 1]);
        match self.kind {
            EnvelopeKind::Linear => lerp(p0, p1, t),
            EnvelopeKind::Step => p0.value,
            EnvelopeKind::Cubic => self.hermite(i, t),
        }
    }

    /// Area under the curve over `[from, to]`; zero when `from >= to`.
    pub fn integrate(&self, from: f64, to: f64) -> f64 {
        if from >= to {
            return 0.0;
        }

        let first = self.first();
        let last = self.last();
        let mut total = 0.0;

        if from < first.time {
            total += first.value * (to.min(first.time) - from);
        }
        if to > last.time {
            total += last.value * (to - from.max(last.time));
        }

        let inner_from = from.max(first.time);
        let inner_to = to.min(last.time);
        if inner_to > inner_from {
            total += self.integrate_inside(inner_from, inner_to);
        }

        total
    }

    fn integrate_inside(&self, from: f64, to: f64) -> f64 {
        let mut total = 0.0;
        let mut i = self.span_index(from);

        while i + 1 < self.points.len() && self.points[i].time < to {
            let (p0, p1) = (self.points[i], self.points[i + 1]);
            let a = from.max(p0.time);
            let b = to.min(p1.time);
            if b > a {
                total += match self.kind {
                    EnvelopeKind::Linear => 0.5 * (lerp(p0, p1, a) + lerp(p0, p1, b)) * (b - a),
                    EnvelopeKind::Step => p0.value * (b - a),
                    EnvelopeKind::Cubic => self.simpson(i, a, b),
                };
            }
            i += 1;
        }

        total
    }

    fn hermite(&self, i: usize, t: f64) -> f64 {
        let (p0, p1) = (self.points[i], self.points[i + 1]);
        let (m0, m1) = (self.tangents[i], self.tangents[i + 1]);
        let h = p1.time - p0.time;
        let s = (t - p0.time) / h;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        h00 * p0.value + h10 * h * m0 + h01 * p1.value + h11 * h * m1
    }

    /// Composite Simpson over `[a, b]`, which lies inside span `i`.
    fn simpson(&self, i: usize, a: f64, b: f64) -> f64 {
        let dt = (b - a) / SIMPSON_STEPS as f64;
        (0..SIMPSON_STEPS)
            .map(|k| {
                let lo = a + k as f64 * dt;
                let hi = if k + 1 == SIMPSON_STEPS { b } else { lo + dt };
                let mid = 0.5 * (lo + hi);
                (hi - lo) / 6.0
                    * (self.hermite(i, lo) + 4.0 * self.hermite(i, mid) + self.hermite(i, hi))
            })
            .sum()
    }
}

fn lerp(p0: Breakpoint, p1: Breakpoint, t: f64) -> f64 {
    let alpha = (t - p0.time) / (p1.time - p0.time);
    p0.value + alpha * (p1.value - p0.value)
}
