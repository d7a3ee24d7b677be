//! Expansion of compact repeated patterns into absolute breakpoints.

use super::{Breakpoint, EnvelopeKind, SpecEntry};
use crate::{distribution::TimeDistribution, GrainScoreError, Result};

/// Gap inserted before the first point of each repetition so the pattern
/// restarts with a jump instead of being interpolated into.
pub const DISCONTINUITY_OFFSET: f64 = 1e-6;

/// A pattern in percentage coordinates repeated `n_reps` times up to the
/// absolute `end_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactSpec {
    /// `(percent, value)` pairs, percent in `[0, 100]` and strictly increasing.
    pub pattern: Vec<(f64, f64)>,
    /// Absolute time at which the last repetition ends.
    pub end_time: f64,
    pub n_reps: usize,
    pub interpolation: Option<EnvelopeKind>,
    pub distribution: TimeDistribution,
}

impl CompactSpec {
    pub fn new(pattern: Vec<(f64, f64)>, end_time: f64, n_reps: usize) -> Self {
        Self {
            pattern,
            end_time,
            n_reps,
            interpolation: None,
            distribution: TimeDistribution::Linear,
        }
    }

    pub fn with_interpolation(mut self, kind: EnvelopeKind) -> Self {
        self.interpolation = Some(kind);
        self
    }

    pub fn with_distribution(mut self, distribution: TimeDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    fn validate(&self, time_offset: f64) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(GrainScoreError::pattern("pattern points cannot be empty"));
        }
        if self.n_reps < 1 {
            return Err(GrainScoreError::pattern(format!(
                "n_reps must be >= 1, got {}",
                self.n_reps
            )));
        }
        if !(self.end_time > time_offset) {
            return Err(GrainScoreError::pattern(format!(
                "end_time ({}) must be greater than the time offset ({time_offset})",
                self.end_time
            )));
        }
        if let Some(&(pct, value)) = self
            .pattern
            .iter()
            .find(|(pct, value)| !(0.0..=100.0).contains(pct) || !value.is_finite())
        {
            return Err(GrainScoreError::pattern(format!(
                "pattern point [{pct}, {value}] must have a percentage in [0, 100] and a finite value"
            )));
        }
        if self.pattern.windows(2).any(|pair| pair[1].0 <= pair[0].0) {
            return Err(GrainScoreError::pattern(
                "pattern percentages must be strictly increasing",
            ));
        }
        Ok(())
    }

    /// Lays the repetitions out between `time_offset` and `end_time`.
    pub fn expand(&self, time_offset: f64) -> Result<Vec<Breakpoint>> {
        self.validate(time_offset)?;

        let total = self.end_time - time_offset;
        let layout = self.distribution.cycles(total, self.n_reps)?;
        let mut expanded = Vec::with_capacity(self.pattern.len() * self.n_reps);

        for (rep, (start, duration)) in layout.starts.iter().zip(&layout.durations).enumerate() {
            let cycle_start = time_offset + start;
            for (index, &(pct, value)) in self.pattern.iter().enumerate() {
                let mut time = cycle_start + pct / 100.0 * duration;
                if index == 0 && (rep > 0 || time_offset > 0.0) {
                    time += DISCONTINUITY_OFFSET;
                }
                expanded.push(Breakpoint::new(time, value));
            }
        }

        // Cycles shorter than the reset gap fold back onto themselves.
        if let Some(index) = expanded.windows(2).position(|pair| pair[1].time <= pair[0].time) {
            let rep = (index + 1) / self.pattern.len();
            return Err(GrainScoreError::pattern(format!(
                "repetition {rep} of {} ({} distribution) is too short: time {} does not follow {} \
                 after the {DISCONTINUITY_OFFSET}s reset gap",
                self.n_reps,
                self.distribution,
                expanded[index + 1].time,
                expanded[index].time,
            )));
        }

        if let (Some(first), Some(last)) = (expanded.first(), expanded.last()) {
            tracing::debug!(
                offset = time_offset,
                duration = total,
                reps = self.n_reps,
                distribution = %self.distribution,
                breakpoints = expanded.len(),
                from = first.time,
                to = last.time,
                "expanded compact envelope pattern"
            );
        }

        Ok(expanded)
    }
}

/// Flattens a mixed list of breakpoints and compact patterns.
///
/// Each compact entry starts where the breakpoints before it end (the latest
/// time seen so far, or zero).
pub fn expand_entries(entries: &[SpecEntry]) -> Result<Vec<Breakpoint>> {
    let mut expanded = Vec::new();
    let mut current_time = 0.0_f64;
    let mut latest: Option<f64> = None;

    for entry in entries {
        match entry {
            SpecEntry::Point(point) => {
                expanded.push(*point);
                current_time = current_time.max(point.time);
                latest = Some(latest.map_or(point.time, |t| t.max(point.time)));
            }
            SpecEntry::Compact(compact) => {
                let points = compact.expand(current_time)?;
                if let (Some(first), Some(previous)) = (points.first(), latest) {
                    if first.time <= previous {
                        return Err(GrainScoreError::pattern(format!(
                            "compact pattern starting at t={} collides with the breakpoint at t={previous}",
                            first.time
                        )));
                    }
                }
                current_time = points.iter().fold(current_time, |acc, p| acc.max(p.time));
                latest = Some(current_time);
                expanded.extend(points);
            }
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(end_time: f64, n_reps: usize) -> CompactSpec {
        CompactSpec::new(vec![(0.0, 0.0), (100.0, 1.0)], end_time, n_reps)
    }

    #[test]
    fn expands_simple_ramp() {
        let points = ramp(0.4, 4).expand(0.0).unwrap();
        assert_eq!(points.len(), 8);
        assert_eq!(points[0], Breakpoint::new(0.0, 0.0));
        assert!((points[1].time - 0.1).abs() < 1e-12);
        assert!((points[2].time - (0.1 + DISCONTINUITY_OFFSET)).abs() < 1e-12);
        assert_eq!(points[2].value, 0.0);
        assert!((points[7].time - 0.4).abs() < 1e-12);
    }

    #[test]
    fn percentage_maps_into_cycle() {
        let spec = CompactSpec::new(vec![(0.0, 10.0), (50.0, 20.0), (100.0, 30.0)], 1.0, 2);
        let points = spec.expand(0.0).unwrap();
        assert!((points[1].time - 0.25).abs() < 1e-12);
        assert!((points[2].time - 0.5).abs() < 1e-12);
        assert!((points[4].time - 0.75).abs() < 1e-12);
        assert_eq!(points[3].value, 10.0);
    }

    #[test]
    fn times_strictly_increase() {
        let points = ramp(2.0, 25).expand(0.0).unwrap();
        assert!(points.windows(2).all(|w| w[1].time > w[0].time));
    }

    #[test]
    fn offset_shifts_first_point() {
        let spec = CompactSpec::new(vec![(0.0, 30.0), (100.0, 50.0)], 1.3, 5);
        let points = spec.expand(0.3).unwrap();
        assert!((points[0].time - (0.3 + DISCONTINUITY_OFFSET)).abs() < 1e-12);
        assert!((points[1].time - 0.5).abs() < 1e-12);
        assert!((points.last().unwrap().time - 1.3).abs() < 1e-12);
    }

    #[test]
    fn distribution_controls_cycle_lengths() {
        let spec = ramp(3.0, 2).with_distribution(TimeDistribution::geometric(2.0).unwrap());
        let points = spec.expand(0.0).unwrap();
        assert!((points[1].time - 1.0).abs() < 1e-12);
        assert!((points[3].time - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(CompactSpec::new(Vec::new(), 1.0, 2).expand(0.0).is_err());
        assert!(ramp(1.0, 0).expand(0.0).is_err());
        assert!(ramp(0.5, 2).expand(0.5).is_err());
        assert!(CompactSpec::new(vec![(0.0, 0.0), (120.0, 1.0)], 1.0, 1)
            .expand(0.0)
            .is_err());
        assert!(CompactSpec::new(vec![(50.0, 0.0), (10.0, 1.0)], 1.0, 1)
            .expand(0.0)
            .is_err());
    }

    #[test]
    fn mixed_entries_chain_offsets() {
        let entries = vec![
            SpecEntry::Point(Breakpoint::new(0.0, 10.0)),
            SpecEntry::Point(Breakpoint::new(0.3, 10.0)),
            SpecEntry::Compact(CompactSpec::new(vec![(0.0, 30.0), (100.0, 50.0)], 1.3, 5)),
            SpecEntry::Point(Breakpoint::new(2.0, 0.0)),
        ];
        let points = expand_entries(&entries).unwrap();
        assert_eq!(points.len(), 2 + 10 + 1);
        assert!(points[2].time > 0.3);
        assert_eq!(points.last().unwrap().time, 2.0);
    }

    #[test]
    fn cycles_shorter_than_the_reset_gap_are_rejected() {
        let spec = ramp(1.0, 40).with_distribution(TimeDistribution::from_name("exponential").unwrap());
        let err = spec.expand(0.0).unwrap_err();
        assert!(matches!(err, GrainScoreError::InvalidPattern(_)), "{err:?}");
        assert!(err.to_string().contains("too short"), "{err}");

        // a gentler layout still fits
        let points = ramp(1.0, 8)
            .with_distribution(TimeDistribution::from_name("exponential").unwrap())
            .expand(0.0)
            .unwrap();
        assert!(points.windows(2).all(|pair| pair[1].time > pair[0].time));
        assert!(points.last().unwrap().time <= 1.0 + 1e-12);
    }

    #[test]
    fn compact_after_a_point_at_its_start_is_rejected() {
        let entries = vec![
            SpecEntry::Point(Breakpoint::new(0.0, 5.0)),
            SpecEntry::Compact(ramp(1.0, 2)),
        ];
        let err = expand_entries(&entries).unwrap_err();
        assert!(matches!(err, GrainScoreError::InvalidPattern(_)), "{err:?}");
        assert!(err.to_string().contains("collides with the breakpoint at t=0"), "{err}");

        // points before zero leave the pattern's own start free
        let entries = vec![
            SpecEntry::Point(Breakpoint::new(-1.0, 5.0)),
            SpecEntry::Compact(ramp(1.0, 2)),
        ];
        assert_eq!(expand_entries(&entries).unwrap().len(), 5);
    }
}
