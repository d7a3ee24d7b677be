use super::Breakpoint;

/// Fritsch–Carlson tangents for a monotone cubic Hermite spline.
///
/// Endpoints take the slope of their only neighbouring span. Interior points
/// at a local extremum (neighbouring slopes of opposite sign, or a flat span)
/// get a zero tangent so the curve cannot overshoot; elsewhere the tangent is
/// the harmonic mean of the neighbouring slopes, limited to three times the
/// smaller one.
pub fn fritsch_carlson(points: &[Breakpoint]) -> Vec<f64> {
    let n = points.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let slopes: Vec<f64> = points
        .windows(2)
        .map(|pair| {
            let dt = pair[1].time - pair[0].time;
            if dt > 0.0 {
                (pair[1].value - pair[0].value) / dt
            } else {
                0.0
            }
        })
        .collect();

    let mut tangents = vec![0.0; n];
    tangents[0] = slopes[0];
    tangents[n - 1] = slopes[n - 2];

    for i in 1..n - 1 {
        let left = slopes[i - 1];
        let right = slopes[i];
        if left * right <= 0.0 {
            continue;
        }
        let harmonic = 2.0 / (1.0 / left + 1.0 / right);
        let limit = 3.0 * left.abs().min(right.abs());
        tangents[i] = harmonic.signum() * harmonic.abs().min(limit);
    }

    tangents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(raw: &[(f64, f64)]) -> Vec<Breakpoint> {
        raw.iter().map(|&(t, v)| Breakpoint::new(t, v)).collect()
    }

    #[test]
    fn endpoints_use_adjacent_slopes() {
        let tangents = fritsch_carlson(&points(&[(0.0, 0.0), (1.0, 2.0), (3.0, 3.0)]));
        assert_eq!(tangents[0], 2.0);
        assert_eq!(tangents[2], 0.5);
    }

    #[test]
    fn interior_tangent_is_harmonic_mean() {
        let tangents = fritsch_carlson(&points(&[(0.0, 0.0), (1.0, 2.0), (3.0, 3.0)]));
        let expected = 2.0 / (1.0 / 2.0 + 1.0 / 0.5);
        assert!((tangents[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn extremum_gets_flat_tangent() {
        let tangents = fritsch_carlson(&points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]));
        assert_eq!(tangents[1], 0.0);
    }

    #[test]
    fn flat_span_flattens_neighbours() {
        let tangents = fritsch_carlson(&points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0), (3.0, 2.0)]));
        assert_eq!(tangents[1], 0.0);
        assert_eq!(tangents[2], 0.0);
    }

    #[test]
    fn short_inputs_are_zero() {
        assert!(fritsch_carlson(&[]).is_empty());
        assert_eq!(fritsch_carlson(&points(&[(0.0, 4.0)])), vec![0.0]);
    }
}
