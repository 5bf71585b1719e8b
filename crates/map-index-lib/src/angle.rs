//! Angle primitives that stay correct across the ±π discontinuity
//!
//! All angles are plain `f64` radians. Every function that returns an angle returns it
//! normalized to the half-open interval (−π, π].

use geo::Coord;
use std::f64::consts::{PI, TAU};

/// Map any angle into (−π, π].
///
/// Exact at the boundary: both `π` and `−π` normalize to `π`.
/// Non-finite input propagates as NaN.
#[inline]
pub fn normalize(angle: f64) -> f64 {
    if angle > -PI && angle <= PI {
        return angle;
    }
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Four-quadrant arctangent of `y / x`, normalized to (−π, π].
///
/// `(0, 0)` (with any combination of signed zeros) returns `0.0`.
#[inline]
pub fn atan2(y: f64, x: f64) -> f64 {
    if x == 0.0 && y == 0.0 {
        return 0.0;
    }
    normalize(y.atan2(x))
}

/// Signed shortest rotation from `from` to `to`, in (−π, π].
///
/// Satisfies `normalize(from + shortest_distance(from, to)) == normalize(to)`.
#[inline]
pub fn shortest_distance(from: f64, to: f64) -> f64 {
    normalize(to - from)
}

/// Signed angle at `origin` sweeping from the ray towards `a` to the ray towards `b`.
///
/// Positive is counter-clockwise. Colinear rays on opposite sides give `π`. A zero-length
/// ray has direction `0.0` (see [`atan2`]).
pub fn angle_between_vectors(origin: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let from = atan2(a.y - origin.y, a.x - origin.x);
    let to = atan2(b.y - origin.y, b.x - origin.x);
    shortest_distance(from, to)
}

/// Direction of the vector `from → to`, measured counter-clockwise from the +x axis.
#[inline]
pub fn direction(from: Coord<f64>, to: Coord<f64>) -> f64 {
    atan2(to.y - from.y, to.x - from.x)
}

/// Circular mean of two angles.
///
/// For exactly opposite angles the mean is undefined and `a` is returned.
pub fn middle_angle(a: f64, b: f64) -> f64 {
    let mut acc = AngleAverageAccumulator::new();
    acc.add(a);
    acc.add(b);
    acc.average().unwrap_or_else(|| normalize(a))
}

/// Running circular mean.
///
/// Each sample is accumulated as the unit vector `(cos θ, sin θ)` and the mean is the
/// direction of the summed vector, so `{π − ε, −π + ε}` averages to `π`, not `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AngleAverageAccumulator {
    sum_cos: f64,
    sum_sin: f64,
    total_weight: f64,
}

/// Relative length under which the summed vector counts as zero.
const DEGENERATE_EPSILON: f64 = 1e-12;

impl AngleAverageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample with unit weight.
    #[inline]
    pub fn add(&mut self, angle: f64) {
        self.add_weighted(angle, 1.0);
    }

    /// Add one sample with the given non-negative weight.
    pub fn add_weighted(&mut self, angle: f64, weight: f64) {
        let (sin, cos) = angle.sin_cos();
        self.sum_cos += cos * weight;
        self.sum_sin += sin * weight;
        self.total_weight += weight;
    }

    /// Number of samples worth of weight accumulated so far.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn is_empty(&self) -> bool {
        self.total_weight <= 0.0
    }

    /// Circular mean of the accumulated samples.
    ///
    /// Returns `None` when nothing was added, or when the samples cancel out (the summed
    /// vector is shorter than `1e-12 × total_weight`, e.g. `{0, π}`): the mean direction is
    /// undefined there.
    pub fn average(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let length = self.sum_cos.hypot(self.sum_sin);
        if length <= DEGENERATE_EPSILON * self.total_weight {
            return None;
        }
        Some(atan2(self.sum_sin, self.sum_cos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    const EPS: f64 = 1e-9;

    fn assert_angle_eq(actual: f64, expected: f64) {
        assert!(
            shortest_distance(actual, expected).abs() < EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_normalize_range() {
        for i in -1000..=1000 {
            let theta = i as f64 * 0.0371;
            let n = normalize(theta);
            assert!(n > -PI && n <= PI, "{theta} -> {n}");
        }
    }

    #[test]
    fn test_normalize_boundary() {
        assert_eq!(normalize(PI), PI);
        assert_eq!(normalize(-PI), PI);
        assert_eq!(normalize(0.0), 0.0);
        assert_angle_eq(normalize(3.0 * PI), PI);
    }

    #[test]
    fn test_normalize_idempotent() {
        for i in -200..=200 {
            let theta = i as f64 * 0.173;
            let n = normalize(theta);
            assert_eq!(normalize(n), n);
        }
    }

    #[test]
    fn test_normalize_periodic() {
        for k in -5..=5 {
            for theta in [-2.5, -1.0, 0.0, 0.3, 1.7, 3.0] {
                let shifted = normalize(theta + TAU * k as f64);
                assert!((shifted - normalize(theta)).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_atan_quadrants() {
        let h4 = FRAC_PI_4;
        assert_angle_eq(atan2(1.0, 1.0), h4);
        assert_angle_eq(atan2(1.0, -1.0), PI - h4);
        assert_angle_eq(atan2(-1.0, -1.0), h4 - PI);
        assert_angle_eq(atan2(-1.0, 1.0), -h4);

        let hh = (1.0f64 / 2.0).atan();
        assert_angle_eq(atan2(1.0, 2.0), hh);
        assert_angle_eq(atan2(1.0, -2.0), PI - hh);
        assert_angle_eq(atan2(-1.0, -2.0), hh - PI);
        assert_angle_eq(atan2(-1.0, 2.0), -hh);
    }

    #[test]
    fn test_atan2_axes() {
        assert!((atan2(1.0, 0.0) - FRAC_PI_2).abs() < EPS);
        assert!((atan2(-1.0, 0.0) + FRAC_PI_2).abs() < EPS);
        assert!(atan2(0.0, 1.0).abs() < EPS);
        assert_eq!(atan2(0.0, -1.0), PI);
        // Negative zero would be −π from std; normalization folds it to π
        assert_eq!(atan2(-0.0, -1.0), PI);
    }

    #[test]
    fn test_atan2_origin_is_zero() {
        assert_eq!(atan2(0.0, 0.0), 0.0);
        assert_eq!(atan2(-0.0, -0.0), 0.0);
        assert_eq!(atan2(0.0, -0.0), 0.0);
    }

    #[test]
    fn test_average_wraparound() {
        let eps = 1.0e-3;
        let mut acc = AngleAverageAccumulator::new();
        acc.add(PI - eps);
        acc.add(-PI + eps);
        let avg = acc.average().unwrap();
        assert!(shortest_distance(avg, PI).abs() < eps);
        assert!(shortest_distance(middle_angle(PI - eps, -PI + eps), PI).abs() < eps);
    }

    #[test]
    fn test_average_around_zero() {
        let eps = 1.0e-3;
        let mut acc = AngleAverageAccumulator::new();
        acc.add(eps);
        acc.add(-eps);
        assert!(acc.average().unwrap().abs() < EPS);
        assert!(middle_angle(eps, -eps).abs() < EPS);
    }

    #[test]
    fn test_average_degenerate() {
        let mut acc = AngleAverageAccumulator::new();
        assert_eq!(acc.average(), None);

        acc.add(0.0);
        acc.add(PI);
        assert_eq!(acc.average(), None);
        assert_eq!(middle_angle(0.0, PI), 0.0);
    }

    #[test]
    fn test_average_weighted() {
        let mut acc = AngleAverageAccumulator::new();
        acc.add_weighted(0.0, 3.0);
        acc.add_weighted(FRAC_PI_2, 1.0);
        let avg = acc.average().unwrap();
        assert!(avg > 0.0 && avg < FRAC_PI_4);
        assert_eq!(acc.total_weight(), 4.0);
    }

    #[test]
    fn test_shortest_distance() {
        assert!((shortest_distance(0.0, PI) - PI).abs() < EPS);
        assert!((shortest_distance(0.0, PI + 1.0) - (-PI + 1.0)).abs() < EPS);
        assert!((shortest_distance(PI - 1.0, 0.0) - (-PI + 1.0)).abs() < EPS);
        assert!((shortest_distance(PI + 1.0, 0.0) - (PI - 1.0)).abs() < EPS);
    }

    #[test]
    fn test_shortest_distance_identity() {
        for i in -30..=30 {
            for j in -30..=30 {
                let a = i as f64 * 0.37;
                let b = j as f64 * 0.41;
                let d = shortest_distance(a, b);
                assert!(d.abs() <= PI);
                assert_angle_eq(normalize(a + d), normalize(b));
            }
        }
    }

    #[test]
    fn test_two_vectors_angle() {
        let angle = angle_between_vectors(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 1.0, y: 0.0 },
        );
        assert!((angle + FRAC_PI_2).abs() < EPS);

        let angle = angle_between_vectors(
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 2.0, y: 2.0 },
            Coord { x: 1.0, y: 2.0 },
        );
        assert!((angle - FRAC_PI_4).abs() < EPS);
    }

    #[test]
    fn test_two_vectors_angle_edge_cases() {
        let origin = Coord { x: 0.0, y: 0.0 };
        let east = Coord { x: 1.0, y: 0.0 };
        let west = Coord { x: -1.0, y: 0.0 };

        assert_eq!(angle_between_vectors(origin, east, east), 0.0);
        assert_eq!(angle_between_vectors(origin, east, west), PI);
        assert_eq!(angle_between_vectors(origin, west, east), PI);
        // Zero-length ray behaves as direction 0
        let north = Coord { x: 0.0, y: 1.0 };
        assert!((angle_between_vectors(origin, origin, north) - FRAC_PI_2).abs() < EPS);
    }
}
