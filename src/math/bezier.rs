use super::curve::ParametricCurve2d;
use super::{Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;
use serde::{Deserialize, Serialize};

/// Evaluates the quadratic bezier curve `(1-t)²p0 + 2(1-t)t·p1 + t²p2`.
pub fn bezier_point(t: f64, p0: Point2d, p1: Point2d, p2: Point2d) -> Point2d {
    let t1 = 1.0 - t;
    Point2d::from_vec(t1 * t1 * p0.to_vec() + 2.0 * t1 * t * p1.to_vec() + t * t * p2.to_vec())
}

/// A quadratic bezier curve
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct QuadraticBezier2d {
    points: [Point2d; 3],
}

impl QuadraticBezier2d {
    pub const fn new(points: &[Point2d; 3]) -> Self {
        Self { points: *points }
    }

    /// The start point, control point and end point of the curve.
    pub fn points(&self) -> &[Point2d; 3] {
        &self.points
    }
}

impl ParametricCurve2d for QuadraticBezier2d {
    fn sample(&self, t: f64) -> Point2d {
        let [p0, p1, p2] = self.points;
        bezier_point(t, p0, p1, p2)
    }

    fn bounds(&self) -> Interval<f64> {
        Interval { min: 0.0, max: 1.0 }
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        let t1 = 1.0 - t;
        -2.0 * t1 * self.points[0].to_vec()
            + (2.0 - 4.0 * t) * self.points[1].to_vec()
            + 2.0 * t * self.points[2].to_vec()
    }
}
