use super::{Point2d, Vector2d};
use cgmath::prelude::*;
use std::f64::consts::TAU;

/// Projects a point onto a local coordinate system.
///
/// # Parameters
/// * `point` - The point to project
/// * `origin` - The origin of the coordinate system
/// * `x_axis` - The basis vector pointing in the positive x-axis.
/// * `y_axis` - The basis vector pointing in the positive y-axis.
pub fn project_local(
    point: Point2d,
    origin: Point2d,
    x_axis: Vector2d,
    y_axis: Vector2d,
) -> Point2d {
    let point = point - origin;
    Point2d::new(point.dot(x_axis), point.dot(y_axis))
}

/// Gets the unit vector to the left of a direction of travel, in canvas
/// coordinates (y-axis pointing down).
pub fn left_of(dir: Vector2d) -> Vector2d {
    Vector2d::new(dir.y, -dir.x)
}

/// Gets the heading angle of a vector in `[0, 2π)`.
pub fn heading_of(dir: Vector2d) -> f64 {
    dir.y.atan2(dir.x).rem_euclid(TAU)
}

/// Gets the unit vector with the given heading angle.
pub fn dir_of(heading: f64) -> Vector2d {
    Vector2d::new(heading.cos(), heading.sin())
}

/// Finds the intersection point of two lines, each given by a point and a direction.
/// Returns `None` if the lines are parallel.
pub fn intersect_lines(p: Point2d, u: Vector2d, q: Point2d, v: Vector2d) -> Option<Point2d> {
    let denom = u.perp_dot(v);
    if denom.abs() < 1e-9 {
        return None;
    }
    let s = (q - p).perp_dot(v) / denom;
    Some(p + s * u)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn left_of_heading_south_is_east() {
        let left = left_of(Vector2d::new(0.0, 1.0));
        assert_approx_eq!(left.x, 1.0);
        assert_approx_eq!(left.y, 0.0);
    }

    #[test]
    fn headings() {
        assert_approx_eq!(heading_of(Vector2d::new(1.0, 0.0)), 0.0);
        assert_approx_eq!(heading_of(Vector2d::new(0.0, 1.0)), FRAC_PI_2);
        assert_approx_eq!(heading_of(Vector2d::new(-1.0, 0.0)), PI);
        assert_approx_eq!(heading_of(Vector2d::new(0.0, -1.0)), 3.0 * FRAC_PI_2);
    }

    #[test]
    fn perpendicular_lines_meet() {
        let p = intersect_lines(
            Point2d::new(415.0, 0.0),
            Vector2d::new(0.0, 1.0),
            Point2d::new(800.0, 385.0),
            Vector2d::new(1.0, 0.0),
        )
        .unwrap();
        assert_approx_eq!(p.x, 415.0);
        assert_approx_eq!(p.y, 385.0);
        assert!(intersect_lines(p, Vector2d::new(1.0, 0.0), p, Vector2d::new(2.0, 0.0)).is_none());
    }
}
