//! The car following rule: a vehicle never closes within the safe following
//! distance of the nearest vehicle ahead in its lane.

use super::Vehicle;
use crate::config::SimulationParams;
use crate::geometry::JunctionGeometry;
use crate::math::{left_of, project_local, Point2d, Vector2d};
use crate::VehicleSet;
use cgmath::prelude::*;

/// Calculates how far `subject` may travel this step before it would be
/// closer than the safe following distance to the vehicle ahead.
///
/// Returns infinity if there is no vehicle ahead, and a negative number if
/// the vehicle ahead is already too close.
pub(crate) fn free_distance(
    subject: &Vehicle,
    vehicles: &VehicleSet,
    params: &SimulationParams,
    geometry: &JunctionGeometry,
) -> f64 {
    vehicles
        .values()
        .filter(|other| other.id != subject.id && !other.has_exited())
        .filter_map(|other| gap_to(subject, other, params, geometry))
        .map(|gap| gap - params.safe_distance)
        .fold(f64::INFINITY, f64::min)
}

/// Gets the distance along `subject`'s path to `other`, if `other` is ahead
/// of it in the same lane.
fn gap_to(
    subject: &Vehicle,
    other: &Vehicle,
    params: &SimulationParams,
    geometry: &JunctionGeometry,
) -> Option<f64> {
    match (subject.distance_on_curve(), other.distance_on_curve()) {
        // Both on curves: only the same movement in the same lane can be ahead
        (Some(own), Some(theirs)) => {
            let same_path = subject.from == other.from && subject.to == other.to && subject.lane == other.lane;
            (same_path && theirs > own).then(|| theirs - own)
        }
        // Leaving the curve: the vehicle ahead may already be on the exit arm
        (Some(own), None) => {
            let curve = subject.curve.as_ref()?;
            let end = curve.sample(1.0);
            let remaining = curve.length() - own;
            let along = lane_gap(end, subject.to.outward(), other, params)?;
            Some(remaining + along)
        }
        // About to cross the stop line behind a vehicle which has just started its turn
        (None, Some(theirs)) => {
            let same_lane = subject.before_stop_line() && subject.from == other.from && subject.lane == other.lane;
            same_lane.then(|| subject.distance_to_stop(geometry).max(0.0) + theirs)
        }
        (None, None) => lane_gap(subject.world_pos, subject.world_dir, other, params),
    }
}

/// Gets the longitudinal distance from `origin` to a non-turning vehicle that
/// is travelling along `dir` in the same lane and lies ahead.
fn lane_gap(
    origin: Point2d,
    dir: Vector2d,
    other: &Vehicle,
    params: &SimulationParams,
) -> Option<f64> {
    if other.is_turning() {
        return None;
    }
    if dir.dot(other.world_dir) < params.heading_tolerance.cos() {
        return None;
    }
    // x: lateral offset, y: longitudinal offset
    let local = project_local(other.world_pos, origin, left_of(dir), dir);
    if local.x.abs() >= params.lateral_tolerance || local.y <= 0.0 {
        return None;
    }
    Some(local.y)
}
