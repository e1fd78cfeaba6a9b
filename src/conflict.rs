//! Right of way between movements that share a green phase.
//!
//! Left turns cross the path of oncoming traffic. A left-turning vehicle
//! waits at its stop line while any oncoming vehicle that is not itself
//! turning left occupies the junction box, or is near enough to the line to
//! reach the crossing before the turn clears it. Once a left-turner has
//! entered, oncoming traffic is held at its line until the turner is clear of
//! the box. Opposing left turns also cross, so the later arrival of two
//! left-turners waits for the earlier one.

use crate::config::SimulationParams;
use crate::geometry::{JunctionGeometry, TrajectoryCurve};
use crate::vehicle::Vehicle;
use crate::{TurnType, VehicleSet};

/// Determines whether `subject` must give way before crossing its stop line.
pub(crate) fn must_yield(
    subject: &Vehicle,
    vehicles: &VehicleSet,
    params: &SimulationParams,
    geometry: &JunctionGeometry,
) -> bool {
    let oncoming = subject.from().opposite();
    let mut others = vehicles
        .values()
        .filter(|other| other.from() == oncoming && !other.has_exited());
    if subject.turn() == TurnType::Left {
        let look_ahead = look_ahead(subject, params);
        others.any(|other| has_priority(subject, other, look_ahead, params, geometry))
    } else {
        others.any(|other| other.turn() == TurnType::Left && crossing(other, params, geometry))
    }
}

/// How far before its stop line an oncoming vehicle must be for `subject`
/// to complete its turn ahead of it.
fn look_ahead(subject: &Vehicle, params: &SimulationParams) -> f64 {
    let turn = subject.curve().map_or(0.0, TrajectoryCurve::length);
    (turn + params.vehicle_length).max(params.safe_distance)
}

/// Whether a vehicle has crossed its stop line and is not yet a vehicle length clear of the box.
fn crossing(vehicle: &Vehicle, params: &SimulationParams, geometry: &JunctionGeometry) -> bool {
    !vehicle.before_stop_line() && geometry.near_box(vehicle.position(), params.vehicle_length)
}

/// Whether the oncoming vehicle `other` has priority over the left-turning `subject`.
fn has_priority(
    subject: &Vehicle,
    other: &Vehicle,
    look_ahead: f64,
    params: &SimulationParams,
    geometry: &JunctionGeometry,
) -> bool {
    let approaching = other.before_stop_line() && other.distance_to_stop(geometry) < look_ahead;
    // Of two approaching left-turners the earlier arrival goes first
    let first = other.turn() != TurnType::Left || other.seq() < subject.seq();
    crossing(other, params, geometry) || (approaching && first)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle::{MotionState, StepPlan};
    use crate::{Approach, VehicleId};
    use Approach::*;

    const FREE: StepPlan = StepPlan {
        limit: f64::INFINITY,
        may_enter: true,
    };

    struct Scene {
        vehicles: VehicleSet,
        params: SimulationParams,
        geometry: JunctionGeometry,
    }

    impl Scene {
        fn new() -> Self {
            let params = SimulationParams::default();
            let geometry = JunctionGeometry::new(&params, 2, false);
            Self {
                vehicles: VehicleSet::default(),
                params,
                geometry,
            }
        }

        fn add(&mut self, from: Approach, to: Approach, lane: usize) -> VehicleId {
            let seq = self.vehicles.len() + 1;
            let geometry = &self.geometry;
            self.vehicles
                .insert_with_key(|id| Vehicle::new(id, seq, from, to, lane, geometry).unwrap())
        }

        /// Drives a vehicle up to its stop line and holds it there.
        fn hold_at_line(&mut self, id: VehicleId) {
            let red = StepPlan { may_enter: false, ..FREE };
            for _ in 0..100 {
                self.vehicles[id].advance(0.05, &red, &self.params, &self.geometry);
            }
        }

        fn must_yield(&self, id: VehicleId) -> bool {
            must_yield(&self.vehicles[id], &self.vehicles, &self.params, &self.geometry)
        }
    }

    #[test]
    fn left_turn_yields_to_oncoming_through_traffic() {
        let mut scene = Scene::new();
        let turner = scene.add(North, West, 0);
        scene.hold_at_line(turner);
        assert!(!scene.must_yield(turner));

        let oncoming = scene.add(South, North, 0);
        scene.hold_at_line(oncoming);
        assert!(scene.must_yield(turner));

        // Still yielding while the oncoming vehicle crosses the box
        scene.vehicles[oncoming].advance(0.5, &FREE, &scene.params, &scene.geometry);
        assert!(scene.vehicles[oncoming].in_junction(&scene.geometry));
        assert!(scene.must_yield(turner));

        scene.vehicles[oncoming].advance(2.0, &FREE, &scene.params, &scene.geometry);
        assert!(!scene.must_yield(turner));
    }

    #[test]
    fn left_turn_waits_for_oncoming_within_reach() {
        let mut scene = Scene::new();
        let turner = scene.add(North, West, 0);
        scene.hold_at_line(turner);
        let oncoming = scene.add(South, North, 1);
        assert!(!scene.must_yield(turner));

        // Further out than the following distance, but close enough to meet the turn
        let red = StepPlan { may_enter: false, ..FREE };
        scene.vehicles[oncoming].advance(2.0, &red, &scene.params, &scene.geometry);
        let distance = scene.vehicles[oncoming].distance_to_stop(&scene.geometry);
        assert!(distance > scene.params.safe_distance);
        assert!(scene.must_yield(turner));
    }

    #[test]
    fn oncoming_traffic_waits_for_turn_to_clear() {
        let mut scene = Scene::new();
        let turner = scene.add(North, West, 0);
        let oncoming = scene.add(South, North, 0);
        scene.hold_at_line(turner);
        scene.hold_at_line(oncoming);
        assert!(!scene.must_yield(oncoming));

        scene.vehicles[turner].advance(0.2, &FREE, &scene.params, &scene.geometry);
        assert!(scene.vehicles[turner].is_turning());
        assert!(scene.must_yield(oncoming));

        let mut steps = 0;
        while scene.must_yield(oncoming) {
            scene.vehicles[turner].advance(0.05, &FREE, &scene.params, &scene.geometry);
            steps += 1;
            assert!(steps < 100, "turn never cleared");
        }
        let turner = &scene.vehicles[turner];
        assert_eq!(turner.state(), MotionState::Departed);
        assert!(!scene.geometry.near_box(turner.position(), scene.params.vehicle_length));
    }

    #[test]
    fn unopposed_movements_do_not_yield() {
        let mut scene = Scene::new();
        let straight = scene.add(North, South, 0);
        let right = scene.add(North, East, 1);
        let oncoming = scene.add(South, North, 0);
        scene.hold_at_line(straight);
        scene.hold_at_line(right);
        scene.hold_at_line(oncoming);
        assert!(!scene.must_yield(straight));
        assert!(!scene.must_yield(right));
    }

    #[test]
    fn opposing_left_turns_go_in_arrival_order() {
        let mut scene = Scene::new();
        let first = scene.add(North, West, 0);
        let second = scene.add(South, East, 0);
        scene.hold_at_line(first);
        scene.hold_at_line(second);
        assert!(!scene.must_yield(first));
        assert!(scene.must_yield(second));
    }
}
