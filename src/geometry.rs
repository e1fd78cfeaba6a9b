//! The junction layout: lane positions, stop lines and turning curves.
//!
//! Traffic keeps to the left of the centre line. Lane 0 is the innermost lane
//! of a direction of travel and lane `num_lanes - 1` is the kerb lane. Every
//! coordinate is derived from the canvas size, the lane width and the lane count.

use crate::config::{SimulationParams, MAX_LANES};
use crate::error::SimError;
use crate::math::{heading_of, intersect_lines, left_of, ParametricCurve2d, Point2d, QuadraticBezier2d, Vector2d};
use crate::util::Interval;
use crate::{Approach, TurnType};
use arrayvec::ArrayVec;
use cgmath::prelude::*;
use rand::Rng;
use serde::Serialize;

/// The number of chords used to approximate a curve's length.
const ARC_LENGTH_STEPS: usize = 64;

/// The path of a turning vehicle through the junction box, from its stop
/// line to the edge of the box on its destination arm.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TrajectoryCurve {
    from: Approach,
    to: Approach,
    lane: usize,
    curve: QuadraticBezier2d,
    length: f64,
}

/// The geometry of a four-way junction.
#[derive(Clone, Debug)]
pub struct JunctionGeometry {
    centre: Point2d,
    bounds: [Interval<f64>; 2],
    lane_width: f64,
    num_lanes: usize,
    stop_dist: f64,
    through_lanes: ArrayVec<usize, { MAX_LANES as usize }>,
    curves: [[Option<TrajectoryCurve>; 4]; 4],
}

impl TrajectoryCurve {
    fn new(from: Approach, to: Approach, lane: usize, p0: Point2d, u: Vector2d, p2: Point2d, v: Vector2d) -> Self {
        // Perpendicular arms always meet; fall back to the chord midpoint regardless.
        let p1 = intersect_lines(p0, u, p2, v).unwrap_or_else(|| p0 + 0.5 * (p2 - p0));
        let curve = QuadraticBezier2d::new(&[p0, p1, p2]);
        Self {
            from,
            to,
            lane,
            curve,
            length: curve.arc_length(ARC_LENGTH_STEPS),
        }
    }

    /// The approach the curve starts on.
    pub fn from(&self) -> Approach {
        self.from
    }

    /// The approach the curve ends on.
    pub fn to(&self) -> Approach {
        self.to
    }

    /// The lane the curve starts and ends in.
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// The entry point, control point and exit point of the curve.
    pub fn control_points(&self) -> &[Point2d; 3] {
        self.curve.points()
    }

    /// The approximate length of the curve.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Samples the curve at parameter `t` in `[0, 1]`.
    pub fn sample(&self, t: f64) -> Point2d {
        self.curve.sample(t.clamp(0.0, 1.0))
    }

    /// The unit tangent of the curve at parameter `t`.
    pub fn tangent(&self, t: f64) -> Vector2d {
        self.curve.sample_dt(t.clamp(0.0, 1.0)).normalize()
    }

    /// The heading of the curve at parameter `t`, in radians.
    pub fn heading_at(&self, t: f64) -> f64 {
        heading_of(self.curve.sample_dt(t.clamp(0.0, 1.0)))
    }
}

impl JunctionGeometry {
    /// Lays out a junction with `num_lanes` lanes in each direction of travel
    /// in the centre of the canvas described by `params`.
    pub fn new(params: &SimulationParams, num_lanes: u8, left_turn_lane: bool) -> Self {
        let num_lanes = usize::from(num_lanes.clamp(1, MAX_LANES));
        let centre = Point2d::new(0.5 * params.canvas_width, 0.5 * params.canvas_height);
        let half_road = num_lanes as f64 * params.lane_width;

        let inner_reserved = left_turn_lane && num_lanes >= 2;
        let outer_reserved = num_lanes >= 3;
        let through_lanes = (0..num_lanes)
            .filter(|lane| !(inner_reserved && *lane == 0))
            .filter(|lane| !(outer_reserved && *lane == num_lanes - 1))
            .collect();

        let mut geometry = Self {
            centre,
            bounds: [
                Interval::new(0.0, params.canvas_width),
                Interval::new(0.0, params.canvas_height),
            ],
            lane_width: params.lane_width,
            num_lanes,
            stop_dist: half_road + params.stop_margin,
            through_lanes,
            curves: [[None; 4]; 4],
        };

        for from in Approach::ALL {
            for to in Approach::ALL {
                let lane = match TurnType::between(from, to) {
                    Some(TurnType::Right) => num_lanes - 1,
                    Some(TurnType::Left) => 0,
                    _ => continue,
                };
                let curve = TrajectoryCurve::new(
                    from,
                    to,
                    lane,
                    geometry.stop_point(from, lane),
                    Self::inbound_dir(from),
                    geometry.junction_exit_point(to, lane),
                    to.outward(),
                );
                geometry.curves[from.index()][to.index()] = Some(curve);
            }
        }

        geometry
    }

    /// The centre of the junction.
    pub fn centre(&self) -> Point2d {
        self.centre
    }

    /// The number of lanes in each direction of travel.
    pub fn num_lanes(&self) -> usize {
        self.num_lanes
    }

    /// The lanes a straight-through vehicle may be assigned.
    pub fn through_lanes(&self) -> &[usize] {
        &self.through_lanes
    }

    /// The direction of travel of vehicles entering by `approach`.
    pub fn inbound_dir(approach: Approach) -> Vector2d {
        -approach.outward()
    }

    /// The lateral distance of a lane from the centre line.
    pub fn lane_offset(&self, lane: usize) -> f64 {
        self.lane_width * (lane as f64 + 0.5)
    }

    /// The distance from the centre to the stop line of every approach.
    pub fn stop_distance(&self) -> f64 {
        self.stop_dist
    }

    /// The distance from the centre to the canvas edge along an arm.
    fn edge_distance(&self, approach: Approach) -> f64 {
        let [xs, ys] = self.bounds;
        match approach {
            Approach::North => self.centre.y - ys.min,
            Approach::East => xs.max - self.centre.x,
            Approach::South => ys.max - self.centre.y,
            Approach::West => self.centre.x - xs.min,
        }
    }

    /// A point on an inbound lane of `approach`, `dist` from the centre along the arm.
    fn inbound_point(&self, approach: Approach, lane: usize, dist: f64) -> Point2d {
        let lateral = left_of(Self::inbound_dir(approach)) * self.lane_offset(lane);
        self.centre + approach.outward() * dist + lateral
    }

    /// A point on an outbound lane of `approach`, `dist` from the centre along the arm.
    fn outbound_point(&self, approach: Approach, lane: usize, dist: f64) -> Point2d {
        let lateral = left_of(approach.outward()) * self.lane_offset(lane);
        self.centre + approach.outward() * dist + lateral
    }

    /// Where vehicles in the given inbound lane enter the canvas.
    pub fn entry_point(&self, approach: Approach, lane: usize) -> Point2d {
        self.inbound_point(approach, lane, self.edge_distance(approach))
    }

    /// Where vehicles in the given outbound lane leave the canvas.
    pub fn exit_point(&self, approach: Approach, lane: usize) -> Point2d {
        self.outbound_point(approach, lane, self.edge_distance(approach))
    }

    /// The point on the stop line of the given inbound lane.
    pub fn stop_point(&self, approach: Approach, lane: usize) -> Point2d {
        self.inbound_point(approach, lane, self.stop_dist)
    }

    /// Where the given outbound lane meets the edge of the junction box.
    pub fn junction_exit_point(&self, approach: Approach, lane: usize) -> Point2d {
        self.outbound_point(approach, lane, self.num_lanes as f64 * self.lane_width)
    }

    /// Chooses the lane for a vehicle travelling from `from` to `to`.
    ///
    /// Right turns use the kerb lane and left turns the innermost lane.
    /// Straight-through traffic picks uniformly among [through_lanes](Self::through_lanes).
    pub fn lane_for_turn(&self, from: Approach, to: Approach, rng: &mut impl Rng) -> Result<usize, SimError> {
        match TurnType::between(from, to) {
            Some(TurnType::Right) => Ok(self.num_lanes - 1),
            Some(TurnType::Left) => Ok(0),
            Some(TurnType::Straight) => {
                let idx = rng.gen_range(0..self.through_lanes.len());
                Ok(self.through_lanes[idx])
            }
            None => Err(SimError::UTurn { from }),
        }
    }

    /// Looks up the turning curve from `from` to `to`.
    /// Returns `None` for straight-through movements, which follow a straight line,
    /// and for U-turns, which have no path.
    pub fn curve_for(&self, from: Approach, to: Approach) -> Option<&TrajectoryCurve> {
        self.curves[from.index()][to.index()].as_ref()
    }

    /// Whether a point lies within the canvas.
    pub fn in_bounds(&self, point: Point2d) -> bool {
        let [xs, ys] = self.bounds;
        xs.contains(point.x) && ys.contains(point.y)
    }

    /// Whether a point lies within the junction box.
    pub fn in_box(&self, point: Point2d) -> bool {
        self.near_box(point, 0.0)
    }

    /// Whether a point lies within the junction box grown by `margin` on every side.
    pub fn near_box(&self, point: Point2d, margin: f64) -> bool {
        let half_road = self.num_lanes as f64 * self.lane_width + margin;
        let xs = Interval::disc(self.centre.x, half_road);
        let ys = Interval::disc(self.centre.y, half_road);
        xs.contains(point.x) && ys.contains(point.y)
    }

    /// The signed distance from `point` to the stop line of `approach`, measured
    /// along the direction of travel. Positive before the line.
    pub fn distance_to_stop(&self, approach: Approach, point: Point2d) -> f64 {
        (point - self.centre).dot(approach.outward()) - self.stop_dist
    }
}
