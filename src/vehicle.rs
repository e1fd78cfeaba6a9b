use crate::config::SimulationParams;
use crate::error::SimError;
use crate::geometry::{JunctionGeometry, TrajectoryCurve};
use crate::math::{dir_of, Point2d, Vector2d};
use crate::{Approach, TurnType, VehicleId};
use serde::Serialize;

pub(crate) mod following;

/// The motion state of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum MotionState {
    /// Driving along the inbound lane towards the stop line.
    Approaching,
    /// Held before the stop line, either by a red light or by the vehicle ahead.
    Queued,
    /// Following a turning curve through the junction; `t` runs from 0 to 1.
    Turning { t: f64 },
    /// Driving in a straight line away from the stop line.
    Departed,
    /// Outside the simulated area and awaiting removal.
    Exited,
}

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The order in which the vehicle was created.
    seq: usize,
    /// The approach the vehicle entered by.
    from: Approach,
    /// The approach the vehicle will leave by.
    to: Approach,
    /// The movement through the junction.
    turn: TurnType,
    /// The lane the vehicle travels in.
    lane: usize,
    /// The turning curve, for turning movements.
    curve: Option<TrajectoryCurve>,
    /// The world space coordinates of the centre of the vehicle.
    world_pos: Point2d,
    /// A unit vector aligned with the vehicle's heading.
    world_dir: Vector2d,
    /// The heading angle in radians.
    heading: f64,
    /// The motion state.
    state: MotionState,
    /// The total time spent queued, in s.
    waited: f64,
}

/// What a vehicle is permitted to do in one step, decided before any vehicle moves.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StepPlan {
    /// The furthest the vehicle may travel before closing within the safe
    /// following distance of the vehicle ahead.
    pub limit: f64,
    /// Whether the vehicle may cross its stop line.
    pub may_enter: bool,
}

impl Vehicle {
    /// Creates a vehicle at the entry point of the given lane.
    ///
    /// Fails if the movement has no path through the junction.
    pub(crate) fn new(
        id: VehicleId,
        seq: usize,
        from: Approach,
        to: Approach,
        lane: usize,
        geometry: &JunctionGeometry,
    ) -> Result<Self, SimError> {
        let turn = TurnType::between(from, to).ok_or(SimError::UTurn { from })?;
        let curve = match turn {
            TurnType::Straight => None,
            _ => Some(*geometry.curve_for(from, to).ok_or(SimError::UTurn { from })?),
        };
        let lane = curve.map(|c| c.lane()).unwrap_or(lane);
        let heading = from.opposite().heading();
        Ok(Self {
            id,
            seq,
            from,
            to,
            turn,
            lane,
            curve,
            world_pos: geometry.entry_point(from, lane),
            world_dir: JunctionGeometry::inbound_dir(from),
            heading,
            state: MotionState::Approaching,
            waited: 0.0,
        })
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The order in which the vehicle was created, starting at 1.
    pub fn seq(&self) -> usize {
        self.seq
    }

    /// The approach the vehicle entered by.
    pub fn from(&self) -> Approach {
        self.from
    }

    /// The approach the vehicle leaves by.
    pub fn to(&self) -> Approach {
        self.to
    }

    /// The vehicle's movement through the junction.
    pub fn turn(&self) -> TurnType {
        self.turn
    }

    /// The lane the vehicle travels in.
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// The turning curve the vehicle follows, if it turns.
    pub fn curve(&self) -> Option<&TrajectoryCurve> {
        self.curve.as_ref()
    }

    /// The coordinates in world space of the centre of the vehicle.
    pub fn position(&self) -> Point2d {
        self.world_pos
    }

    /// A unit vector in world space aligned with the vehicle's heading.
    pub fn direction(&self) -> Vector2d {
        self.world_dir
    }

    /// The vehicle's heading in radians, with east at 0 and south at π/2.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// The vehicle's motion state.
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// The total time the vehicle has spent queued, in s.
    pub fn waited(&self) -> f64 {
        self.waited
    }

    /// Whether the vehicle is following a turning curve.
    pub fn is_turning(&self) -> bool {
        matches!(self.state, MotionState::Turning { .. })
    }

    /// Whether the vehicle is yet to cross its stop line.
    pub fn before_stop_line(&self) -> bool {
        matches!(self.state, MotionState::Approaching | MotionState::Queued)
    }

    /// Whether the vehicle has left the simulated area.
    pub fn has_exited(&self) -> bool {
        self.state == MotionState::Exited
    }

    /// Whether the vehicle occupies the junction box.
    pub fn in_junction(&self, geometry: &JunctionGeometry) -> bool {
        match self.state {
            MotionState::Turning { .. } => true,
            MotionState::Departed => geometry.in_box(self.world_pos),
            _ => false,
        }
    }

    /// The distance to the vehicle's stop line. Only meaningful before the line.
    pub(crate) fn distance_to_stop(&self, geometry: &JunctionGeometry) -> f64 {
        geometry.distance_to_stop(self.from, self.world_pos)
    }

    /// The distance travelled along the turning curve, or `None` if not turning.
    pub(crate) fn distance_on_curve(&self) -> Option<f64> {
        match (self.state, self.curve) {
            (MotionState::Turning { t }, Some(curve)) => Some(t * curve.length()),
            _ => None,
        }
    }

    /// Advances the vehicle by one step of `dt` seconds.
    pub(crate) fn advance(
        &mut self,
        dt: f64,
        plan: &StepPlan,
        params: &SimulationParams,
        geometry: &JunctionGeometry,
    ) {
        let step = params.vehicle_speed * dt;
        let ds = step.min(plan.limit.max(0.0));

        match self.state {
            MotionState::Approaching | MotionState::Queued => {
                let to_stop = self.distance_to_stop(geometry).max(0.0);
                if ds < to_stop {
                    self.move_straight(ds);
                    self.set_held(ds < step, dt);
                } else if plan.may_enter {
                    self.move_straight(to_stop);
                    self.enter_junction(ds - to_stop);
                } else {
                    self.move_straight(to_stop);
                    self.set_held(true, dt);
                }
            }
            MotionState::Turning { .. } => self.follow_curve(ds),
            MotionState::Departed => self.move_straight(ds),
            MotionState::Exited => return,
        }

        if !geometry.in_bounds(self.world_pos) {
            self.state = MotionState::Exited;
        }
    }

    /// Records whether a vehicle before the stop line was held this step.
    fn set_held(&mut self, held: bool, dt: f64) {
        if held {
            self.state = MotionState::Queued;
            self.waited += dt;
        } else {
            self.state = MotionState::Approaching;
        }
    }

    /// Moves along the current heading.
    fn move_straight(&mut self, ds: f64) {
        self.world_pos += self.world_dir * ds;
    }

    /// Crosses the stop line with `leftover` distance still to travel this step.
    fn enter_junction(&mut self, leftover: f64) {
        if self.curve.is_some() {
            self.state = MotionState::Turning { t: 0.0 };
            self.follow_curve(leftover);
        } else {
            self.state = MotionState::Departed;
            self.move_straight(leftover);
        }
    }

    /// Travels `ds` along the turning curve, departing once its end is reached.
    fn follow_curve(&mut self, ds: f64) {
        let (t, curve) = match (self.state, self.curve) {
            (MotionState::Turning { t }, Some(curve)) => (t, curve),
            _ => return,
        };

        let t = t + ds / curve.length().max(f64::EPSILON);
        if t >= 1.0 {
            let overshoot = (t - 1.0) * curve.length();
            self.heading = self.to.heading();
            self.world_dir = self.to.outward();
            self.world_pos = curve.sample(1.0) + self.world_dir * overshoot;
            self.state = MotionState::Departed;
        } else {
            self.heading = curve.heading_at(t);
            self.world_dir = dir_of(self.heading);
            self.world_pos = curve.sample(t);
            self.state = MotionState::Turning { t };
        }
    }
}
