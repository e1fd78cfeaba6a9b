use crate::backend::ApproachMetrics;
use crate::config::{JunctionConfig, SimulationParams, TrafficFlow};
use crate::error::SimError;
use crate::flow::FlowGenerator;
use crate::geometry::JunctionGeometry;
use crate::light::{LightState, SignalController, SignalPhase};
use crate::vehicle::{following, MotionState, StepPlan, Vehicle};
use crate::{conflict, Approach, VehicleId, VehicleSet};
use cgmath::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use slotmap::Key;
use std::collections::{BTreeMap, VecDeque};

/// Whether the simulation clock is advancing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// No run has been started, or the last run was stopped.
    Idle,
    Running,
    Paused,
}

/// Running totals for the vehicles entering by one approach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ApproachStats {
    /// Vehicles placed on the canvas.
    pub spawned: usize,
    /// Vehicles which left the canvas.
    pub exited: usize,
    /// Spawns which had to wait because the entry was blocked.
    pub deferred: usize,
    /// Spawns discarded because the backlog at a blocked entry was full.
    pub dropped: usize,
    /// Vehicles currently queued, including spawns waiting at the entry.
    pub queue_length: usize,
    /// The largest value `queue_length` has reached.
    pub max_queue_length: usize,
    /// The total time spent queued by exited vehicles, in s.
    pub total_wait: f64,
    /// The longest time an exited vehicle spent queued, in s.
    pub max_wait: f64,
}

impl ApproachStats {
    /// Summarises the stats in the form the scoring backend reports.
    pub fn metrics(&self) -> ApproachMetrics {
        let average_waiting_time = if self.exited > 0 {
            self.total_wait / self.exited as f64
        } else {
            0.0
        };
        ApproachMetrics {
            average_waiting_time,
            max_waiting_time: self.max_wait,
            max_queue_length: self.max_queue_length,
        }
    }
}

/// A serialisable picture of one simulated frame, for a renderer.
#[derive(Clone, Debug, Serialize)]
pub struct Frame {
    pub time: f64,
    pub frame: usize,
    pub phase: SignalPhase,
    /// The signal of each approach, clockwise from north.
    pub lights: [LightState; 4],
    pub vehicles: Vec<VehicleView>,
}

/// The renderable state of a single vehicle.
#[derive(Clone, Debug, Serialize)]
pub struct VehicleView {
    pub id: u64,
    pub from: Approach,
    pub to: Approach,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub state: MotionState,
}

/// A vehicle waiting to be placed at the entry of its lane.
#[derive(Clone, Copy, Debug)]
struct PendingSpawn {
    to: Approach,
    deferred: bool,
}

/// A simulation of a single signalised four-way junction.
pub struct Simulation {
    /// The engine parameters.
    params: SimulationParams,
    /// The junction layout.
    geometry: JunctionGeometry,
    /// The signal controller.
    signal: SignalController,
    /// The spawn timers.
    flows: FlowGenerator,
    /// The flows of the current run.
    traffic: Vec<TrafficFlow>,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The set of "frozen" vehicles, which will not move.
    frozen_vehs: Vec<VehicleId>,
    /// Spawned vehicles not yet placed, keyed by approach and lane.
    pending: BTreeMap<(Approach, usize), VecDeque<PendingSpawn>>,
    /// The random number generator used for lane choice and arrivals.
    rng: StdRng,
    /// Whether the clock is advancing.
    state: RunState,
    /// The simulation speed multiplier.
    speed: f64,
    /// The simulated time since the run started, in s.
    time: f64,
    /// The current frame of simulation.
    frame: usize,
    /// The next sequence number.
    seq: usize,
    /// Per-approach totals, indexed clockwise from north.
    stats: [ApproachStats; 4],
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationParams::default())
    }
}

impl Simulation {
    /// Creates a new, idle simulation of a two-lane junction.
    pub fn new(params: SimulationParams) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            geometry: JunctionGeometry::new(&params, 2, false),
            signal: SignalController::new(params.green_time, params.all_red_time),
            flows: FlowGenerator::new(params.arrivals),
            traffic: vec![],
            vehicles: VehicleSet::default(),
            frozen_vehs: vec![],
            pending: BTreeMap::new(),
            rng,
            state: RunState::Idle,
            speed: 1.0,
            time: 0.0,
            frame: 0,
            seq: 0,
            stats: Default::default(),
            params,
        }
    }

    /// Starts a run with the given junction configuration.
    ///
    /// The configuration is validated first; an invalid configuration leaves
    /// the simulation unchanged. Any run in progress is stopped.
    pub fn start(&mut self, config: &JunctionConfig) -> Result<(), SimError> {
        config.validate()?;
        self.stop();

        self.geometry = JunctionGeometry::new(&self.params, config.num_lanes, config.left_turn_lane);
        self.traffic = config.traffic_flows();
        self.stats = Default::default();
        self.time = 0.0;
        self.seq = 0;
        for flow in &self.traffic {
            self.flows
                .schedule(flow.from, flow.to, flow.vph, self.time, &mut self.rng);
        }
        self.state = RunState::Running;

        log::info!(
            "started run with {} flows on {} lanes (left turn lane: {})",
            self.traffic.len(),
            config.num_lanes,
            config.left_turn_lane
        );
        Ok(())
    }

    /// Suspends the clock. Vehicles keep their positions.
    pub fn pause(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Paused;
        }
    }

    /// Resumes a paused run.
    pub fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.state = RunState::Running;
        }
    }

    /// Ends the current run, cancelling every spawn timer and removing all vehicles.
    /// The stats of the run remain readable until the next run starts.
    pub fn stop(&mut self) {
        if self.state != RunState::Idle {
            log::info!("stopped run at t = {:.2}s", self.time);
        }
        self.flows.clear();
        self.traffic.clear();
        self.vehicles.clear();
        self.frozen_vehs.clear();
        self.pending.clear();
        self.signal.reset();
        for stats in &mut self.stats {
            stats.queue_length = 0;
        }
        self.state = RunState::Idle;
    }

    /// Sets the speed multiplier, which scales the simulated time of each step.
    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed >= 0.0 {
            self.speed = speed;
        } else {
            log::warn!("ignoring invalid simulation speed {}", speed);
        }
    }

    /// Adds a vehicle at the entry of a lane chosen for its movement,
    /// regardless of whether the entry is clear. A run must have been started.
    pub fn add_vehicle(&mut self, from: Approach, to: Approach) -> Result<VehicleId, SimError> {
        if self.state == RunState::Idle {
            return Err(SimError::NotRunning);
        }
        let lane = self.geometry.lane_for_turn(from, to, &mut self.rng)?;
        self.insert_vehicle(from, to, lane)
    }

    /// Sets the `frozen` attribute of a vehicle. A frozen vehicle stays where
    /// it is until it is no longer frozen.
    pub fn set_vehicle_frozen(&mut self, vehicle_id: VehicleId, frozen: bool) {
        let idx = self.frozen_vehs.iter().position(|id| *id == vehicle_id);
        match (frozen, idx) {
            (true, None) => {
                self.frozen_vehs.push(vehicle_id);
            }
            (false, Some(idx)) => {
                self.frozen_vehs.remove(idx);
            }
            _ => {}
        }
    }

    /// Gets the `frozen` attribute of a vehicle. [Read more](Self::set_vehicle_frozen).
    pub fn get_vehicle_frozen(&self, vehicle_id: VehicleId) -> bool {
        self.frozen_vehs.iter().any(|id| *id == vehicle_id)
    }

    /// Advances the simulation by `dt` seconds of wall time.
    ///
    /// The frame counter always advances; the simulation itself only advances
    /// while running, by `dt` scaled by the speed multiplier.
    pub fn step(&mut self, dt: f64) {
        self.frame += 1;
        if self.state != RunState::Running {
            return;
        }
        let dt = dt * self.speed;
        self.time += dt;
        self.signal.step(dt);
        self.fire_spawns();
        self.place_pending();
        self.update_vehicles(dt);
        self.remove_exited();
        self.record_queues();
    }

    /// The engine parameters.
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// The junction layout of the current run.
    pub fn geometry(&self) -> &JunctionGeometry {
        &self.geometry
    }

    /// The signal controller.
    pub fn signal(&self) -> &SignalController {
        &self.signal
    }

    /// The spawn timers.
    pub fn flows(&self) -> &FlowGenerator {
        &self.flows
    }

    /// The flows of the current run.
    pub fn traffic(&self) -> &[TrafficFlow] {
        &self.traffic
    }

    /// Whether the clock is advancing.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The speed multiplier.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The simulated time since the run started, in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID, if it still exists.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// The number of spawned vehicles waiting for their entry to clear.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    /// The stats of the vehicles entering by `approach`.
    pub fn stats(&self, approach: Approach) -> &ApproachStats {
        &self.stats[approach.index()]
    }

    /// The total number of vehicles which have left the canvas.
    pub fn exited_count(&self) -> usize {
        self.stats.iter().map(|s| s.exited).sum()
    }

    /// The waiting and queueing metrics of every approach.
    pub fn metrics(&self) -> BTreeMap<Approach, ApproachMetrics> {
        Approach::ALL
            .iter()
            .map(|approach| (*approach, self.stats(*approach).metrics()))
            .collect()
    }

    /// Captures the current frame for rendering.
    pub fn snapshot(&self) -> Frame {
        Frame {
            time: self.time,
            frame: self.frame,
            phase: self.signal.phase(),
            lights: self.signal.lights(),
            vehicles: self
                .vehicles
                .values()
                .map(|vehicle| VehicleView {
                    id: vehicle.id().data().as_ffi(),
                    from: vehicle.from(),
                    to: vehicle.to(),
                    x: vehicle.position().x,
                    y: vehicle.position().y,
                    heading: vehicle.heading(),
                    state: vehicle.state(),
                })
                .collect(),
        }
    }

    /// Creates a vehicle at the entry of the given lane.
    fn insert_vehicle(&mut self, from: Approach, to: Approach, lane: usize) -> Result<VehicleId, SimError> {
        let seq = self.seq + 1;
        let geometry = &self.geometry;
        let vehicle_id = self
            .vehicles
            .try_insert_with_key(|id| Vehicle::new(id, seq, from, to, lane, geometry))?;
        self.seq = seq;
        self.stats[from.index()].spawned += 1;
        Ok(vehicle_id)
    }

    /// Moves every due spawn into the buffer of its lane, dropping it if the buffer is full.
    fn fire_spawns(&mut self) {
        for (from, to) in self.flows.advance(self.time, &mut self.rng) {
            let lane = match self.geometry.lane_for_turn(from, to, &mut self.rng) {
                Ok(lane) => lane,
                Err(err) => {
                    log::warn!("rejected spawn from {} to {}: {}", from, to, err);
                    continue;
                }
            };
            let queue = self.pending.entry((from, lane)).or_default();
            if queue.len() >= self.params.spawn_backlog {
                self.stats[from.index()].dropped += 1;
                log::warn!(
                    "dropped spawn from {} to {}: {} vehicles already waiting in lane {}",
                    from,
                    to,
                    queue.len(),
                    lane
                );
            } else {
                queue.push_back(PendingSpawn { to, deferred: false });
            }
        }
    }

    /// Places the first buffered spawn of each lane whose entry is clear.
    /// Spawns left behind are counted as deferred, once each.
    fn place_pending(&mut self) {
        let keys: Vec<_> = self.pending.keys().copied().collect();
        for (from, lane) in keys {
            if self.entry_clear(from, lane) {
                let next = self
                    .pending
                    .get_mut(&(from, lane))
                    .and_then(VecDeque::pop_front);
                if let Some(spawn) = next {
                    if let Err(err) = self.insert_vehicle(from, spawn.to, lane) {
                        log::warn!("rejected spawn from {} to {}: {}", from, spawn.to, err);
                    }
                }
            }
            if let Some(queue) = self.pending.get_mut(&(from, lane)) {
                for spawn in queue.iter_mut().filter(|s| !s.deferred) {
                    spawn.deferred = true;
                    self.stats[from.index()].deferred += 1;
                    log::debug!("deferred spawn from {} in lane {}: entry blocked", from, lane);
                }
            }
        }
        self.pending.retain(|_, queue| !queue.is_empty());
    }

    /// Whether a new vehicle can be placed at the entry of a lane without
    /// closing within the safe following distance of the vehicle ahead.
    fn entry_clear(&self, from: Approach, lane: usize) -> bool {
        let entry = self.geometry.entry_point(from, lane);
        let dir = JunctionGeometry::inbound_dir(from);
        !self.vehicles.values().any(|vehicle| {
            vehicle.from() == from
                && vehicle.lane() == lane
                && vehicle.before_stop_line()
                && (vehicle.position() - entry).dot(dir) < self.params.safe_distance
        })
    }

    /// Plans every vehicle's step from the same snapshot, then moves them.
    fn update_vehicles(&mut self, dt: f64) {
        let plans: Vec<_> = self
            .vehicles
            .values()
            .filter(|vehicle| !vehicle.has_exited())
            .map(|vehicle| (vehicle.id(), self.plan(vehicle)))
            .collect();

        let mut skipped = vec![];
        for (vehicle_id, plan) in plans {
            if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
                vehicle.advance(dt, &plan, &self.params, &self.geometry);
                let pos = vehicle.position();
                if !(pos.x.is_finite() && pos.y.is_finite()) {
                    skipped.push(vehicle_id);
                }
            }
        }

        for vehicle_id in skipped {
            log::warn!("removing vehicle {:?} with invalid position", vehicle_id);
            self.vehicles.remove(vehicle_id);
        }
    }

    /// Decides how far a vehicle may move and whether it may cross its stop line.
    fn plan(&self, vehicle: &Vehicle) -> StepPlan {
        if self.get_vehicle_frozen(vehicle.id()) {
            return StepPlan {
                limit: 0.0,
                may_enter: false,
            };
        }
        let limit = following::free_distance(vehicle, &self.vehicles, &self.params, &self.geometry);
        let may_enter = self.signal.is_green(vehicle.from())
            && !conflict::must_yield(vehicle, &self.vehicles, &self.params, &self.geometry);
        StepPlan { limit, may_enter }
    }

    /// Removes vehicles which have left the canvas, recording their waiting times.
    fn remove_exited(&mut self) {
        let stats = &mut self.stats;
        self.vehicles.retain(|_, vehicle| {
            if !vehicle.has_exited() {
                return true;
            }
            let stats = &mut stats[vehicle.from().index()];
            stats.exited += 1;
            stats.total_wait += vehicle.waited();
            stats.max_wait = stats.max_wait.max(vehicle.waited());
            false
        });
        let vehicles = &self.vehicles;
        self.frozen_vehs.retain(|id| vehicles.contains_key(*id));
    }

    /// Updates the queue lengths of every approach.
    fn record_queues(&mut self) {
        let mut lengths = [0; 4];
        for vehicle in self.vehicles.values() {
            if vehicle.state() == MotionState::Queued {
                lengths[vehicle.from().index()] += 1;
            }
        }
        for ((from, _), queue) in &self.pending {
            lengths[from.index()] += queue.len();
        }
        for (stats, length) in self.stats.iter_mut().zip(lengths) {
            stats.queue_length = length;
            stats.max_queue_length = stats.max_queue_length.max(length);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ApproachFlows;
    use assert_approx_eq::assert_approx_eq;
    use Approach::*;

    fn seeded() -> Simulation {
        Simulation::new(SimulationParams {
            seed: Some(3),
            ..Default::default()
        })
    }

    fn north_south(vph: u32) -> JunctionConfig {
        let mut config = JunctionConfig::empty(2, false);
        config.north = ApproachFlows::from_outbound(&[(South, vph)]);
        config
    }

    #[test]
    fn invalid_config_does_not_start() {
        let mut sim = seeded();
        let config = JunctionConfig::empty(2, false);
        assert!(matches!(sim.start(&config), Err(SimError::Config(_))));
        assert_eq!(sim.state(), RunState::Idle);
        assert_eq!(sim.flows().timer_count(), 0);
    }

    #[test]
    fn idle_steps_only_count_frames() {
        let mut sim = seeded();
        sim.step(0.1);
        sim.step(0.1);
        assert_eq!(sim.frame(), 2);
        assert_approx_eq!(sim.time(), 0.0);
    }

    #[test]
    fn pause_freezes_time_and_vehicles() {
        let mut sim = seeded();
        sim.start(&north_south(3600)).unwrap();
        for _ in 0..120 {
            sim.step(1.0 / 60.0);
        }
        let time = sim.time();
        let positions: Vec<_> = sim.iter_vehicles().map(Vehicle::position).collect();
        assert!(!positions.is_empty());

        sim.pause();
        for _ in 0..60 {
            sim.step(1.0 / 60.0);
        }
        assert_eq!(sim.time(), time);
        let after: Vec<_> = sim.iter_vehicles().map(Vehicle::position).collect();
        assert_eq!(positions, after);

        sim.resume();
        sim.step(1.0 / 60.0);
        assert!(sim.time() > time);
    }

    #[test]
    fn speed_scales_simulated_time() {
        let mut sim = seeded();
        sim.start(&north_south(600)).unwrap();
        sim.set_speed(2.0);
        sim.step(0.5);
        assert_approx_eq!(sim.time(), 1.0);
        sim.set_speed(f64::NAN);
        assert_approx_eq!(sim.speed(), 2.0);
    }

    #[test]
    fn stop_clears_everything() {
        let mut sim = seeded();
        sim.start(&north_south(3600)).unwrap();
        for _ in 0..300 {
            sim.step(1.0 / 60.0);
        }
        assert!(sim.iter_vehicles().count() > 0);
        sim.stop();
        assert_eq!(sim.state(), RunState::Idle);
        assert_eq!(sim.iter_vehicles().count(), 0);
        assert_eq!(sim.flows().timer_count(), 0);
        assert_eq!(sim.pending_count(), 0);
        assert_eq!(sim.signal().phase(), SignalPhase::NorthSouthGreen);
        for _ in 0..60 {
            sim.step(1.0 / 60.0);
        }
        assert_eq!(sim.iter_vehicles().count(), 0);
    }

    #[test]
    fn blocked_entries_defer_spawns() {
        let mut sim = seeded();
        let mut config = JunctionConfig::empty(1, false);
        config.east = ApproachFlows::from_outbound(&[(West, 2000)]);
        sim.start(&config).unwrap();
        let first = sim.add_vehicle(East, West).unwrap();
        sim.set_vehicle_frozen(first, true);
        for _ in 0..600 {
            sim.step(1.0 / 60.0);
        }
        assert_eq!(sim.iter_vehicles().count(), 1);
        assert!(sim.pending_count() > 0);
        assert_eq!(sim.stats(East).deferred, sim.pending_count());
        assert!(sim.stats(East).max_queue_length >= sim.pending_count());

        sim.set_vehicle_frozen(first, false);
        assert!(!sim.get_vehicle_frozen(first));
        for _ in 0..60 {
            sim.step(1.0 / 60.0);
        }
        assert!(sim.iter_vehicles().count() > 1);
    }

    #[test]
    fn frozen_vehicle_holds_position() {
        let mut sim = seeded();
        sim.start(&north_south(100)).unwrap();
        let id = sim.add_vehicle(West, East).unwrap();
        sim.set_vehicle_frozen(id, true);
        let pos = sim.get_vehicle(id).unwrap().position();
        for _ in 0..60 {
            sim.step(1.0 / 60.0);
        }
        assert_eq!(sim.get_vehicle(id).unwrap().position(), pos);
        assert!(sim.get_vehicle_frozen(id));
    }

    #[test]
    fn records_waiting_at_red() {
        let mut sim = seeded();
        sim.start(&north_south(100)).unwrap();
        // East-west is red for the first green phase
        sim.add_vehicle(East, West).unwrap();
        for _ in 0..(40 * 60) {
            sim.step(1.0 / 60.0);
        }
        let stats = sim.stats(East);
        assert_eq!(stats.exited, 1);
        assert!(stats.max_wait > 5.0);
        assert!(stats.max_queue_length >= 1);
        let metrics = sim.metrics();
        assert_approx_eq!(metrics[&East].average_waiting_time, stats.max_wait);
    }

    #[test]
    fn spawn_backlog_is_bounded() {
        let mut sim = Simulation::new(SimulationParams {
            seed: Some(3),
            spawn_backlog: 4,
            ..Default::default()
        });
        let mut config = JunctionConfig::empty(1, false);
        config.east = ApproachFlows::from_outbound(&[(West, 2000)]);
        sim.start(&config).unwrap();
        let first = sim.add_vehicle(East, West).unwrap();
        sim.set_vehicle_frozen(first, true);
        for _ in 0..(30 * 60) {
            sim.step(1.0 / 60.0);
        }
        let stats = sim.stats(East);
        assert_eq!(sim.pending_count(), 4);
        assert_eq!(stats.deferred, 4);
        assert!(stats.dropped > 0);
        assert_eq!(stats.spawned, 1);
    }

    #[test]
    fn add_vehicle_requires_started_run() {
        let mut sim = seeded();
        assert_eq!(sim.add_vehicle(North, South), Err(SimError::NotRunning));

        sim.start(&north_south(100)).unwrap();
        sim.pause();
        assert!(sim.add_vehicle(North, South).is_ok());

        sim.stop();
        assert_eq!(sim.add_vehicle(North, South), Err(SimError::NotRunning));
        assert_eq!(sim.iter_vehicles().count(), 0);
    }

    #[test]
    fn u_turns_are_rejected() {
        let mut sim = seeded();
        sim.start(&north_south(100)).unwrap();
        let result = sim.add_vehicle(South, South);
        assert_eq!(result, Err(SimError::UTurn { from: South }));
        assert_eq!(sim.iter_vehicles().count(), 0);
    }

    #[test]
    fn snapshot_serialises() {
        let mut sim = seeded();
        sim.start(&north_south(3600)).unwrap();
        for _ in 0..90 {
            sim.step(1.0 / 60.0);
        }
        let frame = sim.snapshot();
        assert_eq!(frame.vehicles.len(), sim.iter_vehicles().count());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["phase"], "NorthSouthGreen");
        assert_eq!(json["vehicles"][0]["from"], "north");
    }
}
