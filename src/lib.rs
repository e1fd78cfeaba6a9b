pub use approach::{Approach, Axis, TurnType};
pub use backend::{ApproachMetrics, CompletedSimulation, NetworkError, SimulationBackend, StatusPoller};
pub use cgmath;
pub use config::{ApproachFlows, ArrivalModel, JunctionConfig, SimulationParams, TrafficFlow};
pub use error::{ConfigError, SimError};
pub use flow::{FlowGenerator, SpawnTimer};
pub use geometry::{JunctionGeometry, TrajectoryCurve};
pub use light::{LightState, SignalController, SignalPhase};
pub use simulation::{ApproachStats, Frame, RunState, Simulation, VehicleView};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{MotionState, Vehicle};

mod approach;
pub mod backend;
pub mod config;
mod conflict;
mod error;
mod flow;
pub mod geometry;
mod light;
pub mod math;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
