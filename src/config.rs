//! The junction configuration and the engine parameters of a run.

use crate::error::ConfigError;
use crate::Approach;
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The maximum rate of any single value in a [JunctionConfig], in vehicles per hour.
pub const MAX_VPH: u32 = 2000;

/// The supported range of lanes per direction of travel.
pub const MIN_LANES: u8 = 1;
pub const MAX_LANES: u8 = 5;

/// The traffic entering by one approach and where it leaves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproachFlows {
    /// The total rate of vehicles entering by this approach, in vph.
    pub inbound: u32,
    /// The rate of vehicles leaving by each other approach, in vph.
    #[serde(flatten)]
    pub outbound: BTreeMap<Approach, u32>,
}

/// A junction configuration, serialised in the shape the scoring backend accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionConfig {
    pub north: ApproachFlows,
    pub east: ApproachFlows,
    pub south: ApproachFlows,
    pub west: ApproachFlows,
    /// Whether the innermost lane of each approach is reserved for left turns.
    #[serde(rename = "leftTurn", alias = "leftTurnLane", default)]
    pub left_turn_lane: bool,
    /// The number of lanes in each direction of travel.
    #[serde(rename = "numLanes")]
    pub num_lanes: u8,
}

/// A single origin-destination flow with a positive rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficFlow {
    pub from: Approach,
    pub to: Approach,
    pub vph: u32,
}

/// How the gaps between spawned vehicles are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalModel {
    /// Vehicles arrive exactly `3600 / vph` seconds apart.
    #[default]
    Fixed,
    /// Gaps are drawn from an exponential distribution with the same mean.
    Poisson,
}

/// The tunable parameters of the simulation engine.
///
/// Distances are in canvas units and times in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// The width of the simulated area.
    pub canvas_width: f64,
    /// The height of the simulated area.
    pub canvas_height: f64,
    /// The width of a single lane.
    pub lane_width: f64,
    /// The gap between the edge of the junction box and the stop line.
    pub stop_margin: f64,
    /// The cruising speed of every vehicle.
    pub vehicle_speed: f64,
    /// The length of a vehicle.
    pub vehicle_length: f64,
    /// The minimum centre-to-centre distance kept to the vehicle ahead.
    pub safe_distance: f64,
    /// The duration of each green phase.
    pub green_time: f64,
    /// The duration of the all-red clearance between opposing greens.
    pub all_red_time: f64,
    /// The inter-arrival model of the flow generators.
    pub arrivals: ArrivalModel,
    /// Two vehicles share a lane if their headings differ by less than this, in radians.
    pub heading_tolerance: f64,
    /// Two vehicles share a lane if their lateral offset is less than this.
    pub lateral_tolerance: f64,
    /// The most spawns a blocked lane entry holds; further spawns are dropped.
    pub spawn_backlog: usize,
    /// The seed of the random number generator, or `None` for a random seed.
    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 800.0,
            lane_width: 30.0,
            stop_margin: 10.0,
            vehicle_speed: 120.0,
            vehicle_length: 24.0,
            safe_distance: 36.0,
            green_time: 10.0,
            all_red_time: 3.0,
            arrivals: ArrivalModel::Fixed,
            heading_tolerance: 0.1,
            lateral_tolerance: 15.0,
            spawn_backlog: 32,
            seed: None,
        }
    }
}

impl ApproachFlows {
    /// Creates the flows of an approach from its outbound rates.
    /// The inbound rate is set to their sum.
    pub fn from_outbound(outbound: &[(Approach, u32)]) -> Self {
        let outbound: BTreeMap<_, _> = outbound.iter().copied().collect();
        Self {
            inbound: outbound.values().sum(),
            outbound,
        }
    }

    /// Gets the outbound rate towards `to`, in vph.
    pub fn to(&self, to: Approach) -> u32 {
        self.outbound.get(&to).copied().unwrap_or(0)
    }

    /// The sum of the outbound rates, in vph.
    pub fn outbound_total(&self) -> u32 {
        self.outbound.values().sum()
    }
}

impl JunctionConfig {
    /// Creates a configuration with no traffic.
    pub fn empty(num_lanes: u8, left_turn_lane: bool) -> Self {
        Self {
            north: Default::default(),
            east: Default::default(),
            south: Default::default(),
            west: Default::default(),
            left_turn_lane,
            num_lanes,
        }
    }

    /// Gets the flows entering by the given approach.
    pub fn flows(&self, approach: Approach) -> &ApproachFlows {
        match approach {
            Approach::North => &self.north,
            Approach::East => &self.east,
            Approach::South => &self.south,
            Approach::West => &self.west,
        }
    }

    /// Gets the flows entering by the given approach, mutably.
    pub fn flows_mut(&mut self, approach: Approach) -> &mut ApproachFlows {
        match approach {
            Approach::North => &mut self.north,
            Approach::East => &mut self.east,
            Approach::South => &mut self.south,
            Approach::West => &mut self.west,
        }
    }

    /// Checks that the configuration can be run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_LANES..=MAX_LANES).contains(&self.num_lanes) {
            return Err(ConfigError::LaneCount {
                value: self.num_lanes,
                min: MIN_LANES,
                max: MAX_LANES,
            });
        }

        for approach in Approach::ALL {
            let flows = self.flows(approach);
            let values = std::iter::once(("inbound".to_string(), flows.inbound)).chain(
                flows
                    .outbound
                    .iter()
                    .map(|(to, vph)| (to.to_string(), *vph)),
            );
            for (field, value) in values {
                if value > MAX_VPH {
                    return Err(ConfigError::RateOutOfRange {
                        approach,
                        field,
                        value,
                        max: MAX_VPH,
                    });
                }
            }
            if flows.to(approach) > 0 {
                return Err(ConfigError::UTurnFlow { approach });
            }
            let outbound = flows.outbound_total();
            if flows.inbound != outbound {
                return Err(ConfigError::FlowMismatch {
                    approach,
                    inbound: flows.inbound,
                    outbound,
                });
            }
        }

        let any_flow = Approach::ALL.iter().any(|a| self.flows(*a).inbound > 0);
        if !any_flow {
            return Err(ConfigError::AllZero);
        }

        Ok(())
    }

    /// Flattens the configuration into the list of flows with a positive rate,
    /// ordered by origin then destination.
    pub fn traffic_flows(&self) -> Vec<TrafficFlow> {
        iproduct!(Approach::ALL, Approach::ALL)
            .filter(|(from, to)| from != to)
            .map(|(from, to)| TrafficFlow {
                from,
                to,
                vph: self.flows(from).to(to),
            })
            .filter(|flow| flow.vph > 0)
            .collect()
    }
}
