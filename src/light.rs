use crate::{Approach, Axis};
use serde::Serialize;

/// The right-of-way assignment of the junction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SignalPhase {
    NorthSouthGreen,
    /// Clearance interval after north-south green.
    AllRedBeforeEastWest,
    EastWestGreen,
    /// Clearance interval after east-west green.
    AllRedBeforeNorthSouth,
}

/// The state of a single approach's signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LightState {
    Red,
    Green,
}

/// A fixed-time signal controller for a four-way junction.
///
/// Opposing approaches share a green phase, and every change of green axis
/// passes through an all-red clearance interval.
#[derive(Clone, Debug)]
pub struct SignalController {
    /// The current phase.
    phase: SignalPhase,
    /// The time since the current phase was entered, in s.
    since: f64,
    /// The duration of each green phase, in s.
    green_time: f64,
    /// The duration of each all-red interval, in s.
    all_red_time: f64,
}

impl SignalPhase {
    /// The phase that follows this one.
    pub fn next(self) -> Self {
        use SignalPhase::*;
        match self {
            NorthSouthGreen => AllRedBeforeEastWest,
            AllRedBeforeEastWest => EastWestGreen,
            EastWestGreen => AllRedBeforeNorthSouth,
            AllRedBeforeNorthSouth => NorthSouthGreen,
        }
    }

    /// The axis which has green, if any.
    pub fn green_axis(self) -> Option<Axis> {
        match self {
            SignalPhase::NorthSouthGreen => Some(Axis::NorthSouth),
            SignalPhase::EastWestGreen => Some(Axis::EastWest),
            _ => None,
        }
    }
}

impl SignalController {
    /// Creates a controller which starts at the beginning of north-south green.
    pub fn new(green_time: f64, all_red_time: f64) -> Self {
        Self {
            phase: SignalPhase::NorthSouthGreen,
            since: 0.0,
            green_time: green_time.max(f64::EPSILON),
            all_red_time: all_red_time.max(f64::EPSILON),
        }
    }

    /// Advances the controller by `dt` seconds.
    ///
    /// At most one phase change happens per step, so every phase is observed
    /// for at least one step. Time left over from a phase change is carried
    /// into the next phase.
    pub fn step(&mut self, dt: f64) {
        self.since += dt;
        let duration = self.duration(self.phase);
        if self.since >= duration {
            self.since -= duration;
            self.phase = self.phase.next();
            log::debug!("signal phase changed to {:?}", self.phase);
        }
    }

    /// Returns to the start of north-south green.
    pub fn reset(&mut self) {
        self.phase = SignalPhase::NorthSouthGreen;
        self.since = 0.0;
    }

    /// The current phase.
    pub fn phase(&self) -> SignalPhase {
        self.phase
    }

    /// The time since the current phase was entered, in s.
    pub fn elapsed(&self) -> f64 {
        self.since
    }

    /// The time until the next phase change, in s.
    pub fn remaining(&self) -> f64 {
        (self.duration(self.phase) - self.since).max(0.0)
    }

    /// The configured duration of a phase, in s.
    pub fn duration(&self, phase: SignalPhase) -> f64 {
        match phase.green_axis() {
            Some(_) => self.green_time,
            None => self.all_red_time,
        }
    }

    /// The signal shown to the given approach.
    pub fn light(&self, approach: Approach) -> LightState {
        if self.phase.green_axis() == Some(approach.axis()) {
            LightState::Green
        } else {
            LightState::Red
        }
    }

    /// Whether the given approach may enter the junction.
    pub fn is_green(&self, approach: Approach) -> bool {
        self.light(approach) == LightState::Green
    }

    /// The signals of all approaches, indexed clockwise from north.
    pub fn lights(&self) -> [LightState; 4] {
        Approach::ALL.map(|approach| self.light(approach))
    }
}
