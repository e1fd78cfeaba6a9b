//! The scoring backend's wire types and a status poller.
//!
//! No HTTP client is bundled. Implement [SimulationBackend] over whichever
//! client the host application uses, and drive a [StatusPoller] from the
//! same clock as the simulation.

use crate::config::JunctionConfig;
use crate::Approach;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The default time between status checks, in s.
pub const DEFAULT_POLL_INTERVAL: f64 = 2.0;

/// The identifier the backend assigns to a submitted run.
pub type SimulationId = u64;

/// The endpoint paths of the backend, relative to its base URL.
pub mod endpoints {
    use super::SimulationId;

    pub const CREATE: &str = "/simulation/create-simulation/";
    pub const COMPLETED_LIST: &str = "/simulation/completed-simulations/";

    pub fn start(id: SimulationId) -> String {
        format!("/simulation/start-simulation/?simulation_id={}", id)
    }

    pub fn status(id: SimulationId) -> String {
        format!("/simulation/check-simulation-status/?simulation_id={}", id)
    }

    pub fn completed(id: SimulationId) -> String {
        format!("/simulation/completed-simulation/?simulation_id={}", id)
    }

    pub fn delete(id: SimulationId) -> String {
        format!("/simulation/delete-simulation/?simulation_id={}", id)
    }
}

/// The response to `create-simulation`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSimulationResponse {
    pub simulation_id: SimulationId,
}

/// The progress of a run on the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    #[serde(rename = "Not started")]
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl SimulationStatus {
    /// Whether the run will not change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The response to `check-simulation-status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub simulation_status: SimulationStatus,
}

/// Waiting and queueing figures for one approach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApproachMetrics {
    /// The mean time a vehicle spent waiting, in s.
    pub average_waiting_time: f64,
    /// The longest time any vehicle spent waiting, in s.
    pub max_waiting_time: f64,
    /// The most vehicles queued at once.
    pub max_queue_length: usize,
}

/// A scored run, as returned by `completed-simulation` and `completed-simulations`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletedSimulation {
    pub simulation_id: SimulationId,
    pub efficiency_score: f64,
    pub metrics: BTreeMap<Approach, ApproachMetrics>,
    pub junction_config: JunctionConfig,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

/// A failed request to the backend.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("backend responded with status {0}")]
    Status(u16),
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The operations of the scoring backend.
pub trait SimulationBackend {
    /// Submits a junction configuration.
    fn create(&mut self, config: &JunctionConfig) -> Result<CreateSimulationResponse, NetworkError>;

    /// Begins scoring a submitted run.
    fn start(&mut self, id: SimulationId) -> Result<(), NetworkError>;

    /// Checks the progress of a run.
    fn status(&mut self, id: SimulationId) -> Result<StatusResponse, NetworkError>;

    /// Fetches the results of a completed run.
    fn completed(&mut self, id: SimulationId) -> Result<CompletedSimulation, NetworkError>;

    /// Lists every completed run.
    fn list(&mut self) -> Result<Vec<CompletedSimulation>, NetworkError>;

    /// Removes a run.
    fn delete(&mut self, id: SimulationId) -> Result<(), NetworkError>;
}

/// The state of a [StatusPoller].
#[derive(Clone, Debug, PartialEq)]
pub enum PollState {
    /// Waiting for the run to finish; holds the last reported status.
    Polling(SimulationStatus),
    /// The run finished and its results were fetched.
    Completed(Box<CompletedSimulation>),
    /// The backend reported that the run failed.
    Failed,
    /// A request failed; polling has stopped.
    Error(String),
}

/// Polls the status of one run at a fixed interval until it finishes.
#[derive(Clone, Debug)]
pub struct StatusPoller {
    id: SimulationId,
    interval: f64,
    /// The time until the next check, in s.
    due_in: f64,
    state: PollState,
}

impl StatusPoller {
    /// Creates a poller which checks the run `id` every `interval` seconds,
    /// starting one interval from now.
    pub fn new(id: SimulationId, interval: f64) -> Self {
        let interval = interval.max(f64::EPSILON);
        Self {
            id,
            interval,
            due_in: interval,
            state: PollState::Polling(SimulationStatus::Running),
        }
    }

    /// The run being polled.
    pub fn id(&self) -> SimulationId {
        self.id
    }

    /// The current state.
    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Whether polling has stopped.
    pub fn is_finished(&self) -> bool {
        !matches!(self.state, PollState::Polling(_))
    }

    /// Advances the poller's clock by `dt` seconds, checking the backend if
    /// a poll is due. Returns `true` if a request was made.
    pub fn step(&mut self, dt: f64, backend: &mut impl SimulationBackend) -> bool {
        if self.is_finished() {
            return false;
        }
        self.due_in -= dt;
        if self.due_in > 0.0 {
            return false;
        }
        self.due_in = self.interval;
        self.poll(backend);
        true
    }

    fn poll(&mut self, backend: &mut impl SimulationBackend) {
        let status = match backend.status(self.id) {
            Ok(response) => response.simulation_status,
            Err(err) => return self.fail(err),
        };
        self.state = match status {
            SimulationStatus::Completed => match backend.completed(self.id) {
                Ok(results) => PollState::Completed(Box::new(results)),
                Err(err) => return self.fail(err),
            },
            SimulationStatus::Failed => PollState::Failed,
            status => PollState::Polling(status),
        };
        if self.is_finished() {
            log::debug!("simulation {} finished polling: {:?}", self.id, status);
        }
    }

    fn fail(&mut self, err: NetworkError) {
        log::warn!("polling simulation {} failed: {}", self.id, err);
        self.state = PollState::Error(err.to_string());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    /// A backend which replays scripted status responses.
    #[derive(Default)]
    struct ScriptedBackend {
        statuses: VecDeque<Result<SimulationStatus, NetworkError>>,
        requests: usize,
    }

    impl ScriptedBackend {
        fn new(statuses: Vec<Result<SimulationStatus, NetworkError>>) -> Self {
            Self {
                statuses: statuses.into(),
                requests: 0,
            }
        }
    }

    impl SimulationBackend for ScriptedBackend {
        fn create(&mut self, _: &JunctionConfig) -> Result<CreateSimulationResponse, NetworkError> {
            Ok(CreateSimulationResponse { simulation_id: 7 })
        }

        fn start(&mut self, _: SimulationId) -> Result<(), NetworkError> {
            Ok(())
        }

        fn status(&mut self, _: SimulationId) -> Result<StatusResponse, NetworkError> {
            self.requests += 1;
            let status = self
                .statuses
                .pop_front()
                .unwrap_or(Ok(SimulationStatus::Running))?;
            Ok(StatusResponse {
                simulation_status: status,
            })
        }

        fn completed(&mut self, id: SimulationId) -> Result<CompletedSimulation, NetworkError> {
            Ok(CompletedSimulation {
                simulation_id: id,
                efficiency_score: 0.5,
                metrics: BTreeMap::new(),
                junction_config: JunctionConfig::empty(2, false),
                created_at: "2025-01-01T00:00:00Z".into(),
            })
        }

        fn list(&mut self) -> Result<Vec<CompletedSimulation>, NetworkError> {
            Ok(vec![])
        }

        fn delete(&mut self, _: SimulationId) -> Result<(), NetworkError> {
            Ok(())
        }
    }

    #[test]
    fn polls_at_interval_until_completed() {
        let mut backend = ScriptedBackend::new(vec![
            Ok(SimulationStatus::Running),
            Ok(SimulationStatus::Completed),
        ]);
        let mut poller = StatusPoller::new(7, DEFAULT_POLL_INTERVAL);
        for _ in 0..30 {
            poller.step(0.25, &mut backend);
        }
        assert_eq!(backend.requests, 2);
        match poller.state() {
            PollState::Completed(results) => assert_eq!(results.simulation_id, 7),
            state => panic!("unexpected state {:?}", state),
        }
        assert!(!poller.step(10.0, &mut backend));
    }

    #[test]
    fn stops_on_failure() {
        let mut backend = ScriptedBackend::new(vec![Ok(SimulationStatus::Failed)]);
        let mut poller = StatusPoller::new(1, 1.0);
        assert!(poller.step(1.0, &mut backend));
        assert_eq!(poller.state(), &PollState::Failed);
        assert!(!poller.step(1.0, &mut backend));
        assert_eq!(backend.requests, 1);
    }

    #[test]
    fn stops_on_network_error() {
        let mut backend = ScriptedBackend::new(vec![Err(NetworkError::Status(500))]);
        let mut poller = StatusPoller::new(1, 1.0);
        poller.step(1.5, &mut backend);
        assert!(matches!(poller.state(), PollState::Error(msg) if msg.contains("500")));
        assert!(poller.is_finished());
    }

    #[test]
    fn status_wire_format() {
        let status: StatusResponse = serde_json::from_str(r#"{"simulation_status":"completed"}"#).unwrap();
        assert_eq!(status.simulation_status, SimulationStatus::Completed);
        let json = serde_json::to_string(&SimulationStatus::NotStarted).unwrap();
        assert_eq!(json, r#""Not started""#);
        assert_eq!(endpoints::status(3), "/simulation/check-simulation-status/?simulation_id=3");
    }

    #[test]
    fn completed_simulation_wire_format() {
        let json = r#"{
            "simulation_id": 4,
            "efficiency_score": 71.5,
            "metrics": {
                "north": {"average_waiting_time": 3.5, "max_waiting_time": 9.0, "max_queue_length": 4}
            },
            "junction_config": {
                "north": {"inbound": 100, "east": 50, "south": 50, "west": 0},
                "east": {"inbound": 0, "north": 0, "south": 0, "west": 0},
                "south": {"inbound": 0, "north": 0, "east": 0, "west": 0},
                "west": {"inbound": 0, "north": 0, "east": 0, "south": 0},
                "leftTurn": false,
                "numLanes": 2
            },
            "created_at": "2025-03-01T12:00:00Z"
        }"#;
        let run: CompletedSimulation = serde_json::from_str(json).unwrap();
        assert_eq!(run.metrics[&Approach::North].max_queue_length, 4);
        assert_eq!(run.junction_config.north.inbound, 100);
        assert!(run.junction_config.validate().is_ok());
    }
}
