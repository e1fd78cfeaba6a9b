//! Tests that poll a scripted backend alongside a running simulation.

use junction_sim::backend::{
    CreateSimulationResponse, PollState, SimulationId, SimulationStatus, StatusResponse, DEFAULT_POLL_INTERVAL,
};
use junction_sim::{
    Approach, ApproachFlows, CompletedSimulation, JunctionConfig, NetworkError, Simulation, SimulationBackend,
    SimulationParams, StatusPoller,
};
use std::collections::BTreeMap;

/// A backend which completes a run after a fixed number of status checks,
/// or fails every request once `offline` is set.
struct FakeBackend {
    config: Option<JunctionConfig>,
    checks_until_done: usize,
    offline: bool,
}

impl FakeBackend {
    fn new(checks_until_done: usize) -> Self {
        Self {
            config: None,
            checks_until_done,
            offline: false,
        }
    }

    fn online(&self) -> Result<(), NetworkError> {
        if self.offline {
            Err(NetworkError::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl SimulationBackend for FakeBackend {
    fn create(&mut self, config: &JunctionConfig) -> Result<CreateSimulationResponse, NetworkError> {
        self.online()?;
        // The payload must survive the wire
        let payload = serde_json::to_string(config)?;
        self.config = Some(serde_json::from_str(&payload)?);
        Ok(CreateSimulationResponse { simulation_id: 1 })
    }

    fn start(&mut self, _: SimulationId) -> Result<(), NetworkError> {
        self.online()
    }

    fn status(&mut self, _: SimulationId) -> Result<StatusResponse, NetworkError> {
        self.online()?;
        self.checks_until_done = self.checks_until_done.saturating_sub(1);
        let simulation_status = if self.checks_until_done == 0 {
            SimulationStatus::Completed
        } else {
            SimulationStatus::Running
        };
        Ok(StatusResponse { simulation_status })
    }

    fn completed(&mut self, simulation_id: SimulationId) -> Result<CompletedSimulation, NetworkError> {
        self.online()?;
        let junction_config = self.config.clone().ok_or(NetworkError::Status(404))?;
        Ok(CompletedSimulation {
            simulation_id,
            efficiency_score: 80.0,
            metrics: BTreeMap::new(),
            junction_config,
            created_at: "2025-03-01T12:00:00Z".into(),
        })
    }

    fn list(&mut self) -> Result<Vec<CompletedSimulation>, NetworkError> {
        self.online()?;
        Ok(vec![])
    }

    fn delete(&mut self, _: SimulationId) -> Result<(), NetworkError> {
        self.online()
    }
}

fn config() -> JunctionConfig {
    let mut config = JunctionConfig::empty(2, false);
    config.north = ApproachFlows::from_outbound(&[(Approach::South, 500), (Approach::East, 100)]);
    config
}

/// Test that polling finishes with the results of the submitted run.
#[test]
fn polls_until_results_arrive() {
    let mut backend = FakeBackend::new(3);
    let config = config();
    let id = backend.create(&config).unwrap().simulation_id;
    backend.start(id).unwrap();

    let mut sim = Simulation::new(SimulationParams::default());
    sim.start(&config).unwrap();
    let mut poller = StatusPoller::new(id, DEFAULT_POLL_INTERVAL);
    let mut requests = 0;
    for _ in 0..(20 * 60) {
        sim.step(1.0 / 60.0);
        if poller.step(1.0 / 60.0, &mut backend) {
            requests += 1;
        }
    }

    assert_eq!(requests, 3);
    match poller.state() {
        PollState::Completed(results) => assert_eq!(results.junction_config, config),
        state => panic!("unexpected state {:?}", state),
    }
}

/// Test that losing the backend stops polling without disturbing the simulation.
#[test]
fn network_errors_stop_polling() {
    let mut backend = FakeBackend::new(10);
    let config = config();
    let id = backend.create(&config).unwrap().simulation_id;
    backend.offline = true;

    let mut sim = Simulation::new(SimulationParams::default());
    sim.start(&config).unwrap();
    let mut poller = StatusPoller::new(id, 1.0);
    for _ in 0..(10 * 60) {
        sim.step(1.0 / 60.0);
        poller.step(1.0 / 60.0, &mut backend);
    }

    assert!(poller.is_finished());
    assert!(matches!(poller.state(), PollState::Error(msg) if msg.contains("connection refused")));
    assert!(sim.time() > 9.9);
    assert!(sim.iter_vehicles().count() > 0);
}
