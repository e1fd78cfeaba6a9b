use std::error::Error;
use std::time::Instant;

use junction_sim::{Approach, ApproachFlows, JunctionConfig, Simulation, SimulationParams};

/// The fixed timestep of the headless loop.
const FRAME_DT: f64 = 1.0 / 60.0;

/// Usage: `junction-sim [CONFIG.json] [PARAMS.json] [SECONDS]`
fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.first() {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => default_config(),
    };
    let params: SimulationParams = match args.get(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => SimulationParams::default(),
    };
    let seconds: f64 = match args.get(2) {
        Some(secs) => secs.parse()?,
        None => 60.0,
    };

    let mut sim = Simulation::new(params);
    sim.start(&config)?;

    println!("Simulating {:.0}s...", seconds);
    let start = Instant::now();
    let num_frames = (seconds / FRAME_DT).ceil() as usize;
    for frame in 1..=num_frames {
        sim.step(FRAME_DT);
        if frame % 600 == 0 {
            log::info!(
                "t = {:.0}s: {} vehicles, {} exited",
                sim.time(),
                sim.iter_vehicles().count(),
                sim.exited_count()
            );
        }
    }
    let elapsed = start.elapsed();

    println!(
        "Simulated {} frames in {:?} ({:.0}x real time)",
        num_frames,
        elapsed,
        sim.time() / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("{:<8}{:>9}{:>8}{:>10}{:>10}{:>10}", "approach", "spawned", "exited", "avg wait", "max wait", "max queue");
    for approach in Approach::ALL {
        let stats = sim.stats(approach);
        let metrics = stats.metrics();
        println!(
            "{:<8}{:>9}{:>8}{:>10.2}{:>10.2}{:>10}",
            approach.to_string(),
            stats.spawned,
            stats.exited,
            metrics.average_waiting_time,
            metrics.max_waiting_time,
            metrics.max_queue_length
        );
    }
    Ok(())
}

/// Heavy north-south traffic with light turning flows from the east and west.
fn default_config() -> JunctionConfig {
    use Approach::*;
    let mut config = JunctionConfig::empty(2, false);
    config.north = ApproachFlows::from_outbound(&[(South, 800), (East, 100), (West, 100)]);
    config.south = ApproachFlows::from_outbound(&[(North, 800), (East, 100), (West, 100)]);
    config.east = ApproachFlows::from_outbound(&[(West, 300), (North, 50), (South, 50)]);
    config.west = ApproachFlows::from_outbound(&[(East, 300), (North, 50), (South, 50)]);
    config
}
