use crate::config::ArrivalModel;
use crate::Approach;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use smallvec::SmallVec;

/// The number of seconds in an hour.
const SECS_PER_HOUR: f64 = 3600.0;

/// A recurring spawn trigger for one origin-destination pair.
#[derive(Clone, Debug)]
pub struct SpawnTimer {
    /// The approach vehicles enter by.
    pub from: Approach,
    /// The approach vehicles leave by.
    pub to: Approach,
    /// The mean time between spawns, in s.
    pub interval: f64,
    /// The simulation time of the next spawn, in s.
    pub next_due: f64,
}

/// Spawns vehicles for each configured flow at its arrival rate.
///
/// Timers are plain data checked against the simulation clock,
/// so a run is replayable given the same seed.
#[derive(Clone, Debug, Default)]
pub struct FlowGenerator {
    timers: Vec<SpawnTimer>,
    arrivals: ArrivalModel,
}

impl FlowGenerator {
    /// Creates a flow generator with no timers.
    pub fn new(arrivals: ArrivalModel) -> Self {
        Self {
            timers: vec![],
            arrivals,
        }
    }

    /// Installs a spawn timer for the pair `(from, to)` which first fires one
    /// interval after `now`. Any existing timer for the pair is replaced.
    /// A rate of zero cancels the pair.
    pub fn schedule(&mut self, from: Approach, to: Approach, vph: u32, now: f64, rng: &mut impl Rng) {
        self.cancel(from, to);
        if vph == 0 {
            return;
        }
        let interval = SECS_PER_HOUR / f64::from(vph);
        let next_due = now + self.gap(interval, rng);
        self.timers.push(SpawnTimer {
            from,
            to,
            interval,
            next_due,
        });
    }

    /// Removes the timer for the pair `(from, to)`, if there is one.
    pub fn cancel(&mut self, from: Approach, to: Approach) {
        self.timers
            .retain(|timer| !(timer.from == from && timer.to == to));
    }

    /// Removes every timer.
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// The number of installed timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Returns an iterator over the installed timers.
    pub fn iter_timers(&self) -> impl Iterator<Item = &SpawnTimer> {
        self.timers.iter()
    }

    /// Fires every timer that is due at time `now`, returning one `(from, to)`
    /// pair per spawn. A timer whose interval is shorter than the time since the
    /// last call fires more than once.
    pub fn advance(&mut self, now: f64, rng: &mut impl Rng) -> SmallVec<[(Approach, Approach); 4]> {
        let mut spawns = SmallVec::new();
        let arrivals = self.arrivals;
        for timer in &mut self.timers {
            while timer.next_due <= now {
                spawns.push((timer.from, timer.to));
                timer.next_due += Self::gap_with(arrivals, timer.interval, rng);
            }
        }
        spawns
    }

    fn gap(&self, interval: f64, rng: &mut impl Rng) -> f64 {
        Self::gap_with(self.arrivals, interval, rng)
    }

    /// Chooses the time until the next spawn of a timer with the given mean interval.
    fn gap_with(arrivals: ArrivalModel, interval: f64, rng: &mut impl Rng) -> f64 {
        match arrivals {
            ArrivalModel::Fixed => interval,
            ArrivalModel::Poisson => match Exp::new(1.0 / interval) {
                // Keep a minimum gap so a single tick never spawns unboundedly.
                Ok(distr) => distr.sample(rng).max(1e-3),
                Err(_) => interval,
            },
        }
    }
}
