//! Progress oracle: computes the next progress state from a reported position.
//!
//! The oracle is a seam. Production deployments may plug in real route
//! matching; the bundled [`RandomOracle`] simulates progress with bounded
//! randomness and never looks at geography.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo::Coordinate;

/// Final waypoint index of a course.
pub const MAX_INDEX: u32 = 80;

/// Upper bound on accumulated travel distance in kilometres.
pub const MAX_DISTANCE_KM: f64 = 15.0;

/// Probability of flagging a deviation on a non-arrived report.
const DEVIATION_PROBABILITY: f64 = 0.1;

/// Progress inputs the oracle may read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressState {
    /// Current waypoint index.
    pub index: u32,
    /// Distance travelled so far, in kilometres.
    pub distance_km: f64,
    /// Last known position, if any.
    pub last_position: Option<Coordinate>,
}

/// Oracle output for one position report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// New waypoint index.
    pub new_index: u32,
    /// New accumulated distance in kilometres.
    pub new_distance_km: f64,
    /// Whether the final waypoint has been reached.
    pub is_arrived: bool,
    /// Whether the reported position is off course.
    pub is_deviation: bool,
}

impl ProgressUpdate {
    /// Clamp an update back into the oracle contract relative to `state`.
    ///
    /// Index and distance never move backwards and never exceed their caps;
    /// arrival is derived from the index; deviation is cleared on arrival.
    #[must_use]
    pub fn conform(self, state: &ProgressState) -> Self {
        let new_index = self.new_index.clamp(state.index.min(MAX_INDEX), MAX_INDEX);
        let floor = if state.distance_km.is_nan() {
            0.0
        } else {
            state.distance_km.clamp(0.0, MAX_DISTANCE_KM)
        };
        let new_distance_km = if self.new_distance_km.is_nan() {
            floor
        } else {
            self.new_distance_km.clamp(floor, MAX_DISTANCE_KM)
        };
        let is_arrived = new_index == MAX_INDEX;
        Self {
            new_index,
            new_distance_km,
            is_arrived,
            is_deviation: self.is_deviation && !is_arrived,
        }
    }
}

/// Computes the next progress state from a reported coordinate.
///
/// Implementations must return `new_index` in `[state.index, MAX_INDEX]`,
/// `new_distance_km` in `[state.distance_km, MAX_DISTANCE_KM]`,
/// `is_arrived` iff `new_index == MAX_INDEX`, and never flag a deviation
/// once arrived.
pub trait ProgressOracle: Send + Sync {
    /// Advance progress for one position report.
    fn advance(&self, state: &ProgressState, coordinate: &Coordinate) -> ProgressUpdate;
}

/// Simulated progress with bounded randomness.
///
/// Each report advances the index by 0, 1 or 2 and the distance by a value in
/// `[0.1, 0.3)` km; a deviation is flagged 10% of the time before arrival.
pub struct RandomOracle {
    rng: Mutex<StdRng>,
}

impl RandomOracle {
    /// Oracle seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic oracle for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressOracle for RandomOracle {
    fn advance(&self, state: &ProgressState, _coordinate: &Coordinate) -> ProgressUpdate {
        let mut rng = self.rng.lock();
        let step: u32 = rng.random_range(0..=2);
        let new_index = state.index.saturating_add(step).min(MAX_INDEX);
        let increment: f64 = rng.random_range(0.1..0.3);
        let new_distance_km = (state.distance_km + increment).min(MAX_DISTANCE_KM);
        let is_arrived = new_index >= MAX_INDEX;
        let is_deviation = !is_arrived && rng.random_bool(DEVIATION_PROBABILITY);
        ProgressUpdate {
            new_index,
            new_distance_km,
            is_arrived,
            is_deviation,
        }
    }
}
