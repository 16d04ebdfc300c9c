//! channel.rs — UWB physical channel between two nodes
//!
//! For every transmitter/receiver pair the channel decides:
//! 1. LOS/NLOS: hard blockage by any obstacle on the direct path, otherwise a
//!    distance-dependent LOS probability exp(-d / scale(environment))
//! 2. Path loss: free-space at 6.5 GHz, shadow fading 3 dB (LOS) or
//!    log-distance excess loss + 6 dB fading (NLOS)
//! 3. RMS delay spread, linear in distance
//! 4. Ranging error: small zero-mean Gaussian (LOS) or a strictly positive
//!    multipath bias plus heavier noise (NLOS), both growing with distance
//!
//! Pure function of geometry, environment and obstacle set; the only state
//! is the seeded random stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use swarm_types::Vec3;

// ── Environment ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Outdoor,
    Indoor,
    /// Any other label (urban, suburban, ...)
    #[serde(other)]
    Other,
}

impl Environment {
    /// Distance scale of the LOS probability, meters
    fn los_scale_m(self) -> f64 {
        match self {
            Environment::Outdoor => 500.0,
            Environment::Indoor  => 30.0,
            Environment::Other   => 150.0,
        }
    }
}

/// Spherical obstacle (building, vehicle, terrain feature)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub center: Vec3,
    pub radius: f64,
}

/// Per-link channel outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCondition {
    pub is_los:           bool,
    pub path_loss_db:     f64,
    pub rssi_dbm:         f64,
    pub delay_spread_ns:  f64,
    pub ranging_error_m:  f64,
}

// ── Channel model ─────────────────────────────────────────────────────────────

const CARRIER_GHZ: f64 = 6.5;
const LOS_SAMPLES: usize = 20;
/// Floor on link distance for the log terms (coincident nodes)
const MIN_PATH_DISTANCE_M: f64 = 1e-3;

const LOS_SHADOW_SIGMA_DB: f64 = 3.0;
const NLOS_SHADOW_SIGMA_DB: f64 = 6.0;
const LOS_RANGE_SIGMA_M: f64 = 0.10;
const NLOS_RANGE_SIGMA_M: f64 = 0.50;
const NLOS_BIAS_MIN_M: f64 = 0.3;
const NLOS_BIAS_MAX_M: f64 = 2.5;

#[derive(Debug, Clone)]
pub struct ChannelModel {
    environment: Environment,
    obstacles: Vec<Obstacle>,
    rng: StdRng,
}

impl ChannelModel {
    pub fn new(environment: Environment, obstacles: Vec<Obstacle>, seed: u64) -> Self {
        Self { environment, obstacles, rng: StdRng::seed_from_u64(seed) }
    }

    /// Full channel condition for one link.
    pub fn evaluate(&mut self, tx_pos: Vec3, rx_pos: Vec3, tx_power_dbm: f64) -> ChannelCondition {
        let distance = tx_pos.dist(&rx_pos);

        let is_los = self.determine_los(tx_pos, rx_pos);
        let path_loss_db = self.path_loss_db(distance, is_los);

        ChannelCondition {
            is_los,
            path_loss_db,
            rssi_dbm: tx_power_dbm - path_loss_db,
            delay_spread_ns: self.delay_spread_ns(distance, is_los),
            ranging_error_m: self.ranging_error_m(distance, is_los),
        }
    }

    /// True if no obstacle intersects the sampled direct path, then a
    /// Bernoulli draw against the environment's LOS probability.
    pub fn determine_los(&mut self, tx: Vec3, rx: Vec3) -> bool {
        if self.path_blocked(tx, rx) {
            return false;
        }

        let distance = tx.dist(&rx);
        let p_los = (-distance / self.environment.los_scale_m()).exp();
        self.rng.gen::<f64>() < p_los
    }

    /// Hard blockage test over LOS_SAMPLES points starting at the transmitter.
    pub fn path_blocked(&self, tx: Vec3, rx: Vec3) -> bool {
        let direction = (rx - tx).normalized();
        let total = tx.dist(&rx);

        (0..LOS_SAMPLES).any(|i| {
            let point = tx + direction * (i as f64 / LOS_SAMPLES as f64 * total);
            self.obstacles.iter().any(|obs| point.dist(&obs.center) < obs.radius)
        })
    }

    pub fn path_loss_db(&mut self, distance_m: f64, is_los: bool) -> f64 {
        let fspl_db = free_space_path_loss_db(distance_m);

        if is_los {
            fspl_db + self.gaussian(LOS_SHADOW_SIGMA_DB)
        } else {
            let d = distance_m.max(MIN_PATH_DISTANCE_M);
            let excess_db = match self.environment {
                Environment::Outdoor => 5.0 + 10.0 * (d / 10.0).log10(),
                _                    => 10.0 + 15.0 * (d / 10.0).log10(),
            };
            fspl_db + excess_db + self.gaussian(NLOS_SHADOW_SIGMA_DB)
        }
    }

    pub fn delay_spread_ns(&self, distance_m: f64, is_los: bool) -> f64 {
        if is_los {
            return 5.0 + 0.02 * distance_m;
        }
        match self.environment {
            Environment::Outdoor => 15.0 + 0.1 * distance_m,
            _                    => 25.0 + 0.3 * distance_m,
        }
    }

    /// Ranging error in meters. NLOS carries a strictly positive multipath
    /// bias; both cases scale by (1 + d/200).
    pub fn ranging_error_m(&mut self, distance_m: f64, is_los: bool) -> f64 {
        let base = if is_los {
            self.gaussian(LOS_RANGE_SIGMA_M)
        } else {
            let bias = self.rng.gen_range(NLOS_BIAS_MIN_M..NLOS_BIAS_MAX_M);
            bias + self.gaussian(NLOS_RANGE_SIGMA_M)
        };
        base * (1.0 + distance_m / 200.0)
    }

    fn gaussian(&mut self, sigma: f64) -> f64 {
        let n: f64 = self.rng.sample(StandardNormal);
        n * sigma
    }
}

/// Free-space path loss at the UWB carrier, dB
pub fn free_space_path_loss_db(distance_m: f64) -> f64 {
    let d = distance_m.max(MIN_PATH_DISTANCE_M);
    20.0 * d.log10() + 20.0 * CARRIER_GHZ.log10() + 92.45
}
