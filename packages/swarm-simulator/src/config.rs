//! config.rs — config.toml surface
//!
//! Every section is optional; missing values fall back to the stock
//! six-drone octahedron run. `[attack]` is the exception: leaving it out of
//! a file means no node turns malicious.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use swarm_types::{NodeId, Vec3, MAX_SWARM_SIZE};

use crate::channel::{Environment, Obstacle};
use crate::trajectory::{Formation, FormationGeometry};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("invalid config.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("swarm size {size} out of range (2..={max})")]
    SwarmSize { size: usize, max: usize },
    #[error("{role} id {id} is not a member of a swarm of {size}")]
    UnknownNode { role: &'static str, id: NodeId, size: usize },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("obstacle {index} has negative radius {radius}")]
    NegativeRadius { index: usize, radius: f64 },
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Root of every random stream in the run
    pub seed: u64,
    pub swarm: SwarmConfig,
    pub simulation: TimingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<AttackConfig>,
    pub channel: ChannelConfig,
    pub trajectory: TrajectoryConfig,
    pub output: OutputConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            swarm: SwarmConfig::default(),
            simulation: TimingConfig::default(),
            attack: Some(AttackConfig::default()),
            channel: ChannelConfig::default(),
            trajectory: TrajectoryConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub size: usize,
    /// Node whose broadcasts drive clock synchronization
    pub master_anchor_id: NodeId,
    /// Explicit hardware drift of nodes 0, 1, ... (ns)
    pub clock_drift_ns: Vec<f64>,
    /// Remaining nodes draw drift uniformly from ±spread (ns)
    pub drift_spread_ns: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            size: 6,
            master_anchor_id: 1,
            clock_drift_ns: vec![10_000.0],
            drift_spread_ns: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub slot_duration_s: f64,
    pub horizon_s: f64,
    /// Period of the trajectory updates
    pub motion_step_s: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { slot_duration_s: 0.005, horizon_s: 300.0, motion_step_s: 0.05 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    pub malicious_node_id: NodeId,
    pub start_s: f64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self { malicious_node_id: 0, start_s: 200.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleConfig {
    pub center: [f64; 3],
    pub radius: f64,
}

impl ObstacleConfig {
    pub fn to_obstacle(&self) -> Obstacle {
        Obstacle { center: Vec3::from_array(self.center), radius: self.radius }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub environment: Environment,
    pub tx_power_dbm: f64,
    pub obstacles: Vec<ObstacleConfig>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { environment: Environment::Outdoor, tx_power_dbm: 0.0, obstacles: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    pub formation: Formation,
    pub radius_m: f64,
    pub center: [f64; 3],
    pub velocity: [f64; 3],
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        let g = FormationGeometry::default();
        Self {
            formation: Formation::Octahedron,
            radius_m: g.radius_m,
            center: g.center.to_array(),
            velocity: g.velocity.to_array(),
        }
    }
}

impl TrajectoryConfig {
    pub fn geometry(&self) -> FormationGeometry {
        FormationGeometry {
            radius_m: self.radius_m,
            center: Vec3::from_array(self.center),
            velocity: Vec3::from_array(self.velocity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { csv_path: "tdma_security_log.csv".into() }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Config shipped with the binary
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

impl SimConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: SimConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// `path` if it exists on disk, otherwise the embedded default.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            warn!("{} not found, using built-in config", path.display());
            Self::from_toml_str(DEFAULT_CONFIG_TOML)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.swarm.size;
        if !(2..=MAX_SWARM_SIZE).contains(&size) {
            return Err(ConfigError::SwarmSize { size, max: MAX_SWARM_SIZE });
        }
        if self.swarm.master_anchor_id as usize >= size {
            return Err(ConfigError::UnknownNode {
                role: "master anchor",
                id: self.swarm.master_anchor_id,
                size,
            });
        }
        if let Some(attack) = &self.attack {
            if attack.malicious_node_id as usize >= size {
                return Err(ConfigError::UnknownNode {
                    role: "malicious node",
                    id: attack.malicious_node_id,
                    size,
                });
            }
        }

        let timing = &self.simulation;
        for (field, value) in [
            ("slot_duration_s", timing.slot_duration_s),
            ("horizon_s", timing.horizon_s),
            ("motion_step_s", timing.motion_step_s),
        ] {
            // also rejects NaN
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        for (index, obs) in self.channel.obstacles.iter().enumerate() {
            if obs.radius < 0.0 {
                return Err(ConfigError::NegativeRadius { index, radius: obs.radius });
            }
            if obs.radius == 0.0 {
                warn!("obstacle {index} has zero radius and never blocks a link");
            }
        }
        if self.swarm.clock_drift_ns.len() > size {
            warn!(
                "{} clock drifts configured for {size} nodes, extra values ignored",
                self.swarm.clock_drift_ns.len()
            );
        }
        Ok(())
    }

    /// Hardware drift per node (ns): explicit values first, then seeded
    /// uniform draws in ±drift_spread_ns.
    pub fn clock_drifts_ns(&self, drift_seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(drift_seed);
        let spread = self.swarm.drift_spread_ns.abs();
        (0..self.swarm.size)
            .map(|i| match self.swarm.clock_drift_ns.get(i) {
                Some(&d) => d,
                None if spread > 0.0 => rng.gen_range(-spread..=spread),
                None => 0.0,
            })
            .collect()
    }

    pub fn obstacles(&self) -> Vec<Obstacle> {
        self.channel.obstacles.iter().map(ObstacleConfig::to_obstacle).collect()
    }
}
