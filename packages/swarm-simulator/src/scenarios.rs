//! scenarios.rs — Named presets layered over the loaded config
//!
//! Each preset exercises one situation of the detection protocol. Presets
//! only touch the fields they are about; everything else (seed, swarm
//! size, output path, ...) comes from config.toml.

use serde::{Deserialize, Serialize};

use crate::channel::Environment;
use crate::config::{AttackConfig, ConfigError, ObstacleConfig, SimConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Node 0 spoofs its GPS from t = 200 s
    #[default]
    GpsSpoof,
    /// Nobody attacks; measures the false-alarm floor
    Baseline,
    /// Spoofing from t = 20 s on a 60 s horizon, for quick checks
    EarlySpoof,
    /// Indoor propagation with a ring of pillars around the formation center
    Indoor,
    /// Outdoor, with buildings standing inside the formation
    Obstructed,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::GpsSpoof,
        Scenario::Baseline,
        Scenario::EarlySpoof,
        Scenario::Indoor,
        Scenario::Obstructed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::GpsSpoof => "gps-spoof",
            Scenario::Baseline => "baseline",
            Scenario::EarlySpoof => "early-spoof",
            Scenario::Indoor => "indoor",
            Scenario::Obstructed => "obstructed",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| ConfigError::UnknownScenario(name.to_string()))
    }

    pub fn apply(self, cfg: &mut SimConfig) {
        let center = cfg.trajectory.center;
        let radius = cfg.trajectory.radius_m;

        match self {
            Scenario::GpsSpoof => {
                cfg.attack = Some(AttackConfig::default());
            }
            Scenario::Baseline => {
                cfg.attack = None;
            }
            Scenario::EarlySpoof => {
                cfg.attack = Some(AttackConfig { start_s: 20.0, ..AttackConfig::default() });
                cfg.simulation.horizon_s = 60.0;
            }
            Scenario::Indoor => {
                cfg.channel.environment = Environment::Indoor;
                // Pillars at half radius, between the hub and the equator
                cfg.channel.obstacles = (0..4)
                    .map(|k| {
                        let a = k as f64 * std::f64::consts::FRAC_PI_2 + std::f64::consts::FRAC_PI_4;
                        ObstacleConfig {
                            center: [
                                center[0] + 0.5 * radius * a.cos(),
                                center[1] + 0.5 * radius * a.sin(),
                                center[2],
                            ],
                            radius: 0.1 * radius,
                        }
                    })
                    .collect();
            }
            Scenario::Obstructed => {
                cfg.channel.environment = Environment::Outdoor;
                // Static, so the moving swarm sweeps across them
                cfg.channel.obstacles = vec![
                    ObstacleConfig { center: [center[0] + 150.0, center[1], center[2]], radius: 20.0 },
                    ObstacleConfig { center: [center[0] + 350.0, center[1] + 30.0, center[2]], radius: 25.0 },
                    ObstacleConfig { center: [center[0] + 550.0, center[1] - 30.0, center[2]], radius: 25.0 },
                ];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for s in Scenario::ALL {
            assert_eq!(Scenario::from_name(s.name()).unwrap(), s);
        }
        assert!(matches!(
            Scenario::from_name("nope"),
            Err(ConfigError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_presets_keep_config_valid() {
        for s in Scenario::ALL {
            let mut cfg = SimConfig::default();
            s.apply(&mut cfg);
            cfg.validate().unwrap();
        }
    }

    #[test]
    fn test_baseline_and_early_spoof() {
        let mut cfg = SimConfig::default();
        Scenario::Baseline.apply(&mut cfg);
        assert!(cfg.attack.is_none());

        Scenario::EarlySpoof.apply(&mut cfg);
        assert_eq!(cfg.attack.as_ref().map(|a| a.start_s), Some(20.0));
        assert_eq!(cfg.simulation.horizon_s, 60.0);
    }

    #[test]
    fn test_indoor_places_obstacles() {
        let mut cfg = SimConfig::default();
        Scenario::Indoor.apply(&mut cfg);
        assert_eq!(cfg.channel.environment, Environment::Indoor);
        assert_eq!(cfg.channel.obstacles.len(), 4);
        assert!(cfg.channel.obstacles.iter().all(|o| o.radius > 0.0));
    }
}
