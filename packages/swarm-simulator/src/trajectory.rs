//! trajectory.rs — Ground-truth motion, one pure `time → position` per node
//!
//! Every formation rides on a common center `center + velocity·t`. Node 0
//! is the tracked target: it takes the top vertex of the octahedron, and a
//! figure-eight in the other formations.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

use serde::{Deserialize, Serialize};

use swarm_types::{NodeId, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formation {
    #[default]
    Octahedron,
    CircularPatrol,
    AtomicShell,
}

/// Shape parameters shared by every trajectory of a formation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationGeometry {
    pub radius_m: f64,
    pub center: Vec3,
    pub velocity: Vec3,
}

impl Default for FormationGeometry {
    fn default() -> Self {
        Self {
            radius_m: 80.0,
            center: Vec3::new(100.0, 0.0, 50.0),
            velocity: Vec3::new(2.5, 0.0, 0.0),
        }
    }
}

impl FormationGeometry {
    pub fn center_at(&self, t: f64) -> Vec3 {
        self.center + self.velocity * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Path {
    /// Vertex `id mod 6`, equatorial vertices rotating at 0.2 rad/s
    Octahedron { id: NodeId },
    /// Evenly spaced on a horizontal ring, one lap per minute
    CircularPatrol { id: NodeId, start_angle: f64 },
    /// Circular orbit in a plane tilted by `inclination` about x
    AtomicShell { inclination: f64, phase: f64 },
    FigureEight,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    path: Path,
    geometry: FormationGeometry,
}

impl Trajectory {
    /// Trajectory of node `id` in a swarm of `total` flying `formation`.
    pub fn for_node(
        formation: Formation,
        id: NodeId,
        total: usize,
        geometry: FormationGeometry,
    ) -> Self {
        let path = match (formation, id) {
            (Formation::Octahedron, _) => Path::Octahedron { id },
            (_, 0) => Path::FigureEight,
            (Formation::CircularPatrol, _) => {
                let step = TAU / (total.saturating_sub(1).max(1)) as f64;
                Path::CircularPatrol { id, start_angle: (id as f64 - 1.0) * step }
            }
            (Formation::AtomicShell, _) => {
                let inclination = match id % 3 {
                    0 => 0.0,
                    1 => FRAC_PI_2,
                    _ => FRAC_PI_4,
                };
                Path::AtomicShell { inclination, phase: id as f64 * TAU / total.max(1) as f64 }
            }
        };
        Self { path, geometry }
    }

    pub fn position_at(&self, t: f64) -> Vec3 {
        let center = self.geometry.center_at(t);
        let r = self.geometry.radius_m;

        let local = match self.path {
            Path::Octahedron { id } => {
                let theta = 0.2 * t;
                let mut p = match id % 6 {
                    0 => Vec3::new(0.0, 0.0, r),
                    1 => Vec3::new(0.0, 0.0, -r),
                    k => {
                        let a = theta + (k - 2) as f64 * FRAC_PI_2;
                        Vec3::new(r * a.cos(), r * a.sin(), 0.0)
                    }
                };
                if id >= 2 {
                    p.z += 10.0 * (0.5 * t + id as f64).sin();
                }
                p
            }
            Path::CircularPatrol { id, start_angle } => {
                let angle = start_angle + TAU / 60.0 * t;
                let z = if id % 2 == 0 { 15.0 } else { -15.0 };
                Vec3::new(r * angle.cos(), r * angle.sin(), z)
            }
            Path::AtomicShell { inclination, phase } => {
                let angle = TAU / 50.0 * t + phase;
                let (bx, by) = (r * angle.cos(), r * angle.sin());
                let mut p = Vec3::new(bx, by * inclination.cos(), by * inclination.sin());
                if inclination == 0.0 {
                    p.z += 15.0 * (2.0 * angle).sin();
                }
                p
            }
            Path::FigureEight => {
                let w = TAU / 40.0;
                Vec3::new(70.0 * (w * t).sin(), 30.0 * (2.0 * w * t).sin(), 10.0 * (w * t).cos())
            }
        };

        center + local
    }
}
