//! swarm.rs — The drones and their ground-truth motion
//!
//! Owns every Node (node `i` at index `i`) together with its trajectory.
//! Motion ticks are independent of the TDMA slots: the simulation calls
//! `advance_motion` on its own fixed step and the slot loop only ever reads
//! the resulting positions.

use swarm_types::NodeId;

use crate::node::Node;
use crate::trajectory::Trajectory;

pub struct Swarm {
    nodes: Vec<Node>,
    trajectories: Vec<Trajectory>,
    t_motion: f64,
}

/// Per-node construction inputs
#[derive(Debug, Clone)]
pub struct NodeSetup {
    pub trajectory: Trajectory,
    pub clock_drift_ns: f64,
    pub gps_seed: u64,
}

impl Swarm {
    /// Node ids follow the order of `setups`; positions start at t = 0.
    pub fn new(setups: Vec<NodeSetup>) -> Self {
        let mut nodes = Vec::with_capacity(setups.len());
        let mut trajectories = Vec::with_capacity(setups.len());

        for (i, setup) in setups.into_iter().enumerate() {
            let mut node = Node::new(i as NodeId, setup.gps_seed);
            node.set_clock_drift_ns(setup.clock_drift_ns);
            node.set_position(setup.trajectory.position_at(0.0));
            nodes.push(node);
            trajectories.push(setup.trajectory);
        }

        Self { nodes, trajectories, t_motion: 0.0 }
    }

    /// Move every node to its trajectory position at `t`.
    pub fn advance_motion(&mut self, t: f64) {
        for (node, traj) in self.nodes.iter_mut().zip(&self.trajectories) {
            node.set_position(traj.position_at(t));
        }
        self.t_motion = t;
    }

    /// Time of the last motion tick
    pub fn t_motion(&self) -> f64 { self.t_motion }

    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn nodes(&self) -> &[Node] { &self.nodes }
    pub fn nodes_mut(&mut self) -> &mut [Node] { &mut self.nodes }

    pub fn node(&self, id: NodeId) -> Option<&Node> { self.nodes.get(id as usize) }
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> { self.nodes.get_mut(id as usize) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{Formation, FormationGeometry};
    use swarm_types::Vec3;

    fn swarm() -> Swarm {
        let g = FormationGeometry::default();
        Swarm::new(
            (0..6)
                .map(|id| NodeSetup {
                    trajectory: Trajectory::for_node(Formation::Octahedron, id, 6, g),
                    clock_drift_ns: id as f64 * 10.0,
                    gps_seed: id as u64,
                })
                .collect(),
        )
    }

    #[test]
    fn test_initial_positions_at_time_zero() {
        let s = swarm();
        assert_eq!(s.len(), 6);
        assert_eq!(s.node(0).unwrap().true_position(), Vec3::new(100.0, 0.0, 130.0));
        assert_eq!(s.node(3).unwrap().clock_drift_ns(), 30.0);
        assert_eq!(s.node(4).unwrap().id(), 4);
    }

    #[test]
    fn test_motion_tick_follows_trajectory() {
        let mut s = swarm();
        s.advance_motion(4.0);
        assert_eq!(s.t_motion(), 4.0);
        for (node, traj) in s.nodes().iter().zip(&s.trajectories) {
            assert_eq!(node.true_position(), traj.position_at(4.0));
        }
    }

    #[test]
    fn test_recovered_node_is_overwritten_by_next_tick() {
        let mut s = swarm();
        s.node_mut(0).unwrap().recover(Vec3::zero());
        assert_ne!(s.node(0).unwrap().true_position(), Vec3::new(100.0, 0.0, 130.0));
        s.advance_motion(0.0);
        assert_eq!(s.node(0).unwrap().true_position(), Vec3::new(100.0, 0.0, 130.0));
    }
}
