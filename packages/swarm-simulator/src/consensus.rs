//! consensus.rs — Vote tally and robust position recovery
//!
//! After every slot the non-transmitting nodes each cast one vote on the
//! transmitter's claim (the transmitter's bit in their trust mask). A net
//! sum at or below VOTE_RECOVERY_THRESHOLD triggers recovery toward the
//! coordinate-wise median of the peers' independent estimates.

use std::cmp::Ordering;

use swarm_types::{NodeId, Vec3};

use crate::constants::VOTE_RECOVERY_THRESHOLD;
use crate::node::Node;

/// Votes and estimates gathered about one transmitter in one slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteTally {
    pub sender_id: NodeId,
    /// +1 per trusting observer, −1 per distrusting observer
    pub sum: i32,
    pub trusting: u32,
    pub distrusting: u32,
    /// Each observer's estimate of the sender, in node order
    pub estimates: Vec<Vec3>,
}

impl VoteTally {
    pub fn should_recover(&self) -> bool {
        should_recover(self.sum)
    }

    /// Coordinate-wise median of the collected estimates
    pub fn median_estimate(&self) -> Vec3 {
        coordinate_median(&self.estimates)
    }
}

/// Poll every node except the sender.
pub fn tally(nodes: &[Node], sender_id: NodeId) -> VoteTally {
    let mut out = VoteTally { sender_id, ..Default::default() };

    for observer in nodes.iter().filter(|n| n.id() != sender_id) {
        out.estimates.push(observer.estimated_position_of(sender_id));

        if observer.vote_mask().trusts(sender_id) {
            out.sum += 1;
            out.trusting += 1;
        } else {
            out.sum -= 1;
            out.distrusting += 1;
        }
    }
    out
}

pub fn should_recover(vote_sum: i32) -> bool {
    vote_sum <= VOTE_RECOVERY_THRESHOLD
}

/// Coordinate-wise median. Even counts average the two middle values;
/// an empty set yields the origin.
pub fn coordinate_median(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::zero();
    }
    Vec3::new(
        median_of(points.iter().map(|p| p.x).collect()),
        median_of(points.iter().map(|p| p.y).collect()),
        median_of(points.iter().map(|p| p.z).collect()),
    )
}

fn median_of(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
