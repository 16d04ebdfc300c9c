//! loss.rs — Lossy relay of a slot's observation packet
//!
//! Every receiver keeps its own measurement; each other anchor's observation
//! reaches it independently with probability 1 − loss_rate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use swarm_types::{NodeId, RangingObservation};

use crate::constants::PACKET_LOSS_RATE;

/// Relay counters over the lifetime of the model (own observations excluded)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeliveryStats {
    pub offered: u64,
    pub delivered: u64,
}

impl DeliveryStats {
    pub fn delivery_rate(&self) -> f64 {
        if self.offered == 0 { return 1.0; }
        self.delivered as f64 / self.offered as f64
    }
}

#[derive(Debug, Clone)]
pub struct LossModel {
    loss_rate: f64,
    rng: StdRng,
    stats: DeliveryStats,
}

impl LossModel {
    pub fn new(seed: u64) -> Self {
        Self::with_rate(PACKET_LOSS_RATE, seed)
    }

    pub fn with_rate(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate: loss_rate.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
            stats: DeliveryStats::default(),
        }
    }

    pub fn stats(&self) -> DeliveryStats { self.stats }

    /// Subset of `packet` that reaches `receiver_id`, in packet order.
    pub fn distribute(
        &mut self,
        packet: &[RangingObservation],
        receiver_id: NodeId,
    ) -> Vec<RangingObservation> {
        let mut out = Vec::with_capacity(packet.len());
        for obs in packet {
            if obs.anchor_id == receiver_id {
                out.push(*obs);
                continue;
            }
            self.stats.offered += 1;
            if self.rng.gen::<f64>() >= self.loss_rate {
                self.stats.delivered += 1;
                out.push(*obs);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_types::Vec3;

    fn packet(anchors: std::ops::Range<u32>) -> Vec<RangingObservation> {
        anchors
            .map(|a| RangingObservation {
                target_id: 0,
                anchor_id: a,
                anchor_position: Vec3::new(a as f64, 0.0, 0.0),
                toa_s: 1.0,
                is_los: true,
            })
            .collect()
    }

    #[test]
    fn test_own_observation_always_delivered() {
        let mut loss = LossModel::with_rate(1.0, 3);
        let got = loss.distribute(&packet(1..6), 3);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].anchor_id, 3);
    }

    #[test]
    fn test_zero_loss_delivers_everything() {
        let mut loss = LossModel::with_rate(0.0, 3);
        assert_eq!(loss.distribute(&packet(1..6), 9).len(), 5);
    }

    #[test]
    fn test_empirical_delivery_rate_near_ninety_percent() {
        let mut loss = LossModel::new(42);
        let pkt = packet(1..6);
        for _ in 0..10_000 {
            for rx in 1..6 {
                loss.distribute(&pkt, rx);
            }
        }
        let stats = loss.stats();
        assert_eq!(stats.offered, 10_000 * 5 * 4);
        assert!((stats.delivery_rate() - 0.9).abs() < 0.005, "rate {}", stats.delivery_rate());
    }
}
