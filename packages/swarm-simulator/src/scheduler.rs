//! scheduler.rs — TDMA slot state machine
//!
//! One transmitter per slot, round-robin over the swarm. A slot runs to
//! completion before the next begins:
//!   1. transmitter builds its broadcast
//!   2. every receiver gets a channel draw on true positions and a raw ToA
//!   3. master slot: receivers fold the arrival error into their clock
//!      offset and no observation is produced
//!      other slots: synchronized ToA → RangingObservation (receiver = anchor)
//!   4. lossy relay of the packet, then every receiver updates its filter
//!   5. vote tally; at or below the threshold the transmitter is recovered
//!      toward the median of the peer estimates
//!
//! Node `i` must sit at index `i` of the node slice.

use tracing::debug;

use swarm_types::{NodeId, RangingObservation, Vec3, SPEED_OF_LIGHT};

use crate::channel::ChannelModel;
use crate::consensus::{self, VoteTally};
use crate::loss::{DeliveryStats, LossModel};
use crate::node::Node;

/// One observer's view of the transmitter after the slot's updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverView {
    pub observer_id: NodeId,
    pub estimate: Vec3,
    pub alarm: bool,
}

/// Everything a slot produced
#[derive(Debug, Clone)]
pub struct SlotOutcome {
    pub time: f64,
    pub slot_index: u64,
    pub sender_id: NodeId,
    /// GPS position carried in the broadcast
    pub claimed: Vec3,
    /// Sender ground truth when the slot started (what the channel saw)
    pub slot_truth: Vec3,
    /// Sender ground truth, read after any recovery
    pub truth: Vec3,
    /// True when this was a master clock-sync slot
    pub sync_slot: bool,
    /// Observations built for the packet (0 on sync slots)
    pub observations: usize,
    /// Receivers whose filter ran predict + update
    pub filter_updates: usize,
    pub tally: VoteTally,
    pub recovered: Option<Vec3>,
    /// Recovery brought the sender close enough to clear its own alarms
    pub alarms_cleared: bool,
    pub observers: Vec<ObserverView>,
}

impl SlotOutcome {
    /// Recovered position if recovery fired, otherwise the claim
    pub fn resolved_position(&self) -> Vec3 {
        self.recovered.unwrap_or(self.claimed)
    }
}

#[derive(Debug, Clone)]
pub struct SlotScheduler {
    slot_index: u64,
    master_id: NodeId,
    tx_power_dbm: f64,
    loss: LossModel,
}

impl SlotScheduler {
    pub fn new(master_id: NodeId, tx_power_dbm: f64, loss: LossModel) -> Self {
        Self { slot_index: 0, master_id, tx_power_dbm, loss }
    }

    pub fn slot_index(&self) -> u64 { self.slot_index }
    pub fn master_id(&self) -> NodeId { self.master_id }
    pub fn delivery_stats(&self) -> DeliveryStats { self.loss.stats() }

    /// Transmitter of the next slot for a swarm of `swarm_size`
    pub fn next_sender(&self, swarm_size: usize) -> Option<NodeId> {
        if swarm_size == 0 { return None; }
        Some((self.slot_index % swarm_size as u64) as NodeId)
    }

    /// Run one slot at simulated time `now`. `None` for an empty swarm.
    pub fn execute_slot(
        &mut self,
        now: f64,
        nodes: &mut [Node],
        channel: &mut ChannelModel,
    ) -> Option<SlotOutcome> {
        let tx_idx = self.next_sender(nodes.len())? as usize;
        let slot_index = self.slot_index;
        self.slot_index += 1;

        let msg = nodes[tx_idx].create_broadcast(now);
        let tx_id = msg.sender_id;
        let tx_time = msg.tx_time_s();
        let tx_true = nodes[tx_idx].true_position();
        let sync_slot = tx_id == self.master_id;

        // ── Physical layer ────────────────────────────────────────────────────
        let mut packet: Vec<RangingObservation> = Vec::with_capacity(nodes.len());
        for rx in nodes.iter_mut().filter(|n| n.id() != tx_id) {
            let rx_true = rx.true_position();
            let cond = channel.evaluate(tx_true, rx_true, self.tx_power_dbm);
            let raw_toa = now
                + tx_true.dist(&rx_true) / SPEED_OF_LIGHT
                + cond.ranging_error_m / SPEED_OF_LIGHT
                + rx.clock_drift_s();
            let anchor_position = rx.reported_position(now);

            if sync_slot {
                let expected = tx_time + msg.gps_position.dist(&anchor_position) / SPEED_OF_LIGHT;
                rx.synchronize(raw_toa - expected);
                continue;
            }

            packet.push(RangingObservation {
                target_id: tx_id,
                anchor_id: rx.id(),
                anchor_position,
                toa_s: raw_toa - rx.clock_offset_s(),
                is_los: cond.is_los,
            });
        }

        // ── Relay + filter updates ────────────────────────────────────────────
        let mut filter_updates = 0;
        for rx in nodes.iter_mut().filter(|n| n.id() != tx_id) {
            let subset = self.loss.distribute(&packet, rx.id());
            if rx.update_neighbor(tx_id, msg.gps_position, &subset, now, tx_time) {
                filter_updates += 1;
            }
        }

        // ── Vote + recovery ───────────────────────────────────────────────────
        let tally = consensus::tally(nodes, tx_id);
        let mut alarms_cleared = false;
        let recovered = if tally.should_recover() {
            let target = tally.median_estimate();
            alarms_cleared = nodes[tx_idx].recover(target);
            debug!(
                "t={now:.3}s node {tx_id} recovered toward ({:.2}, {:.2}, {:.2}), vote sum {}",
                target.x, target.y, target.z, tally.sum
            );
            Some(target)
        } else {
            None
        };

        let observers = nodes
            .iter()
            .filter(|n| n.id() != tx_id)
            .map(|n| ObserverView {
                observer_id: n.id(),
                estimate: n.estimated_position_of(tx_id),
                alarm: n.is_alarmed_for(tx_id),
            })
            .collect();

        Some(SlotOutcome {
            time: now,
            slot_index,
            sender_id: tx_id,
            claimed: msg.gps_position,
            slot_truth: tx_true,
            truth: nodes[tx_idx].true_position(),
            sync_slot,
            observations: packet.len(),
            filter_updates,
            tally,
            recovered,
            alarms_cleared,
            observers,
        })
    }
}
