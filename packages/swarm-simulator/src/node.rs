//! node.rs — One member of the swarm
//!
//! A node owns:
//! - ground-truth position (written by the trajectory collaborator and by
//!   `recover`)
//! - a GPS noise model, plus a ramped spoofing offset once malicious
//! - hardware clock drift (physical) and a software clock offset (sync)
//! - one NeighborFilter + alarm flag per peer, created on first contact
//!
//! All operations act on the node's own state only; cross-node sequencing is
//! the scheduler's job.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use swarm_types::{BroadcastMessage, NodeId, RangingObservation, Vec3, VoteMask};

use crate::constants::{
    ALARM_DISTANCE_M, GPS_SIGMA_HORIZONTAL_M, GPS_SIGMA_VERTICAL_M, MIN_OBSERVATIONS,
    RECOVERY_BLEND, RECOVERY_CLEAR_DISTANCE_M, SPOOF_RAMP_DURATION_S, SPOOF_TARGET_OFFSET_M,
    SYNC_NEW_WEIGHT, SYNC_OLD_WEIGHT,
};
use crate::ekf::NeighborFilter;

/// Filter and trust state this node keeps about one peer
#[derive(Debug, Clone)]
struct PeerTrack {
    filter: NeighborFilter,
    last_update_s: f64,
    alarm: bool,
}

impl PeerTrack {
    fn new(seed_position: Vec3) -> Self {
        Self { filter: NeighborFilter::new(seed_position), last_update_s: 0.0, alarm: false }
    }
}

/// True when the estimate is strictly farther than the alarm distance
pub fn exceeds_alarm_distance(estimate: Vec3, claimed: Vec3) -> bool {
    estimate.dist(&claimed) > ALARM_DISTANCE_M
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    position: Vec3,
    malicious: bool,
    attack_start_s: f64,
    /// Physical clock error, nanoseconds
    clock_drift_ns: f64,
    /// Software correction from the sync sub-protocol, seconds
    clock_offset_s: f64,
    gps_rng: StdRng,
    peers: BTreeMap<NodeId, PeerTrack>,
}

impl Node {
    pub fn new(id: NodeId, gps_seed: u64) -> Self {
        Self {
            id,
            position: Vec3::zero(),
            malicious: false,
            attack_start_s: 0.0,
            clock_drift_ns: 0.0,
            clock_offset_s: 0.0,
            gps_rng: StdRng::seed_from_u64(gps_seed),
            peers: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NodeId { self.id }

    // ── Ground truth ──────────────────────────────────────────────────────────

    pub fn true_position(&self) -> Vec3 { self.position }

    pub fn set_position(&mut self, position: Vec3) { self.position = position; }

    // ── Attack state ──────────────────────────────────────────────────────────

    /// Attack onset is recorded on the false→true edge only.
    pub fn set_malicious(&mut self, malicious: bool, now: f64) {
        if malicious && !self.malicious {
            self.attack_start_s = now;
        }
        self.malicious = malicious;
    }

    pub fn is_malicious(&self) -> bool { self.malicious }

    pub fn attack_start_s(&self) -> f64 { self.attack_start_s }

    /// Spoofing offset on the y axis: ramps linearly to its target over the
    /// ramp duration, zero while honest.
    pub fn spoof_offset_m(&self, now: f64) -> f64 {
        if !self.malicious { return 0.0; }
        let progress = ((now - self.attack_start_s) / SPOOF_RAMP_DURATION_S).clamp(0.0, 1.0);
        SPOOF_TARGET_OFFSET_M * progress
    }

    /// Ground truth + fresh GPS noise (+ spoofing offset when malicious)
    pub fn reported_position(&mut self, now: f64) -> Vec3 {
        let noise = Vec3::new(
            self.gaussian(GPS_SIGMA_HORIZONTAL_M),
            self.gaussian(GPS_SIGMA_HORIZONTAL_M),
            self.gaussian(GPS_SIGMA_VERTICAL_M),
        );
        let mut reported = self.position + noise;
        reported.y += self.spoof_offset_m(now);
        reported
    }

    // ── Clock ─────────────────────────────────────────────────────────────────

    pub fn set_clock_drift_ns(&mut self, drift_ns: f64) { self.clock_drift_ns = drift_ns; }
    pub fn clock_drift_ns(&self) -> f64 { self.clock_drift_ns }
    pub fn clock_drift_s(&self) -> f64 { self.clock_drift_ns * 1e-9 }

    pub fn clock_offset_s(&self) -> f64 { self.clock_offset_s }

    /// Fold a freshly measured clock error into the offset estimate
    pub fn synchronize(&mut self, clock_error_s: f64) {
        self.clock_offset_s = SYNC_OLD_WEIGHT * self.clock_offset_s + SYNC_NEW_WEIGHT * clock_error_s;
    }

    // ── Protocol operations ───────────────────────────────────────────────────

    /// Message for this node's TDMA slot; timestamp carries hardware drift
    pub fn create_broadcast(&mut self, now: f64) -> BroadcastMessage {
        let now_ps = (now * 1e12).round() as u64;
        let drift_ps = (self.clock_drift_ns * 1e3).round() as i64;
        BroadcastMessage {
            sender_id: self.id,
            tx_timestamp_ps: now_ps.saturating_add_signed(drift_ps),
            gps_position: self.reported_position(now),
            vote_mask: self.vote_mask(),
        }
    }

    /// Track `sender_id` from this slot's observations and re-evaluate its
    /// alarm. Returns true if the filter ran predict + update.
    ///
    /// - self-observations are ignored
    /// - first contact seeds the filter at `claimed` with the alarm cleared
    /// - under MIN_OBSERVATIONS the call stops after the lazy init
    /// - a non-positive dt since the last update skips predict and update
    pub fn update_neighbor(
        &mut self,
        sender_id: NodeId,
        claimed: Vec3,
        observations: &[RangingObservation],
        now: f64,
        tx_time_s: f64,
    ) -> bool {
        if sender_id == self.id { return false; }

        let track = self.peers.entry(sender_id).or_insert_with(|| PeerTrack::new(claimed));

        if observations.len() < MIN_OBSERVATIONS { return false; }

        let dt = now - track.last_update_s;
        let updated = dt > 0.0;
        if updated {
            track.filter.predict(dt);
            track.filter.update(observations, tx_time_s);
            track.last_update_s = now;
        }

        let estimate = track.filter.position();
        let alarm = exceeds_alarm_distance(estimate, claimed);
        if alarm && !track.alarm {
            debug!(
                "node {} alarms on node {sender_id}: |est - claim| = {:.2} m",
                self.id,
                estimate.dist(&claimed)
            );
        }
        track.alarm = alarm;
        updated
    }

    /// All bits set except those of alarmed peers
    pub fn vote_mask(&self) -> VoteMask {
        let mut mask = VoteMask::ALL_TRUST;
        for (&peer, track) in &self.peers {
            if track.alarm {
                mask.distrust(peer);
            }
        }
        mask
    }

    /// Blend ground truth toward a peer-computed position. When the result
    /// lands within the clear distance, this node's own alarms are cleared
    /// (observers' alarms about this node are untouched). Returns true if
    /// alarms were cleared.
    pub fn recover(&mut self, recovered: Vec3) -> bool {
        self.position = self.position.lerp(&recovered, RECOVERY_BLEND);

        if self.position.dist(&recovered) < RECOVERY_CLEAR_DISTANCE_M {
            for track in self.peers.values_mut() {
                track.alarm = false;
            }
            return true;
        }
        false
    }

    // ── Read accessors ────────────────────────────────────────────────────────

    /// This node's estimate of `peer`, or the origin if never tracked
    pub fn estimated_position_of(&self, peer: NodeId) -> Vec3 {
        self.peers.get(&peer).map(|t| t.filter.position()).unwrap_or_default()
    }

    pub fn is_alarmed_for(&self, peer: NodeId) -> bool {
        self.peers.get(&peer).map(|t| t.alarm).unwrap_or(false)
    }

    pub fn filter_for(&self, peer: NodeId) -> Option<&NeighborFilter> {
        self.peers.get(&peer).map(|t| &t.filter)
    }

    pub fn alarm_count(&self) -> usize {
        self.peers.values().filter(|t| t.alarm).count()
    }

    fn gaussian(&mut self, sigma: f64) -> f64 {
        let n: f64 = self.gps_rng.sample(StandardNormal);
        n * sigma
    }
}
