//! # swarm-types
//!
//! Shared message structures for the TDoA swarm localization simulator.
//!
//! These types are used by:
//! - `swarm-simulator`: the TDMA slot loop, per-neighbor EKF bank and vote tally
//! - any offline tooling that replays or inspects a recorded run
//!
//! ## Coordinate Conventions
//!
//! - **World frame**: local Cartesian, meters (x, y horizontal, z up)
//! - **Clock bias**: expressed in distance units (seconds × speed of light)
//!
//! ## Vote packing
//! A node's trust in its peers travels as a single 32-bit mask where the bit
//! index equals the peer's node id. Swarms are therefore capped at
//! [`MAX_SWARM_SIZE`] members.

use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Speed of light in vacuum, m/s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Largest swarm a [`VoteMask`] can describe
pub const MAX_SWARM_SIZE: usize = 32;

/// Stable node identity, also the node's bit index in a [`VoteMask`]
pub type NodeId = u32;

// ── 3D Vector ─────────────────────────────────────────────────────────────────

/// 3D vector in the world frame, meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }
    pub const fn zero() -> Self { Self { x: 0.0, y: 0.0, z: 0.0 } }

    pub fn from_array(a: [f64; 3]) -> Self { Self::new(a[0], a[1], a[2]) }
    pub fn to_array(self) -> [f64; 3] { [self.x, self.y, self.z] }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
    pub fn norm(&self) -> f64 { self.dot(self).sqrt() }
    pub fn dist(&self, other: &Vec3) -> f64 { (*self - *other).norm() }

    /// Unit vector in the same direction, or zero for a zero-length vector
    pub fn normalized(&self) -> Vec3 {
        let n = self.norm();
        if n > 0.0 { *self * (1.0 / n) } else { Vec3::zero() }
    }

    /// Linear interpolation: `self` at t=0, `other` at t=1
    pub fn lerp(&self, other: &Vec3, t: f64) -> Vec3 {
        *self * (1.0 - t) + *other * t
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 { Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z) }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, o: Vec3) {
        self.x += o.x;
        self.y += o.y;
        self.z += o.z;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 { Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z) }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 { Vec3::new(self.x * s, self.y * s, self.z * s) }
}

// ── Vote Mask ─────────────────────────────────────────────────────────────────

/// Per-node trust vector: bit `i` set = trusts node `i`'s last claimed position.
///
/// Ids at or above [`MAX_SWARM_SIZE`] have no bit; they read as trusted and
/// cannot be distrusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMask(pub u32);

impl VoteMask {
    pub const ALL_TRUST: VoteMask = VoteMask(u32::MAX);

    /// Clear the bit of `peer`
    pub fn distrust(&mut self, peer: NodeId) {
        if (peer as usize) < MAX_SWARM_SIZE {
            self.0 &= !(1u32 << peer);
        }
    }

    pub fn trusts(&self, peer: NodeId) -> bool {
        if (peer as usize) >= MAX_SWARM_SIZE { return true; }
        (self.0 >> peer) & 1 == 1
    }

    pub fn bits(&self) -> u32 { self.0 }

    /// Number of peers this mask distrusts
    pub fn distrust_count(&self) -> u32 { self.0.count_zeros() }
}

impl Default for VoteMask {
    fn default() -> Self { Self::ALL_TRUST }
}

// ── TDMA Broadcast ────────────────────────────────────────────────────────────

/// Message a node multicasts in its own TDMA slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub sender_id: NodeId,
    /// Transmit timestamp in picoseconds, sender's hardware drift applied
    pub tx_timestamp_ps: u64,
    /// Sender's GPS-reported (possibly spoofed) position
    pub gps_position: Vec3,
    /// Sender's trust in every other node
    pub vote_mask: VoteMask,
}

impl BroadcastMessage {
    /// Transmit timestamp in seconds
    pub fn tx_time_s(&self) -> f64 { self.tx_timestamp_ps as f64 / 1e12 }
}

// ── Ranging Observation ───────────────────────────────────────────────────────

/// One receiver's synchronized time of arrival of a target's broadcast.
/// Built per slot per receiving link and consumed by the target's filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangingObservation {
    /// Node whose broadcast was received
    pub target_id: NodeId,
    /// Receiving node, acting as anchor
    pub anchor_id: NodeId,
    /// Anchor's own claimed (GPS) position at reception
    pub anchor_position: Vec3,
    /// Time of arrival in seconds, corrected by the anchor's clock offset
    pub toa_s: f64,
    pub is_los: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_mask_clears_only_distrusted_bit() {
        let mut mask = VoteMask::ALL_TRUST;
        mask.distrust(4);
        assert_eq!(mask.bits(), 0xFFFF_FFFF & !(1 << 4));
        assert!(!mask.trusts(4));
        assert!(mask.trusts(3));
        assert_eq!(mask.distrust_count(), 1);
    }

    #[test]
    fn test_vote_mask_ignores_ids_beyond_width() {
        let mut mask = VoteMask::default();
        mask.distrust(40);
        assert_eq!(mask, VoteMask::ALL_TRUST);
        assert!(mask.trusts(40));
    }

    #[test]
    fn test_tx_time_from_picoseconds() {
        let msg = BroadcastMessage {
            sender_id: 2,
            tx_timestamp_ps: 1_500_000_000_000,
            gps_position: Vec3::zero(),
            vote_mask: VoteMask::ALL_TRUST,
        };
        assert!((msg.tx_time_s() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_vec3_helpers() {
        let a = Vec3::new(1.0, 2.0, 2.0);
        assert!((a.norm() - 3.0).abs() < 1e-12);
        assert_eq!(Vec3::zero().normalized(), Vec3::zero());
        let mid = Vec3::zero().lerp(&Vec3::new(2.0, 0.0, 0.0), 0.5);
        assert_eq!(mid, Vec3::new(1.0, 0.0, 0.0));
    }
}
