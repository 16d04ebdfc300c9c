// Protocol constants shared by every node in the swarm.
// These are protocol-level values, not per-node configuration.

/// Claimed-vs-estimated distance above which a node raises an alarm (m)
pub const ALARM_DISTANCE_M: f64 = 10.0;

/// Simultaneous range observations needed for x, y, z + clock bias
pub const MIN_OBSERVATIONS: usize = 4;

/// Net vote sum at or below which the transmitter is corrected
pub const VOTE_RECOVERY_THRESHOLD: i32 = -3;

/// Fraction of the way ground truth moves toward the recovered position
pub const RECOVERY_BLEND: f64 = 0.15;

/// Post-blend distance under which the corrected node clears its own alarms (m)
pub const RECOVERY_CLEAR_DISTANCE_M: f64 = 1.0;

/// Final GPS spoofing offset on the y axis (m)
pub const SPOOF_TARGET_OFFSET_M: f64 = 15.0;

/// Time for the spoofing offset to ramp from zero to its target (s)
pub const SPOOF_RAMP_DURATION_S: f64 = 10.0;

/// Probability a relayed observation from another anchor is lost
pub const PACKET_LOSS_RATE: f64 = 0.10;

/// Weight of the newest clock error in the offset estimate
pub const SYNC_NEW_WEIGHT: f64 = 0.8;

/// Weight of the previous offset estimate
pub const SYNC_OLD_WEIGHT: f64 = 0.2;

/// GPS noise standard deviation, horizontal axes (m)
pub const GPS_SIGMA_HORIZONTAL_M: f64 = 0.05;

/// GPS noise standard deviation, vertical axis (m)
pub const GPS_SIGMA_VERTICAL_M: f64 = 0.10;
