//! ekf.rs — Per-neighbor TDoA Extended Kalman Filter
//!
//! Every node keeps one filter per peer it tracks. The filter state is
//!   [x, y, z, vx, vy, vz, b]
//! where `b` is the peer's clock bias expressed in meters (seconds × c).
//!
//! Model:
//! - Constant-velocity transition, `x' = F x`, `P' = F P Fᵀ + Q`
//! - Pseudorange observation per anchor:
//!     z_i = (toa_i − tx_timestamp) · c
//!     h_i = ‖p − a_i‖ + b
//!   Jacobian row: unit vector anchor→estimate on the position columns,
//!   zeros on velocity, 1 on the bias column.
//!
//! Measurement noise is isotropic and does not depend on LOS/NLOS.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use swarm_types::{RangingObservation, Vec3, SPEED_OF_LIGHT};

const STATE_DIM: usize = 7;
const BIAS: usize = 6;

/// Initial position variance (m²), diffuse around the seed position
const INIT_POSITION_VAR: f64 = 5.0;
/// Initial velocity variance (m²/s²)
const INIT_VELOCITY_VAR: f64 = 1.0;
/// Initial clock-bias variance (m²); bias is unconstrained at first contact
const INIT_BIAS_VAR: f64 = 500.0;
/// Process noise on the bias state
const BIAS_PROCESS_VAR: f64 = 1.0;
/// Pseudorange measurement variance (m²), same for every observation
const MEASUREMENT_VAR: f64 = 2.0;
/// Added to geometric distance before dividing (coincident points)
const DIST_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct NeighborFilter {
    state: DVector<f64>,
    cov: DMatrix<f64>,
    process_noise: DMatrix<f64>,
}

impl Default for NeighborFilter {
    fn default() -> Self {
        Self {
            state: DVector::zeros(STATE_DIM),
            cov: DMatrix::identity(STATE_DIM, STATE_DIM),
            process_noise: DMatrix::identity(STATE_DIM, STATE_DIM),
        }
    }
}

impl NeighborFilter {
    /// Filter seeded at `seed_position` with zero velocity and zero bias.
    pub fn new(seed_position: Vec3) -> Self {
        let mut filter = Self::default();
        filter.init(seed_position);
        filter
    }

    /// Reset to `[seed_position, 0, 0, 0, 0]` with diffuse covariance.
    pub fn init(&mut self, seed_position: Vec3) {
        self.state = DVector::zeros(STATE_DIM);
        self.state[0] = seed_position.x;
        self.state[1] = seed_position.y;
        self.state[2] = seed_position.z;

        self.cov = DMatrix::identity(STATE_DIM, STATE_DIM);
        for i in 0..3 {
            self.cov[(i, i)] = INIT_POSITION_VAR;
            self.cov[(i + 3, i + 3)] = INIT_VELOCITY_VAR;
        }
        self.cov[(BIAS, BIAS)] = INIT_BIAS_VAR;

        self.process_noise = DMatrix::identity(STATE_DIM, STATE_DIM);
        self.process_noise[(BIAS, BIAS)] = BIAS_PROCESS_VAR;
    }

    /// Constant-velocity prediction. No-op for `dt <= 0` (duplicate or
    /// out-of-order slot).
    pub fn predict(&mut self, dt: f64) {
        if dt <= 0.0 { return; }

        let mut f = DMatrix::identity(STATE_DIM, STATE_DIM);
        f[(0, 3)] = dt;
        f[(1, 4)] = dt;
        f[(2, 5)] = dt;

        self.state = &f * &self.state;
        self.cov = &f * &self.cov * f.transpose() + &self.process_noise;
    }

    /// Pseudorange correction from simultaneous observations of one broadcast.
    ///
    /// Observability needs at least four observations; that floor is
    /// enforced by the caller. Empty input is a no-op, and so is a singular
    /// innovation covariance (prior is kept).
    pub fn update(&mut self, observations: &[RangingObservation], tx_time_s: f64) {
        if observations.is_empty() { return; }

        let n = observations.len();
        let est = self.position();
        let est_bias = self.state[BIAS];

        let mut z = DVector::zeros(n);
        let mut h = DVector::zeros(n);
        let mut jac = DMatrix::zeros(n, STATE_DIM);

        for (i, obs) in observations.iter().enumerate() {
            let anchor = obs.anchor_position;
            z[i] = (obs.toa_s - tx_time_s) * SPEED_OF_LIGHT;

            let geo_dist = est.dist(&anchor);
            h[i] = geo_dist + est_bias;

            let safe_dist = geo_dist + DIST_EPSILON;
            jac[(i, 0)] = (est.x - anchor.x) / safe_dist;
            jac[(i, 1)] = (est.y - anchor.y) / safe_dist;
            jac[(i, 2)] = (est.z - anchor.z) / safe_dist;
            jac[(i, BIAS)] = 1.0;
        }

        let innovation = z - h;
        let r = DMatrix::identity(n, n) * MEASUREMENT_VAR;
        let s = &jac * &self.cov * jac.transpose() + r;

        let Some(s_inv) = s.try_inverse() else {
            debug!("Innovation covariance singular, skipping update ({n} observations)");
            return;
        };

        let gain = &self.cov * jac.transpose() * s_inv;
        self.state += &gain * innovation;

        let i_kh = DMatrix::identity(STATE_DIM, STATE_DIM) - &gain * &jac;
        let cov = i_kh * &self.cov;
        // Keep P symmetric against round-off
        self.cov = (&cov + cov.transpose()) * 0.5;
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.state[0], self.state[1], self.state[2])
    }

    /// Estimated clock bias, meters
    pub fn bias_m(&self) -> f64 { self.state[BIAS] }

    /// `[x, y, z, vx, vy, vz, b]`
    pub fn full_state(&self) -> [f64; STATE_DIM] {
        let mut out = [0.0; STATE_DIM];
        for (dst, src) in out.iter_mut().zip(self.state.iter()) {
            *dst = *src;
        }
        out
    }

    pub fn covariance(&self) -> &DMatrix<f64> { &self.cov }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchors() -> Vec<Vec3> {
        vec![
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(-50.0, 0.0, 0.0),
            Vec3::new(0.0, 50.0, 0.0),
            Vec3::new(0.0, -50.0, 0.0),
            Vec3::new(0.0, 0.0, 50.0),
            Vec3::new(0.0, 0.0, -50.0),
        ]
    }

    /// Noiseless observations of `target` with clock bias `bias_m`
    fn observe(target: Vec3, bias_m: f64, tx_time: f64) -> Vec<RangingObservation> {
        anchors()
            .into_iter()
            .enumerate()
            .map(|(i, a)| RangingObservation {
                target_id: 0,
                anchor_id: i as u32 + 1,
                anchor_position: a,
                toa_s: tx_time + (target.dist(&a) + bias_m) / SPEED_OF_LIGHT,
                is_los: true,
            })
            .collect()
    }

    #[test]
    fn test_init_state_and_covariance() {
        let f = NeighborFilter::new(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(f.full_state(), [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(f.covariance()[(0, 0)], 5.0);
        assert_eq!(f.covariance()[(4, 4)], 1.0);
        assert_eq!(f.covariance()[(6, 6)], 500.0);
    }

    #[test]
    fn test_predict_skips_non_positive_dt() {
        let mut f = NeighborFilter::new(Vec3::new(1.0, 2.0, 3.0));
        let before = f.covariance().clone();
        f.predict(0.0);
        f.predict(-1.0);
        assert_eq!(f.covariance(), &before);
    }

    #[test]
    fn test_predict_propagates_covariance() {
        let mut f = NeighborFilter::new(Vec3::zero());
        f.predict(0.5);
        // P00 = 5 + dt²·1 + Q00
        assert!((f.covariance()[(0, 0)] - (5.0 + 0.25 + 1.0)).abs() < 1e-12);
        // P03 = dt·P33
        assert!((f.covariance()[(0, 3)] - 0.5).abs() < 1e-12);
        assert!((f.covariance()[(6, 6)] - 501.0).abs() < 1e-12);
    }

    #[test]
    fn test_update_ignores_empty_input() {
        let mut f = NeighborFilter::new(Vec3::new(4.0, 5.0, 6.0));
        f.update(&[], 0.0);
        assert_eq!(f.position(), Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_converges_on_stationary_target() {
        let truth = Vec3::new(3.0, -4.0, 2.0);
        let bias = 25.0;
        let mut f = NeighborFilter::new(Vec3::new(6.0, -2.0, 0.0));

        let mut t = 0.0;
        for _ in 0..300 {
            t += 0.03;
            f.predict(0.03);
            f.update(&observe(truth, bias, t), t);
        }

        assert!(f.position().dist(&truth) < 0.01, "pos err {}", f.position().dist(&truth));
        assert!((f.bias_m() - bias).abs() < 0.01, "bias {}", f.bias_m());
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let truth = Vec3::new(1.0, 1.0, 1.0);
        let mut f = NeighborFilter::new(Vec3::zero());
        for k in 1..20 {
            let t = k as f64 * 0.03;
            f.predict(0.03);
            f.update(&observe(truth, 3.0, t), t);
        }
        let p = f.covariance();
        assert!((p - p.transpose()).amax() < 1e-9);
    }
}
