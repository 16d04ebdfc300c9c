//! multilateration.rs — Closed-form TDoA position fix
//!
//! Offline solver, independent of the slot protocol. Input is one pseudorange
//! per anchor (distance + unknown common offset r0). Differencing against
//! the first anchor gives, for every other anchor i,
//!
//!   2 (a_0 − a_i) · p − 2 Δd_i r0 = Δd_i² − (‖a_i‖² − ‖a_0‖²)
//!
//! - five or more anchors: unknowns (p, r0), least squares via SVD
//! - exactly four: p = S + Q r0 from the 3×3 system, then
//!   ‖p − a_0‖ = r0 is a quadratic in r0 with up to two fixes
//!
//! The experiment driver reproduces the moving-anchor bench: five anchors
//! on closed curves, a target climbing a slow spiral.

use std::time::Instant;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use swarm_types::Vec3;

/// Fixes below this altitude are considered implausible
const MIN_VALID_Z: f64 = -5.0;
const SVD_EPS: f64 = 1e-12;
/// Quadratic leading coefficient below which the equation is treated as linear
const DEGENERATE_QUAD: f64 = 1e-12;

fn v3(p: Vec3) -> Vector3<f64> { Vector3::new(p.x, p.y, p.z) }
fn from_v3(v: &Vector3<f64>) -> Vec3 { Vec3::new(v.x, v.y, v.z) }

/// Pick between the two roots of the four-anchor case.
pub fn select_best_solution(p1: Vec3, p2: Vec3, last: Option<Vec3>) -> Vec3 {
    let p1_valid = p1.z >= MIN_VALID_Z;
    let p2_valid = p2.z >= MIN_VALID_Z;
    if p1_valid && !p2_valid { return p1; }
    if p2_valid && !p1_valid { return p2; }

    match last {
        Some(last) if p2.dist(&last) <= p1.dist(&last) => p2,
        _ => p1,
    }
}

/// Position from `anchors` and matching `pseudoranges` (m). `None` under
/// four anchors, on mismatched input, or when no real fix exists.
pub fn solve(anchors: &[Vec3], pseudoranges: &[f64], last: Option<Vec3>) -> Option<Vec3> {
    if anchors.len() < 4 || anchors.len() != pseudoranges.len() {
        return None;
    }

    let reference = anchors[0];
    let ref_sq = reference.dot(&reference);
    let r_ref = pseudoranges[0];

    if anchors.len() >= 5 {
        let n = anchors.len() - 1;
        let mut a = DMatrix::zeros(n, 4);
        let mut b = DVector::zeros(n);

        for (row, (anchor, range)) in anchors.iter().zip(pseudoranges).skip(1).enumerate() {
            let dd = range - r_ref;
            let diff = (reference - *anchor) * 2.0;
            a[(row, 0)] = diff.x;
            a[(row, 1)] = diff.y;
            a[(row, 2)] = diff.z;
            a[(row, 3)] = -2.0 * dd;
            b[row] = dd * dd - (anchor.dot(anchor) - ref_sq);
        }

        let x = a.svd(true, true).solve(&b, SVD_EPS).ok()?;
        return Some(Vec3::new(x[0], x[1], x[2]));
    }

    let mut a = Matrix3::zeros();
    let mut b = Vector3::zeros();
    let mut v = Vector3::zeros();
    for (row, (anchor, range)) in anchors.iter().zip(pseudoranges).skip(1).enumerate() {
        let dd = range - r_ref;
        let diff = (reference - *anchor) * 2.0;
        a.set_row(row, &Vector3::new(diff.x, diff.y, diff.z).transpose());
        b[row] = dd * dd - (anchor.dot(anchor) - ref_sq);
        v[row] = 2.0 * dd;
    }

    let lu = a.lu();
    let s = lu.solve(&b)?;
    let q = lu.solve(&v)?;
    let d = s - v3(reference);

    let qa = q.dot(&q) - 1.0;
    let qb = 2.0 * q.dot(&d);
    let qc = d.dot(&d);

    if qa.abs() < DEGENERATE_QUAD {
        if qb == 0.0 { return None; }
        return Some(from_v3(&(s + q * (-qc / qb))));
    }

    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        debug!("four-anchor fix has no real solution (disc {disc:.3e})");
        return None;
    }
    let sq = disc.sqrt();
    let p1 = from_v3(&(s + q * ((-qb + sq) / (2.0 * qa))));
    let p2 = from_v3(&(s + q * ((-qb - sq) / (2.0 * qa))));
    Some(select_best_solution(p1, p2, last))
}

// ── Moving-anchor experiment ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FixSample {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub ex: f64,
    pub ey: f64,
    pub ez: f64,
}

impl FixSample {
    pub fn truth(&self) -> Vec3 { Vec3::new(self.tx, self.ty, self.tz) }
    pub fn estimate(&self) -> Vec3 { Vec3::new(self.ex, self.ey, self.ez) }
    pub fn error_m(&self) -> f64 { self.truth().dist(&self.estimate()) }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExperimentReport {
    pub steps: usize,
    pub samples: Vec<FixSample>,
    /// Anchor constellation of every step, failed fixes included
    pub anchor_trace: Vec<[Vec3; 5]>,
    pub mean_solve_us: f64,
    pub rms_error_m: f64,
}

/// Anchor constellation at phase `t` (one lap over t ∈ [0, 2π))
pub fn experiment_anchors(t: f64) -> [Vec3; 5] {
    const R: f64 = 35.0;
    [
        Vec3::new(R * t.cos(), R * t.sin(), 15.0),
        Vec3::new(20.0 * t.cos(), 20.0 * t.sin(), 15.0 + 15.0 * (2.0 * t).sin()),
        Vec3::new(R * t.cos() * (2.0 * t).sin(), R * t.sin() * (2.0 * t).sin(), 25.0),
        Vec3::new(25.0 * (1.5 * t).cos(), 0.0, 30.0 + 20.0 * (1.5 * t).sin()),
        Vec3::new(0.0, 25.0 * (2.0 * t).cos(), 30.0 + 20.0 * (2.0 * t).sin()),
    ]
}

/// Column names of the anchor trace: `ax0,ay0,az0,...,az4`
pub fn anchor_trace_header() -> Vec<String> {
    (0..5)
        .flat_map(|k| ["ax", "ay", "az"].map(|axis| format!("{axis}{k}")))
        .collect()
}

pub fn anchor_trace_row(anchors: &[Vec3; 5]) -> [f64; 15] {
    let mut row = [0.0; 15];
    for (k, a) in anchors.iter().enumerate() {
        row[3 * k..3 * k + 3].copy_from_slice(&a.to_array());
    }
    row
}

pub fn experiment_target(step: usize, t: f64) -> Vec3 {
    Vec3::new(
        -30.0 + 60.0 * (0.5 * t).cos(),
        -30.0 + 60.0 * (0.5 * t).sin(),
        5.0 + 0.1 * step as f64,
    )
}

/// `steps` fixes over one lap, pseudoranges perturbed by uniform ±`noise_m`.
/// Failed fixes are skipped.
pub fn run_experiment(steps: usize, noise_m: f64, seed: u64) -> ExperimentReport {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = noise_m.abs();
    let mut last = None;
    let mut samples = Vec::with_capacity(steps);
    let mut anchor_trace = Vec::with_capacity(steps);
    let mut total_us = 0.0;

    for i in 0..steps {
        let t = i as f64 * std::f64::consts::TAU / steps as f64;
        let anchors = experiment_anchors(t);
        let target = experiment_target(i, t);
        anchor_trace.push(anchors);

        let ranges: Vec<f64> = anchors
            .iter()
            .map(|a| {
                let jitter = if noise > 0.0 { rng.gen_range(-noise..noise) } else { 0.0 };
                a.dist(&target) + jitter
            })
            .collect();

        let started = Instant::now();
        let fix = solve(&anchors, &ranges, last);
        let elapsed_us = started.elapsed().as_secs_f64() * 1e6;

        if let Some(est) = fix {
            last = Some(est);
            total_us += elapsed_us;
            samples.push(FixSample {
                tx: target.x, ty: target.y, tz: target.z,
                ex: est.x, ey: est.y, ez: est.z,
            });
        }
    }

    let n = samples.len();
    let (mean_solve_us, rms_error_m) = if n > 0 {
        let mse = samples.iter().map(|s| s.error_m().powi(2)).sum::<f64>() / n as f64;
        (total_us / n as f64, mse.sqrt())
    } else {
        (0.0, 0.0)
    };

    ExperimentReport { steps, samples, anchor_trace, mean_solve_us, rms_error_m }
}
