//! simulation.rs — Top-level run context
//!
//! Owns the swarm, the channel and the slot scheduler, and drives them on
//! fixed steps:
//!   - motion ticks every `motion_step_s`, starting at t = 0
//!   - slots every `slot_duration_s`, the first at t = slot_duration_s
//!   - attack onset at `attack.start_s`
//! Events falling on the same instant run in that order: motion, attack,
//! slot. The run ends once the next slot would fall past the horizon.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use swarm_types::NodeId;

use crate::channel::ChannelModel;
use crate::config::{AttackConfig, ConfigError, SimConfig};
use crate::logger::{LogError, SlotSink};
use crate::loss::LossModel;
use crate::scheduler::{SlotOutcome, SlotScheduler};
use crate::swarm::{NodeSetup, Swarm};
use crate::trajectory::Trajectory;

/// Tolerance when ordering events computed from different step sizes
const TIME_EPSILON: f64 = 1e-9;
/// Simulated seconds between progress lines
const PROGRESS_INTERVAL_S: f64 = 25.0;

// Random stream ids, mixed with the configured seed
const STREAM_CHANNEL: u64 = 1;
const STREAM_LOSS: u64 = 2;
const STREAM_DRIFT: u64 = 3;
const STREAM_GPS_BASE: u64 = 100;

/// Seed of one independent random stream
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// End-of-run report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub final_time_s: f64,
    pub slots: u64,
    pub sync_slots: u64,
    pub filter_updates: u64,
    pub recoveries: BTreeMap<NodeId, u64>,
    pub first_recovery_s: BTreeMap<NodeId, f64>,
    /// Log rows with the alarm flag set
    pub alarm_rows: u64,
    pub rows: u64,
    /// Relay delivery rate over non-own observations
    pub delivery_rate: f64,
    /// SHA-256 of the slot log, when the sink keeps one
    pub digest: Option<String>,
}

pub struct Simulation {
    cfg: SimConfig,
    swarm: Swarm,
    channel: ChannelModel,
    scheduler: SlotScheduler,
    attack: Option<AttackConfig>,
    attack_active: bool,
    /// Index of the next motion tick
    motion_tick: u64,
    /// Number of the next slot (1-based: slot k runs at k·slot_duration)
    next_slot: u64,
    now: f64,
}

impl Simulation {
    pub fn new(cfg: SimConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let size = cfg.swarm.size;
        let geometry = cfg.trajectory.geometry();
        let drifts = cfg.clock_drifts_ns(stream_seed(cfg.seed, STREAM_DRIFT));

        let setups = drifts
            .into_iter()
            .enumerate()
            .map(|(i, clock_drift_ns)| NodeSetup {
                trajectory: Trajectory::for_node(cfg.trajectory.formation, i as NodeId, size, geometry),
                clock_drift_ns,
                gps_seed: stream_seed(cfg.seed, STREAM_GPS_BASE + i as u64),
            })
            .collect();

        let channel = ChannelModel::new(
            cfg.channel.environment,
            cfg.obstacles(),
            stream_seed(cfg.seed, STREAM_CHANNEL),
        );
        let scheduler = SlotScheduler::new(
            cfg.swarm.master_anchor_id,
            cfg.channel.tx_power_dbm,
            LossModel::new(stream_seed(cfg.seed, STREAM_LOSS)),
        );

        Ok(Self {
            attack: cfg.attack.clone(),
            swarm: Swarm::new(setups),
            channel,
            scheduler,
            attack_active: false,
            motion_tick: 0,
            next_slot: 1,
            now: 0.0,
            cfg,
        })
    }

    pub fn config(&self) -> &SimConfig { &self.cfg }
    pub fn swarm(&self) -> &Swarm { &self.swarm }
    pub fn now(&self) -> f64 { self.now }
    pub fn attack_active(&self) -> bool { self.attack_active }

    /// Time of the next slot, or `None` once past the horizon
    pub fn next_slot_time(&self) -> Option<f64> {
        let t = self.next_slot as f64 * self.cfg.simulation.slot_duration_s;
        (t <= self.cfg.simulation.horizon_s + TIME_EPSILON).then_some(t)
    }

    /// Apply every motion tick and the attack onset due by `t`, then run the
    /// slot at `t`.
    pub fn step(&mut self) -> Option<SlotOutcome> {
        let t = self.next_slot_time()?;
        self.next_slot += 1;
        self.now = t;

        self.apply_motion_until(t);
        self.apply_attack_until(t);

        self.scheduler.execute_slot(t, self.swarm.nodes_mut(), &mut self.channel)
    }

    /// Run to the horizon, recording every slot into `sink`.
    pub fn run<S: SlotSink>(&mut self, sink: &mut S) -> Result<RunSummary, LogError> {
        let mut summary = RunSummary { seed: self.cfg.seed, ..Default::default() };
        let mut next_progress = PROGRESS_INTERVAL_S;

        info!(
            "Running {} nodes for {:.0}s ({} slots of {}s), master anchor {}",
            self.swarm.len(),
            self.cfg.simulation.horizon_s,
            (self.cfg.simulation.horizon_s / self.cfg.simulation.slot_duration_s) as u64,
            self.cfg.simulation.slot_duration_s,
            self.cfg.swarm.master_anchor_id,
        );

        while let Some(outcome) = self.step() {
            summary.slots += 1;
            if outcome.sync_slot {
                summary.sync_slots += 1;
            }
            summary.filter_updates += outcome.filter_updates as u64;
            summary.alarm_rows += outcome.observers.iter().filter(|v| v.alarm).count() as u64;

            if outcome.recovered.is_some() {
                let id = outcome.sender_id;
                *summary.recoveries.entry(id).or_insert(0) += 1;
                if !summary.first_recovery_s.contains_key(&id) {
                    summary.first_recovery_s.insert(id, outcome.time);
                    info!(
                        "t={:.3}s first recovery of node {id} (vote sum {})",
                        outcome.time, outcome.tally.sum
                    );
                }
            }

            summary.rows += sink.record(&outcome)? as u64;

            if outcome.time + TIME_EPSILON >= next_progress {
                info!(
                    "t={:.0}s | slots={} | alarm rows={} | recoveries={}",
                    outcome.time,
                    summary.slots,
                    summary.alarm_rows,
                    summary.recoveries.values().sum::<u64>()
                );
                next_progress += PROGRESS_INTERVAL_S;
            }
        }

        summary.final_time_s = self.now;
        summary.delivery_rate = self.scheduler.delivery_stats().delivery_rate();
        summary.digest = sink.finish()?;

        info!(
            "Run complete: {} slots, {} rows, {} recoveries",
            summary.slots,
            summary.rows,
            summary.recoveries.values().sum::<u64>()
        );
        Ok(summary)
    }

    fn apply_motion_until(&mut self, t: f64) {
        let step = self.cfg.simulation.motion_step_s;
        loop {
            let tick_time = self.motion_tick as f64 * step;
            if tick_time > t + TIME_EPSILON {
                break;
            }
            self.swarm.advance_motion(tick_time);
            self.motion_tick += 1;
        }
    }

    fn apply_attack_until(&mut self, t: f64) {
        let Some(attack) = &self.attack else { return };
        if self.attack_active || attack.start_s > t + TIME_EPSILON {
            return;
        }
        let (id, start) = (attack.malicious_node_id, attack.start_s);
        if let Some(node) = self.swarm.node_mut(id) {
            node.set_malicious(true, start);
            self.attack_active = true;
            info!("t={start:.3}s node {id} starts spoofing its GPS position");
        } else {
            debug!("attack target {id} is not in the swarm");
        }
    }
}
