//! # swarm-simulator
//!
//! Discrete-time simulation of a UWB drone swarm that localizes its members
//! by TDoA and votes out GPS-spoofed positions.
//!
//! Each node runs one EKF per peer on the TDMA broadcasts it hears, flags
//! peers whose claimed GPS position disagrees with the estimate, and
//! publishes its trust as a bit mask. When enough peers distrust a claim,
//! the offender is pulled toward the median of their estimates.

pub mod channel;
pub mod config;
pub mod consensus;
pub mod constants;
pub mod ekf;
pub mod logger;
pub mod loss;
pub mod multilateration;
pub mod node;
pub mod scenarios;
pub mod scheduler;
pub mod simulation;
pub mod swarm;
pub mod trajectory;

pub use config::{ConfigError, SimConfig};
pub use logger::{CsvSink, LogError, MemorySink, SlotSink};
pub use simulation::{RunSummary, Simulation};
