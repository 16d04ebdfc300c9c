//! logger.rs — Append-only slot log
//!
//! One row per slot per non-transmitting observer, fixed column order.
//! The CSV sink also keeps a SHA-256 over every byte it emits so two runs
//! can be compared by digest alone.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::scheduler::SlotOutcome;

pub const CSV_HEADER: [&str; 18] = [
    "time", "sender_id", "observer_id",
    "est_x", "est_y", "est_z",
    "claim_x", "claim_y", "claim_z",
    "true_x", "true_y", "true_z",
    "discrepancy", "estimation_error", "alarm",
    "rec_x", "rec_y", "rec_z",
];

#[derive(Debug, Error)]
pub enum LogError {
    #[error("slot log I/O: {0}")]
    Io(#[from] io::Error),
    #[error("slot log encoding: {0}")]
    Csv(#[from] csv::Error),
}

// ── Row ───────────────────────────────────────────────────────────────────────

/// One observer's view of one slot. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    pub time: f64,
    pub sender_id: u32,
    pub observer_id: u32,
    pub est_x: f64,
    pub est_y: f64,
    pub est_z: f64,
    pub claim_x: f64,
    pub claim_y: f64,
    pub claim_z: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub true_z: f64,
    /// ‖estimate − claim‖
    pub discrepancy: f64,
    /// ‖estimate − truth‖
    pub estimation_error: f64,
    pub alarm: u8,
    pub rec_x: f64,
    pub rec_y: f64,
    pub rec_z: f64,
}

impl LogRow {
    pub fn rows_for(outcome: &SlotOutcome) -> Vec<LogRow> {
        let claim = outcome.claimed;
        let truth = outcome.truth;
        let rec = outcome.resolved_position();

        outcome
            .observers
            .iter()
            .map(|view| {
                let est = view.estimate;
                LogRow {
                    time: outcome.time,
                    sender_id: outcome.sender_id,
                    observer_id: view.observer_id,
                    est_x: est.x,
                    est_y: est.y,
                    est_z: est.z,
                    claim_x: claim.x,
                    claim_y: claim.y,
                    claim_z: claim.z,
                    true_x: truth.x,
                    true_y: truth.y,
                    true_z: truth.z,
                    discrepancy: est.dist(&claim),
                    estimation_error: est.dist(&truth),
                    alarm: u8::from(view.alarm),
                    rec_x: rec.x,
                    rec_y: rec.y,
                    rec_z: rec.z,
                }
            })
            .collect()
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

pub trait SlotSink {
    /// Append the rows of one slot; returns the number of rows written.
    fn record(&mut self, outcome: &SlotOutcome) -> Result<usize, LogError>;

    /// Flush and return the content digest, if the sink keeps one.
    fn finish(&mut self) -> Result<Option<String>, LogError>;
}

/// Write adapter hashing exactly the bytes accepted by the inner writer
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, hasher: Sha256::new() }
    }

    /// Hex SHA-256 of everything written so far
    pub fn digest_hex(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    pub fn get_ref(&self) -> &W { &self.inner }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct CsvSink<W: Write> {
    writer: csv::Writer<HashingWriter<W>>,
    rows: u64,
}

impl CsvSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvSink<W> {
    /// Wraps `inner` and writes the header immediately.
    pub fn new(inner: W) -> Result<Self, LogError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(HashingWriter::new(inner));
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn rows_written(&self) -> u64 { self.rows }

    /// Flushes, then hands back the hashing writer.
    pub fn into_inner(self) -> Result<HashingWriter<W>, LogError> {
        self.writer.into_inner().map_err(|e| LogError::Io(e.into_error()))
    }
}

impl<W: Write> SlotSink for CsvSink<W> {
    fn record(&mut self, outcome: &SlotOutcome) -> Result<usize, LogError> {
        let rows = LogRow::rows_for(outcome);
        for row in &rows {
            self.writer.serialize(row)?;
        }
        self.rows += rows.len() as u64;
        Ok(rows.len())
    }

    fn finish(&mut self) -> Result<Option<String>, LogError> {
        self.writer.flush()?;
        Ok(Some(self.writer.get_ref().digest_hex()))
    }
}

/// Keeps rows in memory; used by tests and analysis code.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<LogRow>,
}

impl SlotSink for MemorySink {
    fn record(&mut self, outcome: &SlotOutcome) -> Result<usize, LogError> {
        let rows = LogRow::rows_for(outcome);
        let n = rows.len();
        self.rows.extend(rows);
        Ok(n)
    }

    fn finish(&mut self) -> Result<Option<String>, LogError> {
        Ok(None)
    }
}
