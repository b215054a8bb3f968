//! Run statistics and export.
//!
//! The orchestrator keeps one [`RunStats`] for its whole lifetime; counters
//! accumulate across runs so a long session can be summarised at the end.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::types::Millis;

/// Counters for one orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Name of the most recently started flow
    pub last_flow: Option<String>,

    /// Virtual time reached by the current or last run
    pub virtual_time: Millis,

    /// Visual events emitted
    pub events_emitted: u64,

    /// Operations executed
    pub operations_fired: u64,

    /// Operations that had to wait for a token to arrive
    pub operations_deferred: u64,

    /// Operations dropped at stage end or because of a defect
    pub operations_skipped: u64,

    /// Flow-definition defects met at run time
    pub defects: u64,

    /// References to consumed tokens
    pub invariant_violations: u64,

    pub tokens_created: u64,
    pub tokens_destroyed: u64,
    pub stages_completed: u64,
    pub flows_started: u64,
    pub flows_completed: u64,
    pub flows_cancelled: u64,
    pub flows_aborted: u64,
}

impl RunStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    fn rows(&self) -> [(&'static str, u64); 14] {
        [
            ("virtual_time", self.virtual_time),
            ("events_emitted", self.events_emitted),
            ("operations_fired", self.operations_fired),
            ("operations_deferred", self.operations_deferred),
            ("operations_skipped", self.operations_skipped),
            ("defects", self.defects),
            ("invariant_violations", self.invariant_violations),
            ("tokens_created", self.tokens_created),
            ("tokens_destroyed", self.tokens_destroyed),
            ("stages_completed", self.stages_completed),
            ("flows_started", self.flows_started),
            ("flows_completed", self.flows_completed),
            ("flows_cancelled", self.flows_cancelled),
            ("flows_aborted", self.flows_aborted),
        ]
    }

    /// Exports statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("metric,value\n");
        for (name, value) in self.rows() {
            csv.push_str(&format!("{},{}\n", name, value));
        }
        csv
    }

    /// Exports statistics to CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Animation Statistics ===")?;
        if let Some(ref flow) = self.last_flow {
            writeln!(w, "Last flow: {}", flow)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Runs ---")?;
        writeln!(w, "Started: {}", self.flows_started)?;
        writeln!(w, "Completed: {}", self.flows_completed)?;
        writeln!(w, "Cancelled: {}", self.flows_cancelled)?;
        writeln!(w, "Aborted: {}", self.flows_aborted)?;
        writeln!(w, "Stages completed: {}", self.stages_completed)?;
        writeln!(w)?;

        writeln!(w, "--- Operations ---")?;
        writeln!(w, "Fired: {}", self.operations_fired)?;
        writeln!(w, "Deferred: {}", self.operations_deferred)?;
        writeln!(w, "Skipped: {}", self.operations_skipped)?;
        writeln!(w, "Defects: {}", self.defects)?;
        writeln!(w, "Invariant violations: {}", self.invariant_violations)?;
        writeln!(w)?;

        writeln!(w, "--- Tokens ---")?;
        writeln!(w, "Created: {}", self.tokens_created)?;
        writeln!(w, "Destroyed: {}", self.tokens_destroyed)?;
        writeln!(w, "Events emitted: {}", self.events_emitted)?;

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        if let Err(err) = self.write_summary(&mut buf) {
            tracing::warn!(%err, "failed to render statistics summary");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}
