//! Cross-worker doom-loop detection.
//!
//! Every tool call is recorded under its canonical fingerprint
//! (`tool_name:sorted_args`). When the same fingerprint accumulates
//! `threshold` calls across all workers, the call is a global doom loop
//! and the loop layer injects a course correction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::error::AgentError;

pub const DEFAULT_GLOBAL_DOOM_LOOP_THRESHOLD: u64 = 10;

#[derive(Debug, Default, Clone)]
struct FingerprintStat {
    count:   u64,
    workers: BTreeSet<String>,
}

/// One entry of the persisted checkpoint layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub fingerprint: String,
    pub count:       u64,
    pub workers:     Vec<String>,
}

/// Checkpoint payload: `{ "fingerprints": [ { fingerprint, count,
/// workers }, … ] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicsCheckpoint {
    pub fingerprints: Vec<FingerprintRecord>,
}

pub struct SharedEconomicsState {
    threshold: u64,
    stats:     Mutex<HashMap<String, FingerprintStat>>,
}

impl SharedEconomicsState {
    pub fn new(threshold: u64) -> Self {
        Self { threshold, stats: Mutex::new(HashMap::new()) }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Record one tool call by `worker_id` under `fingerprint`.
    pub fn record_tool_call(&self, worker_id: &str, fingerprint: &str) {
        let mut stats = self.stats.lock().unwrap();
        let stat = stats.entry(fingerprint.to_string()).or_default();
        stat.count += 1;
        stat.workers.insert(worker_id.to_string());
        if stat.count == self.threshold {
            tracing::warn!(
                fingerprint,
                workers = stat.workers.len(),
                "global doom loop threshold reached"
            );
        }
    }

    /// True once the fingerprint has reached the threshold, regardless of
    /// how the calls were spread across workers.
    pub fn is_global_doom_loop(&self, fingerprint: &str) -> bool {
        self.stats
            .lock()
            .unwrap()
            .get(fingerprint)
            .is_some_and(|s| s.count >= self.threshold)
    }

    pub fn call_count(&self, fingerprint: &str) -> u64 {
        self.stats.lock().unwrap().get(fingerprint).map_or(0, |s| s.count)
    }

    /// Number of distinct workers that issued this fingerprint.
    pub fn worker_count(&self, fingerprint: &str) -> usize {
        self.stats.lock().unwrap().get(fingerprint).map_or(0, |s| s.workers.len())
    }

    /// All fingerprints currently at or past the threshold, sorted for
    /// deterministic output.
    pub fn get_global_loops(&self) -> Vec<FingerprintRecord> {
        let stats = self.stats.lock().unwrap();
        let mut loops: Vec<FingerprintRecord> = stats
            .iter()
            .filter(|(_, s)| s.count >= self.threshold)
            .map(|(fp, s)| FingerprintRecord {
                fingerprint: fp.clone(),
                count:       s.count,
                workers:     s.workers.iter().cloned().collect(),
            })
            .collect();
        loops.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        loops
    }

    /// Serialize the full state in the checkpoint layout, sorted by
    /// fingerprint so two equal states produce identical bytes.
    pub fn to_json(&self) -> serde_json::Value {
        let stats = self.stats.lock().unwrap();
        let mut fingerprints: Vec<FingerprintRecord> = stats
            .iter()
            .map(|(fp, s)| FingerprintRecord {
                fingerprint: fp.clone(),
                count:       s.count,
                workers:     s.workers.iter().cloned().collect(),
            })
            .collect();
        fingerprints.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        serde_json::to_value(EconomicsCheckpoint { fingerprints })
            .unwrap_or_else(|_| serde_json::json!({ "fingerprints": [] }))
    }

    /// Replace the state from a checkpoint produced by `to_json`.
    pub fn restore_from(&self, value: &serde_json::Value) -> Result<(), AgentError> {
        let checkpoint: EconomicsCheckpoint = serde_json::from_value(value.clone())
            .map_err(|e| AgentError::StoreError(format!("bad economics checkpoint: {e}")))?;
        let mut stats = self.stats.lock().unwrap();
        stats.clear();
        for record in checkpoint.fingerprints {
            stats.insert(
                record.fingerprint,
                FingerprintStat {
                    count:   record.count,
                    workers: record.workers.into_iter().collect(),
                },
            );
        }
        Ok(())
    }

    /// Clear all fingerprints (session reset).
    pub fn reset(&self) {
        self.stats.lock().unwrap().clear();
    }
}

impl Default for SharedEconomicsState {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_DOOM_LOOP_THRESHOLD)
    }
}

impl std::fmt::Debug for SharedEconomicsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEconomicsState")
            .field("threshold", &self.threshold)
            .field("fingerprints", &self.stats.lock().unwrap().len())
            .finish()
    }
}
