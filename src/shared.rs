//! Process-wide state shared across worker agents.
//!
//! Workers hold handles to one `SharedContextState` and talk to it through
//! lookup methods; the state owns the failure tracker and the reference
//! pool outright.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::ids::SortableIdGen;

pub const DEFAULT_MAX_FAILURES: usize = 100;
pub const DEFAULT_MAX_REFERENCES: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub id:         String,
    /// Action string, prefixed with the originating worker tag:
    /// `[worker-2] read_file src/main.rs`.
    pub action:     String,
    pub error:      String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack:      Option<String>,
    pub resolved:   bool,
    pub created_at: i64,
}

impl Failure {
    /// The action with the `[worker]` tag stripped.
    pub fn trimmed_action(&self) -> &str {
        match self.action.split_once("] ") {
            Some((prefix, rest)) if prefix.starts_with('[') => rest,
            _ => &self.action,
        }
    }

    /// The worker tag, when present.
    pub fn worker(&self) -> Option<&str> {
        let rest = self.action.strip_prefix('[')?;
        rest.split_once(']').map(|(w, _)| w)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub action: String,
    pub error:  String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack:  Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    File,
    Url,
    Function,
    Error,
    Command,
    Other,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::File     => "file",
            ReferenceType::Url      => "url",
            ReferenceType::Function => "function",
            ReferenceType::Error    => "error",
            ReferenceType::Command  => "command",
            ReferenceType::Other    => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id:        String,
    pub ref_type:  ReferenceType,
    pub value:     String,
    pub timestamp: i64,
}

#[derive(Debug, Default)]
struct ReferencePool {
    entries: VecDeque<Reference>,
    keys:    HashSet<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SharedContextConfig {
    pub max_failures:   usize,
    pub max_references: usize,
}

impl Default for SharedContextConfig {
    fn default() -> Self {
        Self { max_failures: DEFAULT_MAX_FAILURES, max_references: DEFAULT_MAX_REFERENCES }
    }
}

pub struct SharedContextState {
    config:        SharedContextConfig,
    static_prefix: String,
    failures:      Mutex<VecDeque<Failure>>,
    references:    Mutex<ReferencePool>,
    ids:           SortableIdGen,
}

impl SharedContextState {
    /// `static_prefix` is frozen at construction; every worker assembling
    /// a prompt starts from the same cacheable head.
    pub fn new(static_prefix: impl Into<String>, config: SharedContextConfig) -> Self {
        Self {
            config,
            static_prefix: static_prefix.into(),
            failures:      Mutex::new(VecDeque::new()),
            references:    Mutex::new(ReferencePool::default()),
            ids:           SortableIdGen::new(),
        }
    }

    pub fn get_static_prefix(&self) -> &str {
        &self.static_prefix
    }

    // ── Failure tracker ──────────────────────────────────────────────────

    /// Record a failure from any worker. Beyond `max_failures` the oldest
    /// entries are evicted FIFO. Returns the failure id.
    pub fn record_failure(&self, worker_id: &str, report: FailureReport) -> String {
        let id = self.ids.generate();
        let failure = Failure {
            id:         id.clone(),
            action:     format!("[{}] {}", worker_id, report.action.trim()),
            error:      report.error,
            stack:      report.stack,
            resolved:   false,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        let mut failures = self.failures.lock().unwrap();
        failures.push_back(failure);
        while failures.len() > self.config.max_failures {
            failures.pop_front();
        }
        id
    }

    pub fn mark_resolved(&self, failure_id: &str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        for failure in failures.iter_mut() {
            if failure.id == failure_id {
                failure.resolved = true;
                return true;
            }
        }
        false
    }

    /// Was a failure with this (trimmed) action recorded within the last
    /// `within_ms` milliseconds, by any worker?
    pub fn has_recent_failure(&self, action: &str, within_ms: i64) -> bool {
        let cutoff = chrono::Utc::now().timestamp_millis() - within_ms;
        let wanted = action.trim();
        self.failures
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.created_at >= cutoff && f.trimmed_action() == wanted)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    /// Formatted most-recent-first block for prompt injection.
    pub fn get_failure_context(&self, max_failures: usize) -> String {
        let failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            return String::new();
        }
        let mut lines = vec!["Recent failures across workers:".to_string()];
        for failure in failures.iter().rev().take(max_failures) {
            lines.push(format!("- {}: {}", failure.action, failure.error));
        }
        lines.join("\n")
    }

    /// Short human-oriented bullets about repeated failures, e.g.
    /// "3 workers hit the same failure on 'read_file /tmp/x'".
    pub fn extract_insights(&self) -> Vec<String> {
        use std::collections::HashMap;
        let failures = self.failures.lock().unwrap();
        let mut groups: HashMap<&str, (usize, HashSet<&str>)> = HashMap::new();
        for failure in failures.iter() {
            let entry = groups.entry(failure.trimmed_action()).or_default();
            entry.0 += 1;
            if let Some(worker) = failure.worker() {
                entry.1.insert(worker);
            }
        }
        let mut insights: Vec<String> = groups
            .into_iter()
            .filter(|(_, (count, _))| *count >= 2)
            .map(|(action, (count, workers))| {
                if workers.len() >= 2 {
                    format!("{} workers hit the same failure on '{}'", workers.len(), action)
                } else {
                    format!("'{}' failed {} times", action, count)
                }
            })
            .collect();
        insights.sort();
        insights
    }

    // ── Reference pool ───────────────────────────────────────────────────

    /// Add references, deduplicated by `type:value`. Beyond
    /// `max_references` the oldest entries are evicted FIFO.
    pub fn add_references(&self, refs: Vec<(ReferenceType, String)>) {
        let mut pool = self.references.lock().unwrap();
        for (ref_type, value) in refs {
            let key = format!("{}:{}", ref_type.as_str(), value);
            if !pool.keys.insert(key) {
                continue;
            }
            pool.entries.push_back(Reference {
                id:        self.ids.generate(),
                ref_type,
                value,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
            while pool.entries.len() > self.config.max_references {
                if let Some(evicted) = pool.entries.pop_front() {
                    pool.keys.remove(&format!("{}:{}", evicted.ref_type.as_str(), evicted.value));
                }
            }
        }
    }

    /// All references whose value contains `query`, case-insensitively,
    /// in insertion order.
    pub fn search_references(&self, query: &str) -> Vec<Reference> {
        let needle = query.to_lowercase();
        self.references
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|r| r.value.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn reference_count(&self) -> usize {
        self.references.lock().unwrap().entries.len()
    }

    /// Clear all tracked state (session reset). The static prefix is
    /// frozen and survives.
    pub fn reset(&self) {
        self.failures.lock().unwrap().clear();
        let mut pool = self.references.lock().unwrap();
        pool.entries.clear();
        pool.keys.clear();
    }
}

impl std::fmt::Debug for SharedContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContextState")
            .field("failures", &self.failure_count())
            .field("references", &self.reference_count())
            .finish()
    }
}
