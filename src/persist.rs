//! Key-value persistence adapter.
//!
//! Everything the core persists — doom-loop checkpoints, session grants,
//! caller-defined state — goes through `(namespace, key) → JSON value`.
//! Three implementations: in-memory for tests and short-lived sessions, a
//! JSON file tree, and an embedded SQLite store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::economics::SharedEconomicsState;
use crate::error::AgentError;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Save a value. Overwrites silently.
    async fn save(&self, namespace: &str, key: &str, value: &Value) -> Result<(), AgentError>;

    /// Load a value; `None` when absent.
    async fn load(&self, namespace: &str, key: &str) -> Result<Option<Value>, AgentError>;

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, AgentError>;

    /// Delete a value. Returns `false` — not an error — when the key was
    /// absent.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, AgentError>;

    /// All keys saved under the namespace.
    async fn list(&self, namespace: &str) -> Result<Vec<String>, AgentError>;
}

// ── In-memory store ──────────────────────────────────────────────────────

/// A simple in-memory store for testing and short-lived sessions.
pub struct MemoryKvStore {
    entries: Mutex<HashMap<(String, String), Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn save(&self, namespace: &str, key: &str, value: &Value) -> Result<(), AgentError> {
        self.entries
            .lock()
            .unwrap()
            .insert((namespace.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn load(&self, namespace: &str, key: &str) -> Result<Option<Value>, AgentError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, AgentError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .contains_key(&(namespace.to_string(), key.to_string())))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, AgentError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, AgentError> {
        let entries = self.entries.lock().unwrap();
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ── File tree store ──────────────────────────────────────────────────────

/// A store that keeps each value as `<base>/<namespace>/<key>.json`.
pub struct FileKvStore {
    base_path: PathBuf,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let _ = std::fs::create_dir_all(&path);
        Self { base_path: path }
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.base_path.join(namespace).join(format!("{key}.json"))
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn save(&self, namespace: &str, key: &str, value: &Value) -> Result<(), AgentError> {
        let path = self.entry_path(namespace, key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::StoreError(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(value).map_err(|e| AgentError::StoreError(e.to_string()))?;
        std::fs::write(&path, data).map_err(|e| AgentError::StoreError(e.to_string()))
    }

    async fn load(&self, namespace: &str, key: &str) -> Result<Option<Value>, AgentError> {
        let path = self.entry_path(namespace, key);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path).map_err(|e| AgentError::StoreError(e.to_string()))?;
        let value = serde_json::from_str(&data).map_err(|e| AgentError::StoreError(e.to_string()))?;
        Ok(Some(value))
    }

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, AgentError> {
        Ok(self.entry_path(namespace, key).exists())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, AgentError> {
        let path = self.entry_path(namespace, key);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| AgentError::StoreError(e.to_string()))?;
        Ok(true)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, AgentError> {
        let dir = self.base_path.join(namespace);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| AgentError::StoreError(e.to_string()))? {
            let entry = entry.map_err(|e| AgentError::StoreError(e.to_string()))?;
            if let Some(stem) = entry.path().file_stem() {
                keys.push(stem.to_string_lossy().to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// ── SQLite store ─────────────────────────────────────────────────────────

/// A store backed by an embedded SQLite database.
pub struct SqliteKvStore {
    path: PathBuf,
}

impl SqliteKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let path = path.into();
        let conn = rusqlite::Connection::open(&path).map_err(|e| AgentError::StoreError(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                namespace TEXT NOT NULL,
                key       TEXT NOT NULL,
                value     TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )",
            [],
        )
        .map_err(|e| AgentError::StoreError(e.to_string()))?;
        Ok(Self { path })
    }

    fn get_conn(&self) -> Result<rusqlite::Connection, AgentError> {
        rusqlite::Connection::open(&self.path).map_err(|e| AgentError::StoreError(e.to_string()))
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn save(&self, namespace: &str, key: &str, value: &Value) -> Result<(), AgentError> {
        let conn = self.get_conn()?;
        let data = serde_json::to_string(value).map_err(|e| AgentError::StoreError(e.to_string()))?;
        conn.execute(
            "INSERT INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value",
            rusqlite::params![namespace, key, data],
        )
        .map_err(|e| AgentError::StoreError(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, namespace: &str, key: &str) -> Result<Option<Value>, AgentError> {
        let conn = self.get_conn()?;
        let mut stmt = conn
            .prepare("SELECT value FROM kv WHERE namespace = ?1 AND key = ?2")
            .map_err(|e| AgentError::StoreError(e.to_string()))?;
        let mut rows = stmt
            .query(rusqlite::params![namespace, key])
            .map_err(|e| AgentError::StoreError(e.to_string()))?;
        match rows.next().map_err(|e| AgentError::StoreError(e.to_string()))? {
            Some(row) => {
                let data: String = row.get(0).map_err(|e| AgentError::StoreError(e.to_string()))?;
                let value = serde_json::from_str(&data).map_err(|e| AgentError::StoreError(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, AgentError> {
        Ok(self.load(namespace, key).await?.is_some())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, AgentError> {
        let conn = self.get_conn()?;
        let changed = conn
            .execute(
                "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
                rusqlite::params![namespace, key],
            )
            .map_err(|e| AgentError::StoreError(e.to_string()))?;
        Ok(changed > 0)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, AgentError> {
        let conn = self.get_conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE namespace = ?1 ORDER BY key")
            .map_err(|e| AgentError::StoreError(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![namespace], |row| row.get::<_, String>(0))
            .map_err(|e| AgentError::StoreError(e.to_string()))?;
        let mut keys = Vec::new();
        for key in rows {
            keys.push(key.map_err(|e| AgentError::StoreError(e.to_string()))?);
        }
        Ok(keys)
    }
}

// ── Doom-loop checkpoints ────────────────────────────────────────────────

pub const ECONOMICS_NAMESPACE: &str = "economics";

/// Checkpoint the doom-loop state under `(economics, key)`.
pub async fn save_doom_loop_state(
    store: &dyn KvStore,
    key:   &str,
    state: &SharedEconomicsState,
) -> Result<(), AgentError> {
    store.save(ECONOMICS_NAMESPACE, key, &state.to_json()).await
}

/// Restore a checkpoint saved by `save_doom_loop_state`. Returns `false`
/// when no checkpoint exists under the key.
pub async fn restore_doom_loop_state(
    store: &dyn KvStore,
    key:   &str,
    state: &SharedEconomicsState,
) -> Result<bool, AgentError> {
    match store.load(ECONOMICS_NAMESPACE, key).await? {
        Some(value) => {
            state.restore_from(&value)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
