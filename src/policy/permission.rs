//! Permission modes and the approval-pattern grant store.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::danger::DangerLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Strict,
    AutoSafe,
    Interactive,
    Yolo,
}

/// The key used to remember prior approvals.
///
/// Bash-style tools (a `command` argument) key on the first command token;
/// file tools key on the `path`/`file_path` argument; anything else keys
/// on its first string argument.
pub fn approval_pattern(tool: &str, args: &HashMap<String, serde_json::Value>) -> String {
    if let Some(cmd) = args.get("command").and_then(|v| v.as_str()) {
        let first = cmd.split_whitespace().next().unwrap_or("");
        return format!("{tool}:{first}");
    }
    for key in ["path", "file_path"] {
        if let Some(path) = args.get(key).and_then(|v| v.as_str()) {
            return format!("{tool}:{path}");
        }
    }
    let mut keys: Vec<&String> = args.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(s) = args[key].as_str() {
            return format!("{tool}:{s}");
        }
    }
    format!("{tool}:")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub tool_name: String,
    pub tool_args: HashMap<String, serde_json::Value>,
    pub danger:    DangerLevel,
    pub pattern:   String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApprovalOutcome {
    Approved { remember: bool },
    Denied { reason: String },
}

/// Callback invoked for interactive approval. The UI side of this seam is
/// out of scope; tests supply closures.
#[derive(Clone)]
pub struct ApprovalCallback(pub Arc<dyn Fn(ApprovalRequest) -> ApprovalOutcome + Send + Sync>);

impl std::fmt::Debug for ApprovalCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<approval callback>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Approved,
    Denied { reason: String },
}

/// Session-scoped permission policy: a mode, a grant store keyed by
/// approval pattern, and an optional interactive callback.
pub struct PermissionPolicy {
    mode:    PermissionMode,
    grants:  Mutex<HashSet<String>>,
    handler: Option<ApprovalCallback>,
}

impl PermissionPolicy {
    pub fn new(mode: PermissionMode) -> Self {
        Self { mode, grants: Mutex::new(HashSet::new()), handler: None }
    }

    pub fn with_handler(mode: PermissionMode, handler: ApprovalCallback) -> Self {
        Self { mode, grants: Mutex::new(HashSet::new()), handler: Some(handler) }
    }

    pub fn mode(&self) -> PermissionMode {
        self.mode
    }

    /// Pre-seed a grant (e.g. restored from session state).
    pub fn grant(&self, pattern: impl Into<String>) {
        self.grants.lock().unwrap().insert(pattern.into());
    }

    pub fn is_granted(&self, pattern: &str) -> bool {
        self.grants.lock().unwrap().contains(pattern)
    }

    /// Decide whether a tool invocation with the given danger level may
    /// proceed.
    ///
    /// A remembered grant only short-circuits requests whose risk is low
    /// or moderate; dangerous and critical requests always go back to the
    /// approval handler.
    pub fn check(
        &self,
        tool:   &str,
        args:   &HashMap<String, serde_json::Value>,
        danger: DangerLevel,
    ) -> PermissionDecision {
        if self.mode == PermissionMode::Yolo {
            return PermissionDecision::Approved;
        }
        if danger == DangerLevel::Safe {
            return PermissionDecision::Approved;
        }

        let pattern = approval_pattern(tool, args);

        match self.mode {
            PermissionMode::Strict => PermissionDecision::Denied {
                reason: format!("strict mode denies {danger} tool '{tool}'"),
            },
            PermissionMode::AutoSafe => {
                if danger <= DangerLevel::Moderate && self.is_granted(&pattern) {
                    PermissionDecision::Approved
                } else {
                    PermissionDecision::Denied {
                        reason: format!("'{tool}' ({danger}) requires prior approval for pattern '{pattern}'"),
                    }
                }
            }
            PermissionMode::Interactive => {
                if danger <= DangerLevel::Moderate && self.is_granted(&pattern) {
                    return PermissionDecision::Approved;
                }
                let Some(handler) = &self.handler else {
                    return PermissionDecision::Denied {
                        reason: format!("no approval handler configured for {danger} tool '{tool}'"),
                    };
                };
                let request = ApprovalRequest {
                    tool_name: tool.to_string(),
                    tool_args: args.clone(),
                    danger,
                    pattern:   pattern.clone(),
                };
                match (handler.0)(request) {
                    ApprovalOutcome::Approved { remember } => {
                        if remember {
                            self.grant(pattern);
                        }
                        PermissionDecision::Approved
                    }
                    ApprovalOutcome::Denied { reason } => PermissionDecision::Denied { reason },
                }
            }
            PermissionMode::Yolo => PermissionDecision::Approved,
        }
    }
}

impl std::fmt::Debug for PermissionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionPolicy")
            .field("mode", &self.mode)
            .field("grants", &self.grants.lock().unwrap().len())
            .finish()
    }
}
