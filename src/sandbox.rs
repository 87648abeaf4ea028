//! Pluggable command sandbox.
//!
//! The core does not isolate at the OS level; it exposes this seam and
//! ships a pattern-based default. Allowlisting and blocked-pattern checks
//! are applied to the terminal command after `cd`-prefix stripping.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::policy::strip_cd_prefix;

/// Patterns that are never allowed to execute, whatever the mode.
const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "mkfs",
    "dd if=",
    ":(){",           // fork bomb
    "> /dev/sd",
    "chmod 777 /",
    "chown root",
    "shutdown",
    "reboot",
    "init 0",
    "init 6",
    "fdisk",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxRules {
    /// Command heads allowed to run. Empty = no command allowlist.
    pub allowed_commands: Vec<String>,
    /// Directories file arguments may point into. Empty = no path fence.
    pub allowed_paths:    Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason:  Option<String>,
}

impl SandboxDecision {
    fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// The sandbox seam. The default implementation is pattern-based; an
/// OS-level sandbox plugs in here without the registry caring.
pub trait Sandbox: Send + Sync {
    fn is_command_allowed(&self, command: &str, rules: &SandboxRules) -> SandboxDecision;

    /// Same rule as [`Sandbox::is_command_allowed`], surfaced as a
    /// `Result` for call sites that want to propagate with `?`.
    fn validate_command(&self, command: &str, rules: &SandboxRules) -> Result<(), ToolError> {
        let decision = self.is_command_allowed(command, rules);
        if decision.allowed {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied(
                decision.reason.unwrap_or_else(|| "command blocked by sandbox".to_string()),
            ))
        }
    }
}

/// Default pattern-based sandbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSandbox;

impl CommandSandbox {
    pub fn new() -> Self {
        Self
    }

    fn blocked_pattern(command: &str) -> Option<&'static str> {
        let lower = command.to_lowercase();
        BLOCKED_PATTERNS.iter().copied().find(|p| lower.contains(p))
    }
}

impl Sandbox for CommandSandbox {
    fn is_command_allowed(&self, command: &str, rules: &SandboxRules) -> SandboxDecision {
        let terminal = strip_cd_prefix(command);

        if let Some(pattern) = Self::blocked_pattern(terminal) {
            tracing::warn!(command = %terminal, pattern = %pattern, "blocked dangerous command");
            return SandboxDecision::deny(format!("command blocked by security policy (matched '{pattern}')"));
        }

        if !rules.allowed_commands.is_empty() {
            let head = terminal
                .split_whitespace()
                .next()
                .map(|h| h.rsplit('/').next().unwrap_or(h))
                .unwrap_or("");
            if !rules.allowed_commands.iter().any(|c| c == head) {
                return SandboxDecision::deny(format!("command '{head}' is not on the sandbox allowlist"));
            }
        }

        SandboxDecision::allow()
    }
}

/// Resolve `requested` against `base` and verify it stays inside one of
/// the allowed roots (or inside `base` when no roots are configured).
/// Resolution is lexical: `..` components are folded before the prefix
/// check, so traversal cannot step outside an allowed root.
pub fn resolve_path(
    base:      &Path,
    requested: &str,
    allowed:   &[PathBuf],
) -> Result<PathBuf, ToolError> {
    let raw = Path::new(requested);
    let joined = if raw.is_absolute() { raw.to_path_buf() } else { base.join(raw) };

    let mut normal = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normal.pop() {
                    return Err(ToolError::PermissionDenied(format!(
                        "path '{requested}' escapes the workspace root"
                    )));
                }
            }
            Component::CurDir => {}
            other => normal.push(other.as_os_str()),
        }
    }

    let roots: Vec<&Path> = if allowed.is_empty() {
        vec![base]
    } else {
        allowed.iter().map(|p| p.as_path()).collect()
    };

    if roots.iter().any(|root| normal.starts_with(root)) {
        Ok(normal)
    } else {
        Err(ToolError::PermissionDenied(format!(
            "path '{requested}' is outside the allowed directories"
        )))
    }
}
