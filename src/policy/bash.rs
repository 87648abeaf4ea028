//! Execution policy for the bash tool: a mode, a write-protection flag,
//! and the `cd`-prefix rule shared with the sandbox.

use serde::{Deserialize, Serialize};

use super::danger::{classify_command, has_file_mutation, is_read_only};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BashMode {
    Disabled,
    ReadOnly,
    TaskScoped,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteProtection {
    #[default]
    Off,
    BlockFileMutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandCategory {
    Disabled,
    Read,
    Write,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed:  bool,
    pub is_write: bool,
    pub category: CommandCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason:   Option<String>,
}

/// Strip a leading `cd X && ` prefix (repeatedly, so `cd a && cd b && ls`
/// reduces to `ls`). Policy is applied to the terminal command. A bare
/// `cd` command with no continuation is returned unchanged.
pub fn strip_cd_prefix(command: &str) -> &str {
    let mut rest = command.trim();
    loop {
        let Some(stripped) = rest.strip_prefix("cd ") else { return rest };
        let Some(amp) = stripped.find("&&") else { return rest };
        // The prefix must be exactly `cd <dir>`: no pipes or separators
        // hiding between the cd and the `&&`.
        let dir_part = &stripped[..amp];
        if dir_part.contains('|') || dir_part.contains(';') {
            return rest;
        }
        rest = stripped[amp + 2..].trim_start();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BashPolicy {
    pub mode:             BashMode,
    pub write_protection: WriteProtection,
}

impl BashPolicy {
    pub fn new(mode: BashMode, write_protection: WriteProtection) -> Self {
        Self { mode, write_protection }
    }

    /// Evaluate a command against the mode and write-protection flag.
    pub fn evaluate(&self, command: &str) -> PolicyDecision {
        let command = strip_cd_prefix(command);

        if self.mode == BashMode::Disabled {
            return PolicyDecision {
                allowed:  false,
                is_write: false,
                category: CommandCategory::Disabled,
                reason:   Some("bash execution is disabled".to_string()),
            };
        }

        let mutates = has_file_mutation(command);

        if self.write_protection == WriteProtection::BlockFileMutation && mutates {
            return PolicyDecision {
                allowed:  false,
                is_write: true,
                category: CommandCategory::Blocked,
                reason:   Some("file mutation is blocked by write protection".to_string()),
            };
        }

        let read_only = is_read_only(command);

        if self.mode == BashMode::ReadOnly && !read_only {
            let classification = classify_command(command);
            let why = if classification.reasons.is_empty() {
                "command is not on the read-only allowlist".to_string()
            } else {
                format!("command is not read-only ({})", classification.reasons.join(", "))
            };
            return PolicyDecision {
                allowed:  false,
                is_write: mutates,
                category: CommandCategory::Blocked,
                reason:   Some(why),
            };
        }

        PolicyDecision {
            allowed:  true,
            is_write: mutates,
            category: if mutates { CommandCategory::Write } else { CommandCategory::Read },
            reason:   None,
        }
    }
}
