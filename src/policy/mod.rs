//! Command policy: danger classification, bash execution policy, and the
//! permission layer that gates tool invocations.

pub mod bash;
pub mod danger;
pub mod permission;

pub use bash::{strip_cd_prefix, BashMode, BashPolicy, CommandCategory, PolicyDecision, WriteProtection};
pub use danger::{classify_command, has_file_mutation, is_read_only, Classification, DangerLevel};
pub use permission::{
    approval_pattern, ApprovalCallback, ApprovalOutcome, ApprovalRequest, PermissionDecision,
    PermissionMode, PermissionPolicy,
};
