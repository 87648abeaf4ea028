//! Wire protocol between the UI and the core: submissions in, events out.

pub mod bridge;
pub mod queues;

pub use bridge::{Bridge, OperationHandler};
pub use queues::{EventQueue, EventTimeoutError, SubmissionQueue};

use serde::{Deserialize, Serialize};

/// One user operation. The id is assigned on ingest by the submission
/// queue's monotonic counter and never reused within a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub op: Op,
}

/// Operation payloads the bridge routes to its handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    /// Run the agent loop on a task.
    UserTask { task: String },
    /// Cancel the in-flight operation.
    Interrupt,
    /// Close the session.
    Shutdown,
}

/// Events emitted during execution. The `type` tag is the wire name used
/// by type-indexed listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMsg {
    // ── Component lifecycle ───────────────────────────────
    #[serde(rename = "manager.initialized")]
    ManagerInitialized { component: String },
    #[serde(rename = "manager.cleanup")]
    ManagerCleanup { component: String },
    #[serde(rename = "manager.reset")]
    ManagerReset { component: String },
    #[serde(rename = "manager.error")]
    ManagerError { component: String, message: String },

    // ── Tool execution ────────────────────────────────────
    #[serde(rename = "tool.start")]
    ToolStart { tool: String },
    #[serde(rename = "tool.permission_denied")]
    ToolPermissionDenied { tool: String, reason: String },
    #[serde(rename = "tool.complete")]
    ToolComplete { tool: String, success: bool },

    // ── Agent loop ────────────────────────────────────────
    #[serde(rename = "loop.iteration")]
    LoopIteration { iteration: usize },
    #[serde(rename = "loop.response")]
    LoopResponse { content: String },
    #[serde(rename = "loop.complete")]
    LoopComplete { success: bool, iterations: usize },

    // ── Errors ────────────────────────────────────────────
    Error {
        code:        String,
        message:     String,
        recoverable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack:       Option<String>,
    },
}

impl EventMsg {
    /// The wire name of this event, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventMsg::ManagerInitialized { .. }   => "manager.initialized",
            EventMsg::ManagerCleanup { .. }       => "manager.cleanup",
            EventMsg::ManagerReset { .. }         => "manager.reset",
            EventMsg::ManagerError { .. }         => "manager.error",
            EventMsg::ToolStart { .. }            => "tool.start",
            EventMsg::ToolPermissionDenied { .. } => "tool.permission_denied",
            EventMsg::ToolComplete { .. }         => "tool.complete",
            EventMsg::LoopIteration { .. }        => "loop.iteration",
            EventMsg::LoopResponse { .. }         => "loop.response",
            EventMsg::LoopComplete { .. }         => "loop.complete",
            EventMsg::Error { .. }                => "error",
        }
    }
}

/// Envelope delivered to listeners and kept in the recent-events ring.
/// Timestamps are epoch milliseconds and non-decreasing per submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub submission_id: String,
    pub event:         EventMsg,
    pub timestamp:     i64,
}
