use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Tool execution error: {0}")]
    ToolError(String),

    #[error("Max iterations ({0}) reached")]
    MaxIterations(usize),

    #[error("Budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("Submission queue closed")]
    QueueClosed,

    #[error("Cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Build error: {0}")]
    BuildError(String),
}

/// Failure modes of a single tool invocation. These never escape the
/// registry as panics or as `Err` at the loop seam — `ToolRegistry::execute`
/// folds every variant into a `ToolResult { success: false, .. }`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Cancelled")]
    Cancelled,
}
