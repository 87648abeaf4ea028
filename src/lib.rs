pub mod agent;
pub mod budget;
pub mod builder;
pub mod completion;
pub mod context;
pub mod economics;
pub mod error;
pub mod ids;
pub mod injection;
pub mod lifecycle;
pub mod persist;
pub mod policy;
pub mod protocol;
pub mod provider;
pub mod retry;
pub mod sandbox;
pub mod shared;
pub mod tools;
pub mod types;

// Convenience re-exports at crate root
pub use agent::{parse_tool_call, AgentLoop};
pub use budget::{create_budget_pool, BudgetAllocation, BudgetPoolConfig, SharedBudgetPool, TokenUsage};
pub use builder::AgentBuilder;
pub use completion::{analyze_completion, CompletionAnalysis, IncompleteReason};
pub use context::{cache_key, ContextAssembler};
pub use economics::SharedEconomicsState;
pub use error::{AgentError, ToolError};
pub use injection::{allocate_injections, InjectionKind, InjectionProposal};
pub use policy::{
    classify_command, BashMode, BashPolicy, DangerLevel, PermissionMode, PermissionPolicy,
};
pub use protocol::{Bridge, EventMsg, EventQueue, Op, Submission, SubmissionQueue};
pub use provider::{ChatResponse, LlmProvider, MockProvider, ProviderError, RetryingProvider, StopReason};
pub use retry::{retry, RetryPolicy};
pub use sandbox::{CommandSandbox, Sandbox, SandboxRules};
pub use shared::{SharedContextConfig, SharedContextState};
pub use tools::{ExecContext, ParamSchema, ParamType, Tool, ToolRegistry};
pub use types::{
    tool_fingerprint, AgentResult, CancelToken, ContentBlock, LoopConfig, Message, Role, ToolCall,
    ToolResult,
};
