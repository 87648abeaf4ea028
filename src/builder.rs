use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::AgentLoop;
use crate::context::ContextAssembler;
use crate::economics::SharedEconomicsState;
use crate::error::AgentError;
use crate::policy::{ApprovalCallback, PermissionMode, PermissionPolicy};
use crate::provider::{LlmProvider, RetryingProvider};
use crate::protocol::EventQueue;
use crate::retry::RetryPolicy;
use crate::shared::SharedContextState;
use crate::tools::{Tool, ToolRegistry};
use crate::types::{CancelToken, LoopConfig};

/// Fluent construction of an `AgentLoop`.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use agentcore::{AgentBuilder, MockProvider, ChatResponse, PermissionMode};
/// let provider = Arc::new(MockProvider::from_responses(vec![
///     ChatResponse::text("All done."),
/// ]));
/// let agent = AgentBuilder::new()
///     .provider(provider)
///     .permission_mode(PermissionMode::AutoSafe)
///     .retry_on_error(3)
///     .build()
///     .expect("builder should succeed");
/// ```
pub struct AgentBuilder {
    config:          LoopConfig,
    provider:        Option<Arc<dyn LlmProvider>>,
    retry:           Option<RetryPolicy>,
    chat_timeout_ms: Option<u64>,
    permission_mode: PermissionMode,
    approval:        Option<ApprovalCallback>,
    base_path:       Option<PathBuf>,
    tools:           Vec<Arc<dyn Tool>>,
    static_prefix:   String,
    rules:           String,
    memory:          String,
    dynamic:         String,
    events:          Option<(Arc<EventQueue>, String)>,
    economics:       Option<Arc<SharedEconomicsState>>,
    shared:          Option<Arc<SharedContextState>>,
    worker_id:       String,
    cancel:          Option<CancelToken>,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            config:          LoopConfig::default(),
            provider:        None,
            retry:           None,
            chat_timeout_ms: None,
            permission_mode: PermissionMode::AutoSafe,
            approval:        None,
            base_path:       None,
            tools:           Vec::new(),
            static_prefix:   String::new(),
            rules:           String::new(),
            memory:          String::new(),
            dynamic:         String::new(),
            events:          None,
            economics:       None,
            shared:          None,
            worker_id:       "main".to_string(),
            cancel:          None,
        }
    }

    // ── Provider ─────────────────────────────────────────────────────────

    /// Set the LLM provider. The escape-hatch for anything that speaks
    /// the `LlmProvider` contract.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Wrap the provider with automatic retry on transient errors.
    /// Auth-style failures (401/403) are never retried.
    pub fn retry_on_error(mut self, max_retries: u32) -> Self {
        self.retry = Some(RetryPolicy { max_retries, ..RetryPolicy::default() });
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Per-call deadline; an expired call surfaces as a retryable
    /// timeout.
    pub fn chat_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.chat_timeout_ms = Some(timeout_ms);
        self
    }

    // ── Policy ───────────────────────────────────────────────────────────

    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Interactive approval callback; implies nothing about the mode.
    pub fn approval_callback(mut self, callback: ApprovalCallback) -> Self {
        self.approval = Some(callback);
        self
    }

    /// Base path for resolving file-tool arguments and tool working
    /// directories.
    pub fn base_path(mut self, base: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base.into());
        self
    }

    // ── Tools ────────────────────────────────────────────────────────────

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    // ── Prompt sections ──────────────────────────────────────────────────

    pub fn static_prefix(mut self, text: impl Into<String>) -> Self {
        self.static_prefix = text.into();
        self
    }

    pub fn rules(mut self, text: impl Into<String>) -> Self {
        self.rules = text.into();
        self
    }

    pub fn memory(mut self, text: impl Into<String>) -> Self {
        self.memory = text.into();
        self
    }

    pub fn dynamic(mut self, text: impl Into<String>) -> Self {
        self.dynamic = text.into();
        self
    }

    // ── Loop configuration ───────────────────────────────────────────────

    pub fn config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.config.max_iterations = n;
        self
    }

    // ── Shared state and plumbing ────────────────────────────────────────

    pub fn events(mut self, events: Arc<EventQueue>, submission_id: impl Into<String>) -> Self {
        self.events = Some((events, submission_id.into()));
        self
    }

    pub fn economics(mut self, economics: Arc<SharedEconomicsState>) -> Self {
        self.economics = Some(economics);
        self
    }

    /// Attach the cross-worker shared state. When no explicit static
    /// prefix is set, the shared state's frozen prefix is used, so every
    /// worker assembles the same cacheable head.
    pub fn shared_state(mut self, shared: Arc<SharedContextState>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    // ── Build ────────────────────────────────────────────────────────────

    pub fn build(self) -> Result<AgentLoop, AgentError> {
        let mut provider = self.provider.ok_or_else(|| {
            AgentError::BuildError("LLM provider is required. Use .provider()".to_string())
        })?;

        if self.retry.is_some() || self.chat_timeout_ms.is_some() {
            let mut retrying = RetryingProvider::new(provider, self.retry.unwrap_or_default());
            if let Some(ms) = self.chat_timeout_ms {
                retrying = retrying.with_timeout_ms(ms);
            }
            provider = Arc::new(retrying);
        }

        let policy = match self.approval {
            Some(callback) => PermissionPolicy::with_handler(self.permission_mode, callback),
            None           => PermissionPolicy::new(self.permission_mode),
        };

        let mut registry = ToolRegistry::new(Arc::new(policy));
        if let Some(base) = &self.base_path {
            registry = registry.with_base_path(base.clone());
        }
        for tool in self.tools {
            registry.register(tool);
        }
        let registry = Arc::new(registry);

        let static_prefix = if self.static_prefix.is_empty() {
            self.shared
                .as_ref()
                .map(|s| s.get_static_prefix().to_string())
                .unwrap_or_default()
        } else {
            self.static_prefix
        };

        let blocks = ContextAssembler::new()
            .static_prefix(static_prefix)
            .rules(self.rules)
            .tools_from_declarations(&registry.declarations())
            .memory(self.memory)
            .dynamic(self.dynamic)
            .assemble();

        let mut agent = AgentLoop::new(self.config, provider, registry)
            .with_system_blocks(blocks)
            .with_worker_id(self.worker_id);

        if let Some((events, submission_id)) = self.events {
            agent = agent.with_events(events, submission_id);
        }
        if let Some(economics) = self.economics {
            agent = agent.with_economics(economics);
        }
        if let Some(shared) = self.shared {
            agent = agent.with_shared(shared);
        }
        if let Some(cancel) = self.cancel {
            agent = agent.with_cancel(cancel);
        }

        Ok(agent)
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
