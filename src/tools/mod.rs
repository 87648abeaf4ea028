//! Tool trait and the registry that executes tools under policy.
//!
//! `execute` never panics and never returns `Err` at the loop seam: every
//! failure mode — bad arguments, denied permission, executor error,
//! cancellation — is folded into a `ToolResult { success: false, .. }`.

pub mod schema;

pub use schema::{ParamSchema, ParamSpec, ParamType};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::policy::{DangerLevel, PermissionDecision, PermissionPolicy};
use crate::protocol::{EventMsg, EventQueue};
use crate::sandbox::resolve_path;
use crate::types::{CancelToken, ToolResult};

/// Per-invocation execution context handed to tools.
#[derive(Clone)]
pub struct ExecContext {
    pub submission_id: String,
    pub cwd:           Option<PathBuf>,
    pub cancel:        CancelToken,
    pub events:        Option<Arc<EventQueue>>,
}

impl ExecContext {
    /// Context with no event sink and no cwd — unit tests and direct calls.
    pub fn detached() -> Self {
        Self {
            submission_id: String::new(),
            cwd:           None,
            cancel:        CancelToken::new(),
            events:        None,
        }
    }

    fn emit(&self, event: EventMsg) {
        if let Some(events) = &self.events {
            events.emit(&self.submission_id, event);
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> ParamSchema;

    /// Danger of this invocation. Tools that wrap shell commands override
    /// this to classify the command argument.
    fn danger_level(&self, _args: &HashMap<String, Value>) -> DangerLevel {
        DangerLevel::Safe
    }

    /// File tools return true so the registry resolves their `path` /
    /// `file_path` arguments against the configured base path.
    fn resolves_paths(&self) -> bool {
        false
    }

    /// Working directory for tools that spawn processes, resolved against
    /// the registry base path.
    fn default_cwd(&self, _base: &Path) -> Option<PathBuf> {
        None
    }

    async fn execute(
        &self,
        args: HashMap<String, Value>,
        ctx:  &ExecContext,
    ) -> Result<String, ToolError>;
}

/// Name-keyed tool registry. Registered at startup and write-once per
/// session: there is no removal.
pub struct ToolRegistry {
    tools:         HashMap<String, Arc<dyn Tool>>,
    policy:        Arc<PermissionPolicy>,
    base_path:     Option<PathBuf>,
    allowed_paths: Vec<PathBuf>,
}

impl ToolRegistry {
    pub fn new(policy: Arc<PermissionPolicy>) -> Self {
        Self {
            tools:         HashMap::new(),
            policy,
            base_path:     None,
            allowed_paths: Vec::new(),
        }
    }

    pub fn with_base_path(mut self, base: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base.into());
        self
    }

    pub fn with_allowed_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.allowed_paths = paths;
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names in sorted order — deterministic for prompts and errors.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool declarations for the provider, sorted by name so the
    /// serialized list is byte-stable across iterations.
    pub fn declarations(&self) -> Vec<Value> {
        let mut entries: Vec<(&String, &Arc<dyn Tool>)> = self.tools.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "input_schema": tool.schema().to_json_schema(),
                })
            })
            .collect()
    }

    /// Execute a named tool: validate input, consult the permission
    /// policy, resolve path arguments, run the executor, emit events.
    pub async fn execute(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        ctx:  &ExecContext,
    ) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::failure(format!("Tool '{name}' not found in registry"));
        };

        ctx.emit(EventMsg::ToolStart { tool: name.to_string() });

        if let Err(violations) = tool.schema().validate(&args) {
            let result = ToolResult::failure(format!("Invalid arguments: {}", violations.join("; ")));
            ctx.emit(EventMsg::ToolComplete { tool: name.to_string(), success: false });
            return result;
        }

        let danger = tool.danger_level(&args);
        if let PermissionDecision::Denied { reason } = self.policy.check(name, &args, danger) {
            tracing::warn!(tool = name, danger = %danger, reason = %reason, "tool denied by policy");
            ctx.emit(EventMsg::ToolPermissionDenied { tool: name.to_string(), reason: reason.clone() });
            ctx.emit(EventMsg::ToolComplete { tool: name.to_string(), success: false });
            return ToolResult::failure(format!("Permission denied: {reason}"));
        }

        let args = match self.resolve_args(tool.as_ref(), args) {
            Ok(args) => args,
            Err(err) => {
                ctx.emit(EventMsg::ToolComplete { tool: name.to_string(), success: false });
                return ToolResult::failure(err.to_string());
            }
        };

        if ctx.cancel.is_cancelled() {
            ctx.emit(EventMsg::ToolComplete { tool: name.to_string(), success: false });
            return ToolResult::failure("cancelled");
        }

        let mut ctx = ctx.clone();
        if ctx.cwd.is_none() {
            if let Some(base) = &self.base_path {
                ctx.cwd = tool.default_cwd(base);
            }
        }

        let started = Instant::now();
        let result = match tool.execute(args, &ctx).await {
            Ok(output) => ToolResult::success(output, started.elapsed().as_millis() as u64),
            Err(ToolError::Cancelled) => ToolResult::failure("cancelled"),
            Err(err) => ToolResult::failure(format!("Tool execution error: {err}")),
        };

        ctx.emit(EventMsg::ToolComplete { tool: name.to_string(), success: result.success });
        result
    }

    /// Rewrite relative `path` / `file_path` arguments of file tools
    /// against the base path, enforcing the allowed roots.
    fn resolve_args(
        &self,
        tool: &dyn Tool,
        mut args: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, ToolError> {
        let Some(base) = &self.base_path else { return Ok(args) };
        if !tool.resolves_paths() {
            return Ok(args);
        }
        for key in ["path", "file_path"] {
            let Some(requested) = args.get(key).and_then(|v| v.as_str()).map(str::to_string) else {
                continue;
            };
            let resolved = resolve_path(base, &requested, &self.allowed_paths)?;
            args.insert(key.to_string(), Value::String(resolved.to_string_lossy().into_owned()));
        }
        Ok(args)
    }
}
