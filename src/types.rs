use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message role in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Role::System    => write!(f, "system"),
            Role::User      => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One block of prompt content. A block either carries a cache marker —
/// announcing "the prefix up to and including this block is a stable cache
/// key" — or it does not. Order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub text:         String,
    pub cache_marker: bool,
}

impl ContentBlock {
    pub fn cacheable(text: impl Into<String>) -> Self {
        Self { text: text.into(), cache_marker: true }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), cache_marker: false }
    }
}

/// Message content: plain text, or an ordered list of content blocks
/// (used for the composed system prompt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Flattens the content to plain text (blocks joined by newlines).
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(t)   => t.clone(),
            MessageContent::Blocks(b) => b.iter()
                .map(|blk| blk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One entry in the append-only conversation history. Never mutated after
/// it is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role:    Role,
    pub content: MessageContent,
    /// Ids of the tool calls this message answers, when it carries results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_ids: Vec<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(content.into()), tool_call_ids: Vec::new() }
    }

    pub fn system_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self { role: Role::System, content: MessageContent::Blocks(blocks), tool_call_ids: Vec::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(content.into()), tool_call_ids: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(content.into()), tool_call_ids: Vec::new() }
    }
}

/// A tool invocation requested by the LLM. Immutable once created.
///
/// If the raw argument payload failed to parse as JSON, `parse_error`
/// carries the message and `args` defaults to the empty mapping — a bad
/// payload must not crash the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: HashMap<String, serde_json::Value>,
    pub id:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: HashMap<String, serde_json::Value>) -> Self {
        Self { name: name.into(), args, id: None, parse_error: None }
    }

    /// Build a call from a raw JSON argument string. A parse failure is
    /// recorded, not propagated.
    pub fn from_raw_args(name: impl Into<String>, id: Option<String>, raw_args: &str) -> Self {
        match serde_json::from_str::<HashMap<String, serde_json::Value>>(raw_args) {
            Ok(args) => Self { name: name.into(), args, id, parse_error: None },
            Err(e)   => Self {
                name:        name.into(),
                args:        HashMap::new(),
                id,
                parse_error: Some(e.to_string()),
            },
        }
    }
}

/// Result of a single tool execution, as produced by `ToolRegistry::execute`.
/// `success == false` implies `output` describes the failure cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output:  String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ToolMetrics>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub latency_ms: u64,
}

impl ToolResult {
    pub fn success(output: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: true,
            output:  output.into(),
            metrics: Some(ToolMetrics { latency_ms }),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into(), metrics: None }
    }
}

/// Terminal outcome of one agent loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success:    bool,
    pub message:    String,
    pub iterations: usize,
    pub history:    Vec<Message>,
}

/// Configuration for the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Hard cap on model-call iterations.
    pub max_iterations: usize,

    /// Completion-intent confidence at or above which a no-tool-call
    /// response classified incomplete makes the loop inject guidance and
    /// continue rather than halt.
    pub continuation_threshold: f64,

    /// Token budget for per-iteration injection slots.
    pub injection_budget_tokens: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations:          15,
            continuation_threshold:  0.6,
            injection_budget_tokens: 2_000,
        }
    }
}

/// Cooperative cancellation handle passed down to tool executions and
/// checked by the loop between suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Canonical JSON serialisation: object keys sorted, no insignificant
/// whitespace. Used for tool fingerprints and cacheable prompt sections so
/// the same logical value always produces the same bytes.
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner = keys.iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(&map[*k])))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", inner)
        }
        serde_json::Value::Array(items) => {
            let inner = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{}]", inner)
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Canonical fingerprint of a tool call: `tool_name:sorted_args`. This
/// format is pinned by the test suite so persisted doom-loop checkpoints
/// stay portable.
pub fn tool_fingerprint(tool: &str, args: &HashMap<String, serde_json::Value>) -> String {
    let mut map = serde_json::Map::new();
    for (k, v) in args {
        map.insert(k.clone(), v.clone());
    }
    format!("{}:{}", tool, canonical_json(&serde_json::Value::Object(map)))
}
