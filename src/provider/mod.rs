//! The single interface between the loop and any LLM provider.
//!
//! # Contract
//! - Must be Send + Sync (used behind `Arc<dyn LlmProvider>`)
//! - Returns `Ok(ChatResponse)` on any valid model interaction
//! - Returns `Err(ProviderError)` only for transport or semantic
//!   failures; the error carries the attributes the retry classifier
//!   consults (status, code, retry-after)
//! - Tool-call arguments that fail JSON parsing must not error: the
//!   adapter attaches `parse_error` and defaults the arguments to the
//!   empty mapping
//! - Vendor-specific cache accounting is normalised here: prefer
//!   `cacheReadTokens`, fall back to any equivalent

mod mock;
mod retry;

pub use mock::MockProvider;
pub use retry::RetryingProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::budget::TokenUsage;
use crate::retry::RetryClassify;
use crate::types::{Message, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content:     String,
    pub stop_reason: StopReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls:  Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage:       Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost:        Option<f64>,
}

impl ChatResponse {
    /// A plain end-of-turn text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content:     content.into(),
            stop_reason: StopReason::EndTurn,
            tool_calls:  Vec::new(),
            usage:       None,
            cost:        None,
        }
    }

    pub fn tool_use(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content:     content.into(),
            stop_reason: StopReason::ToolUse,
            tool_calls,
            usage:       None,
            cost:        None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message:        String,
    pub code:           Option<String>,
    pub status:         Option<u16>,
    pub retryable:      Option<bool>,
    pub retry_after_ms: Option<u64>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message:        message.into(),
            code:           None,
            status:         None,
            retryable:      None,
            retry_after_ms: None,
        }
    }

    pub fn transport(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { code: Some(code.into()), ..Self::new(message) }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), ..Self::new(message) }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_ms: u64) -> Self {
        Self {
            status:         Some(429),
            retry_after_ms: Some(retry_after_ms),
            ..Self::new(message)
        }
    }

    /// A model call that exceeded its configured deadline. Explicitly
    /// retryable.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self { retryable: Some(true), ..Self::new(message) }
    }
}

impl RetryClassify for ProviderError {
    fn retryable_hint(&self) -> Option<bool> {
        self.retryable
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn status(&self) -> Option<u16> {
        self.status
    }

    fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }

    fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One model call over the ordered history with the given tool
    /// declarations.
    async fn chat(&self, messages: &[Message], tools: &[Value]) -> Result<ChatResponse, ProviderError>;
}

/// Normalise a vendor usage payload. Token fields are read through their
/// known aliases; cache reads prefer `cacheReadTokens` and fall back to
/// equivalents like `cachedTokens`.
pub fn normalize_usage(raw: &Value) -> (TokenUsage, Option<f64>) {
    fn read(raw: &Value, keys: &[&str]) -> u64 {
        keys.iter()
            .find_map(|k| raw.get(k).and_then(|v| v.as_u64()))
            .unwrap_or(0)
    }

    let input = read(raw, &["inputTokens", "input_tokens", "prompt_tokens"]);
    let output = read(raw, &["outputTokens", "output_tokens", "completion_tokens"]);
    let cache_read = read(
        raw,
        &["cacheReadTokens", "cache_read_tokens", "cachedTokens", "cached_tokens", "cache_read_input_tokens"],
    );
    let cache_write = read(
        raw,
        &["cacheWriteTokens", "cache_write_tokens", "cache_creation_input_tokens"],
    );
    let cost = raw.get("cost").and_then(|v| v.as_f64());

    let usage = TokenUsage {
        input_tokens:       input,
        output_tokens:      output,
        cache_read_tokens:  cache_read,
        cache_write_tokens: cache_write,
        total_tokens:       input + output,
    };
    (usage, cost)
}
