use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::retry::{retry, RetryPolicy};
use crate::types::Message;

use super::{ChatResponse, LlmProvider, ProviderError};

/// Wraps any `LlmProvider` with the retry/back-off layer and an optional
/// per-call deadline. A call that exceeds the deadline surfaces as a
/// retryable timeout error.
pub struct RetryingProvider {
    inner:      Arc<dyn LlmProvider>,
    policy:     RetryPolicy,
    timeout_ms: Option<u64>,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy, timeout_ms: None }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    async fn call_once(&self, messages: &[Message], tools: &[Value]) -> Result<ChatResponse, ProviderError> {
        match self.timeout_ms {
            Some(ms) => {
                match tokio::time::timeout(Duration::from_millis(ms), self.inner.chat(messages, tools)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::timeout(format!("model call exceeded {ms}ms timeout"))),
                }
            }
            None => self.inner.chat(messages, tools).await,
        }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn chat(&self, messages: &[Message], tools: &[Value]) -> Result<ChatResponse, ProviderError> {
        retry(&self.policy, || self.call_once(messages, tools), None).await
    }
}
