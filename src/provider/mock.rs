use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Message;

use super::{ChatResponse, LlmProvider, ProviderError};

/// Scripted provider for tests — no network calls are made.
pub struct MockProvider {
    responses: Mutex<Vec<Result<ChatResponse, ProviderError>>>,
    call_log:  Mutex<Vec<usize>>, // message count per call
}

impl MockProvider {
    pub fn new(responses: Vec<Result<ChatResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_log:  Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a script of successful responses.
    pub fn from_responses(responses: Vec<ChatResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Returns the number of times `chat` was invoked.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Returns the history length passed to the Nth call (0-indexed).
    pub fn history_len_for_call(&self, n: usize) -> Option<usize> {
        self.call_log.lock().unwrap().get(n).copied()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message], _tools: &[Value]) -> Result<ChatResponse, ProviderError> {
        self.call_log.lock().unwrap().push(messages.len());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ProviderError::new("MockProvider: no more programmed responses"));
        }
        responses.remove(0)
    }
}
