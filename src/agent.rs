//! The agent loop: alternate model calls and tool executions until a stop
//! condition.
//!
//! The history is append-only. Errors local to a tool call are folded
//! into the next user message so the model can recover; errors that abort
//! the loop produce a terminal `AgentResult { success: false, .. }`.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::completion::{analyze_completion, guidance_for};
use crate::economics::SharedEconomicsState;
use crate::injection::{allocate_injections, InjectionKind, InjectionProposal};
use crate::provider::LlmProvider;
use crate::protocol::{EventMsg, EventQueue};
use crate::shared::SharedContextState;
use crate::tools::{ExecContext, ToolRegistry};
use crate::types::{
    tool_fingerprint, AgentResult, CancelToken, ContentBlock, LoopConfig, Message, ToolCall,
};

pub struct AgentLoop {
    config:        LoopConfig,
    provider:      Arc<dyn LlmProvider>,
    tools:         Arc<ToolRegistry>,
    system_blocks: Vec<ContentBlock>,
    worker_id:     String,
    submission_id: String,
    events:        Option<Arc<EventQueue>>,
    cancel:        CancelToken,
    economics:     Option<Arc<SharedEconomicsState>>,
    shared:        Option<Arc<SharedContextState>>,
}

impl AgentLoop {
    pub fn new(config: LoopConfig, provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            provider,
            tools,
            system_blocks: Vec::new(),
            worker_id:     "main".to_string(),
            submission_id: String::new(),
            events:        None,
            cancel:        CancelToken::new(),
            economics:     None,
            shared:        None,
        }
    }

    /// The composed system prompt, usually produced by `ContextAssembler`.
    pub fn with_system_blocks(mut self, blocks: Vec<ContentBlock>) -> Self {
        self.system_blocks = blocks;
        self
    }

    pub fn with_events(mut self, events: Arc<EventQueue>, submission_id: impl Into<String>) -> Self {
        self.events = Some(events);
        self.submission_id = submission_id.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_economics(mut self, economics: Arc<SharedEconomicsState>) -> Self {
        self.economics = Some(economics);
        self
    }

    pub fn with_shared(mut self, shared: Arc<SharedContextState>) -> Self {
        self.shared = Some(shared);
        self
    }

    fn emit(&self, event: EventMsg) {
        if let Some(events) = &self.events {
            events.emit(&self.submission_id, event);
        }
    }

    /// Run the loop on a task to a terminal result.
    pub async fn run(&self, task: &str) -> AgentResult {
        let mut history: Vec<Message> = Vec::new();
        if !self.system_blocks.is_empty() {
            history.push(Message::system_blocks(self.system_blocks.clone()));
        }
        history.push(Message::user(task));

        let declarations = self.tools.declarations();
        let mut looped_fingerprint: Option<String> = None;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;

            if self.cancel.is_cancelled() {
                self.emit(EventMsg::LoopComplete { success: false, iterations });
                return AgentResult {
                    success: false,
                    message: "Cancelled".to_string(),
                    iterations,
                    history,
                };
            }

            tracing::info!(worker = %self.worker_id, iteration = iterations, "agent loop tick");
            self.emit(EventMsg::LoopIteration { iteration: iterations });

            // Budget-bounded injections land ahead of the model call.
            if let Some(injected) = self.gather_injections(looped_fingerprint.take().as_deref()) {
                history.push(Message::user(injected));
            }

            let response = match self.provider.chat(&history, &declarations).await {
                Ok(response) => response,
                Err(err) => {
                    self.emit(EventMsg::LoopComplete { success: false, iterations });
                    return AgentResult {
                        success: false,
                        message: format!("LLM error: {err}"),
                        iterations,
                        history,
                    };
                }
            };

            history.push(Message::assistant(response.content.clone()));
            self.emit(EventMsg::LoopResponse { content: response.content.clone() });

            let tool_calls: Vec<ToolCall> = if !response.tool_calls.is_empty() {
                response.tool_calls
            } else {
                parse_tool_call(&response.content).into_iter().collect()
            };

            if tool_calls.is_empty() {
                let analysis = analyze_completion(&response.content);
                if analysis.is_incomplete_action
                    && analysis.confidence >= self.config.continuation_threshold
                {
                    tracing::debug!(
                        reason = ?analysis.reason,
                        confidence = analysis.confidence,
                        "response looks incomplete; nudging"
                    );
                    history.push(Message::user(guidance_for(analysis.reason)));
                    continue;
                }
                self.emit(EventMsg::LoopComplete { success: true, iterations });
                return AgentResult {
                    success: true,
                    message: response.content,
                    iterations,
                    history,
                };
            }

            for call in tool_calls {
                if let Some(economics) = &self.economics {
                    let fingerprint = tool_fingerprint(&call.name, &call.args);
                    economics.record_tool_call(&self.worker_id, &fingerprint);
                    if economics.is_global_doom_loop(&fingerprint) {
                        looped_fingerprint = Some(fingerprint);
                    }
                }

                if !self.tools.has(&call.name) {
                    history.push(Message::user(format!(
                        "Error: Unknown tool \"{}\". Available: {}",
                        call.name,
                        self.tools.tool_names().join(", ")
                    )));
                    continue;
                }

                let ctx = ExecContext {
                    submission_id: self.submission_id.clone(),
                    cwd:           None,
                    cancel:        self.cancel.clone(),
                    events:        self.events.clone(),
                };
                let result = self.tools.execute(&call.name, call.args.clone(), &ctx).await;

                if !result.success {
                    if let Some(shared) = &self.shared {
                        shared.record_failure(
                            &self.worker_id,
                            crate::shared::FailureReport {
                                action: format!("{} {}", call.name, summarize_args(&call.args)),
                                error:  result.output.clone(),
                                stack:  None,
                            },
                        );
                    }
                }

                let mut message = Message::user(if result.success {
                    format!("Tool result:\n{}", result.output)
                } else {
                    format!("Tool error:\n{}", result.output)
                });
                if let Some(id) = &call.id {
                    message.tool_call_ids.push(id.clone());
                }
                history.push(message);
            }
        }

        self.emit(EventMsg::LoopComplete { success: false, iterations });
        AgentResult {
            success: false,
            message: format!(
                "Max iterations ({}) reached without completion",
                self.config.max_iterations
            ),
            iterations,
            history,
        }
    }

    /// Collect injection proposals and fit them into the iteration's
    /// token budget. Returns the combined text, or `None` when nothing
    /// survives allocation.
    fn gather_injections(&self, looped_fingerprint: Option<&str>) -> Option<String> {
        let mut proposals = Vec::new();

        if let Some(fingerprint) = looped_fingerprint {
            proposals.push(InjectionProposal::new(
                InjectionKind::DoomLoop,
                format!(
                    "You have repeated the identical call {fingerprint} many times across \
                     workers without progress. Change approach instead of retrying it."
                ),
            ));
        }

        if let Some(shared) = &self.shared {
            let context = shared.get_failure_context(5);
            if !context.is_empty() {
                proposals.push(InjectionProposal::new(InjectionKind::FailureContext, context));
            }
            let insights = shared.extract_insights();
            if !insights.is_empty() {
                proposals.push(InjectionProposal::new(
                    InjectionKind::LearningContext,
                    insights.join("\n"),
                ));
            }
        }

        if proposals.is_empty() {
            return None;
        }

        let accepted = allocate_injections(proposals, self.config.injection_budget_tokens);
        if accepted.is_empty() {
            return None;
        }
        Some(
            accepted
                .into_iter()
                .map(|a| a.content)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }
}

fn summarize_args(args: &HashMap<String, serde_json::Value>) -> String {
    let mut keys: Vec<&String> = args.keys().collect();
    keys.sort();
    keys.iter()
        .filter_map(|k| args[*k].as_str().map(|v| v.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tool-call parsing from response text ─────────────────────────────────

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("fenced json rule"));

static FENCED_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*(\{.*?\})\s*```").expect("fenced plain rule"));

/// Parse a tool call out of a text response.
///
/// Tried in order: a fenced `json` block, any fenced block, and a raw
/// brace-delimited object. The first candidate that parses to an object
/// with a string `tool` property wins; `input` defaults to the empty
/// mapping.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let candidates = [
        FENCED_JSON.captures(text).map(|c| c[1].to_string()),
        FENCED_PLAIN.captures(text).map(|c| c[1].to_string()),
        extract_braced_object(text),
    ];

    for candidate in candidates.into_iter().flatten() {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&candidate) else {
            continue;
        };
        let Some(tool) = value.get("tool").and_then(|t| t.as_str()) else {
            continue;
        };
        let args: HashMap<String, serde_json::Value> = value
            .get("input")
            .and_then(|v| v.as_object())
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        return Some(ToolCall::new(tool, args));
    }
    None
}

/// The first balanced `{ … }` region whose content mentions a top-level
/// `"tool"` key candidate. Balance is tracked by depth, not regex.
fn extract_braced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
