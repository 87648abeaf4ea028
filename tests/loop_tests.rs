//! Agent loop integration tests.
//!
//! All tests use `MockProvider` — no network calls are made.
//! Run with: `cargo test`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use agentcore::{
    parse_tool_call, AgentBuilder, CancelToken, ChatResponse, ExecContext, MockProvider,
    ParamSchema, ParamType, Role, Tool, ToolError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test helpers
// ─────────────────────────────────────────────────────────────────────────────

struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate a simple arithmetic expression"
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new().require("expression", ParamType::String, "The expression to evaluate")
    }

    async fn execute(
        &self,
        args: HashMap<String, serde_json::Value>,
        _ctx: &ExecContext,
    ) -> Result<String, ToolError> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("expression must be a string".to_string()))?;
        match expression {
            "25*4" => Ok("100".to_string()),
            other  => Err(ToolError::ExecutionError(format!("cannot evaluate '{other}'"))),
        }
    }
}

fn mock(responses: Vec<ChatResponse>) -> Arc<MockProvider> {
    Arc::new(MockProvider::from_responses(responses))
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: calculator-style loop — tool call then final answer
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_calculator_loop_two_iterations() {
    let provider = mock(vec![
        ChatResponse::text("```json\n{\"tool\":\"calculate\",\"input\":{\"expression\":\"25*4\"}}\n```"),
        ChatResponse::text("The answer is 100."),
    ]);

    let agent = AgentBuilder::new()
        .provider(provider)
        .tool(Arc::new(CalculateTool))
        .build()
        .expect("builder should succeed");

    let result = agent.run("What is 25 * 4?").await;

    assert!(result.success, "loop should succeed: {}", result.message);
    assert_eq!(result.iterations, 2, "one tool round plus one answer round");
    assert!(result.message.contains("100"), "final answer should contain 100");
    assert_eq!(
        result.history.len(),
        5,
        "history must be system, user, assistant, tool-result, assistant"
    );
    assert_eq!(result.history[0].role, Role::System);
    assert_eq!(result.history[1].role, Role::User);
    assert_eq!(result.history[2].role, Role::Assistant);
    assert_eq!(result.history[3].role, Role::User);
    assert!(
        result.history[3].content.as_text().starts_with("Tool result:"),
        "tool output must be folded into a user message"
    );
    assert_eq!(result.history[4].role, Role::Assistant);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: unknown tool becomes an error message, loop continues
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_tool_is_reported_not_fatal() {
    let provider = mock(vec![
        ChatResponse::text(r#"{"tool":"unknown_tool","input":{}}"#),
        ChatResponse::text("That capability is unavailable; answering directly instead: 42."),
    ]);

    let agent = AgentBuilder::new()
        .provider(provider)
        .tool(Arc::new(CalculateTool))
        .build()
        .expect("builder should succeed");

    let result = agent.run("Use the mystery tool").await;

    assert!(result.success, "loop should recover from an unknown tool");
    assert_eq!(result.iterations, 2, "unknown tool costs one iteration, then the loop continues");

    let error_message = result
        .history
        .iter()
        .find(|m| m.role == Role::User && m.content.as_text().starts_with("Error: Unknown tool"))
        .expect("a user-role error message must be appended");
    assert!(
        error_message
            .content
            .as_text()
            .starts_with("Error: Unknown tool \"unknown_tool\""),
        "error must name the unknown tool: {}",
        error_message.content.as_text()
    );
    assert!(
        error_message.content.as_text().contains("calculate"),
        "error must list the available tools"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: tool executor failure is folded into a user message
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tool_failure_becomes_tool_error_message() {
    let provider = mock(vec![
        ChatResponse::text("```json\n{\"tool\":\"calculate\",\"input\":{\"expression\":\"1/0\"}}\n```"),
        ChatResponse::text("The expression could not be evaluated."),
    ]);

    let agent = AgentBuilder::new()
        .provider(provider)
        .tool(Arc::new(CalculateTool))
        .build()
        .expect("builder should succeed");

    let result = agent.run("Divide by zero").await;

    assert!(result.success, "tool failure must not abort the loop");
    let error_message = result
        .history
        .iter()
        .find(|m| m.content.as_text().starts_with("Tool error:"))
        .expect("tool failure must appear as a Tool error message");
    assert!(
        error_message.content.as_text().contains("Tool execution error"),
        "executor failures are wrapped: {}",
        error_message.content.as_text()
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: max iterations produces a terminal failure
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_max_iterations_reached() {
    // Every response requests another tool call; the loop must stop itself.
    let responses: Vec<ChatResponse> = (0..5)
        .map(|_| ChatResponse::text("```json\n{\"tool\":\"calculate\",\"input\":{\"expression\":\"25*4\"}}\n```"))
        .collect();

    let agent = AgentBuilder::new()
        .provider(mock(responses))
        .tool(Arc::new(CalculateTool))
        .max_iterations(3)
        .build()
        .expect("builder should succeed");

    let result = agent.run("Loop forever").await;

    assert!(!result.success, "hitting the cap is a failure");
    assert_eq!(result.iterations, 3);
    assert!(
        result.message.starts_with("Max iterations (3) reached"),
        "message must name the cap: {}",
        result.message
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: provider failure is terminal with an LLM error message
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_provider_error_is_terminal() {
    let provider = Arc::new(MockProvider::new(vec![Err(
        agentcore::ProviderError::http(401, "invalid api key"),
    )]));

    let agent = AgentBuilder::new()
        .provider(provider)
        .build()
        .expect("builder should succeed");

    let result = agent.run("anything").await;

    assert!(!result.success);
    assert!(
        result.message.starts_with("LLM error:"),
        "terminal provider failures are prefixed: {}",
        result.message
    );
    assert_eq!(result.iterations, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: future-intent narration triggers a guidance nudge
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_future_intent_injects_guidance_and_continues() {
    let provider = mock(vec![
        ChatResponse::text("I'll create the config file for you next."),
        ChatResponse::text("Done. The config file has been created successfully."),
    ]);

    let agent = AgentBuilder::new()
        .provider(provider)
        .build()
        .expect("builder should succeed");

    let result = agent.run("Create a config file").await;

    assert!(result.success);
    assert_eq!(result.iterations, 2, "the narrated response must not end the loop");
    let nudge = result
        .history
        .iter()
        .filter(|m| m.role == Role::User)
        .any(|m| m.content.as_text().contains("did not do it"));
    assert!(nudge, "a guidance message must be injected after the narration");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: a pre-cancelled token stops the loop before any model call
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancellation_stops_the_loop() {
    let cancel = CancelToken::new();
    cancel.cancel();

    let provider = mock(vec![ChatResponse::text("should never be reached")]);
    let agent = AgentBuilder::new()
        .provider(provider.clone())
        .cancel_token(cancel)
        .build()
        .expect("builder should succeed");

    let result = agent.run("anything").await;

    assert!(!result.success);
    assert_eq!(result.message, "Cancelled");
    assert_eq!(provider.call_count(), 0, "no model call may happen after cancellation");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 8: schema violations come back as structured failures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_schema_violation_is_structured_failure() {
    let provider = mock(vec![
        // Missing the required "expression" parameter.
        ChatResponse::text("```json\n{\"tool\":\"calculate\",\"input\":{}}\n```"),
        ChatResponse::text("I passed the wrong arguments; the correct answer is 100."),
    ]);

    let agent = AgentBuilder::new()
        .provider(provider)
        .tool(Arc::new(CalculateTool))
        .build()
        .expect("builder should succeed");

    let result = agent.run("Calculate").await;

    assert!(result.success);
    let validation_error = result
        .history
        .iter()
        .find(|m| m.content.as_text().contains("Invalid arguments"))
        .expect("validation failure must reach the model as a message");
    assert!(
        validation_error.content.as_text().contains("expression"),
        "the violation must name the missing parameter"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 9: tool-call parsing candidates
// ─────────────────────────────────────────────────────────────────────────────

// ─────────────────────────────────────────────────────────────────────────────
// Test 10: doom-loop detection injects a course correction
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repeated_identical_calls_trigger_doom_loop_injection() {
    use agentcore::protocol::{EventMsg, EventQueue};
    use agentcore::SharedEconomicsState;

    let same_call =
        ChatResponse::text("```json\n{\"tool\":\"calculate\",\"input\":{\"expression\":\"25*4\"}}\n```");
    let provider = mock(vec![
        same_call.clone(),
        same_call.clone(),
        same_call,
        ChatResponse::text("The answer is 100."),
    ]);

    let economics = Arc::new(SharedEconomicsState::new(2));
    let events = Arc::new(EventQueue::new());

    let agent = AgentBuilder::new()
        .provider(provider)
        .tool(Arc::new(CalculateTool))
        .economics(Arc::clone(&economics))
        .events(Arc::clone(&events), "sub-0")
        .worker_id("w1")
        .build()
        .expect("builder should succeed");

    let result = agent.run("What is 25 * 4?").await;
    assert!(result.success);

    let nudge = result
        .history
        .iter()
        .filter(|m| m.role == Role::User)
        .any(|m| m.content.as_text().contains("repeated the identical call"));
    assert!(nudge, "crossing the doom-loop threshold must inject a course correction");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let recent = events.recent_events();
    let iterations = recent
        .iter()
        .filter(|e| matches!(e.event, EventMsg::LoopIteration { .. }))
        .count();
    assert_eq!(iterations, result.iterations, "every iteration must be announced");
    assert!(
        recent
            .iter()
            .any(|e| matches!(e.event, EventMsg::LoopComplete { success: true, .. })),
        "the terminal event must report success"
    );
}

#[test]
fn test_parse_tool_call_fenced_json() {
    let call = parse_tool_call("Let me compute.\n```json\n{\"tool\":\"calc\",\"input\":{\"x\":1}}\n```")
        .expect("fenced json block must parse");
    assert_eq!(call.name, "calc");
    assert_eq!(call.args.get("x").and_then(|v| v.as_i64()), Some(1));
}

#[test]
fn test_parse_tool_call_plain_fence() {
    let call = parse_tool_call("```\n{\"tool\":\"search\",\"input\":{\"q\":\"rust\"}}\n```")
        .expect("plain fenced block must parse");
    assert_eq!(call.name, "search");
}

#[test]
fn test_parse_tool_call_raw_braces() {
    let call = parse_tool_call("Calling: {\"tool\":\"read_file\",\"input\":{\"path\":\"/tmp/x\"}} now")
        .expect("raw brace object must parse");
    assert_eq!(call.name, "read_file");
    assert_eq!(call.args.get("path").and_then(|v| v.as_str()), Some("/tmp/x"));
}

#[test]
fn test_parse_tool_call_defaults_input_to_empty() {
    let call = parse_tool_call(r#"{"tool":"noop"}"#).expect("missing input defaults to empty");
    assert!(call.args.is_empty());
}

#[test]
fn test_parse_tool_call_rejects_non_tool_objects() {
    assert!(parse_tool_call(r#"{"answer": 42}"#).is_none(), "objects without a tool key are not calls");
    assert!(parse_tool_call("no json here at all").is_none());
}
