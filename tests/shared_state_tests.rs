//! Cross-worker shared state: failure tracker, reference pool, and the
//! global doom-loop detector.

use std::collections::HashMap;

use agentcore::economics::SharedEconomicsState;
use agentcore::persist::{restore_doom_loop_state, save_doom_loop_state, MemoryKvStore};
use agentcore::shared::{
    FailureReport, ReferenceType, SharedContextConfig, SharedContextState,
};
use agentcore::tool_fingerprint;
use serde_json::json;

fn read_file_args(path: &str) -> HashMap<String, serde_json::Value> {
    HashMap::from([("path".to_string(), json!(path))])
}

fn default_state() -> SharedContextState {
    SharedContextState::new("You are a coding agent.", SharedContextConfig::default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Fingerprint canonicalisation (pinned format)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_fingerprint_format_is_pinned() {
    let fp = tool_fingerprint("read_file", &read_file_args("/same"));
    assert_eq!(
        fp, r#"read_file:{"path":"/same"}"#,
        "checkpoint portability depends on this exact format"
    );
}

#[test]
fn test_fingerprint_sorts_argument_keys() {
    let args = HashMap::from([
        ("b".to_string(), json!(1)),
        ("a".to_string(), json!(2)),
    ]);
    assert_eq!(
        tool_fingerprint("t", &args),
        r#"t:{"a":2,"b":1}"#,
        "key order in the source map must not leak into the fingerprint"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Global doom loop
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_global_doom_loop_across_five_workers() {
    let economics = SharedEconomicsState::new(5);
    let fp = tool_fingerprint("read_file", &read_file_args("/same"));

    for worker in ["w1", "w2", "w3", "w4"] {
        economics.record_tool_call(worker, &fp);
        assert!(
            !economics.is_global_doom_loop(&fp),
            "below the threshold there is no doom loop yet"
        );
    }
    economics.record_tool_call("w5", &fp);

    assert!(economics.is_global_doom_loop(&fp), "the 5th identical call trips the detector");
    assert_eq!(economics.worker_count(&fp), 5);

    let loops = economics.get_global_loops();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].fingerprint, fp);
    assert_eq!(loops[0].count, 5);
    assert_eq!(loops[0].workers.len(), 5);
}

#[test]
fn test_single_worker_can_trip_the_global_detector() {
    let economics = SharedEconomicsState::new(3);
    let fp = tool_fingerprint("search", &HashMap::from([("q".to_string(), json!("same"))]));

    for _ in 0..3 {
        economics.record_tool_call("w1", &fp);
    }
    assert!(economics.is_global_doom_loop(&fp));
    assert_eq!(economics.worker_count(&fp), 1);
}

#[test]
fn test_economics_checkpoint_roundtrip() {
    let economics = SharedEconomicsState::new(5);
    let fp = tool_fingerprint("read_file", &read_file_args("/same"));
    economics.record_tool_call("w1", &fp);
    economics.record_tool_call("w2", &fp);

    let checkpoint = economics.to_json();
    assert!(checkpoint.get("fingerprints").is_some(), "checkpoint layout is {{fingerprints: […]}}");

    let restored = SharedEconomicsState::new(5);
    restored.restore_from(&checkpoint).expect("restore succeeds");
    assert_eq!(restored.call_count(&fp), 2);
    assert_eq!(restored.worker_count(&fp), 2);
}

#[tokio::test]
async fn test_economics_checkpoint_through_kv_store() {
    let store = MemoryKvStore::new();
    let economics = SharedEconomicsState::new(5);
    let fp = tool_fingerprint("read_file", &read_file_args("/same"));
    economics.record_tool_call("w1", &fp);

    save_doom_loop_state(&store, "session-1", &economics).await.expect("save");

    let restored = SharedEconomicsState::new(5);
    assert!(restore_doom_loop_state(&store, "session-1", &restored).await.expect("restore"));
    assert_eq!(restored.call_count(&fp), 1);

    let missing = SharedEconomicsState::new(5);
    assert!(
        !restore_doom_loop_state(&store, "absent", &missing).await.expect("no error"),
        "a missing checkpoint restores nothing and is not an error"
    );
}

#[test]
fn test_economics_reset_clears_fingerprints() {
    let economics = SharedEconomicsState::new(2);
    economics.record_tool_call("w1", "t:{}");
    economics.record_tool_call("w1", "t:{}");
    assert!(economics.is_global_doom_loop("t:{}"));

    economics.reset();
    assert!(!economics.is_global_doom_loop("t:{}"));
    assert_eq!(economics.call_count("t:{}"), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure tracker
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_failures_carry_worker_tags() {
    let state = default_state();
    state.record_failure(
        "worker-2",
        FailureReport {
            action: "read_file /tmp/missing".to_string(),
            error:  "ENOENT".to_string(),
            stack:  None,
        },
    );

    let context = state.get_failure_context(10);
    assert!(
        context.contains("[worker-2] read_file /tmp/missing"),
        "the action must be prefixed with the worker tag: {context}"
    );
    assert!(context.contains("ENOENT"));
}

#[test]
fn test_has_recent_failure_matches_trimmed_action() {
    let state = default_state();
    state.record_failure(
        "w1",
        FailureReport { action: "  npm install  ".to_string(), error: "E404".to_string(), stack: None },
    );

    assert!(state.has_recent_failure("npm install", 60_000));
    assert!(!state.has_recent_failure("npm uninstall", 60_000));
}

#[test]
fn test_failure_capacity_evicts_fifo() {
    let state = SharedContextState::new(
        "",
        SharedContextConfig { max_failures: 2, max_references: 10 },
    );
    for i in 0..4 {
        state.record_failure(
            "w1",
            FailureReport { action: format!("step-{i}"), error: "boom".to_string(), stack: None },
        );
    }

    assert_eq!(state.failure_count(), 2);
    assert!(!state.has_recent_failure("step-0", 60_000), "oldest entries are gone");
    assert!(state.has_recent_failure("step-3", 60_000));
}

#[test]
fn test_failure_context_is_most_recent_first() {
    let state = default_state();
    state.record_failure("w1", FailureReport { action: "first".into(), error: "e1".into(), stack: None });
    state.record_failure("w1", FailureReport { action: "second".into(), error: "e2".into(), stack: None });

    let context = state.get_failure_context(10);
    let first_pos = context.find("first").expect("first entry present");
    let second_pos = context.find("second").expect("second entry present");
    assert!(second_pos < first_pos, "the newest failure leads the block");
}

#[test]
fn test_insights_aggregate_across_workers() {
    let state = default_state();
    for worker in ["w1", "w2", "w3"] {
        state.record_failure(
            worker,
            FailureReport {
                action: "read_file /shared/config".to_string(),
                error:  "ENOENT".to_string(),
                stack:  None,
            },
        );
    }

    let insights = state.extract_insights();
    assert!(
        insights.iter().any(|i| i.contains("3 workers")),
        "repeated cross-worker failures must aggregate: {insights:?}"
    );
}

#[test]
fn test_mark_resolved() {
    let state = default_state();
    let id = state.record_failure(
        "w1",
        FailureReport { action: "build".into(), error: "tsc failed".into(), stack: None },
    );
    assert!(state.mark_resolved(&id));
    assert!(!state.mark_resolved("no-such-id"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference pool
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_references_deduplicate_by_type_and_value() {
    let state = default_state();
    state.add_references(vec![
        (ReferenceType::File, "src/main.rs".to_string()),
        (ReferenceType::File, "src/main.rs".to_string()),
        (ReferenceType::Url, "src/main.rs".to_string()),
    ]);

    assert_eq!(
        state.reference_count(),
        2,
        "same value under a different type is a distinct reference"
    );
}

#[test]
fn test_reference_search_is_case_insensitive() {
    let state = default_state();
    state.add_references(vec![
        (ReferenceType::File, "src/Parser.rs".to_string()),
        (ReferenceType::Function, "parse_tool_call".to_string()),
        (ReferenceType::Url, "https://docs.rs".to_string()),
    ]);

    let hits = state.search_references("PARSE");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|r| r.value.to_lowercase().contains("parse")));
}

#[test]
fn test_reference_capacity_evicts_fifo_and_forgets_keys() {
    let state = SharedContextState::new(
        "",
        SharedContextConfig { max_failures: 10, max_references: 2 },
    );
    state.add_references(vec![
        (ReferenceType::File, "a".to_string()),
        (ReferenceType::File, "b".to_string()),
        (ReferenceType::File, "c".to_string()),
    ]);
    assert_eq!(state.reference_count(), 2);
    assert!(state.search_references("a").is_empty(), "evicted entries are gone");

    // An evicted key may be re-added.
    state.add_references(vec![(ReferenceType::File, "a".to_string())]);
    assert_eq!(state.search_references("a").len(), 1);
}

#[test]
fn test_static_prefix_is_frozen() {
    let state = default_state();
    assert_eq!(state.get_static_prefix(), "You are a coding agent.");
    state.reset();
    assert_eq!(state.get_static_prefix(), "You are a coding agent.", "reset keeps the prefix");
    assert_eq!(state.failure_count(), 0);
    assert_eq!(state.reference_count(), 0);
}
