//! Completion-intent analysis of assistant responses.
//!
//! A pure classifier over the response text: did the model actually finish,
//! or is it narrating work it has not done? The loop uses the verdict to
//! decide between returning the text as the final answer and injecting a
//! guidance message to keep the model working.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    None,
    FutureIntent,
    FailureAdmission,
    NarrativeAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionAnalysis {
    pub is_incomplete_action: bool,
    pub reason:               IncompleteReason,
    pub confidence:           f64,
}

impl CompletionAnalysis {
    fn complete(confidence: f64) -> Self {
        Self { is_incomplete_action: false, reason: IncompleteReason::None, confidence }
    }

    fn incomplete(reason: IncompleteReason, confidence: f64) -> Self {
        Self { is_incomplete_action: true, reason, confidence }
    }
}

// Rule tables. Patterns are data: adding a signal means adding a line here.

static COMPLETION_SIGNALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(done|completed|finished|saved|wrote)\b|here (is|'s) the (final|complete)|created successfully|all (changes|tasks) (are )?complete",
    )
    .expect("completion signal table")
});

static ACTION_VERBS: &str = "update|modify|create|add|change|fix|implement|refactor|write|edit|run|install|delete|remove|build|test|check|start";

static FUTURE_INTENT: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(&format!(r"(?i)\b(i will|i'll|let me)\b[^.!?]*\b({ACTION_VERBS})\b")).expect("future intent 1"),
        Regex::new(&format!(r"(?i)\bi\s+(need to|should|can)\b[^.!?]*\b({ACTION_VERBS})\b")).expect("future intent 2"),
        Regex::new(r"(?i)\b(the next step|first,?\s+i\b|now\s+i\b)").expect("future intent 3"),
        Regex::new(r"(?i)\bi('m| am)\s+going\s+to\b").expect("future intent 4"),
    ]
});

static FAILURE_ADMISSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)ran out of budget|budget exhausted|unable to complete|could not complete|no changes were made|no files were modified",
    )
    .expect("failure admission table")
});

static CODE_CONCEPTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(file|function|class|module|component|import|export|variable|method)\b")
        .expect("code concept table")
});

static NARRATIVE_VERBS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(update|modify|create|add|change|fix|implement|refactor|write|edit)\b")
        .expect("narrative verb table")
});

const NARRATIVE_MAX_LEN: usize = 600;

/// Classify an assistant response. Rules are evaluated in order; the first
/// match wins.
pub fn analyze_completion(text: &str) -> CompletionAnalysis {
    // 1. An explicit completion signal beats everything else.
    if COMPLETION_SIGNALS.is_match(text) {
        return CompletionAnalysis::complete(0.9);
    }

    // 2. Announced future work without having done it.
    if FUTURE_INTENT.iter().any(|re| re.is_match(text)) {
        return CompletionAnalysis::incomplete(IncompleteReason::FutureIntent, 0.95);
    }

    // 3. Admission that the work did not happen.
    if FAILURE_ADMISSION.is_match(text) {
        return CompletionAnalysis::incomplete(IncompleteReason::FailureAdmission, 0.9);
    }

    // 4. Short narrative about code with no artifact in sight.
    if text.len() < NARRATIVE_MAX_LEN
        && CODE_CONCEPTS.is_match(text)
        && NARRATIVE_VERBS.is_match(text)
        && !text.contains("```")
    {
        return CompletionAnalysis::incomplete(IncompleteReason::NarrativeAction, 0.65);
    }

    CompletionAnalysis::complete(0.3)
}

/// The guidance message injected when the loop decides to continue past an
/// incomplete response.
pub fn guidance_for(reason: IncompleteReason) -> &'static str {
    match reason {
        IncompleteReason::FutureIntent =>
            "You described what you will do but did not do it. Perform the action now using the available tools.",
        IncompleteReason::FailureAdmission =>
            "The task is not complete. Continue working toward the goal with the available tools, or state precisely what is blocking you.",
        IncompleteReason::NarrativeAction =>
            "You narrated a change without producing it. Apply the change using the available tools and show the result.",
        IncompleteReason::None =>
            "Continue with the task.",
    }
}
