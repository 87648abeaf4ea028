//! Per-iteration injection slots.
//!
//! The loop proposes priority-tagged content for the next model call; the
//! manager fits proposals into a token budget, truncating at the margin
//! and dropping the rest.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionKind {
    BudgetWarning,
    TimeoutWrapup,
    DoomLoop,
    FailureContext,
    LearningContext,
    Recitation,
    ExplorationNudge,
    PhaseGuidance,
}

impl InjectionKind {
    /// Fixed priority; lower is more important.
    pub fn priority(&self) -> u8 {
        match self {
            InjectionKind::BudgetWarning    => 0,
            InjectionKind::TimeoutWrapup    => 0,
            InjectionKind::DoomLoop         => 1,
            InjectionKind::FailureContext   => 2,
            InjectionKind::LearningContext  => 2,
            InjectionKind::Recitation       => 3,
            InjectionKind::ExplorationNudge => 4,
            InjectionKind::PhaseGuidance    => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionProposal {
    pub kind:    InjectionKind,
    pub content: String,
}

impl InjectionProposal {
    pub fn new(kind: InjectionKind, content: impl Into<String>) -> Self {
        Self { kind, content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedInjection {
    pub kind:      InjectionKind,
    pub content:   String,
    pub truncated: bool,
}

const TRUNCATION_SUFFIX: &str = "…(truncated for context budget)";
const TRUNCATION_FLOOR_TOKENS: usize = 100;

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Fit proposals into `budget_tokens`.
///
/// Proposals are taken in priority order (stable within equal priority).
/// A proposal that fits is accepted whole; one that does not fit is
/// truncated to the remaining budget when more than the floor remains,
/// otherwise dropped.
pub fn allocate_injections(
    proposals:     Vec<InjectionProposal>,
    budget_tokens: usize,
) -> Vec<AcceptedInjection> {
    let mut ordered = proposals;
    ordered.sort_by_key(|p| p.kind.priority());

    let mut remaining = budget_tokens;
    let mut accepted = Vec::new();

    for proposal in ordered {
        let estimated = estimate_tokens(&proposal.content);
        if estimated <= remaining {
            remaining -= estimated;
            accepted.push(AcceptedInjection {
                kind:      proposal.kind,
                content:   proposal.content,
                truncated: false,
            });
        } else if remaining > TRUNCATION_FLOOR_TOKENS {
            let keep_chars = remaining * 4;
            let cut: String = proposal.content.chars().take(keep_chars).collect();
            accepted.push(AcceptedInjection {
                kind:      proposal.kind,
                content:   format!("{cut}{TRUNCATION_SUFFIX}"),
                truncated: true,
            });
            remaining = 0;
        } else {
            tracing::debug!(kind = ?proposal.kind, estimated, remaining, "injection dropped");
        }
    }

    accepted
}
