//! Shared budget pool and injection allocation tests.

use agentcore::budget::{create_budget_pool, BudgetPoolConfig, SharedBudgetPool, TokenUsage};
use agentcore::injection::{allocate_injections, estimate_tokens, InjectionKind, InjectionProposal};

fn pool_100k_40k() -> SharedBudgetPool {
    SharedBudgetPool::new(BudgetPoolConfig {
        total_tokens:         100_000,
        total_cost:           f64::INFINITY,
        max_tokens_per_child: 40_000,
        max_cost_per_child:   f64::INFINITY,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Reservation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_pessimistic_reservation_sequence() {
    let pool = pool_100k_40k();

    let a = pool.reserve("a").expect("first child gets a full allocation");
    assert_eq!(a.token_budget, 40_000);

    let b = pool.reserve("b").expect("second child gets a full allocation");
    assert_eq!(b.token_budget, 40_000);

    let c = pool.reserve("c").expect("third child gets the remainder");
    assert_eq!(c.token_budget, 20_000, "only 20k remains after two full grants");

    assert!(pool.reserve("d").is_none(), "an exhausted pool refuses the fourth child");
}

#[test]
fn test_release_returns_unused_budget() {
    let pool = pool_100k_40k();
    pool.reserve("a").expect("reserve a");
    pool.reserve("b").expect("reserve b");
    pool.reserve("c").expect("reserve c");

    assert!(pool.record_usage("a", 10_000, 0.0), "usage within budget is recorded");
    pool.release("a");

    // used=10k, live reservations = 60k → remaining = 100k − max(10k, 60k).
    assert_eq!(pool.remaining_tokens(), 40_000);

    let e = pool.reserve("e").expect("released budget is available again");
    assert_eq!(e.token_budget, 40_000, "min(max_per_child, remaining)");
}

#[test]
fn test_reserve_release_leaves_no_residue() {
    let pool = pool_100k_40k();
    pool.reserve("a").expect("reserve");
    pool.release("a");

    assert_eq!(pool.tokens_reserved(), 0, "release must zero the reservation");
    assert_eq!(
        pool.remaining_tokens(),
        100_000,
        "with no usage recorded, the full capacity returns"
    );
}

#[test]
fn test_effective_remaining_tracks_recorded_usage() {
    let pool = pool_100k_40k();
    pool.reserve("a").expect("reserve");
    assert!(pool.record_usage("a", 25_000, 0.0));
    pool.release("a");

    assert_eq!(pool.tokens_reserved(), 0);
    assert_eq!(
        pool.remaining_tokens(),
        75_000,
        "after release the effective remaining equals capacity − recorded usage"
    );
}

#[test]
fn test_double_reserve_for_live_child_is_refused() {
    let pool = pool_100k_40k();
    pool.reserve("a").expect("first reserve");
    assert!(pool.reserve("a").is_none(), "a live child cannot reserve twice");
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage accounting
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_record_usage_rejects_overdraft() {
    let pool = pool_100k_40k();
    pool.reserve("a").expect("reserve");

    assert!(pool.record_usage("a", 39_000, 0.0));
    assert!(
        !pool.record_usage("a", 2_000, 0.0),
        "usage beyond the per-child budget is refused"
    );

    let snapshot = pool.snapshot("a").expect("allocation is live");
    assert_eq!(snapshot.tokens_used, 39_000, "the refused usage must not be recorded");
}

#[test]
fn test_record_usage_without_allocation_fails() {
    let pool = pool_100k_40k();
    assert!(!pool.record_usage("ghost", 100, 0.0));
}

#[test]
fn test_cost_budget_is_enforced_when_finite() {
    let pool = SharedBudgetPool::new(BudgetPoolConfig {
        total_tokens:         100_000,
        total_cost:           1.0,
        max_tokens_per_child: 40_000,
        max_cost_per_child:   0.5,
    });

    pool.reserve("a").expect("reserve");
    assert!(pool.record_usage("a", 100, 0.4));
    assert!(!pool.record_usage("a", 100, 0.2), "cost overdraft is refused");
}

// ─────────────────────────────────────────────────────────────────────────────
// Pool partitioning
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_create_budget_pool_keeps_parent_reserve() {
    let pool = create_budget_pool(200_000, f64::INFINITY, 0.25, 100_000);
    assert_eq!(
        pool.config().total_tokens,
        150_000,
        "the parent keeps 25% for post-worker synthesis"
    );
    assert_eq!(pool.config().max_tokens_per_child, 100_000);
}

// ─────────────────────────────────────────────────────────────────────────────
// Token usage accumulation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_token_usage_accumulates() {
    let mut session = TokenUsage::new(1_000, 200);
    session.add(TokenUsage::new(500, 100));
    assert_eq!(session.input_tokens, 1_500);
    assert_eq!(session.output_tokens, 300);
    assert_eq!(session.total_tokens, 1_800);
}

// ─────────────────────────────────────────────────────────────────────────────
// Injection slots
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_injections_under_budget_are_all_accepted() {
    let proposals = vec![
        InjectionProposal::new(InjectionKind::FailureContext, "x".repeat(400)),
        InjectionProposal::new(InjectionKind::Recitation, "y".repeat(400)),
    ];
    // 400 chars ≈ 100 tokens each, well under 1000.
    let accepted = allocate_injections(proposals, 1_000);

    assert_eq!(accepted.len(), 2);
    assert!(accepted.iter().all(|a| !a.truncated), "nothing is truncated under budget");
}

#[test]
fn test_injections_are_ordered_by_priority() {
    let proposals = vec![
        InjectionProposal::new(InjectionKind::PhaseGuidance, "guidance".to_string()),
        InjectionProposal::new(InjectionKind::BudgetWarning, "warning".to_string()),
        InjectionProposal::new(InjectionKind::DoomLoop, "loop".to_string()),
    ];
    let accepted = allocate_injections(proposals, 1_000);

    let kinds: Vec<InjectionKind> = accepted.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![InjectionKind::BudgetWarning, InjectionKind::DoomLoop, InjectionKind::PhaseGuidance],
        "lower priority values come first"
    );
}

#[test]
fn test_marginal_injection_is_truncated() {
    let proposals = vec![
        InjectionProposal::new(InjectionKind::BudgetWarning, "a".repeat(1_200)), // 300 tokens
        InjectionProposal::new(InjectionKind::Recitation, "b".repeat(4_000)),    // 1000 tokens
    ];
    let accepted = allocate_injections(proposals, 500);

    assert_eq!(accepted.len(), 2);
    assert!(!accepted[0].truncated);
    assert!(accepted[1].truncated, "the oversized proposal is cut to the margin");
    assert!(
        accepted[1].content.ends_with("…(truncated for context budget)"),
        "truncation is announced in the content"
    );
    assert!(
        accepted[1].content.len() <= 200 * 4 + "…(truncated for context budget)".len(),
        "the cut respects the remaining budget"
    );
}

#[test]
fn test_injection_below_floor_is_dropped() {
    let proposals = vec![
        InjectionProposal::new(InjectionKind::BudgetWarning, "a".repeat(1_800)), // 450 tokens
        InjectionProposal::new(InjectionKind::Recitation, "b".repeat(4_000)),    // 1000 tokens
    ];
    // 50 tokens remain after the first proposal — below the 100-token floor.
    let accepted = allocate_injections(proposals, 500);

    assert_eq!(accepted.len(), 1, "a proposal with no meaningful room left is dropped");
    assert_eq!(accepted[0].kind, InjectionKind::BudgetWarning);
}

#[test]
fn test_token_estimate_rounds_up() {
    assert_eq!(estimate_tokens(""), 0);
    assert_eq!(estimate_tokens("abc"), 1);
    assert_eq!(estimate_tokens("abcd"), 1);
    assert_eq!(estimate_tokens("abcde"), 2);
}
