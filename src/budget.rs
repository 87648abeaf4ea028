use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Tracks token usage for a single LLM call or an entire session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens:       u64,
    pub output_tokens:      u64,
    pub cache_read_tokens:  u64,
    pub cache_write_tokens: u64,
    pub total_tokens:       u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens:       input,
            output_tokens:      output,
            cache_read_tokens:  0,
            cache_write_tokens: 0,
            total_tokens:       input + output,
        }
    }

    /// Accumulate usage from another call
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Snapshot of one child's allocation, returned by `reserve` and
/// refreshed by `snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub id:           String,
    pub token_budget: u64,
    pub cost_budget:  f64,
    pub tokens_used:  u64,
    pub cost_used:    f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetPoolConfig {
    pub total_tokens:         u64,
    pub total_cost:           f64,
    pub max_tokens_per_child: u64,
    pub max_cost_per_child:   f64,
}

impl Default for BudgetPoolConfig {
    fn default() -> Self {
        Self {
            total_tokens:         1_000_000,
            total_cost:           f64::INFINITY,
            max_tokens_per_child: DEFAULT_MAX_TOKENS_PER_CHILD,
            max_cost_per_child:   f64::INFINITY,
        }
    }
}

pub const DEFAULT_PARENT_RESERVE_RATIO: f64 = 0.25;
pub const DEFAULT_MAX_TOKENS_PER_CHILD: u64 = 100_000;

#[derive(Debug, Default)]
struct AllocationState {
    token_budget: u64,
    cost_budget:  f64,
    tokens_used:  u64,
    cost_used:    f64,
}

#[derive(Debug)]
struct PoolState {
    tokens_used:     u64,
    cost_used:       f64,
    tokens_reserved: u64,
    cost_reserved:   f64,
    allocations:     HashMap<String, AllocationState>,
}

/// Shared budget pool with pessimistic accounting: capacity consumed is
/// `max(used, reserved)` per resource, so concurrent reservations can
/// never overshoot capacity even before any usage lands.
///
/// `reserve` and `release` must be paired on every code path — unused
/// budget only returns to the pool on release.
#[derive(Debug)]
pub struct SharedBudgetPool {
    config: BudgetPoolConfig,
    state:  Mutex<PoolState>,
}

impl SharedBudgetPool {
    pub fn new(config: BudgetPoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState {
                tokens_used:     0,
                cost_used:       0.0,
                tokens_reserved: 0,
                cost_reserved:   0.0,
                allocations:     HashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &BudgetPoolConfig {
        &self.config
    }

    /// Capacity not yet claimed by realised usage or live reservations.
    pub fn remaining_tokens(&self) -> u64 {
        let state = self.state.lock().unwrap();
        self.config
            .total_tokens
            .saturating_sub(state.tokens_used.max(state.tokens_reserved))
    }

    pub fn remaining_cost(&self) -> f64 {
        let state = self.state.lock().unwrap();
        (self.config.total_cost - state.cost_used.max(state.cost_reserved)).max(0.0)
    }

    pub fn tokens_reserved(&self) -> u64 {
        self.state.lock().unwrap().tokens_reserved
    }

    pub fn tokens_used(&self) -> u64 {
        self.state.lock().unwrap().tokens_used
    }

    /// Reserve a child allocation pessimistically. Grants
    /// `min(max_per_child, remaining)` of each resource; returns `None`
    /// when either grant would be empty, or when the child already holds
    /// a live allocation.
    pub fn reserve(&self, child_id: &str) -> Option<BudgetAllocation> {
        let mut state = self.state.lock().unwrap();
        if state.allocations.contains_key(child_id) {
            return None;
        }

        let tokens_remaining = self
            .config
            .total_tokens
            .saturating_sub(state.tokens_used.max(state.tokens_reserved));
        let token_budget = self.config.max_tokens_per_child.min(tokens_remaining);
        if token_budget == 0 {
            return None;
        }

        let cost_remaining = self.config.total_cost - state.cost_used.max(state.cost_reserved);
        let cost_budget = self.config.max_cost_per_child.min(cost_remaining);
        if cost_budget <= 0.0 {
            return None;
        }

        state.tokens_reserved += token_budget;
        if cost_budget.is_finite() {
            state.cost_reserved += cost_budget;
        }
        state.allocations.insert(
            child_id.to_string(),
            AllocationState { token_budget, cost_budget, tokens_used: 0, cost_used: 0.0 },
        );

        tracing::debug!(
            child = child_id,
            token_budget,
            tokens_reserved = state.tokens_reserved,
            "budget reserved"
        );

        Some(BudgetAllocation {
            id:           child_id.to_string(),
            token_budget,
            cost_budget,
            tokens_used:  0,
            cost_used:    0.0,
        })
    }

    /// Record realised usage against a live allocation. Returns `false` —
    /// recording nothing — when the child has no allocation or the usage
    /// would exceed its per-child budget. Reservations are untouched.
    pub fn record_usage(&self, child_id: &str, tokens: u64, cost: f64) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(allocation) = state.allocations.get_mut(child_id) else {
            return false;
        };
        if allocation.tokens_used + tokens > allocation.token_budget {
            return false;
        }
        if allocation.cost_budget.is_finite() && allocation.cost_used + cost > allocation.cost_budget {
            return false;
        }
        allocation.tokens_used += tokens;
        allocation.cost_used += cost;
        state.tokens_used += tokens;
        state.cost_used += cost;
        true
    }

    /// Release a child's allocation, returning its unused reservation to
    /// the pool. Mandatory after the child finishes.
    pub fn release(&self, child_id: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(allocation) = state.allocations.remove(child_id) else {
            return;
        };
        debug_assert!(
            state.tokens_reserved >= allocation.token_budget,
            "reservation accounting went negative"
        );
        state.tokens_reserved = state.tokens_reserved.saturating_sub(allocation.token_budget);
        if allocation.cost_budget.is_finite() {
            state.cost_reserved = (state.cost_reserved - allocation.cost_budget).max(0.0);
        }
        tracing::debug!(
            child = child_id,
            tokens_used = allocation.tokens_used,
            tokens_reserved = state.tokens_reserved,
            "budget released"
        );
    }

    /// Current view of a live allocation.
    pub fn snapshot(&self, child_id: &str) -> Option<BudgetAllocation> {
        let state = self.state.lock().unwrap();
        state.allocations.get(child_id).map(|a| BudgetAllocation {
            id:           child_id.to_string(),
            token_budget: a.token_budget,
            cost_budget:  a.cost_budget,
            tokens_used:  a.tokens_used,
            cost_used:    a.cost_used,
        })
    }
}

/// Partition a parent budget into a worker pool. The parent keeps
/// `reserve_ratio` of each resource for post-worker synthesis; the pool
/// gets the rest.
pub fn create_budget_pool(
    parent_tokens:        u64,
    parent_cost:          f64,
    parent_reserve_ratio: f64,
    max_tokens_per_child: u64,
) -> SharedBudgetPool {
    let ratio = parent_reserve_ratio.clamp(0.0, 1.0);
    let pool_tokens = ((parent_tokens as f64) * (1.0 - ratio)).floor() as u64;
    let pool_cost = if parent_cost.is_finite() { parent_cost * (1.0 - ratio) } else { parent_cost };
    SharedBudgetPool::new(BudgetPoolConfig {
        total_tokens:         pool_tokens,
        total_cost:           pool_cost,
        max_tokens_per_child: max_tokens_per_child,
        max_cost_per_child:   f64::INFINITY,
    })
}
