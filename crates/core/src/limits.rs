//! Platform-wide ceilings and retention windows. These are deliberately
//! not configurable per store; per-store knobs live in `AgentConfig` and
//! the store record.

/// Hard daily reasoning-spend ceiling per store, independent of any
/// store-configured budget.
pub const ABSOLUTE_MAX_DAILY_LLM_BUDGET_USD: f64 = 100.0;

pub const DEFAULT_DAILY_LLM_BUDGET_USD: f64 = 25.0;
pub const DEFAULT_MONTHLY_LLM_BUDGET_USD: f64 = 500.0;

/// Upper bound on a single reasoning call's output allocation.
pub const MAX_LLM_TOKENS_PER_CALL: u32 = 4096;

pub const PROCESSED_EVENTS_RETENTION_DAYS: u32 = 7;
pub const AGENT_RUNS_RETENTION_DAYS: u32 = 90;
pub const EVENTS_RETENTION_DAYS: u32 = 30;

/// Bounded history sizes fed into the decision context.
pub const RECENT_EVENTS_LIMIT: u32 = 20;
pub const RECENT_ORDERS_LIMIT: u32 = 10;
