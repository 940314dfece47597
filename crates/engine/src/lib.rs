//! The admission-controlled, idempotent, cost-bounded orchestration core.
//!
//! One inbound commerce event flows through: idempotency check → billing
//! gate → context build → ordered agent dispatch under budget and rate
//! admission → durable run records → processed mark. Many events may be
//! in flight concurrently; within one event, agents run strictly
//! sequentially in priority order.
//!
//! Consistency model: budget and rate state derive from durable run
//! aggregates, not in-memory counters, so concurrent invocations racing
//! on the same store resolve through eventual consistency of the
//! aggregation. A short overspend window under heavy concurrency is an
//! accepted trade-off.

pub mod billing;
pub mod budget;
pub mod context;
pub mod errors;
pub mod idempotency;
pub mod metrics;
pub mod orchestrator;
pub mod rate;

pub use billing::{AllowAllBilling, BillingGate, BillingVerdict};
pub use budget::BudgetGuard;
pub use context::ContextBuilder;
pub use errors::OrchestratorError;
pub use idempotency::IdempotencyStore;
pub use metrics::{MetricsSink, NoopMetricsSink};
pub use orchestrator::Orchestrator;
pub use rate::RateLimiter;

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;

    use chrono::Utc;
    use serde_json::json;

    use relay_core::domain::agent::{AgentConfig, AgentKind};
    use relay_core::domain::context::EventContext;
    use relay_core::domain::event::{Event, EventKind, EventSource, StoreId};
    use relay_core::domain::store::Store;

    pub fn context_with_store_budgets(
        store_id: &str,
        daily_llm_budget_usd: Option<f64>,
        monthly_llm_budget_usd: Option<f64>,
    ) -> EventContext {
        let store_id = StoreId(store_id.to_string());
        let agent_configs: HashMap<AgentKind, AgentConfig> = AgentKind::ALL
            .into_iter()
            .map(|agent| (agent, AgentConfig::default_for(&store_id, agent)))
            .collect();

        EventContext {
            store: Store {
                id: store_id.clone(),
                name: "Aurora Goods".to_string(),
                platform_domain: "aurora-goods.example.com".to_string(),
                encrypted_access_token: "enc".to_string(),
                daily_llm_budget_usd,
                monthly_llm_budget_usd,
                created_at: Utc::now(),
            },
            event: Event {
                id: "e-gate".to_string(),
                store_id,
                external_event_id: None,
                kind: EventKind::OrderCreated,
                source: EventSource::Platform,
                payload: json!({}),
                received_at: Utc::now(),
                processed_at: None,
            },
            customer: None,
            recent_events: Vec::new(),
            recent_orders: Vec::new(),
            access_token: "token".to_string(),
            agent_configs,
        }
    }
}
