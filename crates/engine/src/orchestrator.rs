//! Per-event state machine: idempotency check, billing gate, context
//! build, sequential agent dispatch under the admission gates, then the
//! processed mark.
//!
//! Agents run strictly sequentially in priority order. An earlier agent's
//! side effects may matter to a later agent's decision, and sequential
//! execution bounds worst-case cost exposure per event.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use relay_agents::{Agent, AgentRegistry};
use relay_core::domain::agent::{Decision, Run, RunStatus};
use relay_core::domain::context::EventContext;
use relay_core::domain::event::Event;
use relay_db::repositories::{EventRepository, RunRepository};

use crate::billing::BillingGate;
use crate::budget::BudgetGuard;
use crate::context::ContextBuilder;
use crate::errors::OrchestratorError;
use crate::idempotency::IdempotencyStore;
use crate::metrics::MetricsSink;
use crate::rate::RateLimiter;

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    context_builder: ContextBuilder,
    budget_guard: BudgetGuard,
    rate_limiter: RateLimiter,
    runs: Arc<dyn RunRepository>,
    events: Arc<dyn EventRepository>,
    idempotency: Arc<IdempotencyStore>,
    billing: Arc<dyn BillingGate>,
    metrics: Arc<dyn MetricsSink>,
}

/// Result of one agent's admission + decide + execute sequence, before
/// any run row is written.
enum AgentOutcome {
    BudgetDenied,
    RateLimited,
    NotApplicable,
    Idle(Decision),
    Acted { decision: Decision, result: serde_json::Value },
    Failed(String),
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        context_builder: ContextBuilder,
        runs: Arc<dyn RunRepository>,
        events: Arc<dyn EventRepository>,
        idempotency: Arc<IdempotencyStore>,
        billing: Arc<dyn BillingGate>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            budget_guard: BudgetGuard::new(Arc::clone(&runs)),
            rate_limiter: RateLimiter::new(Arc::clone(&runs)),
            registry,
            context_builder,
            runs,
            events,
            idempotency,
            billing,
            metrics,
        }
    }

    /// Either completes (event fully handled, possibly with per-agent
    /// failures recorded as error runs) or returns an error with the
    /// event left unmarked, safe for at-least-once redelivery.
    pub async fn process_event(&self, event: &Event) -> Result<(), OrchestratorError> {
        let started = Instant::now();
        let idempotency_key = format!("agent:{}", event.id);

        if self.idempotency.is_processed(&idempotency_key).await {
            debug!(event_id = %event.id, "event already processed by agents");
            return Ok(());
        }

        let verdict = self.billing.can_process_event(&event.store_id).await;
        if !verdict.allowed {
            warn!(
                store_id = %event.store_id,
                reason = verdict.reason.as_deref().unwrap_or("unspecified"),
                "event blocked by billing"
            );
            self.idempotency.mark_processed(&idempotency_key).await;
            return Ok(());
        }

        let context = self.context_builder.build(event).await?;

        let agents: Vec<Arc<dyn Agent>> = self
            .registry
            .agents_for_event(event.kind)
            .into_iter()
            .filter(|agent| agent.is_enabled(&context))
            .collect();

        if agents.is_empty() {
            debug!(event_id = %event.id, kind = event.kind.as_str(), "no agents eligible for event");
            self.idempotency.mark_processed(&idempotency_key).await;
            return Ok(());
        }

        for agent in &agents {
            self.dispatch_agent(agent.as_ref(), event, &context).await?;
        }

        self.events.mark_processed(&event.id, Utc::now()).await?;
        self.idempotency.mark_processed(&idempotency_key).await;

        info!(
            event_id = %event.id,
            kind = event.kind.as_str(),
            store_id = %event.store_id,
            agents_run = agents.len(),
            total_duration_ms = started.elapsed().as_millis() as u64,
            "event processing complete"
        );
        Ok(())
    }

    /// Anything the agent itself does wrong becomes an error run and the
    /// loop moves on; only run-persistence failures propagate, leaving
    /// the event unmarked for redelivery.
    async fn dispatch_agent(
        &self,
        agent: &dyn Agent,
        event: &Event,
        context: &EventContext,
    ) -> Result<(), OrchestratorError> {
        let agent_started = Instant::now();
        let outcome = self.attempt_agent(agent, context).await;
        let duration_ms = agent_started.elapsed().as_millis() as i64;

        match outcome {
            AgentOutcome::BudgetDenied => {
                warn!(store_id = %event.store_id, agent = %agent.kind(), "budget exceeded, skipping agent");
                self.runs
                    .create(self.run_record(
                        agent,
                        event,
                        None,
                        None,
                        duration_ms,
                        RunStatus::Skipped,
                        Some("Budget exceeded".to_string()),
                    ))
                    .await?;
            }
            AgentOutcome::RateLimited => {
                debug!(store_id = %event.store_id, agent = %agent.kind(), "rate limited, skipping agent");
            }
            AgentOutcome::NotApplicable => {}
            AgentOutcome::Idle(decision) => {
                self.runs
                    .create(self.run_record(
                        agent,
                        event,
                        Some(decision),
                        None,
                        duration_ms,
                        RunStatus::Success,
                        None,
                    ))
                    .await?;
            }
            AgentOutcome::Acted { decision, result } => {
                let cost_usd = decision.cost_usd;
                info!(
                    store_id = %event.store_id,
                    agent = %agent.kind(),
                    action = %decision.action,
                    confidence = decision.confidence,
                    duration_ms,
                    "agent action executed"
                );
                self.runs
                    .create(self.run_record(
                        agent,
                        event,
                        Some(decision),
                        Some(result),
                        duration_ms,
                        RunStatus::Success,
                        None,
                    ))
                    .await?;
                self.metrics.record_agent_action(&event.store_id, cost_usd).await;
            }
            AgentOutcome::Failed(message) => {
                error!(
                    store_id = %event.store_id,
                    agent = %agent.kind(),
                    event_id = %event.id,
                    error = %message,
                    "agent execution error"
                );
                self.runs
                    .create(self.run_record(
                        agent,
                        event,
                        None,
                        None,
                        duration_ms,
                        RunStatus::Error,
                        Some(message),
                    ))
                    .await?;
            }
        }

        Ok(())
    }

    async fn attempt_agent(&self, agent: &dyn Agent, context: &EventContext) -> AgentOutcome {
        // Gates are evaluated fresh for every agent; an earlier agent in
        // this same event may have exhausted the store budget.
        match self.budget_guard.can_spend(context, agent.kind()).await {
            Ok(true) => {}
            Ok(false) => return AgentOutcome::BudgetDenied,
            Err(gate_error) => return AgentOutcome::Failed(gate_error.to_string()),
        }

        match self.rate_limiter.can_act(context, agent.kind()).await {
            Ok(true) => {}
            Ok(false) => return AgentOutcome::RateLimited,
            Err(gate_error) => return AgentOutcome::Failed(gate_error.to_string()),
        }

        if !agent.can_handle(context) {
            return AgentOutcome::NotApplicable;
        }

        let decision = match agent.decide(context).await {
            Ok(decision) => decision,
            Err(agent_error) => return AgentOutcome::Failed(agent_error.to_string()),
        };

        if decision.is_no_action() {
            return AgentOutcome::Idle(decision);
        }

        match agent.execute(&decision, context).await {
            Ok(result) => AgentOutcome::Acted { decision, result },
            Err(agent_error) => AgentOutcome::Failed(agent_error.to_string()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_record(
        &self,
        agent: &dyn Agent,
        event: &Event,
        decision: Option<Decision>,
        result: Option<serde_json::Value>,
        duration_ms: i64,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Run {
        let (tokens_used, cost_usd) = decision
            .as_ref()
            .map(|decision| (decision.tokens_used, decision.cost_usd))
            .unwrap_or((0, 0.0));

        Run {
            id: Uuid::new_v4().to_string(),
            store_id: event.store_id.clone(),
            agent: agent.kind(),
            trigger_event_id: event.id.clone(),
            decision,
            result,
            duration_ms,
            tokens_used,
            cost_usd,
            status,
            error_message,
            created_at: Utc::now(),
        }
    }
}
