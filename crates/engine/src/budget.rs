//! Spend admission. All figures derive from summing `cost_usd` over run
//! records in the relevant window; there is no separate running counter,
//! so correctness depends on every costed call producing a run row.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use tracing::{error, warn};

use relay_core::domain::agent::AgentKind;
use relay_core::domain::context::EventContext;
use relay_core::limits::ABSOLUTE_MAX_DAILY_LLM_BUDGET_USD;
use relay_db::repositories::{RepositoryError, RunRepository};

pub struct BudgetGuard {
    runs: Arc<dyn RunRepository>,
}

impl BudgetGuard {
    pub fn new(runs: Arc<dyn RunRepository>) -> Self {
        Self { runs }
    }

    /// Checks run cheapest-first and short-circuit on the first violated
    /// ceiling: agent daily cap, store daily cap, store monthly cap, then
    /// the absolute platform ceiling.
    pub async fn can_spend(
        &self,
        context: &EventContext,
        agent: AgentKind,
    ) -> Result<bool, RepositoryError> {
        let store_id = &context.store.id;
        let now = Utc::now();
        let today = start_of_day(now);

        if let Some(config) = context.config_for(agent) {
            let agent_day_cost = self.runs.cost_since(store_id, Some(agent), today).await?;
            if agent_day_cost >= config.max_cost_per_day_usd {
                warn!(
                    store_id = %store_id,
                    agent = %agent,
                    spent = agent_day_cost,
                    limit = config.max_cost_per_day_usd,
                    "agent daily budget exceeded"
                );
                return Ok(false);
            }
        }

        let store_day_cost = self.runs.cost_since(store_id, None, today).await?;
        if let Some(daily_cap) = context.store.daily_llm_budget_usd {
            if store_day_cost >= daily_cap {
                warn!(
                    store_id = %store_id,
                    spent = store_day_cost,
                    limit = daily_cap,
                    "store daily budget exceeded"
                );
                return Ok(false);
            }
        }

        if let Some(monthly_cap) = context.store.monthly_llm_budget_usd {
            let month_cost = self.runs.cost_since(store_id, None, start_of_month(now)).await?;
            if month_cost >= monthly_cap {
                warn!(
                    store_id = %store_id,
                    spent = month_cost,
                    limit = monthly_cap,
                    "store monthly budget exceeded"
                );
                return Ok(false);
            }
        }

        if store_day_cost >= ABSOLUTE_MAX_DAILY_LLM_BUDGET_USD {
            error!(
                store_id = %store_id,
                spent = store_day_cost,
                limit = ABSOLUTE_MAX_DAILY_LLM_BUDGET_USD,
                "absolute daily budget exceeded"
            );
            return Ok(false);
        }

        Ok(true)
    }
}

pub(crate) fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub(crate) fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    date.with_day(1).unwrap_or(date).and_time(NaiveTime::MIN).and_utc()
}
