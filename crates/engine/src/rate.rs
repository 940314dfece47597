//! Throughput admission: a sliding 60-minute window over non-NO_ACTION
//! runs, recomputed from run timestamps on every check.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;

use relay_core::domain::agent::AgentKind;
use relay_core::domain::context::EventContext;
use relay_db::repositories::{RepositoryError, RunRepository};

const WINDOW_MINUTES: i64 = 60;

pub struct RateLimiter {
    runs: Arc<dyn RunRepository>,
}

impl RateLimiter {
    pub fn new(runs: Arc<dyn RunRepository>) -> Self {
        Self { runs }
    }

    /// False means "skip silently", not an error: a throttled agent
    /// leaves no run row, to avoid inflating audit volume under
    /// sustained pressure.
    pub async fn can_act(
        &self,
        context: &EventContext,
        agent: AgentKind,
    ) -> Result<bool, RepositoryError> {
        let max_per_hour = context
            .config_for(agent)
            .map(|config| config.max_actions_per_hour)
            .unwrap_or(50);

        let window_start = Utc::now() - Duration::minutes(WINDOW_MINUTES);
        let actions_last_hour =
            self.runs.actions_since(&context.store.id, agent, window_start).await?;

        if actions_last_hour >= i64::from(max_per_hour) {
            debug!(
                store_id = %context.store.id,
                agent = %agent,
                actions_last_hour,
                max_per_hour,
                "rate limit reached"
            );
            return Ok(false);
        }

        Ok(true)
    }
}
