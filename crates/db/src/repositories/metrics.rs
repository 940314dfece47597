use chrono::NaiveDate;

use relay_core::domain::event::StoreId;

use super::{MetricsRepository, RepositoryError};
use crate::DbPool;

/// Best-effort per-store daily counters surfaced to the dashboard. Never
/// used for budget math; that derives from agent_runs.
pub struct SqlMetricsRepository {
    pool: DbPool,
}

impl SqlMetricsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MetricsRepository for SqlMetricsRepository {
    async fn record_action(
        &self,
        store_id: &StoreId,
        day: NaiveDate,
        cost_usd: f64,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO store_metrics (store_id, day, actions, cost_usd)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(store_id, day) DO UPDATE SET
                actions = actions + 1,
                cost_usd = cost_usd + excluded.cost_usd",
        )
        .bind(&store_id.0)
        .bind(day.to_string())
        .bind(cost_usd)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
