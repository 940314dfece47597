use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use relay_core::domain::event::StoreId;
use relay_db::repositories::{
    InMemoryMetricsRepository, MetricsRepository, SqlMetricsRepository,
};

/// Best-effort action counters. Never authoritative for budget math and
/// never allowed to fail the dispatch path; implementations swallow and
/// log their own errors.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_agent_action(&self, store_id: &StoreId, cost_usd: f64);
}

pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn record_agent_action(&self, _store_id: &StoreId, _cost_usd: f64) {}
}

#[async_trait]
impl MetricsSink for SqlMetricsRepository {
    async fn record_agent_action(&self, store_id: &StoreId, cost_usd: f64) {
        let day = Utc::now().date_naive();
        if let Err(db_error) = MetricsRepository::record_action(self, store_id, day, cost_usd).await
        {
            warn!(store_id = %store_id, error = %db_error, "failed to record action metrics");
        }
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsRepository {
    async fn record_agent_action(&self, store_id: &StoreId, cost_usd: f64) {
        let day = Utc::now().date_naive();
        if let Err(db_error) = MetricsRepository::record_action(self, store_id, day, cost_usd).await
        {
            warn!(store_id = %store_id, error = %db_error, "failed to record action metrics");
        }
    }
}
