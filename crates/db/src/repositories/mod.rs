use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use relay_core::domain::agent::{AgentConfig, AgentKind, Run};
use relay_core::domain::customer::Customer;
use relay_core::domain::event::{Event, StoreId};
use relay_core::domain::order::Order;
use relay_core::domain::store::Store;

pub mod agent_config;
pub mod customer;
pub mod event;
pub mod memory;
pub mod metrics;
pub mod order;
pub mod processed_event;
pub mod run;
pub mod store;

pub use agent_config::SqlAgentConfigRepository;
pub use customer::SqlCustomerRepository;
pub use event::SqlEventRepository;
pub use memory::{
    InMemoryAgentConfigRepository, InMemoryCustomerRepository, InMemoryEventRepository,
    InMemoryMetricsRepository, InMemoryOrderRepository, InMemoryProcessedEventRepository,
    InMemoryRunRepository, InMemoryStoreRepository,
};
pub use metrics::SqlMetricsRepository;
pub use order::SqlOrderRepository;
pub use processed_event::SqlProcessedEventRepository;
pub use run::SqlRunRepository;
pub use store::SqlStoreRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Append-only audit trail plus the window aggregates the admission gates
/// derive their state from. Window cutoffs are computed by the caller so
/// tests control the clock boundaries.
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: Run) -> Result<(), RepositoryError>;

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<Run>, RepositoryError>;

    /// Sum of `cost_usd` over runs created at or after `since`, optionally
    /// scoped to one agent.
    async fn cost_since(
        &self,
        store_id: &StoreId,
        agent: Option<AgentKind>,
        since: DateTime<Utc>,
    ) -> Result<f64, RepositoryError>;

    /// Count of non-NO_ACTION runs for (store, agent) created at or after
    /// `since`.
    async fn actions_since(
        &self,
        store_id: &StoreId,
        agent: AgentKind,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn save(&self, event: Event) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>, RepositoryError>;

    async fn mark_processed(
        &self,
        event_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Most recent events whose payload carries the given customer email,
    /// newest first, bounded.
    async fn recent_for_customer(
        &self,
        store_id: &StoreId,
        email: &str,
        limit: u32,
    ) -> Result<Vec<Event>, RepositoryError>;
}

#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn find_by_id(&self, id: &StoreId) -> Result<Option<Store>, RepositoryError>;
    async fn save(&self, store: Store) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        store_id: &StoreId,
        external_id: &str,
    ) -> Result<Option<Customer>, RepositoryError>;

    async fn find_by_email(
        &self,
        store_id: &StoreId,
        email: &str,
    ) -> Result<Option<Customer>, RepositoryError>;

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn recent_for_customer(
        &self,
        store_id: &StoreId,
        customer_external_id: &str,
        limit: u32,
    ) -> Result<Vec<Order>, RepositoryError>;

    async fn save(&self, order: Order) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AgentConfigRepository: Send + Sync {
    async fn list_for_store(&self, store_id: &StoreId)
        -> Result<Vec<AgentConfig>, RepositoryError>;
    async fn save(&self, config: AgentConfig) -> Result<(), RepositoryError>;
}

/// Durable half of the idempotency ledger.
#[async_trait]
pub trait ProcessedEventRepository: Send + Sync {
    /// Insert-if-absent; returns true when the key was newly recorded.
    async fn insert_if_absent(
        &self,
        key: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn exists(&self, key: &str) -> Result<bool, RepositoryError>;

    async fn insert_batch(
        &self,
        keys: &[String],
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn record_action(
        &self,
        store_id: &StoreId,
        day: NaiveDate,
        cost_usd: f64,
    ) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_json(column: &str, value: String) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(&value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}
