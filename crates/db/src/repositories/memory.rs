//! In-memory repository implementations backing engine tests and local
//! experimentation. Same contracts as the SQL variants, no durability.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use relay_core::domain::agent::{AgentConfig, AgentKind, Run};
use relay_core::domain::customer::Customer;
use relay_core::domain::event::{payload, Event, StoreId};
use relay_core::domain::order::Order;
use relay_core::domain::store::Store;

use super::{
    AgentConfigRepository, CustomerRepository, EventRepository, MetricsRepository,
    OrderRepository, ProcessedEventRepository, RepositoryError, RunRepository, StoreRepository,
};

#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: RwLock<Vec<Run>>,
}

impl InMemoryRunRepository {
    pub async fn all(&self) -> Vec<Run> {
        self.runs.read().await.clone()
    }

    /// Seed a run directly, bypassing `create`, for window tests.
    pub async fn seed(&self, run: Run) {
        self.runs.write().await.push(run);
    }
}

#[async_trait::async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn create(&self, run: Run) -> Result<(), RepositoryError> {
        self.runs.write().await.push(run);
        Ok(())
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<Run>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.iter().filter(|run| run.trigger_event_id == event_id).cloned().collect())
    }

    async fn cost_since(
        &self,
        store_id: &StoreId,
        agent: Option<AgentKind>,
        since: DateTime<Utc>,
    ) -> Result<f64, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|run| {
                run.store_id == *store_id
                    && run.created_at >= since
                    && agent.map(|agent| run.agent == agent).unwrap_or(true)
            })
            .map(|run| run.cost_usd)
            .sum())
    }

    async fn actions_since(
        &self,
        store_id: &StoreId,
        agent: AgentKind,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|run| {
                run.store_id == *store_id
                    && run.agent == agent
                    && run.created_at >= since
                    && run.is_action()
            })
            .count() as i64)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|run| run.created_at >= cutoff);
        Ok((before - runs.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<String, Event>>,
}

impl InMemoryEventRepository {
    pub async fn get(&self, id: &str) -> Option<Event> {
        self.events.read().await.get(id).cloned()
    }
}

#[async_trait::async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn save(&self, event: Event) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.entry(event.id.clone()).or_insert(event);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>, RepositoryError> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        if let Some(event) = events.get_mut(event_id) {
            event.processed_at = Some(processed_at);
        }
        Ok(())
    }

    async fn recent_for_customer(
        &self,
        store_id: &StoreId,
        email: &str,
        limit: u32,
    ) -> Result<Vec<Event>, RepositoryError> {
        let events = self.events.read().await;
        let mut matching: Vec<Event> = events
            .values()
            .filter(|event| {
                event.store_id == *store_id
                    && payload::email(&event.payload).as_deref() == Some(email)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryStoreRepository {
    stores: RwLock<HashMap<String, Store>>,
}

#[async_trait::async_trait]
impl StoreRepository for InMemoryStoreRepository {
    async fn find_by_id(&self, id: &StoreId) -> Result<Option<Store>, RepositoryError> {
        Ok(self.stores.read().await.get(&id.0).cloned())
    }

    async fn save(&self, store: Store) -> Result<(), RepositoryError> {
        self.stores.write().await.insert(store.id.0.clone(), store);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<String, Customer>>,
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_external_id(
        &self,
        store_id: &StoreId,
        external_id: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers
            .values()
            .find(|customer| {
                customer.store_id == *store_id
                    && customer.external_id.as_deref() == Some(external_id)
            })
            .cloned())
    }

    async fn find_by_email(
        &self,
        store_id: &StoreId,
        email: &str,
    ) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers
            .values()
            .find(|customer| {
                customer.store_id == *store_id && customer.email.as_deref() == Some(email)
            })
            .cloned())
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        self.customers.write().await.insert(customer.id.clone(), customer);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<Order>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn recent_for_customer(
        &self,
        store_id: &StoreId,
        customer_external_id: &str,
        limit: u32,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .iter()
            .filter(|order| {
                order.store_id == *store_id
                    && order.customer_external_id.as_deref() == Some(customer_external_id)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn save(&self, order: Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        orders.retain(|existing| {
            !(existing.store_id == order.store_id
                && existing.external_order_id == order.external_order_id)
        });
        orders.push(order);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAgentConfigRepository {
    configs: RwLock<Vec<AgentConfig>>,
}

#[async_trait::async_trait]
impl AgentConfigRepository for InMemoryAgentConfigRepository {
    async fn list_for_store(
        &self,
        store_id: &StoreId,
    ) -> Result<Vec<AgentConfig>, RepositoryError> {
        let configs = self.configs.read().await;
        Ok(configs.iter().filter(|config| config.store_id == *store_id).cloned().collect())
    }

    async fn save(&self, config: AgentConfig) -> Result<(), RepositoryError> {
        let mut configs = self.configs.write().await;
        configs.retain(|existing| {
            !(existing.store_id == config.store_id && existing.agent == config.agent)
        });
        configs.push(config);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProcessedEventRepository {
    keys: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryProcessedEventRepository {
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ProcessedEventRepository for InMemoryProcessedEventRepository {
    async fn insert_if_absent(
        &self,
        key: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut keys = self.keys.write().await;
        if keys.contains_key(key) {
            return Ok(false);
        }
        keys.insert(key.to_string(), processed_at);
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.keys.read().await.contains_key(key))
    }

    async fn insert_batch(
        &self,
        batch: &[String],
        processed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut keys = self.keys.write().await;
        for key in batch {
            keys.entry(key.clone()).or_insert(processed_at);
        }
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut keys = self.keys.write().await;
        let before = keys.len();
        keys.retain(|_, processed_at| *processed_at >= cutoff);
        Ok((before - keys.len()) as u64)
    }
}

/// Counting metrics double used by orchestrator tests.
#[derive(Default)]
pub struct InMemoryMetricsRepository {
    entries: RwLock<Vec<(StoreId, NaiveDate, f64)>>,
}

impl InMemoryMetricsRepository {
    pub async fn entries(&self) -> Vec<(StoreId, NaiveDate, f64)> {
        self.entries.read().await.clone()
    }
}

#[async_trait::async_trait]
impl MetricsRepository for InMemoryMetricsRepository {
    async fn record_action(
        &self,
        store_id: &StoreId,
        day: NaiveDate,
        cost_usd: f64,
    ) -> Result<(), RepositoryError> {
        self.entries.write().await.push((store_id.clone(), day, cost_usd));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use relay_core::domain::agent::{AgentKind, Decision, Run, RunStatus};
    use relay_core::domain::event::{Event, EventKind, EventSource, StoreId};

    use super::{InMemoryEventRepository, InMemoryProcessedEventRepository, InMemoryRunRepository};
    use crate::repositories::{EventRepository, ProcessedEventRepository, RunRepository};

    #[tokio::test]
    async fn run_aggregates_match_sql_semantics() {
        let repo = InMemoryRunRepository::default();
        let store_id = StoreId("s-1".to_string());
        let now = Utc::now();

        let action = Run {
            id: "r-1".to_string(),
            store_id: store_id.clone(),
            agent: AgentKind::Support,
            trigger_event_id: "e-1".to_string(),
            decision: Some(Decision {
                action: "auto_respond".to_string(),
                ..Decision::no_action("")
            }),
            result: None,
            duration_ms: 5,
            tokens_used: 0,
            cost_usd: 0.10,
            status: RunStatus::Success,
            error_message: None,
            created_at: now - Duration::minutes(10),
        };
        let idle = Run {
            id: "r-2".to_string(),
            decision: Some(Decision::no_action("nothing")),
            cost_usd: 0.05,
            ..action.clone()
        };
        repo.create(action).await.expect("create action");
        repo.create(idle).await.expect("create idle");

        let cost = repo
            .cost_since(&store_id, None, now - Duration::hours(1))
            .await
            .expect("cost");
        assert!((cost - 0.15).abs() < 1e-9);

        let actions = repo
            .actions_since(&store_id, AgentKind::Support, now - Duration::hours(1))
            .await
            .expect("actions");
        assert_eq!(actions, 1);
    }

    #[tokio::test]
    async fn event_save_never_overwrites_existing_rows() {
        let repo = InMemoryEventRepository::default();
        let store_id = StoreId("s-1".to_string());
        let mut event = Event {
            id: "e-1".to_string(),
            store_id,
            external_event_id: None,
            kind: EventKind::CartUpdated,
            source: EventSource::Platform,
            payload: json!({"email": "a@example.com"}),
            received_at: Utc::now(),
            processed_at: None,
        };
        repo.save(event.clone()).await.expect("save");

        event.payload = json!({"email": "b@example.com"});
        repo.save(event).await.expect("conflicting save");

        let stored = repo.get("e-1").await.expect("exists");
        assert_eq!(stored.payload["email"], "a@example.com");
    }

    #[tokio::test]
    async fn processed_event_ledger_is_insert_if_absent() {
        let repo = InMemoryProcessedEventRepository::default();
        let now = Utc::now();
        assert!(repo.insert_if_absent("agent:e-1", now).await.expect("insert"));
        assert!(!repo.insert_if_absent("agent:e-1", now).await.expect("replay"));
        assert_eq!(repo.len().await, 1);
    }
}
