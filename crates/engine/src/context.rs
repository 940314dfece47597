use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::error;

use relay_core::crypto::CredentialCipher;
use relay_core::domain::agent::{AgentConfig, AgentKind};
use relay_core::domain::context::{CustomerContext, EventContext, OrderSummary};
use relay_core::domain::customer::Customer;
use relay_core::domain::event::{payload, Event};
use relay_core::limits::{RECENT_EVENTS_LIMIT, RECENT_ORDERS_LIMIT};
use relay_db::repositories::{
    AgentConfigRepository, CustomerRepository, EventRepository, OrderRepository, StoreRepository,
};

use crate::errors::OrchestratorError;

/// Assembles the read-only decision context for one event: store record,
/// resolved customer with derived attributes, bounded histories, the
/// decrypted platform credential, and the per-agent config snapshot.
pub struct ContextBuilder {
    stores: Arc<dyn StoreRepository>,
    customers: Arc<dyn CustomerRepository>,
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn EventRepository>,
    agent_configs: Arc<dyn AgentConfigRepository>,
    cipher: CredentialCipher,
}

impl ContextBuilder {
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        customers: Arc<dyn CustomerRepository>,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn EventRepository>,
        agent_configs: Arc<dyn AgentConfigRepository>,
        cipher: CredentialCipher,
    ) -> Self {
        Self { stores, customers, orders, events, agent_configs, cipher }
    }

    pub async fn build(&self, event: &Event) -> Result<EventContext, OrchestratorError> {
        let store = self
            .stores
            .find_by_id(&event.store_id)
            .await?
            .ok_or_else(|| OrchestratorError::StoreNotFound(event.store_id.clone()))?;

        let customer_email = payload::email(&event.payload);
        let customer_external_id = payload::customer_id(&event.payload);

        // External id is the preferred handle; email is the fallback.
        let customer = if let Some(external_id) = customer_external_id.as_deref() {
            self.customers.find_by_external_id(&event.store_id, external_id).await?
        } else if let Some(email) = customer_email.as_deref() {
            self.customers.find_by_email(&event.store_id, email).await?
        } else {
            None
        };
        let customer = customer.map(customer_context);

        let recent_events = match customer_email.as_deref() {
            Some(email) => {
                self.events
                    .recent_for_customer(&event.store_id, email, RECENT_EVENTS_LIMIT)
                    .await?
            }
            None => Vec::new(),
        };

        let recent_orders = match customer_external_id.as_deref() {
            Some(external_id) => self
                .orders
                .recent_for_customer(&event.store_id, external_id, RECENT_ORDERS_LIMIT)
                .await?
                .into_iter()
                .map(|order| OrderSummary {
                    total_price: order.total_price,
                    placed_at: order.placed_at,
                    line_items: order.line_items,
                })
                .collect(),
            None => Vec::new(),
        };

        // A bad credential degrades to an empty token; agents needing a
        // live credential fail later, individually.
        let access_token = match self.cipher.decrypt(&store.encrypted_access_token) {
            Ok(token) => token,
            Err(crypto_error) => {
                error!(store_id = %store.id, error = %crypto_error, "failed to decrypt store access token");
                String::new()
            }
        };

        let mut agent_configs: HashMap<AgentKind, AgentConfig> = AgentKind::ALL
            .into_iter()
            .map(|agent| (agent, AgentConfig::default_for(&event.store_id, agent)))
            .collect();
        for stored in self.agent_configs.list_for_store(&event.store_id).await? {
            agent_configs.insert(stored.agent, stored);
        }

        Ok(EventContext {
            store,
            event: event.clone(),
            customer,
            recent_events,
            recent_orders,
            access_token,
            agent_configs,
        })
    }
}

fn customer_context(customer: Customer) -> CustomerContext {
    let days_since_last_order = customer
        .last_order_at
        .map(|last_order_at| (Utc::now() - last_order_at).num_days());

    CustomerContext {
        id: customer.id,
        external_id: customer.external_id,
        email: customer.email,
        total_orders: customer.total_orders,
        total_spent: customer.total_spent,
        days_since_last_order,
        is_repeat_buyer: customer.total_orders > 1,
        tags: customer.tags,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use secrecy::SecretString;
    use serde_json::json;

    use relay_core::crypto::{generate_key, CredentialCipher};
    use relay_core::domain::agent::{AgentConfig, AgentKind};
    use relay_core::domain::customer::Customer;
    use relay_core::domain::event::{Event, EventKind, EventSource, StoreId};
    use relay_core::domain::order::Order;
    use relay_core::domain::store::Store;
    use relay_db::repositories::{
        AgentConfigRepository, CustomerRepository, EventRepository, InMemoryAgentConfigRepository,
        InMemoryCustomerRepository, InMemoryEventRepository, InMemoryOrderRepository,
        InMemoryStoreRepository, OrderRepository, StoreRepository,
    };

    use super::ContextBuilder;
    use crate::errors::OrchestratorError;

    struct Fixture {
        stores: Arc<InMemoryStoreRepository>,
        customers: Arc<InMemoryCustomerRepository>,
        orders: Arc<InMemoryOrderRepository>,
        events: Arc<InMemoryEventRepository>,
        agent_configs: Arc<InMemoryAgentConfigRepository>,
        cipher: CredentialCipher,
        builder: ContextBuilder,
        store_id: StoreId,
    }

    fn fixture() -> Fixture {
        let stores = Arc::new(InMemoryStoreRepository::default());
        let customers = Arc::new(InMemoryCustomerRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let events = Arc::new(InMemoryEventRepository::default());
        let agent_configs = Arc::new(InMemoryAgentConfigRepository::default());
        let cipher = CredentialCipher::from_hex_key(&SecretString::from(generate_key()))
            .expect("valid key");

        let builder = ContextBuilder::new(
            Arc::clone(&stores) as _,
            Arc::clone(&customers) as _,
            Arc::clone(&orders) as _,
            Arc::clone(&events) as _,
            Arc::clone(&agent_configs) as _,
            cipher.clone(),
        );

        Fixture {
            stores,
            customers,
            orders,
            events,
            agent_configs,
            cipher,
            builder,
            store_id: StoreId("s-1".to_string()),
        }
    }

    async fn seed_store(fixture: &Fixture, token_envelope: &str) {
        fixture
            .stores
            .save(Store {
                id: fixture.store_id.clone(),
                name: "Aurora Goods".to_string(),
                platform_domain: "aurora-goods.example.com".to_string(),
                encrypted_access_token: token_envelope.to_string(),
                daily_llm_budget_usd: Some(25.0),
                monthly_llm_budget_usd: Some(500.0),
                created_at: Utc::now(),
            })
            .await
            .expect("seed store");
    }

    fn event(store_id: &StoreId, payload: serde_json::Value) -> Event {
        Event {
            id: "e-1".to_string(),
            store_id: store_id.clone(),
            external_event_id: None,
            kind: EventKind::OrderCreated,
            source: EventSource::Platform,
            payload,
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn missing_store_is_fatal() {
        let fixture = fixture();
        let result = fixture.builder.build(&event(&fixture.store_id, json!({}))).await;
        assert!(matches!(result, Err(OrchestratorError::StoreNotFound(_))));
    }

    #[tokio::test]
    async fn resolves_customer_by_external_id_with_derived_attributes() {
        let fixture = fixture();
        let envelope = fixture.cipher.encrypt("tok_live_0c6e7f").expect("encrypt");
        seed_store(&fixture, &envelope).await;

        fixture
            .customers
            .save(Customer {
                id: "c-1".to_string(),
                store_id: fixture.store_id.clone(),
                external_id: Some("82411".to_string()),
                email: Some("buyer@example.com".to_string()),
                total_orders: 3,
                total_spent: 300.0,
                last_order_at: Some(Utc::now() - Duration::days(9)),
                tags: vec!["vip".to_string()],
            })
            .await
            .expect("seed customer");

        let context = fixture
            .builder
            .build(&event(&fixture.store_id, json!({"customer": {"id": 82411}})))
            .await
            .expect("context");

        let customer = context.customer.expect("customer resolved");
        assert_eq!(customer.external_id.as_deref(), Some("82411"));
        assert_eq!(customer.days_since_last_order, Some(9));
        assert!(customer.is_repeat_buyer);
        assert_eq!(context.access_token, "tok_live_0c6e7f");
    }

    #[tokio::test]
    async fn falls_back_to_email_resolution() {
        let fixture = fixture();
        let envelope = fixture.cipher.encrypt("token").expect("encrypt");
        seed_store(&fixture, &envelope).await;

        fixture
            .customers
            .save(Customer {
                id: "c-2".to_string(),
                store_id: fixture.store_id.clone(),
                external_id: None,
                email: Some("only-email@example.com".to_string()),
                total_orders: 1,
                total_spent: 40.0,
                last_order_at: None,
                tags: Vec::new(),
            })
            .await
            .expect("seed customer");

        let context = fixture
            .builder
            .build(&event(&fixture.store_id, json!({"email": "only-email@example.com"})))
            .await
            .expect("context");

        let customer = context.customer.expect("customer resolved");
        assert_eq!(customer.days_since_last_order, None);
        assert!(!customer.is_repeat_buyer);
    }

    #[tokio::test]
    async fn unidentifiable_customer_means_no_personalization_not_an_error() {
        let fixture = fixture();
        let envelope = fixture.cipher.encrypt("token").expect("encrypt");
        seed_store(&fixture, &envelope).await;

        let context = fixture
            .builder
            .build(&event(&fixture.store_id, json!({"total_price": "10.00"})))
            .await
            .expect("context");

        assert!(context.customer.is_none());
        assert!(context.recent_events.is_empty());
        assert!(context.recent_orders.is_empty());
    }

    #[tokio::test]
    async fn histories_are_bounded() {
        let fixture = fixture();
        let envelope = fixture.cipher.encrypt("token").expect("encrypt");
        seed_store(&fixture, &envelope).await;

        for index in 0..30 {
            fixture
                .events
                .save(Event {
                    id: format!("e-h-{index}"),
                    store_id: fixture.store_id.clone(),
                    external_event_id: None,
                    kind: EventKind::ProductViewed,
                    source: EventSource::Platform,
                    payload: json!({"email": "buyer@example.com"}),
                    received_at: Utc::now() - Duration::minutes(index),
                    processed_at: None,
                })
                .await
                .expect("seed event");
        }
        for index in 0..15 {
            fixture
                .orders
                .save(Order {
                    store_id: fixture.store_id.clone(),
                    external_order_id: format!("o-{index}"),
                    customer_external_id: Some("82411".to_string()),
                    total_price: 10.0,
                    line_items: json!([]),
                    placed_at: Some(Utc::now() - Duration::days(index)),
                })
                .await
                .expect("seed order");
        }

        let context = fixture
            .builder
            .build(&event(
                &fixture.store_id,
                json!({"email": "buyer@example.com", "customer": {"id": "82411"}}),
            ))
            .await
            .expect("context");

        assert_eq!(context.recent_events.len(), 20);
        assert_eq!(context.recent_orders.len(), 10);
    }

    #[tokio::test]
    async fn malformed_credential_degrades_to_empty_token() {
        let fixture = fixture();
        seed_store(&fixture, "garbage-envelope").await;

        let context =
            fixture.builder.build(&event(&fixture.store_id, json!({}))).await.expect("context");
        assert_eq!(context.access_token, "");
    }

    #[tokio::test]
    async fn stored_configs_override_compiled_defaults() {
        let fixture = fixture();
        let envelope = fixture.cipher.encrypt("token").expect("encrypt");
        seed_store(&fixture, &envelope).await;

        let mut override_config =
            AgentConfig::default_for(&fixture.store_id, AgentKind::Conversion);
        override_config.enabled = false;
        override_config.model = "claude-sonnet".to_string();
        fixture.agent_configs.save(override_config).await.expect("seed config");

        let context =
            fixture.builder.build(&event(&fixture.store_id, json!({}))).await.expect("context");

        assert!(!context.is_enabled(AgentKind::Conversion));
        assert_eq!(context.model_for(AgentKind::Conversion), "claude-sonnet");
        // Untouched agents keep their compiled defaults.
        assert!(context.is_enabled(AgentKind::Retention));
        assert!(!context.is_enabled(AgentKind::Operations));
    }
}
