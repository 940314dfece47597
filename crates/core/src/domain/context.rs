use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::agent::{AgentConfig, AgentKind};
use crate::domain::event::Event;
use crate::domain::store::Store;

/// Resolved view of the acting customer, with the derived attributes the
/// decision rules key on. `None` on the context means "no personalization
/// possible", not an error.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomerContext {
    pub id: String,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub total_orders: i64,
    pub total_spent: f64,
    pub days_since_last_order: Option<i64>,
    pub is_repeat_buyer: bool,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderSummary {
    pub total_price: f64,
    pub placed_at: Option<DateTime<Utc>>,
    pub line_items: serde_json::Value,
}

/// Ephemeral, read-only decision context assembled once per event and
/// shared by every agent that runs for it. Never persisted as a unit.
#[derive(Clone, Debug)]
pub struct EventContext {
    pub store: Store,
    pub event: Event,
    pub customer: Option<CustomerContext>,
    pub recent_events: Vec<Event>,
    pub recent_orders: Vec<OrderSummary>,
    /// Decrypted platform credential; empty when decryption failed, in
    /// which case credential-requiring actions fail individually later.
    pub access_token: String,
    pub agent_configs: HashMap<AgentKind, AgentConfig>,
}

impl EventContext {
    pub fn config_for(&self, agent: AgentKind) -> Option<&AgentConfig> {
        self.agent_configs.get(&agent)
    }

    pub fn is_enabled(&self, agent: AgentKind) -> bool {
        self.config_for(agent).map(|config| config.enabled).unwrap_or(false)
    }

    pub fn model_for(&self, agent: AgentKind) -> &str {
        self.config_for(agent).map(|config| config.model.as_str()).unwrap_or("gpt-4o-mini")
    }
}
