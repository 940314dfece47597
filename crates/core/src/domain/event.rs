use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub String);

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commerce platform event kinds the agent pipeline subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OrderCreated,
    OrderUpdated,
    OrderFulfilled,
    OrderCancelled,
    CheckoutStarted,
    CheckoutUpdated,
    CheckoutCompleted,
    CartCreated,
    CartUpdated,
    CustomerCreated,
    CustomerUpdated,
    ProductViewed,
    ProductUpdated,
    SupportTicketCreated,
    SupportTicketResolved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order.created",
            Self::OrderUpdated => "order.updated",
            Self::OrderFulfilled => "order.fulfilled",
            Self::OrderCancelled => "order.cancelled",
            Self::CheckoutStarted => "checkout.started",
            Self::CheckoutUpdated => "checkout.updated",
            Self::CheckoutCompleted => "checkout.completed",
            Self::CartCreated => "cart.created",
            Self::CartUpdated => "cart.updated",
            Self::CustomerCreated => "customer.created",
            Self::CustomerUpdated => "customer.updated",
            Self::ProductViewed => "product.viewed",
            Self::ProductUpdated => "product.updated",
            Self::SupportTicketCreated => "support.ticket.created",
            Self::SupportTicketResolved => "support.ticket.resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "order.created" => Some(Self::OrderCreated),
            "order.updated" => Some(Self::OrderUpdated),
            "order.fulfilled" => Some(Self::OrderFulfilled),
            "order.cancelled" => Some(Self::OrderCancelled),
            "checkout.started" => Some(Self::CheckoutStarted),
            "checkout.updated" => Some(Self::CheckoutUpdated),
            "checkout.completed" => Some(Self::CheckoutCompleted),
            "cart.created" => Some(Self::CartCreated),
            "cart.updated" => Some(Self::CartUpdated),
            "customer.created" => Some(Self::CustomerCreated),
            "customer.updated" => Some(Self::CustomerUpdated),
            "product.viewed" => Some(Self::ProductViewed),
            "product.updated" => Some(Self::ProductUpdated),
            "support.ticket.created" => Some(Self::SupportTicketCreated),
            "support.ticket.resolved" => Some(Self::SupportTicketResolved),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Platform,
    Marketing,
    Helpdesk,
    Internal,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Marketing => "marketing",
            Self::Helpdesk => "helpdesk",
            Self::Internal => "internal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "platform" => Some(Self::Platform),
            "marketing" => Some(Self::Marketing),
            "helpdesk" => Some(Self::Helpdesk),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// An inbound business event. Immutable once created; the same id may be
/// delivered more than once, so everything downstream must tolerate
/// reprocessing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub store_id: StoreId,
    pub external_event_id: Option<String>,
    pub kind: EventKind,
    pub source: EventSource,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Payload conventions of the commerce platform. Webhook bodies carry the
/// acting customer either inline (`email`) or nested (`customer.id`,
/// `customer.email`), and monetary totals as stringified decimals.
pub mod payload {
    use serde_json::Value;

    pub fn email(payload: &Value) -> Option<String> {
        if let Some(email) = payload.get("email").and_then(Value::as_str) {
            return Some(email.to_string());
        }
        payload
            .get("customer")
            .and_then(|customer| customer.get("email"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn customer_id(payload: &Value) -> Option<String> {
        let id = payload.get("customer").and_then(|customer| customer.get("id"))?;
        match id {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn total_price(payload: &Value) -> f64 {
        for key in ["total_price", "subtotal_price"] {
            match payload.get(key) {
                Some(Value::String(value)) => {
                    if let Ok(parsed) = value.parse::<f64>() {
                        return parsed;
                    }
                }
                Some(Value::Number(value)) => {
                    if let Some(parsed) = value.as_f64() {
                        return parsed;
                    }
                }
                _ => {}
            }
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{payload, EventKind, EventSource};

    #[test]
    fn event_kind_round_trips_through_wire_names() {
        let kinds = [
            EventKind::OrderCreated,
            EventKind::CheckoutStarted,
            EventKind::CartUpdated,
            EventKind::SupportTicketResolved,
        ];
        for kind in kinds {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("order.exploded"), None);
    }

    #[test]
    fn event_source_round_trips() {
        for source in [
            EventSource::Platform,
            EventSource::Marketing,
            EventSource::Helpdesk,
            EventSource::Internal,
        ] {
            assert_eq!(EventSource::parse(source.as_str()), Some(source));
        }
    }

    #[test]
    fn payload_email_prefers_top_level_field() {
        let body = json!({"email": "a@example.com", "customer": {"email": "b@example.com"}});
        assert_eq!(payload::email(&body).as_deref(), Some("a@example.com"));

        let nested = json!({"customer": {"email": "b@example.com"}});
        assert_eq!(payload::email(&nested).as_deref(), Some("b@example.com"));

        assert_eq!(payload::email(&json!({})), None);
    }

    #[test]
    fn payload_customer_id_accepts_numeric_ids() {
        let body = json!({"customer": {"id": 82411}});
        assert_eq!(payload::customer_id(&body).as_deref(), Some("82411"));
    }

    #[test]
    fn payload_total_price_parses_string_and_number() {
        assert_eq!(payload::total_price(&json!({"total_price": "129.90"})), 129.90);
        assert_eq!(payload::total_price(&json!({"total_price": 42.5})), 42.5);
        assert_eq!(payload::total_price(&json!({"subtotal_price": "10.00"})), 10.0);
        assert_eq!(payload::total_price(&json!({})), 0.0);
    }
}
