use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::error;

use relay_core::domain::agent::{AgentKind, Decision};
use relay_core::domain::context::EventContext;
use relay_core::domain::event::{payload, EventKind};
use relay_llm::{CompletionRequest, ReasoningClient};

use crate::agent::Agent;
use crate::commerce::{
    CommerceClient, DiscountRequest, DiscountValueType, StoreHandle,
};

const SUBSCRIPTIONS: &[EventKind] = &[
    EventKind::CheckoutStarted,
    EventKind::CheckoutUpdated,
    EventKind::CartCreated,
    EventKind::CartUpdated,
];

const HIGH_VALUE_CART_THRESHOLD: f64 = 100.0;

/// Nudges hesitant buyers over the line: rule-based incentives for cart
/// activity, reasoning-backed intervention for started checkouts.
pub struct ConversionAgent {
    llm: Arc<ReasoningClient>,
    commerce: Arc<dyn CommerceClient>,
}

impl ConversionAgent {
    pub fn new(llm: Arc<ReasoningClient>, commerce: Arc<dyn CommerceClient>) -> Self {
        Self { llm, commerce }
    }

    fn handle_cart_event(&self, context: &EventContext) -> Decision {
        let cart_value = payload::total_price(&context.event.payload);
        let customer = context.customer.as_ref();

        let is_new_buyer = customer.map(|customer| !customer.is_repeat_buyer).unwrap_or(true);
        if is_new_buyer && cart_value > HIGH_VALUE_CART_THRESHOLD {
            return Decision {
                action: "create_discount".to_string(),
                params: json!({
                    "type": "percentage",
                    "value": "-10",
                    "reason": "high_value_new_customer",
                    "cart_value": cart_value,
                }),
                reasoning: format!(
                    "New customer with high-value cart ({cart_value}). Offering 10% to convert."
                ),
                confidence: 0.75,
                estimated_impact: cart_value * 0.9,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        if let Some(customer) = customer {
            if customer.is_repeat_buyer
                && customer.total_orders > 0
                && cart_value > customer.total_spent / customer.total_orders as f64
            {
                return Decision {
                    confidence: 0.85,
                    ..Decision::no_action(
                        "Repeat buyer already spending above average. No incentive needed.",
                    )
                };
            }
        }

        Decision {
            confidence: 0.8,
            ..Decision::no_action("Cart does not meet criteria for conversion intervention.")
        }
    }

    async fn handle_checkout_started(&self, context: &EventContext) -> Decision {
        let checkout_value = payload::total_price(&context.event.payload);
        let customer = context.customer.as_ref();

        let prompt = format!(
            "You are a conversion optimization agent for an e-commerce store.\n\n\
             A customer has started checkout. Analyze and decide the best action.\n\n\
             Customer profile:\n\
             - Is repeat buyer: {}\n\
             - Total orders: {}\n\
             - Total spent: {}\n\
             - Days since last order: {}\n\n\
             Checkout value: {checkout_value}\n\n\
             Decide ONE action:\n\
             1. \"create_discount\" - offer a discount to increase conversion (specify percentage)\n\
             2. \"NO_ACTION\" - let the checkout proceed normally\n\n\
             Respond in JSON:\n\
             {{\n\
               \"action\": \"create_discount\" or \"NO_ACTION\",\n\
               \"discount_percentage\": number (if applicable),\n\
               \"reasoning\": \"brief explanation\",\n\
               \"confidence\": 0.0 to 1.0\n\
             }}",
            customer.map(|c| c.is_repeat_buyer.to_string()).unwrap_or_else(|| "unknown".to_string()),
            customer.map(|c| c.total_orders).unwrap_or(0),
            customer.map(|c| c.total_spent).unwrap_or(0.0),
            customer
                .and_then(|c| c.days_since_last_order)
                .map(|days| days.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        );

        let request = CompletionRequest::new(prompt, context.model_for(self.kind()))
            .with_max_tokens(200)
            .with_temperature(0.3)
            .with_json_shape();

        match self.llm.complete(request).await {
            Ok(response) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&response.text).unwrap_or_default();
                let wants_discount = parsed["action"] == "create_discount";
                let discount_pct = parsed["discount_percentage"].as_f64();

                Decision {
                    action: if wants_discount {
                        "create_discount".to_string()
                    } else {
                        Decision::NO_ACTION.to_string()
                    },
                    params: json!({
                        "type": "percentage",
                        "value": discount_pct.map(|pct| format!("-{pct}")),
                        "reason": "checkout_optimization",
                        "checkout_value": checkout_value,
                    }),
                    reasoning: parsed["reasoning"]
                        .as_str()
                        .unwrap_or("LLM decision")
                        .to_string(),
                    confidence: parsed["confidence"].as_f64().unwrap_or(0.5),
                    estimated_impact: if wants_discount {
                        checkout_value * (1.0 - discount_pct.unwrap_or(10.0) / 100.0)
                    } else {
                        0.0
                    },
                    tokens_used: response.tokens_used(),
                    cost_usd: response.cost_usd,
                }
            }
            Err(llm_error) => {
                error!(error = %llm_error, "conversion agent reasoning call failed");
                Decision {
                    confidence: 0.5,
                    ..Decision::no_action("Reasoning call failed, defaulting to no action")
                }
            }
        }
    }
}

#[async_trait]
impl Agent for ConversionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Conversion
    }

    fn priority(&self) -> u8 {
        1
    }

    fn subscribed_events(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    fn can_handle(&self, context: &EventContext) -> bool {
        context.customer.is_some() || context.event.payload.get("email").is_some()
    }

    async fn decide(&self, context: &EventContext) -> Result<Decision> {
        Ok(match context.event.kind {
            EventKind::CartCreated | EventKind::CartUpdated => self.handle_cart_event(context),
            EventKind::CheckoutStarted => self.handle_checkout_started(context).await,
            _ => Decision::no_action("Event kind not actionable for conversion agent"),
        })
    }

    async fn execute(
        &self,
        decision: &Decision,
        context: &EventContext,
    ) -> Result<serde_json::Value> {
        if decision.action != "create_discount" {
            return Ok(json!({}));
        }

        let customer_external_id =
            context.customer.as_ref().and_then(|customer| customer.external_id.clone());
        let value =
            decision.params["value"].as_str().unwrap_or("-10").to_string();
        let now = Utc::now();

        let discount = self
            .commerce
            .create_discount(
                &StoreHandle::from_context(context),
                DiscountRequest {
                    title: format!("RELAY-CONV-{}", now.timestamp_millis()),
                    value_type: DiscountValueType::Percentage,
                    value: value.clone(),
                    customer_external_id,
                    starts_at: now,
                    ends_at: now + Duration::hours(24),
                    usage_limit: 1,
                },
            )
            .await?;

        Ok(json!({
            "discount_code": discount.code,
            "discount_value": value,
            "target_customer": context.customer.as_ref().and_then(|c| c.email.clone()),
            "expires_in": "24h",
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use relay_core::domain::agent::{AgentKind, Decision};
    use relay_core::domain::event::EventKind;

    use super::ConversionAgent;
    use crate::agent::Agent;
    use crate::commerce::{CommerceCall, RecordingCommerceClient};
    use crate::testutil::{context_fixture, customer_fixture, llm_returning, llm_unavailable};

    fn agent_with(
        llm: Arc<relay_llm::ReasoningClient>,
    ) -> (ConversionAgent, Arc<RecordingCommerceClient>) {
        let commerce = Arc::new(RecordingCommerceClient::default());
        (ConversionAgent::new(llm, Arc::clone(&commerce) as _), commerce)
    }

    #[tokio::test]
    async fn high_value_cart_from_new_customer_earns_discount() {
        let (agent, _) = agent_with(llm_unavailable());
        let context = context_fixture(
            EventKind::CartUpdated,
            json!({"total_price": "150.00", "email": "new@example.com"}),
            None,
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "create_discount");
        assert_eq!(decision.params["value"], "-10");
        assert!(decision.estimated_impact > 100.0);
    }

    #[tokio::test]
    async fn repeat_buyer_above_average_gets_no_incentive() {
        let (agent, _) = agent_with(llm_unavailable());
        let mut customer = customer_fixture();
        customer.is_repeat_buyer = true;
        customer.total_orders = 4;
        customer.total_spent = 200.0; // average 50
        let context = context_fixture(
            EventKind::CartUpdated,
            json!({"total_price": "80.00"}),
            Some(customer),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert!(decision.is_no_action());
        assert_eq!(decision.confidence, 0.85);
    }

    #[tokio::test]
    async fn checkout_started_follows_llm_verdict() {
        let (agent, _) = agent_with(llm_returning(
            r#"{"action":"create_discount","discount_percentage":15,"reasoning":"high intent","confidence":0.8}"#,
        ));
        let context = context_fixture(
            EventKind::CheckoutStarted,
            json!({"total_price": "240.00", "email": "maybe@example.com"}),
            Some(customer_fixture()),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "create_discount");
        assert_eq!(decision.params["value"], "-15");
        assert_eq!(decision.reasoning, "high intent");
        assert!(decision.tokens_used > 0);
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_no_action() {
        let (agent, _) = agent_with(llm_unavailable());
        let context = context_fixture(
            EventKind::CheckoutStarted,
            json!({"total_price": "240.00", "email": "maybe@example.com"}),
            Some(customer_fixture()),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert!(decision.is_no_action());
        assert_eq!(decision.confidence, 0.5);
    }

    #[tokio::test]
    async fn execute_creates_bounded_single_use_discount() {
        let (agent, commerce) = agent_with(llm_unavailable());
        let mut customer = customer_fixture();
        customer.external_id = Some("82411".to_string());
        let context = context_fixture(
            EventKind::CartUpdated,
            json!({"total_price": "150.00"}),
            Some(customer),
        );

        let decision = Decision {
            action: "create_discount".to_string(),
            params: json!({"type": "percentage", "value": "-10"}),
            ..Decision::no_action("")
        };
        let result = agent.execute(&decision, &context).await.expect("execute");

        assert!(result["discount_code"].as_str().expect("code").starts_with("RELAY-CONV-"));
        let calls = commerce.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            CommerceCall::CreateDiscount { request, .. } => {
                assert_eq!(request.usage_limit, 1);
                assert_eq!(request.customer_external_id.as_deref(), Some("82411"));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn subscribes_to_cart_and_checkout_kinds_only() {
        let (agent, _) = agent_with(llm_unavailable());
        assert_eq!(agent.kind(), AgentKind::Conversion);
        assert_eq!(agent.priority(), 1);
        assert!(agent.subscribed_events().contains(&EventKind::CartCreated));
        assert!(!agent.subscribed_events().contains(&EventKind::OrderCreated));
    }
}
