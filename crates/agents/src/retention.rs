use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::error;

use relay_core::domain::agent::{AgentKind, Decision};
use relay_core::domain::context::{CustomerContext, EventContext};
use relay_core::domain::event::{payload, EventKind};
use relay_llm::{CompletionRequest, ReasoningClient};

use crate::agent::Agent;
use crate::commerce::{CommerceClient, DiscountRequest, DiscountValueType, StoreHandle};

const SUBSCRIPTIONS: &[EventKind] = &[
    EventKind::OrderCreated,
    EventKind::OrderFulfilled,
    EventKind::CustomerCreated,
    EventKind::CustomerUpdated,
    EventKind::SupportTicketResolved,
];

const VIP_LIFETIME_VALUE: f64 = 500.0;
const VIP_ORDER_COUNT: i64 = 5;
const RECOVERY_SPEND_THRESHOLD: f64 = 200.0;

/// Keeps buyers coming back: lifecycle tagging, follow-up scheduling, and
/// reasoning-backed recovery offers after support friction.
pub struct RetentionAgent {
    llm: Arc<ReasoningClient>,
    commerce: Arc<dyn CommerceClient>,
}

impl RetentionAgent {
    pub fn new(llm: Arc<ReasoningClient>, commerce: Arc<dyn CommerceClient>) -> Self {
        Self { llm, commerce }
    }

    fn handle_order_created(&self, customer: &CustomerContext, context: &EventContext) -> Decision {
        let order_value = payload::total_price(&context.event.payload);

        // First purchase: start the nurture sequence.
        if customer.total_orders <= 1 {
            return Decision {
                action: "tag_customer".to_string(),
                params: json!({
                    "tags": ["first-purchase", "nurture-sequence"],
                    "order_value": order_value,
                    "segment": "new_buyer",
                }),
                reasoning: format!(
                    "First purchase ({order_value}). Tagging for nurture sequence to drive repeat."
                ),
                confidence: 0.9,
                estimated_impact: order_value * 0.3,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        let lifetime_value = customer.total_spent + order_value;
        if lifetime_value > VIP_LIFETIME_VALUE || customer.total_orders >= VIP_ORDER_COUNT {
            return Decision {
                action: "tag_customer".to_string(),
                params: json!({
                    "tags": ["vip", "high-value"],
                    "order_value": order_value,
                    "segment": "vip",
                    "total_lifetime_value": lifetime_value,
                }),
                reasoning: format!("Customer LTV reached {lifetime_value}. Tagging as VIP."),
                confidence: 0.95,
                estimated_impact: order_value * 0.5,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        if customer.is_repeat_buyer {
            if let Some(days_since_last_order) = customer.days_since_last_order {
                if days_since_last_order < 30 {
                    return Decision {
                        action: "tag_customer".to_string(),
                        params: json!({
                            "tags": ["active-buyer", "frequent"],
                            "segment": "active",
                        }),
                        reasoning: format!(
                            "Active repeat buyer. Last order was {days_since_last_order} days ago. Tagging for loyalty."
                        ),
                        confidence: 0.85,
                        estimated_impact: order_value * 0.4,
                        tokens_used: 0,
                        cost_usd: 0.0,
                    };
                }
            }
        }

        Decision::no_action("Order created but no special retention action needed")
    }

    fn handle_order_fulfilled(&self, customer: &CustomerContext) -> Decision {
        if customer.total_orders >= 2 {
            return Decision {
                action: "schedule_followup".to_string(),
                params: json!({
                    "type": "review_request",
                    "delay_days": 7,
                    "segment": if customer.total_orders >= VIP_ORDER_COUNT { "vip" } else { "repeat" },
                }),
                reasoning: format!(
                    "Order fulfilled for repeat customer ({} orders). Scheduling review request in 7 days.",
                    customer.total_orders
                ),
                confidence: 0.8,
                estimated_impact: 5.0,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        Decision::no_action("First order fulfilled; handled by nurture sequence")
    }

    fn handle_new_customer(&self) -> Decision {
        Decision {
            action: "tag_customer".to_string(),
            params: json!({
                "tags": ["new-customer", "welcome-sequence"],
                "segment": "new",
            }),
            reasoning: "New customer created. Tagging for welcome sequence.".to_string(),
            confidence: 0.95,
            estimated_impact: 0.0,
            tokens_used: 0,
            cost_usd: 0.0,
        }
    }

    async fn handle_ticket_resolved(
        &self,
        customer: &CustomerContext,
        context: &EventContext,
    ) -> Decision {
        if customer.total_spent <= RECOVERY_SPEND_THRESHOLD {
            return Decision::no_action("Customer not high-value enough for recovery offer");
        }

        let prompt = format!(
            "A valuable customer (total spent: {}, {} orders) just had a support ticket resolved.\n\n\
             Should we send a recovery discount to maintain the relationship?\n\n\
             Consider:\n\
             - Customer value: {}\n\
             - Order count: {}\n\
             - Days since last order: {}\n\n\
             Respond in JSON:\n\
             {{\n\
               \"action\": \"create_recovery_discount\" or \"NO_ACTION\",\n\
               \"discount_percentage\": number (5-20),\n\
               \"reasoning\": \"brief explanation\",\n\
               \"confidence\": 0.0 to 1.0\n\
             }}",
            customer.total_spent,
            customer.total_orders,
            customer.total_spent,
            customer.total_orders,
            customer
                .days_since_last_order
                .map(|days| days.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        );

        let request = CompletionRequest::new(prompt, context.model_for(self.kind()))
            .with_max_tokens(200)
            .with_temperature(0.3)
            .with_json_shape();

        match self.llm.complete(request).await {
            Ok(response) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&response.text).unwrap_or_default();

                if parsed["action"] == "create_recovery_discount" {
                    let discount_pct = parsed["discount_percentage"].as_f64().unwrap_or(10.0);
                    let average_order = if customer.total_orders > 0 {
                        customer.total_spent / customer.total_orders as f64
                    } else {
                        0.0
                    };

                    Decision {
                        action: "create_discount".to_string(),
                        params: json!({
                            "type": "percentage",
                            "value": format!("-{discount_pct}"),
                            "reason": "support_recovery",
                            "customer_id": customer.external_id,
                        }),
                        reasoning: parsed["reasoning"]
                            .as_str()
                            .unwrap_or("Recovery discount for post-support customer")
                            .to_string(),
                        confidence: parsed["confidence"].as_f64().unwrap_or(0.7),
                        estimated_impact: average_order,
                        tokens_used: response.tokens_used(),
                        cost_usd: response.cost_usd,
                    }
                } else {
                    Decision::no_action_with_usage(
                        parsed["reasoning"]
                            .as_str()
                            .unwrap_or("LLM decided no recovery action needed"),
                        response.tokens_used(),
                        response.cost_usd,
                    )
                }
            }
            Err(llm_error) => {
                error!(error = %llm_error, "retention agent reasoning call failed");
                Decision::no_action("Reasoning call failed")
            }
        }
    }
}

#[async_trait]
impl Agent for RetentionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Retention
    }

    fn priority(&self) -> u8 {
        2
    }

    fn subscribed_events(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    fn can_handle(&self, context: &EventContext) -> bool {
        context.customer.is_some()
    }

    async fn decide(&self, context: &EventContext) -> Result<Decision> {
        let Some(customer) = context.customer.as_ref() else {
            return Ok(Decision::no_action("No customer context available"));
        };

        Ok(match context.event.kind {
            EventKind::OrderCreated => self.handle_order_created(customer, context),
            EventKind::OrderFulfilled => self.handle_order_fulfilled(customer),
            EventKind::CustomerCreated => self.handle_new_customer(),
            EventKind::SupportTicketResolved => {
                self.handle_ticket_resolved(customer, context).await
            }
            _ => Decision::no_action("Event kind not handled by retention rules"),
        })
    }

    async fn execute(
        &self,
        decision: &Decision,
        context: &EventContext,
    ) -> Result<serde_json::Value> {
        let store = StoreHandle::from_context(context);
        let customer_external_id =
            context.customer.as_ref().and_then(|customer| customer.external_id.clone());

        match decision.action.as_str() {
            "tag_customer" => {
                let tags: Vec<String> = decision.params["tags"]
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|value| value.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();

                let Some(customer_external_id) = customer_external_id else {
                    return Ok(json!({
                        "action": "tag_customer",
                        "skipped": true,
                        "reason": "no_customer_id",
                    }));
                };

                self.commerce.tag_customer(&store, &customer_external_id, &tags).await?;
                Ok(json!({
                    "action": "tag_customer",
                    "customer_id": customer_external_id,
                    "tags": tags,
                    "segment": decision.params["segment"],
                }))
            }
            "create_discount" => {
                let value = decision.params["value"].as_str().unwrap_or("-10").to_string();
                let now = Utc::now();
                let discount = self
                    .commerce
                    .create_discount(
                        &store,
                        DiscountRequest {
                            title: format!("RELAY-RET-{}", now.timestamp_millis()),
                            value_type: DiscountValueType::Percentage,
                            value: value.clone(),
                            customer_external_id,
                            starts_at: now,
                            ends_at: now + Duration::days(7),
                            usage_limit: 1,
                        },
                    )
                    .await?;

                Ok(json!({
                    "action": "create_discount",
                    "discount_code": discount.code,
                    "discount_value": value,
                    "reason": decision.params["reason"],
                    "expires_in": "7d",
                }))
            }
            "schedule_followup" => Ok(json!({
                "action": "schedule_followup",
                "type": decision.params["type"],
                "delay_days": decision.params["delay_days"],
                "scheduled": true,
            })),
            _ => Ok(json!({})),
        }
    }
}
