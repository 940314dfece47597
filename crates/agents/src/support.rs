use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::error;

use relay_core::domain::agent::{AgentKind, Decision};
use relay_core::domain::context::EventContext;
use relay_core::domain::event::EventKind;
use relay_llm::{CompletionRequest, ReasoningClient};

use crate::agent::Agent;
use crate::commerce::{CommerceClient, StoreHandle};

const SUBSCRIPTIONS: &[EventKind] =
    &[EventKind::SupportTicketCreated, EventKind::OrderCancelled];

const VIP_SPEND_THRESHOLD: f64 = 500.0;
const CANCELLATION_FOLLOWUP_THRESHOLD: f64 = 200.0;

const TRACKING_KEYWORDS: &[&str] = &[
    "tracking",
    "track",
    "where is my order",
    "où est ma commande",
    "suivi",
    "livraison",
    "delivery",
    "shipped",
    "colis",
    "package",
];

const RETURN_KEYWORDS: &[&str] = &[
    "return",
    "retour",
    "refund",
    "remboursement",
    "exchange",
    "échanger",
    "renvoi",
    "send back",
];

const RESPONSE_TEMPLATES: &[(&str, &str)] = &[
    ("tracking", "Your order is on its way. You can follow it with the tracking link in your shipping confirmation email."),
    ("returns", "You can return any item within 30 days. Start a return from your account's order history page."),
];

/// Triage for inbound support traffic: keyword fast paths for the common
/// questions, reasoning-backed classification for the rest, and rules for
/// cancellations.
pub struct SupportAgent {
    llm: Arc<ReasoningClient>,
    commerce: Arc<dyn CommerceClient>,
}

impl SupportAgent {
    pub fn new(llm: Arc<ReasoningClient>, commerce: Arc<dyn CommerceClient>) -> Self {
        Self { llm, commerce }
    }

    async fn handle_ticket_created(&self, context: &EventContext) -> Decision {
        let subject = context.event.payload["subject"].as_str().unwrap_or("");
        let body = context.event.payload["body"].as_str().unwrap_or("");
        let ticket_content = format!("{subject}\n{body}").to_lowercase();

        if contains_any(&ticket_content, TRACKING_KEYWORDS) {
            return Decision {
                action: "auto_respond".to_string(),
                params: json!({"response_type": "tracking_info", "template": "tracking"}),
                reasoning:
                    "Customer asking about order tracking. Auto-responding with tracking info."
                        .to_string(),
                confidence: 0.9,
                estimated_impact: 0.0,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        if contains_any(&ticket_content, RETURN_KEYWORDS) {
            return Decision {
                action: "auto_respond".to_string(),
                params: json!({"response_type": "return_info", "template": "returns"}),
                reasoning: "Customer asking about returns. Auto-responding with return policy."
                    .to_string(),
                confidence: 0.85,
                estimated_impact: 0.0,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        let customer = context.customer.as_ref();
        let total_spent = customer.map(|c| c.total_spent).unwrap_or(0.0);
        let prompt = format!(
            "You are a customer support triage agent. Classify this support ticket and decide the best action.\n\n\
             Ticket:\n\
             Subject: {subject}\n\
             Body: {body}\n\n\
             Customer info:\n\
             - Total orders: {}\n\
             - Total spent: {}\n\
             - Is VIP (spent > {VIP_SPEND_THRESHOLD}): {}\n\n\
             Recent orders: {}\n\n\
             Classify into:\n\
             1. \"auto_respond\" - can be answered automatically\n\
             2. \"escalate\" - needs human attention\n\
             3. \"flag_vip\" - VIP customer needs priority human attention\n\n\
             Respond in JSON:\n\
             {{\n\
               \"action\": \"auto_respond\" or \"escalate\" or \"flag_vip\",\n\
               \"category\": \"tracking\" or \"returns\" or \"product_question\" or \"complaint\" or \"other\",\n\
               \"urgency\": \"low\" or \"medium\" or \"high\",\n\
               \"suggested_response\": \"brief response if auto_respond\",\n\
               \"reasoning\": \"brief explanation\",\n\
               \"confidence\": 0.0 to 1.0\n\
             }}",
            customer.map(|c| c.total_orders.to_string()).unwrap_or_else(|| "unknown".to_string()),
            customer.map(|c| c.total_spent.to_string()).unwrap_or_else(|| "unknown".to_string()),
            total_spent > VIP_SPEND_THRESHOLD,
            context.recent_orders.len(),
        );

        let request = CompletionRequest::new(prompt, context.model_for(self.kind()))
            .with_max_tokens(300)
            .with_temperature(0.2)
            .with_json_shape();

        match self.llm.complete(request).await {
            Ok(response) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&response.text).unwrap_or_default();
                let action = match parsed["action"].as_str() {
                    Some(action @ ("auto_respond" | "escalate" | "flag_vip")) => {
                        action.to_string()
                    }
                    _ => "escalate".to_string(),
                };

                Decision {
                    action,
                    params: json!({
                        "category": parsed["category"],
                        "urgency": parsed["urgency"],
                        "suggested_response": parsed["suggested_response"],
                        "is_vip": total_spent > VIP_SPEND_THRESHOLD,
                    }),
                    reasoning: parsed["reasoning"]
                        .as_str()
                        .unwrap_or("LLM triage decision")
                        .to_string(),
                    confidence: parsed["confidence"].as_f64().unwrap_or(0.6),
                    estimated_impact: 0.0,
                    tokens_used: response.tokens_used(),
                    cost_usd: response.cost_usd,
                }
            }
            Err(llm_error) => {
                error!(error = %llm_error, "support agent reasoning call failed");
                // Safety posture: an unclassifiable ticket goes to a human.
                Decision {
                    action: "escalate".to_string(),
                    params: json!({
                        "category": "unknown",
                        "urgency": "medium",
                        "reason": "llm_classification_failed",
                    }),
                    reasoning: "Reasoning call failed. Escalating to human as safety measure."
                        .to_string(),
                    confidence: 0.5,
                    estimated_impact: 0.0,
                    tokens_used: 0,
                    cost_usd: 0.0,
                }
            }
        }
    }

    fn handle_order_cancelled(&self, context: &EventContext) -> Decision {
        let Some(customer) = context.customer.as_ref() else {
            return Decision::no_action("No customer context for cancellation");
        };

        if customer.total_spent > CANCELLATION_FOLLOWUP_THRESHOLD {
            let average_order = if customer.total_orders > 0 {
                customer.total_spent / customer.total_orders as f64
            } else {
                0.0
            };
            return Decision {
                action: "flag_vip".to_string(),
                params: json!({
                    "reason": "order_cancelled",
                    "urgency": "high",
                    "customer_value": customer.total_spent,
                    "order_id": context.event.payload["id"],
                }),
                reasoning: format!(
                    "High-value customer ({}) cancelled order. Flagging for personal follow-up.",
                    customer.total_spent
                ),
                confidence: 0.9,
                estimated_impact: average_order,
                tokens_used: 0,
                cost_usd: 0.0,
            };
        }

        Decision {
            action: "tag_customer".to_string(),
            params: json!({"tags": ["cancelled-order"], "reason": "order_cancelled"}),
            reasoning: "Order cancelled. Tagging customer for winback sequence.".to_string(),
            confidence: 0.85,
            estimated_impact: 0.0,
            tokens_used: 0,
            cost_usd: 0.0,
        }
    }

    fn template_body(template: &str) -> Option<&'static str> {
        RESPONSE_TEMPLATES
            .iter()
            .find(|(name, _)| *name == template)
            .map(|(_, body)| *body)
    }
}

#[async_trait]
impl Agent for SupportAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Support
    }

    fn priority(&self) -> u8 {
        1
    }

    fn subscribed_events(&self) -> &[EventKind] {
        SUBSCRIPTIONS
    }

    fn can_handle(&self, _context: &EventContext) -> bool {
        // Support handles every event it subscribes to.
        true
    }

    async fn decide(&self, context: &EventContext) -> Result<Decision> {
        Ok(match context.event.kind {
            EventKind::SupportTicketCreated => self.handle_ticket_created(context).await,
            EventKind::OrderCancelled => self.handle_order_cancelled(context),
            _ => Decision::no_action("Unhandled event kind"),
        })
    }

    async fn execute(
        &self,
        decision: &Decision,
        context: &EventContext,
    ) -> Result<serde_json::Value> {
        match decision.action.as_str() {
            "auto_respond" => {
                let reply = decision.params["template"]
                    .as_str()
                    .and_then(Self::template_body)
                    .map(str::to_string)
                    .or_else(|| {
                        decision.params["suggested_response"].as_str().map(str::to_string)
                    });

                let ticket_id = context.event.payload["ticket_id"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| {
                        context.event.payload["ticket_id"].as_i64().map(|id| id.to_string())
                    });

                if let (Some(ticket_id), Some(reply)) = (ticket_id.as_deref(), reply.as_deref()) {
                    self.commerce
                        .reply_to_ticket(&StoreHandle::from_context(context), ticket_id, reply)
                        .await?;
                }

                Ok(json!({
                    "action": "auto_respond",
                    "response_type": decision.params["response_type"],
                    "sent": ticket_id.is_some() && reply.is_some(),
                }))
            }
            "escalate" => Ok(json!({
                "action": "escalate",
                "category": decision.params["category"],
                "urgency": decision.params["urgency"],
                "escalated": true,
            })),
            "flag_vip" => Ok(json!({
                "action": "flag_vip",
                "reason": decision.params["reason"],
                "customer_value": decision.params["customer_value"],
                "flagged": true,
            })),
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

                if let Some(customer_external_id) =
                    context.customer.as_ref().and_then(|customer| customer.external_id.as_deref())
                {
                    self.commerce
                        .tag_customer(
                            &StoreHandle::from_context(context),
                            customer_external_id,
                            &tags,
                        )
                        .await?;
                }

                Ok(json!({"action": "tag_customer", "tags": tags, "tagged": true}))
            }
            _ => Ok(json!({})),
        }
    }
}

fn contains_any(content: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| content.contains(keyword))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use relay_core::domain::agent::{AgentKind, Decision};
    use relay_core::domain::event::EventKind;

    use super::SupportAgent;
    use crate::agent::Agent;
    use crate::commerce::{CommerceCall, RecordingCommerceClient};
    use crate::testutil::{context_fixture, customer_fixture, llm_returning, llm_unavailable};

    fn agent_with(
        llm: Arc<relay_llm::ReasoningClient>,
    ) -> (SupportAgent, Arc<RecordingCommerceClient>) {
        let commerce = Arc::new(RecordingCommerceClient::default());
        (SupportAgent::new(llm, Arc::clone(&commerce) as _), commerce)
    }

    #[tokio::test]
    async fn tracking_question_takes_fast_path_without_reasoning() {
        let (agent, _) = agent_with(llm_unavailable());
        let context = context_fixture(
            EventKind::SupportTicketCreated,
            json!({"subject": "Where is my order?", "body": "It has been a week"}),
            Some(customer_fixture()),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "auto_respond");
        assert_eq!(decision.params["template"], "tracking");
        assert_eq!(decision.tokens_used, 0);
    }

    #[tokio::test]
    async fn return_question_takes_fast_path() {
        let (agent, _) = agent_with(llm_unavailable());
        let context = context_fixture(
            EventKind::SupportTicketCreated,
            json!({"subject": "Refund please", "body": "I want my money back"}),
            Some(customer_fixture()),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "auto_respond");
        assert_eq!(decision.params["template"], "returns");
    }

    #[tokio::test]
    async fn complex_ticket_follows_llm_triage() {
        let (agent, _) = agent_with(llm_returning(
            r#"{"action":"flag_vip","category":"complaint","urgency":"high","reasoning":"angry vip","confidence":0.85}"#,
        ));
        let mut customer = customer_fixture();
        customer.total_spent = 900.0;
        let context = context_fixture(
            EventKind::SupportTicketCreated,
            json!({"subject": "Very disappointed", "body": "The product broke twice"}),
            Some(customer),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "flag_vip");
        assert_eq!(decision.params["is_vip"], true);
        assert!(decision.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn llm_failure_escalates_as_safety_measure() {
        let (agent, _) = agent_with(llm_unavailable());
        let context = context_fixture(
            EventKind::SupportTicketCreated,
            json!({"subject": "Strange issue", "body": "Something odd happened"}),
            Some(customer_fixture()),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "escalate");
        assert_eq!(decision.params["reason"], "llm_classification_failed");
    }

    #[tokio::test]
    async fn high_value_cancellation_is_flagged() {
        let (agent, _) = agent_with(llm_unavailable());
        let mut customer = customer_fixture();
        customer.total_spent = 420.0;
        customer.total_orders = 3;
        let context = context_fixture(
            EventKind::OrderCancelled,
            json!({"id": "o-93"}),
            Some(customer),
        );

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "flag_vip");
        assert_eq!(decision.params["urgency"], "high");
        assert!(decision.estimated_impact > 0.0);
    }

    #[tokio::test]
    async fn low_value_cancellation_gets_winback_tag() {
        let (agent, _) = agent_with(llm_unavailable());
        let mut customer = customer_fixture();
        customer.total_spent = 40.0;
        let context =
            context_fixture(EventKind::OrderCancelled, json!({"id": "o-94"}), Some(customer));

        let decision = agent.decide(&context).await.expect("decide");
        assert_eq!(decision.action, "tag_customer");
        assert_eq!(decision.params["tags"][0], "cancelled-order");
    }

    #[tokio::test]
    async fn auto_respond_replies_to_the_ticket_when_identified() {
        let (agent, commerce) = agent_with(llm_unavailable());
        let context = context_fixture(
            EventKind::SupportTicketCreated,
            json!({"ticket_id": 7712, "subject": "tracking", "body": ""}),
            Some(customer_fixture()),
        );

        let decision = Decision {
            action: "auto_respond".to_string(),
            params: json!({"response_type": "tracking_info", "template": "tracking"}),
            ..Decision::no_action("")
        };
        let result = agent.execute(&decision, &context).await.expect("execute");

        assert_eq!(result["sent"], true);
        match &commerce.calls()[0] {
            CommerceCall::ReplyToTicket { ticket_id, .. } => assert_eq!(ticket_id, "7712"),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn support_shares_top_priority_with_conversion() {
        let (agent, _) = agent_with(llm_unavailable());
        assert_eq!(agent.kind(), AgentKind::Support);
        assert_eq!(agent.priority(), 1);
    }
}
