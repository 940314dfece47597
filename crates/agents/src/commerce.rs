//! Outbound surface to the commerce platform's admin API. Agents execute
//! their side effects exclusively through this trait so tests can swap in
//! the recording double.

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use relay_core::domain::context::EventContext;

/// Per-call connection details, resolved from the event context. The
/// token may be empty when credential decryption degraded; calls then
/// fail individually rather than globally.
#[derive(Clone, Debug)]
pub struct StoreHandle {
    pub domain: String,
    pub access_token: String,
}

impl StoreHandle {
    pub fn from_context(context: &EventContext) -> Self {
        Self {
            domain: context.store.platform_domain.clone(),
            access_token: context.access_token.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountValueType {
    Percentage,
    FixedAmount,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiscountRequest {
    pub title: String,
    pub value_type: DiscountValueType,
    /// Negative-prefixed amount, e.g. "-10" for ten percent off.
    pub value: String,
    pub customer_external_id: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub usage_limit: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CreatedDiscount {
    pub code: String,
}

#[async_trait]
pub trait CommerceClient: Send + Sync {
    async fn create_discount(
        &self,
        store: &StoreHandle,
        request: DiscountRequest,
    ) -> Result<CreatedDiscount>;

    async fn tag_customer(
        &self,
        store: &StoreHandle,
        customer_external_id: &str,
        tags: &[String],
    ) -> Result<()>;

    async fn reply_to_ticket(
        &self,
        store: &StoreHandle,
        ticket_id: &str,
        body: &str,
    ) -> Result<()>;
}

/// Thin admin-REST client. The platform scopes everything under the
/// store's own domain.
pub struct HttpCommerceClient {
    http: reqwest::Client,
}

impl HttpCommerceClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    fn require_token(store: &StoreHandle) -> Result<&str> {
        if store.access_token.is_empty() {
            bail!("no platform credential available for {}", store.domain);
        }
        Ok(&store.access_token)
    }
}

impl Default for HttpCommerceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommerceClient for HttpCommerceClient {
    async fn create_discount(
        &self,
        store: &StoreHandle,
        request: DiscountRequest,
    ) -> Result<CreatedDiscount> {
        let token = Self::require_token(store)?;

        let response = self
            .http
            .post(format!("https://{}/admin/api/discounts.json", store.domain))
            .header("X-Platform-Access-Token", token)
            .json(&json!({"discount": request}))
            .send()
            .await
            .context("discount request failed")?
            .error_for_status()
            .context("discount request rejected")?;

        #[derive(Deserialize)]
        struct DiscountEnvelope {
            discount: CreatedDiscount,
        }

        let envelope: DiscountEnvelope =
            response.json().await.context("discount response decode failed")?;
        Ok(envelope.discount)
    }

    async fn tag_customer(
        &self,
        store: &StoreHandle,
        customer_external_id: &str,
        tags: &[String],
    ) -> Result<()> {
        let token = Self::require_token(store)?;

        self.http
            .put(format!(
                "https://{}/admin/api/customers/{customer_external_id}/tags.json",
                store.domain
            ))
            .header("X-Platform-Access-Token", token)
            .json(&json!({"tags": tags}))
            .send()
            .await
            .context("tag request failed")?
            .error_for_status()
            .context("tag request rejected")?;

        Ok(())
    }

    async fn reply_to_ticket(
        &self,
        store: &StoreHandle,
        ticket_id: &str,
        body: &str,
    ) -> Result<()> {
        let token = Self::require_token(store)?;

        self.http
            .post(format!(
                "https://{}/admin/api/tickets/{ticket_id}/replies.json",
                store.domain
            ))
            .header("X-Platform-Access-Token", token)
            .json(&json!({"reply": {"body": body}}))
            .send()
            .await
            .context("ticket reply failed")?
            .error_for_status()
            .context("ticket reply rejected")?;

        Ok(())
    }
}

/// Recording double for tests: captures every call, returns canned
/// discount codes.
#[derive(Debug, Default)]
pub struct RecordingCommerceClient {
    calls: std::sync::Mutex<Vec<CommerceCall>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommerceCall {
    CreateDiscount { domain: String, request: DiscountRequest },
    TagCustomer { domain: String, customer_external_id: String, tags: Vec<String> },
    ReplyToTicket { domain: String, ticket_id: String, body: String },
}

impl RecordingCommerceClient {
    pub fn calls(&self) -> Vec<CommerceCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, call: CommerceCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

#[async_trait]
impl CommerceClient for RecordingCommerceClient {
    async fn create_discount(
        &self,
        store: &StoreHandle,
        request: DiscountRequest,
    ) -> Result<CreatedDiscount> {
        let code = format!("{}-TEST", request.title);
        self.record(CommerceCall::CreateDiscount { domain: store.domain.clone(), request });
        Ok(CreatedDiscount { code })
    }

    async fn tag_customer(
        &self,
        store: &StoreHandle,
        customer_external_id: &str,
        tags: &[String],
    ) -> Result<()> {
        self.record(CommerceCall::TagCustomer {
            domain: store.domain.clone(),
            customer_external_id: customer_external_id.to_string(),
            tags: tags.to_vec(),
        });
        Ok(())
    }

    async fn reply_to_ticket(
        &self,
        store: &StoreHandle,
        ticket_id: &str,
        body: &str,
    ) -> Result<()> {
        self.record(CommerceCall::ReplyToTicket {
            domain: store.domain.clone(),
            ticket_id: ticket_id.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
