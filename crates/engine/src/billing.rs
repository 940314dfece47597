use async_trait::async_trait;

use relay_core::domain::event::StoreId;

/// External billing/eligibility collaborator. A denial is terminal for
/// the event, not retryable, so the orchestrator marks it processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl BillingVerdict {
    pub fn allowed() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

#[async_trait]
pub trait BillingGate: Send + Sync {
    async fn can_process_event(&self, store_id: &StoreId) -> BillingVerdict;
}

/// Default gate for deployments without a billing system wired in.
pub struct AllowAllBilling;

#[async_trait]
impl BillingGate for AllowAllBilling {
    async fn can_process_event(&self, _store_id: &StoreId) -> BillingVerdict {
        BillingVerdict::allowed()
    }
}
