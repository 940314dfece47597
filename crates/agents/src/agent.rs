use anyhow::Result;
use async_trait::async_trait;

use relay_core::domain::agent::{AgentKind, Decision};
use relay_core::domain::context::EventContext;
use relay_core::domain::event::EventKind;

/// The fixed decision contract every pluggable unit implements.
///
/// The orchestrator drives these in a strict order: `is_enabled` and
/// `can_handle` gate cheaply, `decide` may spend reasoning budget, and
/// `execute` is only ever reached with a non-NO_ACTION decision.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Lower runs first; ties break by registration order.
    fn priority(&self) -> u8;

    fn subscribed_events(&self) -> &[EventKind];

    fn is_enabled(&self, context: &EventContext) -> bool {
        context.is_enabled(self.kind())
    }

    fn can_handle(&self, context: &EventContext) -> bool;

    async fn decide(&self, context: &EventContext) -> Result<Decision>;

    async fn execute(
        &self,
        decision: &Decision,
        context: &EventContext,
    ) -> Result<serde_json::Value>;
}
