use std::sync::Arc;

use relay_core::domain::agent::AgentKind;
use relay_core::domain::event::EventKind;
use relay_llm::ReasoningClient;

use crate::agent::Agent;
use crate::commerce::CommerceClient;
use crate::conversion::ConversionAgent;
use crate::retention::RetentionAgent;
use crate::support::SupportAgent;

/// Static catalog of decision units, fixed at process start. No runtime
/// plugin loading.
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { agents }
    }

    /// The shipped lineup, sharing one reasoning client and one commerce
    /// client.
    pub fn with_default_agents(
        llm: Arc<ReasoningClient>,
        commerce: Arc<dyn CommerceClient>,
    ) -> Self {
        Self::new(vec![
            Arc::new(ConversionAgent::new(Arc::clone(&llm), Arc::clone(&commerce))),
            Arc::new(RetentionAgent::new(Arc::clone(&llm), Arc::clone(&commerce))),
            Arc::new(SupportAgent::new(llm, commerce)),
        ])
    }

    /// Subscribed agents for an event kind, ascending by priority. The
    /// sort is stable, so registration order is the documented tie-break.
    pub fn agents_for_event(&self, kind: EventKind) -> Vec<Arc<dyn Agent>> {
        let mut eligible: Vec<Arc<dyn Agent>> = self
            .agents
            .iter()
            .filter(|agent| agent.subscribed_events().contains(&kind))
            .cloned()
            .collect();
        eligible.sort_by_key(|agent| agent.priority());
        eligible
    }

    pub fn all(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.agents.iter().find(|agent| agent.kind() == kind).cloned()
    }
}
