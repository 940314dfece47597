use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::StoreId;

/// The closed set of decision units shipped with the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Conversion,
    Retention,
    Support,
    Acquisition,
    Operations,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        Self::Conversion,
        Self::Retention,
        Self::Support,
        Self::Acquisition,
        Self::Operations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversion => "conversion",
            Self::Retention => "retention",
            Self::Support => "support",
            Self::Acquisition => "acquisition",
            Self::Operations => "operations",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "conversion" => Some(Self::Conversion),
            "retention" => Some(Self::Retention),
            "support" => Some(Self::Support),
            "acquisition" => Some(Self::Acquisition),
            "operations" => Some(Self::Operations),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an agent's `decide` step. `NO_ACTION` short-circuits
/// execution while still leaving an auditable trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: String,
    pub params: serde_json::Value,
    pub reasoning: String,
    pub confidence: f64,
    pub estimated_impact: f64,
    #[serde(default)]
    pub tokens_used: u32,
    #[serde(default)]
    pub cost_usd: f64,
}

impl Decision {
    pub const NO_ACTION: &'static str = "NO_ACTION";

    pub fn no_action(reasoning: impl Into<String>) -> Self {
        Self {
            action: Self::NO_ACTION.to_string(),
            params: serde_json::Value::Object(serde_json::Map::new()),
            reasoning: reasoning.into(),
            confidence: 1.0,
            estimated_impact: 0.0,
            tokens_used: 0,
            cost_usd: 0.0,
        }
    }

    pub fn no_action_with_usage(reasoning: impl Into<String>, tokens_used: u32, cost_usd: f64) -> Self {
        Self { tokens_used, cost_usd, ..Self::no_action(reasoning) }
    }

    pub fn is_no_action(&self) -> bool {
        self.action == Self::NO_ACTION
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// Append-only audit record of one agent invocation against one event.
/// Never mutated after insertion; budget and rate state are derived by
/// aggregating these rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub store_id: StoreId,
    pub agent: AgentKind,
    pub trigger_event_id: String,
    pub decision: Option<Decision>,
    pub result: Option<serde_json::Value>,
    pub duration_ms: i64,
    pub tokens_used: u32,
    pub cost_usd: f64,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// True when this run represents an externally visible action, the
    /// unit the rate limiter counts.
    pub fn is_action(&self) -> bool {
        self.decision.as_ref().is_some_and(|decision| !decision.is_no_action())
    }
}

/// Per-store, per-agent admission settings. Stored rows override the
/// compiled defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub store_id: StoreId,
    pub agent: AgentKind,
    pub enabled: bool,
    pub max_actions_per_hour: u32,
    pub model: String,
    pub max_cost_per_day_usd: f64,
}

impl AgentConfig {
    /// Platform defaults applied when a store has no stored row for an
    /// agent. Acquisition and operations ship disabled.
    pub fn default_for(store_id: &StoreId, agent: AgentKind) -> Self {
        let (enabled, max_actions_per_hour, model, max_cost_per_day_usd) = match agent {
            AgentKind::Conversion => (true, 100, "gpt-4o-mini", 5.0),
            AgentKind::Retention => (true, 50, "gpt-4o-mini", 10.0),
            AgentKind::Support => (true, 200, "gpt-4o-mini", 8.0),
            AgentKind::Acquisition => (false, 30, "gpt-4o", 15.0),
            AgentKind::Operations => (false, 20, "gpt-4o", 10.0),
        };

        Self {
            store_id: store_id.clone(),
            agent,
            enabled,
            max_actions_per_hour,
            model: model.to_string(),
            max_cost_per_day_usd,
        }
    }
}
