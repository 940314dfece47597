//! Static reasoning-model catalog: pricing, limits, and the downgrade
//! chain used for budget- and availability-driven fallback.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Anthropic => f.write_str("anthropic"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelSpec {
    pub id: &'static str,
    pub provider: Provider,
    /// Provider-side model identifier sent on the wire.
    pub api_model: &'static str,
    pub input_cost_per_mtok: f64,
    pub output_cost_per_mtok: f64,
    pub max_output_tokens: u32,
    pub supports_json: bool,
}

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Catalog ordered most expensive first; this order IS the downgrade
/// chain, so a retry or budget squeeze always moves strictly cheaper.
const CATALOG: &[ModelSpec] = &[
    ModelSpec {
        id: "claude-sonnet",
        provider: Provider::Anthropic,
        api_model: "claude-sonnet-4-20250514",
        input_cost_per_mtok: 3.0,
        output_cost_per_mtok: 15.0,
        max_output_tokens: 8_192,
        supports_json: false,
    },
    ModelSpec {
        id: "gpt-4o",
        provider: Provider::OpenAi,
        api_model: "gpt-4o",
        input_cost_per_mtok: 2.5,
        output_cost_per_mtok: 10.0,
        max_output_tokens: 16_384,
        supports_json: true,
    },
    ModelSpec {
        id: "claude-haiku",
        provider: Provider::Anthropic,
        api_model: "claude-haiku-3-20240307",
        input_cost_per_mtok: 0.25,
        output_cost_per_mtok: 1.25,
        max_output_tokens: 4_096,
        supports_json: false,
    },
    ModelSpec {
        id: "gpt-4o-mini",
        provider: Provider::OpenAi,
        api_model: "gpt-4o-mini",
        input_cost_per_mtok: 0.15,
        output_cost_per_mtok: 0.6,
        max_output_tokens: 16_384,
        supports_json: true,
    },
];

/// Resolve a model id, falling back to the default for unknown ids.
pub fn model_spec(id: &str) -> &'static ModelSpec {
    CATALOG
        .iter()
        .find(|spec| spec.id == id)
        .or_else(|| CATALOG.iter().find(|spec| spec.id == DEFAULT_MODEL))
        .unwrap_or(&CATALOG[0])
}

pub fn is_known_model(id: &str) -> bool {
    CATALOG.iter().any(|spec| spec.id == id)
}

/// Next cheaper model in the chain, None at the bottom.
pub fn cheaper_model(id: &str) -> Option<&'static str> {
    let index = CATALOG.iter().position(|spec| spec.id == id)?;
    CATALOG.get(index + 1).map(|spec| spec.id)
}

/// Pre-flight token estimate. A fixed characters-per-token approximation;
/// advisory only, never a guarantee.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32).div_ceil(4)
}

pub fn estimate_cost(spec: &ModelSpec, input_tokens: u32, output_tokens: u32) -> f64 {
    (f64::from(input_tokens) * spec.input_cost_per_mtok
        + f64::from(output_tokens) * spec.output_cost_per_mtok)
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::{cheaper_model, estimate_cost, estimate_tokens, is_known_model, model_spec, Provider, DEFAULT_MODEL};

    #[test]
    fn unknown_model_resolves_to_default() {
        assert_eq!(model_spec("gpt-9000").id, DEFAULT_MODEL);
        assert!(!is_known_model("gpt-9000"));
        assert!(is_known_model("claude-sonnet"));
    }

    #[test]
    fn downgrade_chain_is_strictly_cheaper() {
        let mut id = "claude-sonnet";
        let mut previous_input_price = model_spec(id).input_cost_per_mtok;
        while let Some(next) = cheaper_model(id) {
            let price = model_spec(next).input_cost_per_mtok;
            assert!(price < previous_input_price, "{next} should be cheaper than {id}");
            previous_input_price = price;
            id = next;
        }
        assert_eq!(id, "gpt-4o-mini");
        assert_eq!(cheaper_model("gpt-4o-mini"), None);
    }

    #[test]
    fn providers_match_catalog_entries() {
        assert_eq!(model_spec("claude-haiku").provider, Provider::Anthropic);
        assert_eq!(model_spec("gpt-4o").provider, Provider::OpenAi);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn cost_formula_is_per_million_tokens() {
        let spec = model_spec("gpt-4o");
        let cost = estimate_cost(spec, 1_000_000, 1_000_000);
        assert!((cost - 12.5).abs() < 1e-9);
    }
}
