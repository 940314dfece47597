//! Client-side orchestration around the metered reasoning service.
//!
//! The hard parts live here, not in any prompt: pre-flight cost
//! estimation against a static price catalog, per-attempt timeouts with
//! cancellation, retry with exponential backoff (or the provider's own
//! retry-after hint), and model downgrade along a fixed
//! most-to-least-expensive chain when budget or availability demand it.

pub mod client;
pub mod models;
pub mod providers;
pub mod tracker;

pub use client::{
    Completion, CompletionRequest, ProviderError, ProviderTransport, RawCompletion,
    ReasoningClient, ResponseShape,
};
pub use models::{cheaper_model, estimate_cost, estimate_tokens, model_spec, ModelSpec, Provider, DEFAULT_MODEL};
pub use tracker::{UsageEntry, UsageSummary, UsageTracker};
