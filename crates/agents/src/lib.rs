//! The pluggable decision units and their shared contract.
//!
//! Each agent is a simple rule table plus, where the rules run out, a
//! prompt template; the orchestration core treats them uniformly through
//! the `Agent` trait. Side effects go through `CommerceClient` so tests
//! can observe them without a network.

pub mod agent;
pub mod commerce;
pub mod conversion;
pub mod registry;
pub mod retention;
pub mod support;

pub use agent::Agent;
pub use commerce::{
    CommerceCall, CommerceClient, CreatedDiscount, DiscountRequest, DiscountValueType,
    HttpCommerceClient, RecordingCommerceClient, StoreHandle,
};
pub use conversion::ConversionAgent;
pub use registry::AgentRegistry;
pub use retention::RetentionAgent;
pub use support::SupportAgent;
