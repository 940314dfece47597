pub mod config;
pub mod crypto;
pub mod domain;
pub mod limits;

pub use chrono;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use crypto::{CredentialCipher, CryptoError};
pub use domain::agent::{AgentConfig, AgentKind, Decision, Run, RunStatus};
pub use domain::context::{CustomerContext, EventContext, OrderSummary};
pub use domain::customer::Customer;
pub use domain::event::{Event, EventKind, EventSource, StoreId};
pub use domain::order::Order;
pub use domain::store::Store;
