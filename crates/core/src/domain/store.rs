use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::StoreId;

/// A connected storefront. The access token is stored encrypted
/// (see `crypto`); budgets are optional per-store ceilings layered under
/// the absolute platform limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub platform_domain: String,
    pub encrypted_access_token: String,
    pub daily_llm_budget_usd: Option<f64>,
    pub monthly_llm_budget_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
}
