use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::StoreId;

/// Synced customer record from the commerce platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub store_id: StoreId,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub total_orders: i64,
    pub total_spent: f64,
    pub last_order_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}
