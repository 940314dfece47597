use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::StoreId;

/// Synced order record from the commerce platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub store_id: StoreId,
    pub external_order_id: String,
    pub customer_external_id: Option<String>,
    pub total_price: f64,
    pub line_items: serde_json::Value,
    pub placed_at: Option<DateTime<Utc>>,
}
