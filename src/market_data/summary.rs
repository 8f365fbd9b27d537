use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live 24h statistics for one instrument, polled while live mode is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub instrument_id: String,
    pub current_price: f64,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_change_pct_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}
