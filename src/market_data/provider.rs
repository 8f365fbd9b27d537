use async_trait::async_trait;

use crate::error::FetchError;
use crate::market_data::{Candle, Instrument, MarketSummary, PricePoint};
use crate::types::Timeframe;

/// Abstract interface over the public market-data endpoints.
///
/// Each method performs exactly one request; retrying is the caller's job
/// (see [`crate::fetch::FetchExecutor`]). Implementations must report an
/// empty or structurally broken payload as [`FetchError::InvalidPayload`].
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Raw OHLC rows for `(instrument, timeframe)`, oldest first.
    async fn fetch_ohlc(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, FetchError>;

    /// Price-only samples for `(instrument, timeframe)`, oldest first.
    async fn fetch_price_history(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<PricePoint>, FetchError>;

    /// Current summary statistics for one instrument.
    async fn fetch_summary(&self, instrument_id: &str) -> Result<MarketSummary, FetchError>;

    /// One page of instruments ordered by market cap.
    async fn fetch_markets(&self, per_page: u32, page: u32) -> Result<Vec<Instrument>, FetchError>;

    /// Same listing from the secondary metadata provider.
    async fn fetch_markets_fallback(
        &self,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Instrument>, FetchError>;
}
