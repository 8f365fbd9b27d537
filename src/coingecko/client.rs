// =============================================================================
// CoinGecko REST Client: public market-data endpoints
// =============================================================================
//
// Endpoints used (all public, unauthenticated):
//   GET /coins/{id}/ohlc          -> [[ts, open, high, low, close], ...]
//   GET /coins/{id}/market_chart  -> { "prices": [[ts, price], ...], ... }
//   GET /coins/{id}               -> { "market_data": { ... } }
//   GET /coins/markets            -> [{ id, name, symbol, image, ... }, ...]
//
// The instrument listing has a second provider (CoinCap `/assets`) used
// only when CoinGecko's listing is unavailable.
//
// Every method performs a single request. Empty arrays and missing fields
// are reported as `FetchError::InvalidPayload` so the executor counts them
// as failed attempts.
// =============================================================================

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::FetchError;
use crate::market_data::{Candle, Instrument, MarketDataApi, MarketSummary, PricePoint};
use crate::runtime_config::RuntimeConfig;
use crate::types::Timeframe;

/// Client for the CoinGecko v3 API plus the CoinCap listing fallback.
#[derive(Clone)]
pub struct CoinGeckoClient {
    base_url: String,
    fallback_base_url: String,
    vs_currency: String,
    client: reqwest::Client,
}

impl CoinGeckoClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(config: &RuntimeConfig) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;

        debug!(base_url = %config.api_base_url, "CoinGeckoClient initialised");

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            fallback_base_url: config.fallback_api_base_url.trim_end_matches('/').to_string(),
            vs_currency: config.vs_currency.clone(),
            client,
        })
    }

    // -------------------------------------------------------------------------
    // Request helper
    // -------------------------------------------------------------------------

    /// GET `url` with `query`, require a success status and decode the JSON
    /// body.
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let resp = self.client.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body: Value = resp.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl MarketDataApi for CoinGeckoClient {
    #[instrument(skip(self), name = "coingecko::get_ohlc")]
    async fn fetch_ohlc(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, FetchError> {
        let url = format!("{}/coins/{}/ohlc", self.base_url, instrument_id);
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("days", timeframe.days().to_string()),
        ];
        let body = self.get_json(&url, &query).await?;
        let candles = parse_ohlc(&body)?;
        debug!(instrument_id, %timeframe, count = candles.len(), "ohlc fetched");
        Ok(candles)
    }

    #[instrument(skip(self), name = "coingecko::get_market_chart")]
    async fn fetch_price_history(
        &self,
        instrument_id: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<PricePoint>, FetchError> {
        let url = format!("{}/coins/{}/market_chart", self.base_url, instrument_id);
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("days", timeframe.days().to_string()),
        ];
        let body = self.get_json(&url, &query).await?;
        let points = parse_price_history(&body)?;
        debug!(instrument_id, %timeframe, count = points.len(), "price history fetched");
        Ok(points)
    }

    #[instrument(skip(self), name = "coingecko::get_coin")]
    async fn fetch_summary(&self, instrument_id: &str) -> Result<MarketSummary, FetchError> {
        let url = format!("{}/coins/{}", self.base_url, instrument_id);
        let query = [
            ("localization", "false".to_string()),
            ("tickers", "false".to_string()),
            ("market_data", "true".to_string()),
            ("community_data", "false".to_string()),
            ("developer_data", "false".to_string()),
            ("sparkline", "false".to_string()),
        ];
        let body = self.get_json(&url, &query).await?;
        parse_summary(instrument_id, &self.vs_currency, &body)
    }

    #[instrument(skip(self), name = "coingecko::get_markets")]
    async fn fetch_markets(&self, per_page: u32, page: u32) -> Result<Vec<Instrument>, FetchError> {
        let url = format!("{}/coins/markets", self.base_url);
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
            ("sparkline", "false".to_string()),
        ];
        let body = self.get_json(&url, &query).await?;
        parse_markets(body)
    }

    #[instrument(skip(self), name = "coincap::get_assets")]
    async fn fetch_markets_fallback(
        &self,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Instrument>, FetchError> {
        let url = format!("{}/assets", self.fallback_base_url);
        let offset = page.saturating_sub(1) * per_page;
        let query = [("limit", per_page.to_string()), ("offset", offset.to_string())];
        let body = self.get_json(&url, &query).await?;
        parse_coincap_assets(&body)
    }
}

impl std::fmt::Debug for CoinGeckoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoClient")
            .field("base_url", &self.base_url)
            .field("fallback_base_url", &self.fallback_base_url)
            .field("vs_currency", &self.vs_currency)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Payload parsing
// -----------------------------------------------------------------------------

/// Parse `[[ts, open, high, low, close], ...]`. Malformed rows are skipped;
/// an array with no usable rows is an invalid payload.
fn parse_ohlc(body: &Value) -> Result<Vec<Candle>, FetchError> {
    let rows = body
        .as_array()
        .ok_or_else(|| FetchError::invalid("OHLC response is not an array"))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let parsed = row.as_array().filter(|a| a.len() >= 5).and_then(|a| {
            Some(Candle::new(
                a[0].as_i64()?,
                number(&a[1])?,
                number(&a[2])?,
                number(&a[3])?,
                number(&a[4])?,
            ))
        });
        match parsed {
            Some(candle) => candles.push(candle),
            None => warn!(row = %row, "skipping malformed OHLC row"),
        }
    }

    if candles.is_empty() {
        return Err(FetchError::invalid("empty OHLC array"));
    }
    Ok(candles)
}

/// Parse the `prices` field of a market-chart response.
fn parse_price_history(body: &Value) -> Result<Vec<PricePoint>, FetchError> {
    let rows = body
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::invalid("market chart response missing 'prices' array"))?;

    let points: Vec<PricePoint> = rows
        .iter()
        .filter_map(|row| {
            let pair = row.as_array()?;
            Some(PricePoint {
                timestamp: pair.first()?.as_i64()?,
                price: number(pair.get(1)?)?,
            })
        })
        .collect();

    if points.is_empty() {
        return Err(FetchError::invalid("empty 'prices' array"));
    }
    Ok(points)
}

/// Extract live stats from a `/coins/{id}` response.
fn parse_summary(instrument_id: &str, vs: &str, body: &Value) -> Result<MarketSummary, FetchError> {
    let md = body
        .get("market_data")
        .filter(|v| v.is_object())
        .ok_or_else(|| FetchError::invalid("coin response missing 'market_data'"))?;

    let per_currency = |field: &str| md.get(field).and_then(|v| v.get(vs)).and_then(number);

    let current_price = per_currency("current_price").ok_or_else(|| {
        FetchError::invalid(format!("market_data.current_price.{vs} missing"))
    })?;

    Ok(MarketSummary {
        instrument_id: instrument_id.to_string(),
        current_price,
        high_24h: per_currency("high_24h"),
        low_24h: per_currency("low_24h"),
        market_cap: per_currency("market_cap"),
        price_change_pct_24h: md.get("price_change_percentage_24h").and_then(number),
        volume_24h: per_currency("total_volume"),
        fetched_at: Utc::now(),
    })
}

#[derive(Deserialize)]
struct CoinGeckoMarket {
    id: String,
    name: String,
    symbol: String,
    image: Option<String>,
    market_cap: Option<f64>,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    total_volume: Option<f64>,
}

fn parse_markets(body: Value) -> Result<Vec<Instrument>, FetchError> {
    let rows: Vec<CoinGeckoMarket> = serde_json::from_value(body)?;
    if rows.is_empty() {
        return Err(FetchError::invalid("empty markets listing"));
    }
    Ok(rows
        .into_iter()
        .map(|m| Instrument {
            id: m.id,
            name: m.name,
            symbol: m.symbol,
            image: m.image,
            market_cap: m.market_cap,
            current_price: m.current_price,
            price_change_pct_24h: m.price_change_percentage_24h,
            total_volume: m.total_volume,
        })
        .collect())
}

/// CoinCap sends numbers as strings: `{ "data": [{ "priceUsd": "64000.1", ... }] }`.
fn parse_coincap_assets(body: &Value) -> Result<Vec<Instrument>, FetchError> {
    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::invalid("assets response missing 'data' array"))?;

    let instruments: Vec<Instrument> = rows
        .iter()
        .filter_map(|row| {
            let id = row.get("id")?.as_str()?.to_string();
            let symbol = row.get("symbol")?.as_str()?.to_string();
            let name = row.get("name").and_then(Value::as_str).unwrap_or(&id).to_string();
            let image = format!(
                "https://assets.coincap.io/assets/icons/{}@2x.png",
                symbol.to_lowercase()
            );
            Some(Instrument {
                id,
                name,
                symbol,
                image: Some(image),
                market_cap: row.get("marketCapUsd").and_then(number),
                current_price: row.get("priceUsd").and_then(number),
                price_change_pct_24h: row.get("changePercent24Hr").and_then(number),
                total_volume: row.get("volumeUsd24Hr").and_then(number),
            })
        })
        .collect();

    if instruments.is_empty() {
        return Err(FetchError::invalid("empty assets listing"));
    }
    Ok(instruments)
}

/// A JSON value that may be either a number or a numeric string.
fn number(val: &Value) -> Option<f64> {
    match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_ohlc_rows() {
        let body = json!([
            [1700000000000i64, 37000.0, 37050.5, 36990.0, 37020.0],
            [1700014400000i64, 37020.0, 37100.0, 37000.0, 37090.0],
            ["bad"],
        ]);
        let candles = parse_ohlc(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
        assert!((candles[1].close - 37090.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_ohlc_empty_is_invalid() {
        assert!(matches!(parse_ohlc(&json!([])), Err(FetchError::InvalidPayload(_))));
        assert!(matches!(
            parse_ohlc(&json!({"error": "coin not found"})),
            Err(FetchError::InvalidPayload(_))
        ));
    }

    #[test]
    fn parse_price_history_reads_prices_field() {
        let body = json!({
            "prices": [[1700000000000i64, 100.5], [1700003600000i64, 101.0]],
            "market_caps": [],
            "total_volumes": []
        });
        let points = parse_price_history(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].price, 101.0);

        assert!(parse_price_history(&json!({"prices": []})).is_err());
        assert!(parse_price_history(&json!({})).is_err());
    }

    #[test]
    fn parse_summary_uses_vs_currency() {
        let body = json!({
            "id": "bitcoin",
            "market_data": {
                "current_price": { "usd": 64000.0, "eur": 59000.0 },
                "high_24h": { "usd": 65000.0 },
                "low_24h": { "usd": 63000.0 },
                "market_cap": { "usd": 1.26e12 },
                "total_volume": { "usd": 2.5e10 },
                "price_change_percentage_24h": -1.23
            }
        });
        let summary = parse_summary("bitcoin", "usd", &body).unwrap();
        assert_eq!(summary.current_price, 64000.0);
        assert_eq!(summary.high_24h, Some(65000.0));
        assert_eq!(summary.price_change_pct_24h, Some(-1.23));

        let eur = parse_summary("bitcoin", "eur", &body).unwrap();
        assert_eq!(eur.current_price, 59000.0);
        assert_eq!(eur.high_24h, None);
    }

    #[test]
    fn parse_summary_without_market_data_is_invalid() {
        let err = parse_summary("bitcoin", "usd", &json!({"id": "bitcoin"})).unwrap_err();
        assert!(matches!(err, FetchError::InvalidPayload(_)));
    }

    #[test]
    fn parse_markets_listing() {
        let body = json!([{
            "id": "bitcoin",
            "name": "Bitcoin",
            "symbol": "btc",
            "image": "https://example.com/btc.png",
            "current_price": 64000.0,
            "market_cap": 1.26e12,
            "total_volume": 2.5e10,
            "price_change_percentage_24h": null
        }]);
        let list = parse_markets(body).unwrap();
        assert_eq!(list[0].id, "bitcoin");
        assert_eq!(list[0].price_change_pct_24h, None);
        assert!(parse_markets(json!([])).is_err());
    }

    #[test]
    fn parse_coincap_string_numbers() {
        let body = json!({
            "data": [{
                "id": "bitcoin",
                "symbol": "BTC",
                "name": "Bitcoin",
                "priceUsd": "64000.12",
                "marketCapUsd": "1260000000000",
                "volumeUsd24Hr": "25000000000",
                "changePercent24Hr": "-0.5"
            }]
        });
        let list = parse_coincap_assets(&body).unwrap();
        assert_eq!(list[0].current_price, Some(64000.12));
        assert_eq!(list[0].price_change_pct_24h, Some(-0.5));
        assert_eq!(
            list[0].image.as_deref(),
            Some("https://assets.coincap.io/assets/icons/btc@2x.png")
        );
    }
}
