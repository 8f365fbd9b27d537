//! Scripted in-memory [`MarketDataApi`] used by unit tests.
//!
//! Responses are queued per endpoint and popped in order; an empty queue
//! answers with a transport error. Optional per-endpoint latency makes the
//! call suspend on tokio's clock, which tests drive with paused time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::FetchError;
use crate::market_data::{Candle, Instrument, MarketDataApi, MarketSummary, PricePoint};
use crate::types::Timeframe;

type Queue<T> = Mutex<VecDeque<Result<T, FetchError>>>;

#[derive(Default)]
pub struct ScriptedApi {
    ohlc: Queue<Vec<Candle>>,
    prices: Queue<Vec<PricePoint>>,
    summaries: Queue<MarketSummary>,
    markets: Queue<Vec<Instrument>>,
    markets_fallback: Queue<Vec<Instrument>>,

    /// Answer used for summaries once the queue is drained.
    steady_summary: Mutex<Option<MarketSummary>>,

    ohlc_latency: Mutex<Duration>,
    summary_latency: Mutex<Duration>,

    ohlc_calls: AtomicU32,
    price_calls: AtomicU32,
    summary_calls: AtomicU32,
    markets_calls: AtomicU32,
    markets_fallback_calls: AtomicU32,
    summary_requests: Mutex<Vec<String>>,
}

fn pop<T>(queue: &Queue<T>, what: &str) -> Result<T, FetchError> {
    queue
        .lock()
        .pop_front()
        .unwrap_or_else(|| Err(FetchError::Transport(format!("no scripted {what} response"))))
}

impl ScriptedApi {
    pub fn push_ohlc(&self, response: Result<Vec<Candle>, FetchError>) {
        self.ohlc.lock().push_back(response);
    }

    pub fn push_prices(&self, response: Result<Vec<PricePoint>, FetchError>) {
        self.prices.lock().push_back(response);
    }

    pub fn push_summary(&self, response: Result<MarketSummary, FetchError>) {
        self.summaries.lock().push_back(response);
    }

    pub fn push_markets(&self, response: Result<Vec<Instrument>, FetchError>) {
        self.markets.lock().push_back(response);
    }

    pub fn push_markets_fallback(&self, response: Result<Vec<Instrument>, FetchError>) {
        self.markets_fallback.lock().push_back(response);
    }

    pub fn set_steady_summary(&self, summary: MarketSummary) {
        *self.steady_summary.lock() = Some(summary);
    }

    pub fn set_ohlc_latency(&self, latency: Duration) {
        *self.ohlc_latency.lock() = latency;
    }

    pub fn set_summary_latency(&self, latency: Duration) {
        *self.summary_latency.lock() = latency;
    }

    pub fn ohlc_calls(&self) -> u32 {
        self.ohlc_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> u32 {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn summary_calls(&self) -> u32 {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn markets_fallback_calls(&self) -> u32 {
        self.markets_fallback_calls.load(Ordering::SeqCst)
    }

    pub fn summary_requests(&self) -> Vec<String> {
        self.summary_requests.lock().clone()
    }
}

#[async_trait]
impl MarketDataApi for ScriptedApi {
    async fn fetch_ohlc(
        &self,
        _instrument_id: &str,
        _timeframe: Timeframe,
    ) -> Result<Vec<Candle>, FetchError> {
        self.ohlc_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.ohlc_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        pop(&self.ohlc, "ohlc")
    }

    async fn fetch_price_history(
        &self,
        _instrument_id: &str,
        _timeframe: Timeframe,
    ) -> Result<Vec<PricePoint>, FetchError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.prices, "price history")
    }

    async fn fetch_summary(&self, instrument_id: &str) -> Result<MarketSummary, FetchError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.summary_requests.lock().push(instrument_id.to_string());
        let latency = *self.summary_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let queued = self.summaries.lock().pop_front();
        match queued {
            Some(response) => response,
            None => self
                .steady_summary
                .lock()
                .clone()
                .map(|s| MarketSummary {
                    instrument_id: instrument_id.to_string(),
                    fetched_at: Utc::now(),
                    ..s
                })
                .ok_or_else(|| FetchError::Transport("no scripted summary response".into())),
        }
    }

    async fn fetch_markets(&self, _per_page: u32, _page: u32) -> Result<Vec<Instrument>, FetchError> {
        self.markets_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.markets, "markets")
    }

    async fn fetch_markets_fallback(
        &self,
        _per_page: u32,
        _page: u32,
    ) -> Result<Vec<Instrument>, FetchError> {
        self.markets_fallback_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.markets_fallback, "fallback markets")
    }
}

/// `n` well-formed hourly candles with closes `base, base + 1, …`.
pub fn rising_candles(n: usize, base: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = base + i as f64;
            Candle::new(1_700_000_000_000 + i as i64 * 3_600_000, close - 0.5, close + 1.0, close - 1.0, close)
        })
        .collect()
}

/// `n` hourly price samples starting at `base`.
pub fn price_points(n: usize, base: f64) -> Vec<PricePoint> {
    (0..n)
        .map(|i| PricePoint {
            timestamp: 1_700_000_000_000 + i as i64 * 3_600_000,
            price: base + (i as f64 * 1.7).sin() * 10.0,
        })
        .collect()
}

pub fn summary(instrument_id: &str, current_price: f64) -> MarketSummary {
    MarketSummary {
        instrument_id: instrument_id.to_string(),
        current_price,
        high_24h: Some(current_price * 1.02),
        low_24h: Some(current_price * 0.97),
        market_cap: Some(current_price * 19_000_000.0),
        price_change_pct_24h: Some(1.5),
        volume_24h: Some(25_000_000_000.0),
        fetched_at: Utc::now(),
    }
}
