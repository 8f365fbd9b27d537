use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;

use crate::types::Timeframe;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLC candle. `timestamp` is the interval open in ms since epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// `low <= min(open, close)` and `high >= max(open, close)`. Any NaN
    /// price fails the check.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.high >= self.open
            && self.high >= self.close
    }
}

/// One `(timestamp, price)` sample from the price-only endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
}

/// Identifies the (instrument, timeframe) pair a series belongs to.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeriesKey {
    pub instrument_id: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(instrument_id: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timeframe,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.instrument_id, self.timeframe)
    }
}

// ---------------------------------------------------------------------------
// Series -- immutable, time-sorted candles for one key
// ---------------------------------------------------------------------------

/// Immutable, strictly time-ordered candle sequence. Cloning is cheap; a new
/// selection always produces a new `Series` instead of mutating an old one.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    key: SeriesKey,
    candles: Arc<[Candle]>,
}

impl Series {
    /// Build a series from raw endpoint rows.
    ///
    /// Rows are sorted by timestamp, duplicate timestamps keep the first row,
    /// and rows violating the OHLC envelope are dropped.
    pub fn from_candles(key: SeriesKey, mut raw: Vec<Candle>) -> Self {
        raw.sort_by_key(|c| c.timestamp);
        let before = raw.len();
        raw.dedup_by_key(|c| c.timestamp);
        let duplicates = before - raw.len();

        let total = raw.len();
        raw.retain(Candle::is_well_formed);
        let malformed = total - raw.len();

        if duplicates > 0 || malformed > 0 {
            warn!(key = %key, duplicates, malformed, kept = raw.len(), "dropped unusable candles");
        }

        Self {
            key,
            candles: raw.into(),
        }
    }

    /// Synthesize OHLC from consecutive price samples: `n` prices produce
    /// `n - 1` candles, each spanning one adjacent pair in time order.
    pub fn synthesize(key: SeriesKey, prices: &[PricePoint]) -> Self {
        let mut ordered = prices.to_vec();
        ordered.sort_by_key(|p| p.timestamp);

        let raw = ordered
            .windows(2)
            .map(|pair| {
                let (current, next) = (pair[0], pair[1]);
                Candle {
                    timestamp: current.timestamp,
                    open: current.price,
                    high: current.price.max(next.price),
                    low: current.price.min(next.price),
                    close: next.price,
                }
            })
            .collect();
        Self::from_candles(key, raw)
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

impl Serialize for Series {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Series", 2)?;
        state.serialize_field("key", &self.key)?;
        state.serialize_field("candles", &self.candles[..])?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
