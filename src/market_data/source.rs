// =============================================================================
// Series Source Adapter: primary OHLC with synthesized fallback
// =============================================================================
//
//   1. OHLC endpoint (through the fetch executor).
//   2. If that fails or yields fewer than two usable candles: price-only
//      endpoint, converted pairwise into n - 1 synthetic candles.
//   3. If both fail or yield fewer than two raw points: `Empty`.
//
// `Empty` is a normal outcome, not an error. The caller is expected to show a
// retry affordance instead of a stale or partial chart.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::fetch::FetchExecutor;
use crate::market_data::{MarketDataApi, Series, SeriesKey};
use crate::types::Timeframe;

/// Fewer raw points than this cannot form a chart.
const MIN_RAW_POINTS: usize = 2;

/// Which endpoint produced a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesOrigin {
    Primary,
    Synthesized,
}

/// Result of [`SeriesSource::get_series`].
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesOutcome {
    Available { series: Series, origin: SeriesOrigin },
    Empty,
}

impl SeriesOutcome {
    pub fn series(&self) -> Option<&Series> {
        match self {
            Self::Available { series, .. } => Some(series),
            Self::Empty => None,
        }
    }

    pub fn origin(&self) -> Option<SeriesOrigin> {
        match self {
            Self::Available { origin, .. } => Some(*origin),
            Self::Empty => None,
        }
    }
}

/// Fetches the candle series for one (instrument, timeframe) pair.
#[derive(Clone)]
pub struct SeriesSource {
    api: Arc<dyn MarketDataApi>,
    executor: FetchExecutor,
}

impl SeriesSource {
    pub fn new(api: Arc<dyn MarketDataApi>, executor: FetchExecutor) -> Self {
        Self { api, executor }
    }

    #[instrument(skip(self), name = "source::get_series")]
    pub async fn get_series(&self, instrument_id: &str, timeframe: Timeframe) -> SeriesOutcome {
        let key = SeriesKey::new(instrument_id, timeframe);

        // ── 1. Primary OHLC ─────────────────────────────────────────────
        let primary = self
            .executor
            .execute(&format!("ohlc {key}"), || {
                self.api.fetch_ohlc(instrument_id, timeframe)
            })
            .await;

        match primary {
            Ok(raw) => {
                let series = Series::from_candles(key.clone(), raw);
                if series.len() >= MIN_RAW_POINTS {
                    info!(key = %key, candles = series.len(), "series loaded from OHLC endpoint");
                    return SeriesOutcome::Available {
                        series,
                        origin: SeriesOrigin::Primary,
                    };
                }
                warn!(key = %key, candles = series.len(), "OHLC endpoint returned too few candles, trying price history");
            }
            Err(failure) => {
                warn!(key = %key, error = %failure, "OHLC endpoint failed, trying price history");
            }
        }

        // ── 2. Price-only fallback ──────────────────────────────────────
        let fallback = self
            .executor
            .execute(&format!("price history {key}"), || {
                self.api.fetch_price_history(instrument_id, timeframe)
            })
            .await;

        let points = match fallback {
            Ok(points) => points,
            Err(failure) => {
                warn!(key = %key, error = %failure, "price history failed, no chart data");
                return SeriesOutcome::Empty;
            }
        };

        if points.len() < MIN_RAW_POINTS {
            warn!(key = %key, points = points.len(), "price history too short, no chart data");
            return SeriesOutcome::Empty;
        }

        let series = Series::synthesize(key.clone(), &points);
        if series.is_empty() {
            warn!(key = %key, points = points.len(), "no usable synthesized candles");
            return SeriesOutcome::Empty;
        }

        debug!(key = %key, points = points.len(), candles = series.len(), "synthesized OHLC from price history");
        SeriesOutcome::Available {
            series,
            origin: SeriesOrigin::Synthesized,
        }
    }
}
