// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_0      = close_0
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// Unlike the SMA there is no warm-up: the series is seeded with the first
// close and every candle yields one point.
// =============================================================================

use crate::indicators::IndicatorPoint;
use crate::market_data::Candle;

/// Compute the EMA series over `candles` for look-back `period`.
///
/// Returns one point per candle, or an empty `Vec` when the input is empty
/// or `period == 0`.
pub fn calculate_ema(candles: &[Candle], period: usize) -> Vec<IndicatorPoint> {
    let Some(first) = candles.first() else {
        return Vec::new();
    };
    if period == 0 {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let mut prev_ema = first.close;

    let mut result = Vec::with_capacity(candles.len());
    result.push(IndicatorPoint {
        timestamp: first.timestamp,
        value: prev_ema,
    });

    for candle in &candles[1..] {
        let ema = candle.close * multiplier + prev_ema * (1.0 - multiplier);
        result.push(IndicatorPoint {
            timestamp: candle.timestamp,
            value: ema,
        });
        prev_ema = ema;
    }

    result
}
