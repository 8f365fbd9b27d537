// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
//   SMA_i = mean(close[i - period + 1 ..= i])     for i >= period - 1
//
// The first `period - 1` candles produce no output (warm-up), so a series of
// length n yields n - period + 1 points.
// =============================================================================

use crate::indicators::IndicatorPoint;
use crate::market_data::Candle;

/// Compute the SMA series over `candles` for look-back `period`.
///
/// Returns an empty `Vec` when `period == 0` or `period > candles.len()`.
/// Point `k` is stamped with the timestamp of candle `k + period - 1`.
pub fn calculate_sma(candles: &[Candle], period: usize) -> Vec<IndicatorPoint> {
    if period == 0 || candles.len() < period {
        return Vec::new();
    }

    candles
        .windows(period)
        .map(|window| IndicatorPoint {
            timestamp: window[period - 1].timestamp,
            value: window.iter().map(|c| c.close).sum::<f64>() / period as f64,
        })
        .collect()
}
