// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), with k = 2 and σ the population standard
// deviation of the closes in the same window:
//
//   σ_i = sqrt( mean_{j=0..period-1} (close[i + period - 1 - j] - SMA_i)^2 )
//
// Both bands are aligned one-to-one with the SMA output.

use serde::Serialize;

use crate::indicators::{calculate_sma, IndicatorPoint};
use crate::market_data::Candle;

/// Band distance from the middle band, in standard deviations.
pub const BOLLINGER_STD_DEV: f64 = 2.0;

/// Upper and lower bands, each the same length as the SMA for `period`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BollingerBands {
    pub upper: Vec<IndicatorPoint>,
    pub lower: Vec<IndicatorPoint>,
}

/// Calculate Bollinger Bands for the given candles and look-back `period`.
///
/// Returns empty bands when `period == 0` or `period > candles.len()`.
pub fn calculate_bollinger(candles: &[Candle], period: usize) -> BollingerBands {
    let middle = calculate_sma(candles, period);

    let mut bands = BollingerBands {
        upper: Vec::with_capacity(middle.len()),
        lower: Vec::with_capacity(middle.len()),
    };

    for (i, mid) in middle.iter().enumerate() {
        let window = &candles[i..i + period];
        let variance = window
            .iter()
            .map(|c| (c.close - mid.value).powi(2))
            .sum::<f64>()
            / period as f64;
        let std_dev = variance.sqrt();

        bands.upper.push(IndicatorPoint {
            timestamp: mid.timestamp,
            value: mid.value + BOLLINGER_STD_DEV * std_dev,
        });
        bands.lower.push(IndicatorPoint {
            timestamp: mid.timestamp,
            value: mid.value - BOLLINGER_STD_DEV * std_dev,
        });
    }

    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::testing::rising_candles;

    #[test]
    fn bands_align_with_sma_and_bracket_it() {
        let mut candles = rising_candles(40, 100.0);
        for (i, c) in candles.iter_mut().enumerate() {
            // zig-zag so the deviation is non-trivial
            c.close += if i % 2 == 0 { 3.0 } else { -3.0 };
            c.high = c.high.max(c.close);
            c.low = c.low.min(c.close);
        }
        let sma = calculate_sma(&candles, 20);
        let bands = calculate_bollinger(&candles, 20);

        assert_eq!(bands.upper.len(), sma.len());
        assert_eq!(bands.lower.len(), sma.len());
        for ((upper, lower), mid) in bands.upper.iter().zip(&bands.lower).zip(&sma) {
            assert_eq!(upper.timestamp, mid.timestamp);
            assert_eq!(lower.timestamp, mid.timestamp);
            assert!(upper.value >= mid.value);
            assert!(mid.value >= lower.value);
            assert!(upper.value > lower.value);
        }
    }

    #[test]
    fn bollinger_known_values() {
        // closes 1..=5, period 5: mean 3, population variance 2
        let bands = calculate_bollinger(&rising_candles(5, 1.0), 5);
        let sd = 2.0_f64.sqrt();
        assert_eq!(bands.upper.len(), 1);
        assert!((bands.upper[0].value - (3.0 + 2.0 * sd)).abs() < 1e-10);
        assert!((bands.lower[0].value - (3.0 - 2.0 * sd)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_flat_series_collapses_onto_sma() {
        let mut candles = rising_candles(20, 0.0);
        for c in &mut candles {
            c.close = 100.0;
        }
        let bands = calculate_bollinger(&candles, 20);
        assert!((bands.upper[0].value - 100.0).abs() < 1e-10);
        assert!((bands.lower[0].value - 100.0).abs() < 1e-10);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let bands = calculate_bollinger(&rising_candles(3, 1.0), 20);
        assert!(bands.upper.is_empty());
        assert!(bands.lower.is_empty());
    }
}
