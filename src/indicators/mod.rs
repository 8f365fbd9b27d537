// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, deterministic overlay indicators computed from a candle series using
// the close as reference price. Plain IEEE arithmetic throughout: NaN or
// infinite closes propagate into the output rather than being filtered.
//
//   SMA        -> one point per full window (warm-up of period - 1 candles)
//   EMA        -> one point per candle (seeded with the first close)
//   Bollinger  -> upper/lower bands aligned one-to-one with the SMA output

pub mod bollinger;
pub mod ema;
pub mod sma;

use serde::{Deserialize, Serialize};

pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use sma::calculate_sma;

/// One derived value, stamped with the timestamp of the candle it ends on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: i64,
    pub value: f64,
}
