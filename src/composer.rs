// =============================================================================
// Series Composer: price series + active indicator overlays
// =============================================================================
//
// Produces one `CompositeSeries` per (series, indicator set). The primary
// "Price" member always comes first; overlays follow in canonical order:
//
//   SMA  ->  EMA  ->  Upper Band  ->  Lower Band
//
// A composite is always rebuilt from scratch. Nothing here patches a
// previous composite in place.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::{calculate_bollinger, calculate_ema, calculate_sma, IndicatorPoint};
use crate::market_data::{Series, SeriesKey, SeriesOutcome};
use crate::types::{Indicator, IndicatorSet, OverlayKind};

/// Name of the primary candle member.
pub const PRICE_SERIES_NAME: &str = "Price";

const SMA_COLOR: &str = "#2196F3";
const EMA_COLOR: &str = "#FF9800";
const BAND_COLOR: &str = "#9C27B0";

/// Parameters shared by all overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayParams {
    pub period: usize,
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self { period: 20 }
    }
}

/// One derived line drawn over the price series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedOverlay {
    pub name: String,
    pub kind: OverlayKind,
    pub points: Vec<IndicatorPoint>,
    pub color_hint: &'static str,
}

/// Price series plus its overlays, ready for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeSeries {
    pub key: SeriesKey,
    pub price_name: &'static str,
    pub price: Series,
    pub overlays: Vec<NamedOverlay>,
    pub indicators: IndicatorSet,
    pub period: usize,
}

#[cfg(test)]
impl CompositeSeries {
    pub fn overlay(&self, kind: OverlayKind) -> Option<&NamedOverlay> {
        self.overlays.iter().find(|o| o.kind == kind)
    }
}

/// Build the composite for `series` with the requested indicators.
///
/// An overlay whose indicator produces no points (period longer than the
/// series) is still listed, with an empty point list. An empty series gets
/// no overlays at all.
pub fn compose(series: &Series, indicators: IndicatorSet, params: &OverlayParams) -> CompositeSeries {
    let candles = series.candles();
    let period = params.period;
    let mut overlays = Vec::new();

    let requested = if series.is_empty() {
        IndicatorSet::empty()
    } else {
        indicators
    };
    for indicator in requested.iter() {
        match indicator {
            Indicator::Sma => overlays.push(NamedOverlay {
                name: format!("SMA {period}"),
                kind: OverlayKind::Sma,
                points: calculate_sma(candles, period),
                color_hint: SMA_COLOR,
            }),
            Indicator::Ema => overlays.push(NamedOverlay {
                name: format!("EMA {period}"),
                kind: OverlayKind::Ema,
                points: calculate_ema(candles, period),
                color_hint: EMA_COLOR,
            }),
            Indicator::Bollinger => {
                let bands = calculate_bollinger(candles, period);
                overlays.push(NamedOverlay {
                    name: "Upper Band".to_string(),
                    kind: OverlayKind::BollingerUpper,
                    points: bands.upper,
                    color_hint: BAND_COLOR,
                });
                overlays.push(NamedOverlay {
                    name: "Lower Band".to_string(),
                    kind: OverlayKind::BollingerLower,
                    points: bands.lower,
                    color_hint: BAND_COLOR,
                });
            }
        }
    }

    debug!(
        key = %series.key(),
        candles = candles.len(),
        overlays = overlays.len(),
        period,
        "composite built"
    );

    CompositeSeries {
        key: series.key().clone(),
        price_name: PRICE_SERIES_NAME,
        price: series.clone(),
        overlays,
        indicators,
        period,
    }
}

/// Compose straight from a source outcome. `Empty` yields `None` and no
/// indicator is computed.
pub fn compose_outcome(
    outcome: &SeriesOutcome,
    indicators: IndicatorSet,
    params: &OverlayParams,
) -> Option<CompositeSeries> {
    outcome.series().map(|series| compose(series, indicators, params))
}
