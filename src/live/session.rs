// =============================================================================
// Chart Session: drives loads, recomposition and live mode per selection
// =============================================================================
//
//   select(selection)      -> new epoch, disarm, fetch series + summary
//                             concurrently, compose, apply, arm if live
//   set_indicators(set)    -> new epoch, recompose from the cached series
//                             while the chart is ready for the same
//                             (instrument, timeframe), reload otherwise
//   set_live(enabled)      -> arm / disarm under the current epoch
//   retry()                -> re-run the current selection under a new epoch
//
// Loads are never cancelled. A load that finishes after its epoch has been
// superseded finds the view refusing its writes and leaves without effect.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::composer::{compose, compose_outcome, OverlayParams};
use crate::fetch::FetchExecutor;
use crate::live::epoch::Epoch;
use crate::live::scheduler::{LiveRefreshScheduler, SchedulerState};
use crate::live::view::{ChartStatus, ChartView, Selection};
use crate::market_data::{MarketDataApi, Series, SeriesOrigin, SeriesOutcome, SeriesSource};
use crate::types::{IndicatorSet, Timeframe};

/// Partial selection update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionChange {
    pub instrument_id: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub indicators: Option<IndicatorSet>,
    pub live_enabled: Option<bool>,
}

impl SelectionChange {
    pub fn merge(&self, current: &Selection) -> Selection {
        Selection {
            instrument_id: self
                .instrument_id
                .clone()
                .unwrap_or_else(|| current.instrument_id.clone()),
            timeframe: self.timeframe.unwrap_or(current.timeframe),
            indicators: self.indicators.unwrap_or(current.indicators),
            live_enabled: self.live_enabled.unwrap_or(current.live_enabled),
        }
    }
}

/// Last successfully loaded series, kept for indicator-only changes.
struct CachedSeries {
    series: Series,
    origin: SeriesOrigin,
}

pub struct ChartSession {
    source: SeriesSource,
    api: Arc<dyn MarketDataApi>,
    executor: FetchExecutor,
    view: Arc<ChartView>,
    scheduler: LiveRefreshScheduler,
    params: OverlayParams,
    cache: Mutex<Option<CachedSeries>>,
}

impl ChartSession {
    pub fn new(
        api: Arc<dyn MarketDataApi>,
        executor: FetchExecutor,
        view: Arc<ChartView>,
        params: OverlayParams,
        live_period: Duration,
    ) -> Self {
        Self {
            source: SeriesSource::new(api.clone(), executor.clone()),
            scheduler: LiveRefreshScheduler::new(api.clone(), executor.clone(), view.clone(), live_period),
            api,
            executor,
            view,
            params,
            cache: Mutex::new(None),
        }
    }

    pub fn view(&self) -> &Arc<ChartView> {
        &self.view
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Switch to `selection` and start loading it in the background.
    pub fn select(self: &Arc<Self>, selection: Selection) -> Epoch {
        let epoch = self.view.begin(selection.clone());
        self.scheduler.disarm();

        info!(
            epoch = %epoch,
            key = %selection.key(),
            indicators = ?selection.indicators,
            live = selection.live_enabled,
            "selection changed, loading chart"
        );

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.load(epoch, selection).await;
        });
        epoch
    }

    /// Change the active indicators. Reuses the cached series only while the
    /// chart is ready for the current (instrument, timeframe); a loading or
    /// unavailable chart is reloaded instead.
    pub fn set_indicators(self: &Arc<Self>, indicators: IndicatorSet) -> Option<Epoch> {
        let mut selection = self.view.selection()?;
        selection.indicators = indicators;

        let key = selection.key();
        let cached = if self.view.is_ready_for(&key) {
            self.cache
                .lock()
                .as_ref()
                .filter(|c| c.series.key() == &key)
                .map(|c| (c.series.clone(), c.origin))
        } else {
            None
        };

        let Some((series, origin)) = cached else {
            debug!(key = %key, "chart not ready for indicator change, reloading");
            return Some(self.select(selection));
        };

        let epoch = self.view.begin(selection.clone());
        self.scheduler.disarm();

        let composite = compose(&series, indicators, &self.params);
        self.view.apply_chart(epoch, ChartStatus::Ready { origin, composite });
        info!(epoch = %epoch, key = %key, indicators = ?indicators, "recomposed from cached series");

        if selection.live_enabled {
            self.scheduler.arm(epoch, &selection.instrument_id);
        }
        Some(epoch)
    }

    /// Turn live refresh on or off for the current selection. Does not open
    /// a new epoch. Returns `false` when there is nothing selected.
    pub fn set_live(&self, enabled: bool) -> bool {
        let epoch = self.view.current_epoch();
        let Some(selection) = self.view.selection() else {
            return false;
        };
        if !self.view.set_live(epoch, enabled) {
            return false;
        }

        if enabled {
            self.scheduler.arm(epoch, &selection.instrument_id);
        } else {
            self.scheduler.disarm();
        }
        true
    }

    /// Reload the current selection from scratch.
    pub fn retry(self: &Arc<Self>) -> Option<Epoch> {
        let selection = self.view.selection()?;
        info!(key = %selection.key(), "retrying chart load");
        Some(self.select(selection))
    }

    /// Route a partial update to the cheapest operation that realises it.
    pub fn apply_change(self: &Arc<Self>, change: &SelectionChange) -> Option<Epoch> {
        let current = self.view.selection()?;
        let next = change.merge(&current);

        if next.instrument_id != current.instrument_id || next.timeframe != current.timeframe {
            return Some(self.select(next));
        }

        let mut epoch = self.view.current_epoch();
        if next.indicators != current.indicators {
            epoch = self.set_indicators(next.indicators)?;
        }
        if next.live_enabled != current.live_enabled {
            self.set_live(next.live_enabled);
        }
        Some(epoch)
    }

    pub fn shutdown(&self) {
        self.scheduler.disarm();
    }

    // ── Loading ─────────────────────────────────────────────────────────

    async fn load(&self, epoch: Epoch, selection: Selection) {
        let instrument_id = selection.instrument_id.as_str();
        let summary_label = format!("summary {instrument_id}");

        let (outcome, summary) = tokio::join!(
            self.source.get_series(instrument_id, selection.timeframe),
            self.executor.execute(&summary_label, || {
                self.api.fetch_summary(instrument_id)
            }),
        );

        if !self.view.is_current(epoch) {
            debug!(epoch = %epoch, key = %selection.key(), "load finished after selection changed, discarding");
            return;
        }

        *self.cache.lock() = match &outcome {
            SeriesOutcome::Available { series, origin } => {
                debug!(
                    epoch = %epoch,
                    key = %selection.key(),
                    candles = series.len(),
                    last_close = series.last().map(|c| c.close),
                    origin = ?origin,
                    "chart series loaded"
                );
                Some(CachedSeries {
                    series: series.clone(),
                    origin: *origin,
                })
            }
            SeriesOutcome::Empty => {
                warn!(epoch = %epoch, key = %selection.key(), "no chart data available");
                None
            }
        };

        let composite = compose_outcome(&outcome, selection.indicators, &self.params);
        let status = match (outcome.origin(), composite) {
            (Some(origin), Some(composite)) => ChartStatus::Ready { origin, composite },
            _ => ChartStatus::unavailable(),
        };
        self.view.apply_chart(epoch, status);

        match summary {
            Ok(summary) => {
                self.view.apply_summary(epoch, summary);
            }
            Err(failure) => {
                warn!(epoch = %epoch, instrument = instrument_id, error = %failure, "summary unavailable");
                self.view.note_error(epoch, failure.last_error.user_message());
            }
        }

        // Live mode may have been toggled while loading.
        let live = self.view.selection().is_some_and(|s| s.live_enabled);
        if live {
            self.scheduler.arm(epoch, instrument_id);
        }
    }
}
