// =============================================================================
// Live Refresh Scheduler: periodic summary refresh for the current epoch
// =============================================================================
//
//   Idle ──arm(epoch, instrument)──▶ Armed ──disarm()──▶ Idle
//                                      │
//                                      └─ every period: refresh summary
//
// Rules:
//   - At most one timer exists. Arming replaces (and aborts) any previous one.
//   - The first tick fires one full period after arming.
//   - A tick that arrives while the previous refresh is still running is
//     skipped, so refreshes never overlap.
//   - The timer exits on its own once its epoch is no longer current.
//   - Disarming aborts the timer task together with any in-flight refresh,
//     so nothing it started can land afterwards.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::fetch::FetchExecutor;
use crate::live::epoch::Epoch;
use crate::live::view::ChartView;
use crate::market_data::MarketDataApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { epoch: Epoch, instrument_id: String },
}

struct ArmedTimer {
    epoch: Epoch,
    instrument_id: String,
    handle: JoinHandle<()>,
}

impl Drop for ArmedTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct LiveRefreshScheduler {
    api: Arc<dyn MarketDataApi>,
    executor: FetchExecutor,
    view: Arc<ChartView>,
    period: Duration,
    timer: Mutex<Option<ArmedTimer>>,
}

impl LiveRefreshScheduler {
    pub fn new(
        api: Arc<dyn MarketDataApi>,
        executor: FetchExecutor,
        view: Arc<ChartView>,
        period: Duration,
    ) -> Self {
        Self {
            api,
            executor,
            view,
            period,
            timer: Mutex::new(None),
        }
    }

    /// Start refreshing `instrument_id` under `epoch`, replacing any armed
    /// timer. Refuses (and returns `false`) when `epoch` is already stale.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, epoch: Epoch, instrument_id: &str) -> bool {
        let mut timer = self.timer.lock();
        if !self.view.is_current(epoch) {
            debug!(epoch = %epoch, instrument = instrument_id, "not arming live refresh for stale epoch");
            return false;
        }

        let handle = tokio::spawn(run_timer(
            self.api.clone(),
            self.executor.clone(),
            self.view.clone(),
            epoch,
            instrument_id.to_string(),
            self.period,
        ));

        // Replacing the previous timer drops it, which aborts its task.
        *timer = Some(ArmedTimer {
            epoch,
            instrument_id: instrument_id.to_string(),
            handle,
        });

        info!(
            epoch = %epoch,
            instrument = instrument_id,
            period_ms = self.period.as_millis() as u64,
            "live refresh armed"
        );
        true
    }

    pub fn disarm(&self) {
        if let Some(timer) = self.timer.lock().take() {
            info!(epoch = %timer.epoch, instrument = %timer.instrument_id, "live refresh disarmed");
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.timer.lock().as_ref() {
            Some(timer) if !timer.handle.is_finished() => SchedulerState::Armed {
                epoch: timer.epoch,
                instrument_id: timer.instrument_id.clone(),
            },
            _ => SchedulerState::Idle,
        }
    }
}

async fn run_timer(
    api: Arc<dyn MarketDataApi>,
    executor: FetchExecutor,
    view: Arc<ChartView>,
    epoch: Epoch,
    instrument_id: String,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if !view.is_current(epoch) {
            debug!(epoch = %epoch, "epoch superseded, live timer exiting");
            return;
        }

        let refresh = refresh_summary(&api, &executor, &view, epoch, &instrument_id);
        tokio::pin!(refresh);

        loop {
            tokio::select! {
                _ = &mut refresh => break,
                _ = ticker.tick() => {
                    debug!(epoch = %epoch, instrument = %instrument_id, "refresh still in flight, tick skipped");
                }
            }
        }
    }
}

async fn refresh_summary(
    api: &Arc<dyn MarketDataApi>,
    executor: &FetchExecutor,
    view: &ChartView,
    epoch: Epoch,
    instrument_id: &str,
) {
    let result = executor
        .execute(&format!("live summary {instrument_id}"), || {
            api.fetch_summary(instrument_id)
        })
        .await;

    match result {
        Ok(summary) => {
            let price = summary.current_price;
            if view.apply_summary(epoch, summary) {
                debug!(epoch = %epoch, instrument = instrument_id, price, "live summary applied");
            }
        }
        Err(failure) => {
            warn!(epoch = %epoch, instrument = instrument_id, error = %failure, "live refresh failed");
            view.note_error(epoch, failure.last_error.user_message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{Backoff, RetryPolicy};
    use crate::live::view::Selection;
    use crate::market_data::testing::{summary, ScriptedApi};
    use crate::types::{IndicatorSet, Timeframe};

    const PERIOD: Duration = Duration::from_secs(30);

    fn selection(id: &str) -> Selection {
        Selection {
            instrument_id: id.to_string(),
            timeframe: Timeframe::Month,
            indicators: IndicatorSet::empty(),
            live_enabled: true,
        }
    }

    fn setup() -> (Arc<ScriptedApi>, Arc<ChartView>, LiveRefreshScheduler) {
        let api = Arc::new(ScriptedApi::default());
        api.set_steady_summary(summary("bitcoin", 60_000.0));
        let view = Arc::new(ChartView::new());
        let scheduler = LiveRefreshScheduler::new(
            api.clone(),
            FetchExecutor::new(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(100),
                backoff: Backoff::Linear,
            }),
            view.clone(),
            PERIOD,
        );
        (api, view, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_one_period_after_arming() {
        let (api, view, scheduler) = setup();
        let epoch = view.begin(selection("bitcoin"));
        assert!(scheduler.arm(epoch, "bitcoin"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(api.summary_calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.summary_calls(), 1);
        assert_eq!(
            view.snapshot().summary.map(|s| s.current_price),
            Some(60_000.0)
        );

        tokio::time::sleep(PERIOD).await;
        assert_eq!(api.summary_calls(), 2);
        assert_eq!(api.summary_requests(), vec!["bitcoin", "bitcoin"]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_skipped() {
        let (api, view, scheduler) = setup();
        api.set_summary_latency(Duration::from_secs(45));
        let epoch = view.begin(selection("bitcoin"));
        scheduler.arm(epoch, "bitcoin");

        // t=30 refresh starts (ends t=75), t=60 skipped, t=90 next refresh.
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(api.summary_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_last_summary() {
        let (api, view, scheduler) = setup();
        let epoch = view.begin(selection("bitcoin"));
        view.apply_summary(epoch, summary("bitcoin", 59_000.0));
        api.push_summary(Err(FetchError::Transport("connection reset".to_string())));
        scheduler.arm(epoch, "bitcoin");

        tokio::time::sleep(Duration::from_secs(31)).await;
        let snap = view.snapshot();
        assert_eq!(snap.summary.map(|s| s.current_price), Some(59_000.0));
        assert_eq!(snap.last_error.as_deref(), Some("Unable to load market data."));

        tokio::time::sleep(PERIOD).await;
        assert_eq!(view.snapshot().summary.map(|s| s.current_price), Some(60_000.0));
        assert_eq!(api.summary_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_stops_refreshing() {
        let (api, view, scheduler) = setup();
        let epoch = view.begin(selection("bitcoin"));
        scheduler.arm(epoch, "bitcoin");
        assert!(matches!(scheduler.state(), SchedulerState::Armed { .. }));

        scheduler.disarm();
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.summary_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_discards_in_flight_refresh() {
        let (api, view, scheduler) = setup();
        api.set_summary_latency(Duration::from_secs(10));
        let epoch = view.begin(selection("bitcoin"));
        scheduler.arm(epoch, "bitcoin");

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(api.summary_calls(), 1);
        scheduler.disarm();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(view.snapshot().summary.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_epoch_stops_timer() {
        let (api, view, scheduler) = setup();
        let old = view.begin(selection("bitcoin"));
        scheduler.arm(old, "bitcoin");

        view.begin(selection("ethereum"));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(api.summary_calls(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn arming_a_stale_epoch_is_refused() {
        let (_api, view, scheduler) = setup();
        let old = view.begin(selection("bitcoin"));
        let new = view.begin(selection("ethereum"));

        assert!(!scheduler.arm(old, "bitcoin"));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        assert!(scheduler.arm(new, "ethereum"));
        assert_eq!(
            scheduler.state(),
            SchedulerState::Armed {
                epoch: new,
                instrument_id: "ethereum".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_timer() {
        let (api, view, scheduler) = setup();
        let epoch = view.begin(selection("bitcoin"));
        scheduler.arm(epoch, "bitcoin");
        tokio::time::sleep(Duration::from_secs(20)).await;
        scheduler.arm(epoch, "bitcoin");

        // Old timer would have fired at t=30; new one fires at t=50.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(api.summary_calls(), 0);
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(api.summary_calls(), 1);
    }
}
