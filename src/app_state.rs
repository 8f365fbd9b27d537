// =============================================================================
// Central Application State: chart feed
// =============================================================================
//
// Ties the chart session, the instrument list and the error log together and
// provides the version counter the WebSocket feed polls.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared collections.
//   - The chart view and session manage their own interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::fetch::FetchExecutor;
use crate::live::{ChartSession, ChartSnapshot, ChartView, SchedulerState, Selection};
use crate::market_data::{Instrument, InstrumentCatalog, InstrumentList, InstrumentSource, MarketDataApi};
use crate::runtime_config::RuntimeConfig;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable error message.
    pub message: String,
    /// Optional machine-readable error code (e.g. HTTP status).
    pub code: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Everything a client needs to render: chart view, live state, errors.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub chart: ChartSnapshot,
    pub live_armed: bool,
    pub instrument_source: InstrumentSource,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Bumped on every change outside the chart view (errors, instrument
    /// list). Combined with the view's own version for change detection.
    local_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Chart ───────────────────────────────────────────────────────────
    pub session: Arc<ChartSession>,

    // ── Instruments ─────────────────────────────────────────────────────
    catalog: InstrumentCatalog,
    pub instruments: RwLock<InstrumentList>,
    /// Last listing page loaded into `instruments`.
    instruments_page: AtomicU64,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` from the given runtime configuration and
    /// market-data provider. The returned value is typically wrapped in `Arc`
    /// immediately.
    pub fn new(config: RuntimeConfig, api: Arc<dyn MarketDataApi>) -> Self {
        let executor = FetchExecutor::new(config.retry_policy());
        let view = Arc::new(ChartView::new());
        let session = Arc::new(ChartSession::new(
            api.clone(),
            executor.clone(),
            view,
            config.overlay_params(),
            config.live_refresh_interval(),
        ));

        Self {
            local_version: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            session,
            catalog: InstrumentCatalog::new(api, executor),
            instruments: RwLock::new(InstrumentList::static_fallback()),
            instruments_page: AtomicU64::new(0),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.local_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Combined version of the chart view and the rest of the state. Any
    /// change to either moves it forward.
    pub fn current_state_version(&self) -> u64 {
        self.session.view().version() + self.local_version.load(Ordering::SeqCst)
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Selection the service starts with, taken from the config.
    pub fn default_selection(&self) -> Selection {
        let config = self.runtime_config.read();
        Selection {
            instrument_id: config.default_instrument.clone(),
            timeframe: config.default_timeframe,
            indicators: config.default_indicators,
            live_enabled: config.default_live_enabled,
        }
    }

    /// Remember the current selection as the startup default.
    pub fn persist_selection(&self) {
        if let Some(selection) = self.session.view().selection() {
            let mut config = self.runtime_config.write();
            config.default_instrument = selection.instrument_id;
            config.default_timeframe = selection.timeframe;
            config.default_indicators = selection.indicators;
            config.default_live_enabled = selection.live_enabled;
        }
    }

    // ── Instruments ─────────────────────────────────────────────────────

    /// Reload the first listing page, replacing the current list.
    pub async fn reload_instruments(&self) -> usize {
        let per_page = self.runtime_config.read().markets_per_page;
        let list = self.catalog.load(per_page, 1).await;
        self.note_listing_source(&list);

        let count = list.instruments.len();
        *self.instruments.write() = list;
        self.instruments_page.store(1, Ordering::SeqCst);
        self.increment_version();
        count
    }

    /// Load the next listing page and append instruments not yet listed.
    /// The built-in list has no further pages.
    pub async fn load_more_instruments(&self) -> usize {
        if self.instruments.read().source == InstrumentSource::Static {
            return self.reload_instruments().await;
        }

        let per_page = self.runtime_config.read().markets_per_page;
        let page = self.instruments_page.load(Ordering::SeqCst) as u32 + 1;
        let list = self.catalog.load(per_page, page).await;
        if list.source == InstrumentSource::Static {
            self.note_listing_source(&list);
            return 0;
        }

        let added = {
            let mut current = self.instruments.write();
            let fresh: Vec<Instrument> = list
                .instruments
                .into_iter()
                .filter(|i| current.find(&i.id).is_none())
                .collect();
            let added = fresh.len();
            current.instruments.extend(fresh);
            current.loaded_at = list.loaded_at;
            added
        };

        self.instruments_page.store(u64::from(page), Ordering::SeqCst);
        self.increment_version();
        info!(page, added, "instrument page appended");
        added
    }

    fn note_listing_source(&self, list: &InstrumentList) {
        if list.source == InstrumentSource::Static {
            self.push_error_with_code(
                "Instrument listing unavailable, showing built-in list".to_string(),
                Some("instruments_static".to_string()),
            );
        }
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error with an optional machine-readable code. The ring is
    /// capped at [`MAX_RECENT_ERRORS`]; oldest entries are evicted first.
    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            code,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }

        self.increment_version();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn build_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            chart: self.session.view().snapshot(),
            live_armed: matches!(self.session.scheduler_state(), SchedulerState::Armed { .. }),
            instrument_source: self.instruments.read().source,
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}
