// =============================================================================
// Chart View: epoch-guarded store of what the renderer should show
// =============================================================================
//
// The only value shared across epochs. Writers present the epoch their work
// was started under; the write is accepted only while that epoch is current.
// The epoch check and the mutation happen under one write lock, so a result
// can never land after a newer selection has begun.
//
// The chart is in exactly one of three states:
//   Loading      -> a load for the current epoch is in flight
//   Unavailable  -> both series endpoints failed, retry is offered
//   Ready        -> composite series available
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::composer::CompositeSeries;
use crate::live::epoch::{Epoch, EpochCounter};
use crate::market_data::{MarketSummary, SeriesKey, SeriesOrigin};
use crate::types::{IndicatorSet, Timeframe};

/// Message shown with the retry affordance when no chart could be built.
pub const UNAVAILABLE_MESSAGE: &str = "No chart data available";

/// What the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub instrument_id: String,
    pub timeframe: Timeframe,
    pub indicators: IndicatorSet,
    pub live_enabled: bool,
}

impl Selection {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.instrument_id.clone(), self.timeframe)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChartStatus {
    Loading,
    Unavailable {
        message: String,
    },
    Ready {
        origin: SeriesOrigin,
        composite: CompositeSeries,
    },
}

impl ChartStatus {
    pub fn unavailable() -> Self {
        Self::Unavailable {
            message: UNAVAILABLE_MESSAGE.to_string(),
        }
    }

    pub fn composite(&self) -> Option<&CompositeSeries> {
        match self {
            Self::Ready { composite, .. } => Some(composite),
            _ => None,
        }
    }
}

/// Serialisable copy of the view, pushed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub version: u64,
    pub epoch: Epoch,
    pub selection: Option<Selection>,
    pub status: ChartStatus,
    pub summary: Option<MarketSummary>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

struct ViewState {
    selection: Option<Selection>,
    status: ChartStatus,
    summary: Option<MarketSummary>,
    last_error: Option<String>,
    updated_at: DateTime<Utc>,
}

pub struct ChartView {
    epochs: EpochCounter,
    state: RwLock<ViewState>,
    version: AtomicU64,
}

impl Default for ChartView {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartView {
    pub fn new() -> Self {
        Self {
            epochs: EpochCounter::new(),
            state: RwLock::new(ViewState {
                selection: None,
                status: ChartStatus::Loading,
                summary: None,
                last_error: None,
                updated_at: Utc::now(),
            }),
            version: AtomicU64::new(1),
        }
    }

    // ── Epochs ──────────────────────────────────────────────────────────

    /// Open a new epoch for `selection`. The chart goes back to `Loading`;
    /// the summary survives only if the instrument is unchanged.
    pub fn begin(&self, selection: Selection) -> Epoch {
        let mut state = self.state.write();
        let epoch = self.epochs.advance();

        let same_instrument = state
            .selection
            .as_ref()
            .is_some_and(|s| s.instrument_id == selection.instrument_id);
        if !same_instrument {
            state.summary = None;
        }

        debug!(epoch = %epoch, key = %selection.key(), indicators = ?selection.indicators, "selection epoch opened");
        state.selection = Some(selection);
        state.status = ChartStatus::Loading;
        state.last_error = None;
        self.touch(&mut state);
        epoch
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epochs.current()
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.epochs.is_current(epoch)
    }

    // ── Epoch-guarded writes ────────────────────────────────────────────

    /// Replace the chart status. Returns `false` (and changes nothing) if
    /// `epoch` is stale.
    pub fn apply_chart(&self, epoch: Epoch, status: ChartStatus) -> bool {
        let mut state = self.state.write();
        if !self.epochs.is_current(epoch) {
            debug!(epoch = %epoch, current = %self.epochs.current(), "discarding stale chart result");
            return false;
        }
        state.status = status;
        self.touch(&mut state);
        true
    }

    pub fn apply_summary(&self, epoch: Epoch, summary: MarketSummary) -> bool {
        let mut state = self.state.write();
        if !self.epochs.is_current(epoch) {
            debug!(epoch = %epoch, instrument = %summary.instrument_id, "discarding stale summary");
            return false;
        }
        state.summary = Some(summary);
        self.touch(&mut state);
        true
    }

    /// Record a user-facing error message for the current epoch.
    pub fn note_error(&self, epoch: Epoch, message: impl Into<String>) -> bool {
        let mut state = self.state.write();
        if !self.epochs.is_current(epoch) {
            return false;
        }
        state.last_error = Some(message.into());
        self.touch(&mut state);
        true
    }

    /// Flip live mode on the current selection without opening a new epoch.
    pub fn set_live(&self, epoch: Epoch, enabled: bool) -> bool {
        let mut state = self.state.write();
        if !self.epochs.is_current(epoch) {
            return false;
        }
        match state.selection.as_mut() {
            Some(selection) => selection.live_enabled = enabled,
            None => return false,
        }
        self.touch(&mut state);
        true
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn selection(&self) -> Option<Selection> {
        self.state.read().selection.clone()
    }

    /// `true` when the chart currently shows a ready composite for `key`.
    pub fn is_ready_for(&self, key: &SeriesKey) -> bool {
        self.state
            .read()
            .status
            .composite()
            .is_some_and(|composite| &composite.key == key)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        let state = self.state.read();
        ChartSnapshot {
            version: self.version(),
            epoch: self.epochs.current(),
            selection: state.selection.clone(),
            status: state.status.clone(),
            summary: state.summary.clone(),
            last_error: state.last_error.clone(),
            updated_at: state.updated_at,
        }
    }

    fn touch(&self, state: &mut ViewState) {
        state.updated_at = Utc::now();
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}
