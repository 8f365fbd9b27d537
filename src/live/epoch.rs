// =============================================================================
// Request epochs
// =============================================================================
//
// Every selection change opens a new epoch. Any asynchronous result carries
// the epoch it was started under and is applied only if that epoch is still
// the current one; everything else is dropped on arrival.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Generation number of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic epoch source. Starts at epoch 0, which no selection ever uses.
#[derive(Debug, Default)]
pub struct EpochCounter {
    current: AtomicU64,
}

impl EpochCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new epoch and return it.
    pub fn advance(&self) -> Epoch {
        Epoch(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Epoch {
        Epoch(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current() == epoch
    }
}
