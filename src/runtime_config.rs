// =============================================================================
// Runtime Configuration: chart feed settings with atomic save
// =============================================================================
//
// Every tunable of the feed lives here: provider endpoints, retry budget,
// live refresh cadence, indicator period and the selection the service starts
// with.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::composer::OverlayParams;
use crate::fetch::{Backoff, RetryPolicy};
use crate::types::{IndicatorSet, Timeframe};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_fallback_api_base_url() -> String {
    "https://api.coincap.io/v2".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_user_agent() -> String {
    "CryptoEye/1.0".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_live_refresh_interval_ms() -> u64 {
    30_000
}

fn default_indicator_period() -> usize {
    20
}

fn default_instrument() -> String {
    "bitcoin".to_string()
}

fn default_markets_per_page() -> u32 {
    100
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RetryConfig
// =============================================================================

/// Attempt budget shared by every outbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay; the n-th retry waits a multiple of it depending on
    /// `backoff`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff: self.backoff,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the chart feed.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Providers ----------------------------------------------------------

    /// Primary market-data API (OHLC, price history, summary, listings).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Secondary provider used only for the instrument listing.
    #[serde(default = "default_fallback_api_base_url")]
    pub fallback_api_base_url: String,

    /// Quote currency for every price.
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-attempt HTTP timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    // --- Live refresh & indicators ------------------------------------------

    #[serde(default = "default_live_refresh_interval_ms")]
    pub live_refresh_interval_ms: u64,

    /// Look-back period shared by SMA, EMA and Bollinger.
    #[serde(default = "default_indicator_period")]
    pub indicator_period: usize,

    // --- Startup selection --------------------------------------------------

    #[serde(default = "default_instrument")]
    pub default_instrument: String,

    #[serde(default)]
    pub default_timeframe: Timeframe,

    #[serde(default)]
    pub default_indicators: IndicatorSet,

    #[serde(default = "default_true")]
    pub default_live_enabled: bool,

    // --- Listing & server ---------------------------------------------------

    /// Instruments requested per listing page.
    #[serde(default = "default_markets_per_page")]
    pub markets_per_page: u32,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            fallback_api_base_url: default_fallback_api_base_url(),
            vs_currency: default_vs_currency(),
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryConfig::default(),
            live_refresh_interval_ms: default_live_refresh_interval_ms(),
            indicator_period: default_indicator_period(),
            default_instrument: default_instrument(),
            default_timeframe: Timeframe::default(),
            default_indicators: IndicatorSet::empty(),
            default_live_enabled: true,
            markets_per_page: default_markets_per_page(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            api = %config.api_base_url,
            instrument = %config.default_instrument,
            timeframe = %config.default_timeframe,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    pub fn live_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.live_refresh_interval_ms.max(1))
    }

    pub fn overlay_params(&self) -> OverlayParams {
        OverlayParams {
            period: self.indicator_period,
        }
    }
}
