// =============================================================================
// Instrument Catalog: selectable instrument list with layered fallbacks
// =============================================================================
//
// Resolution order:
//   1. Primary market listing (ordered by market cap).
//   2. Secondary provider listing.
//   3. Built-in list of majors, flagged `Static`, so the selector is never
//      empty.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fetch::FetchExecutor;
use crate::market_data::MarketDataApi;

/// One selectable instrument with its headline market figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
    pub market_cap: Option<f64>,
    pub current_price: Option<f64>,
    pub price_change_pct_24h: Option<f64>,
    pub total_volume: Option<f64>,
}

impl Instrument {
    fn listed(id: &str, name: &str, symbol: &str, image: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            image: Some(image.to_string()),
            market_cap: None,
            current_price: None,
            price_change_pct_24h: None,
            total_volume: None,
        }
    }
}

/// Where an [`InstrumentList`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentSource {
    Primary,
    Secondary,
    Static,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentList {
    pub source: InstrumentSource,
    pub instruments: Vec<Instrument>,
    pub loaded_at: DateTime<Utc>,
}

impl InstrumentList {
    /// Built-in list used when both providers are unreachable.
    pub fn static_fallback() -> Self {
        const MAJORS: [(&str, &str, &str, &str); 10] = [
            ("bitcoin", "Bitcoin", "btc", "https://assets.coingecko.com/coins/images/1/large/bitcoin.png"),
            ("ethereum", "Ethereum", "eth", "https://assets.coingecko.com/coins/images/279/large/ethereum.png"),
            ("binancecoin", "BNB", "bnb", "https://assets.coingecko.com/coins/images/825/large/bnb-icon2_2x.png"),
            ("solana", "Solana", "sol", "https://assets.coingecko.com/coins/images/4128/large/solana.png"),
            ("cardano", "Cardano", "ada", "https://assets.coingecko.com/coins/images/975/large/Cardano.png"),
            ("polkadot", "Polkadot", "dot", "https://assets.coingecko.com/coins/images/12171/large/polkadot_new_logo.png"),
            ("dogecoin", "Dogecoin", "doge", "https://assets.coingecko.com/coins/images/5/large/dogecoin.png"),
            ("avalanche-2", "Avalanche", "avax", "https://assets.coingecko.com/coins/images/12559/large/avalanche.png"),
            ("chainlink", "Chainlink", "link", "https://assets.coingecko.com/coins/images/877/large/chainlink.png"),
            ("polygon", "Polygon", "matic", "https://assets.coingecko.com/coins/images/4713/large/matic.png"),
        ];

        Self {
            source: InstrumentSource::Static,
            instruments: MAJORS
                .iter()
                .map(|(id, name, symbol, image)| Instrument::listed(id, name, symbol, image))
                .collect(),
            loaded_at: Utc::now(),
        }
    }

    pub fn find(&self, instrument_id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == instrument_id)
    }
}

/// Loads the instrument list through the fetch executor.
pub struct InstrumentCatalog {
    api: Arc<dyn MarketDataApi>,
    executor: FetchExecutor,
}

impl InstrumentCatalog {
    pub fn new(api: Arc<dyn MarketDataApi>, executor: FetchExecutor) -> Self {
        Self { api, executor }
    }

    /// Load one page of instruments, falling back provider by provider.
    /// Always returns a non-empty list.
    pub async fn load(&self, per_page: u32, page: u32) -> InstrumentList {
        let primary = self
            .executor
            .execute(&format!("markets page {page}"), || {
                self.api.fetch_markets(per_page, page)
            })
            .await;

        match primary {
            Ok(instruments) => {
                info!(count = instruments.len(), page, "instrument list loaded");
                return InstrumentList {
                    source: InstrumentSource::Primary,
                    instruments,
                    loaded_at: Utc::now(),
                };
            }
            Err(failure) => {
                warn!(error = %failure, "primary instrument listing failed, trying secondary provider");
            }
        }

        let secondary = self
            .executor
            .execute(&format!("fallback markets page {page}"), || {
                self.api.fetch_markets_fallback(per_page, page)
            })
            .await;

        match secondary {
            Ok(instruments) => {
                info!(count = instruments.len(), page, "instrument list loaded from secondary provider");
                InstrumentList {
                    source: InstrumentSource::Secondary,
                    instruments,
                    loaded_at: Utc::now(),
                }
            }
            Err(failure) => {
                warn!(
                    error = %failure,
                    hint = failure.last_error.user_message(),
                    "instrument listing unavailable, using built-in list"
                );
                InstrumentList::static_fallback()
            }
        }
    }
}
