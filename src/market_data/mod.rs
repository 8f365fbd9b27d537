pub mod candle;
pub mod instruments;
pub mod provider;
pub mod source;
pub mod summary;
#[cfg(test)]
pub mod testing;

// Re-exports for convenient access (e.g. `use crate::market_data::Series`).
pub use candle::{Candle, PricePoint, Series, SeriesKey};
pub use instruments::{Instrument, InstrumentCatalog, InstrumentList, InstrumentSource};
pub use provider::MarketDataApi;
pub use source::{SeriesOrigin, SeriesOutcome, SeriesSource};
pub use summary::MarketSummary;
