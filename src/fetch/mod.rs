// =============================================================================
// Fetch Module
// =============================================================================
//
// Retry/backoff wrapper shared by every outbound request (chart series,
// instrument metadata, live summary).

pub mod executor;

pub use executor::{Backoff, FetchExecutor, RetryPolicy};
