// Market data module entrypoint
pub mod adapters;     // venue-specific fetchers behind MarketDataSource
pub mod error;        // fetch failure taxonomy
pub mod market_cache; // symbol -> market id with TTL
pub mod normaliser;   // wire strings -> f64 levels

pub use adapters::{HttpMarketData, MarketDataSource};
pub use error::{ErrorCode, FetchError};
pub use market_cache::MarketIdCache;
