// Shared trait + live implementation for venue order-book adapters

use std::sync::Arc;
use std::time::Duration;

use crate::engine::types::RawBook;
use crate::market_data::error::FetchError;
use crate::market_data::market_cache::MarketIdCache;
use crate::venue::{Venue, LIGHTER_WS_URL};

pub mod binance;
pub mod bybit;
pub mod dydx;
pub mod http;
pub mod hyperliquid;
pub mod hyperliquid_types;
pub mod lighter;
pub mod lighter_ws;
pub mod scripted;

use http::HttpClient;
pub use scripted::ScriptedSource;

/// Where the sampler gets raw books from. The live implementation talks to the
/// venues; tests script their own.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    /// One request/response depth snapshot. `sig_figs` asks the venue for
    /// price buckets at that resolution where supported (Hyperliquid).
    async fn fetch_book(
        &self,
        venue: Venue,
        symbol: &str,
        depth_limit: usize,
        sig_figs: Option<u32>,
    ) -> Result<RawBook, FetchError>;

    /// First full snapshot from the venue's push transport.
    async fn fetch_stream_snapshot(&self, venue: Venue, symbol: &str) -> Result<RawBook, FetchError>;
}

pub struct HttpMarketData {
    http: HttpClient,
    markets: Arc<MarketIdCache>,
    ws_url: String,
}

impl HttpMarketData {
    pub fn new(request_timeout: Duration, markets: Arc<MarketIdCache>) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpClient::new(request_timeout, http::proxy_prefix_from_env())?,
            markets,
            ws_url: LIGHTER_WS_URL.to_string(),
        })
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn markets(&self) -> &Arc<MarketIdCache> {
        &self.markets
    }
}

#[async_trait::async_trait]
impl MarketDataSource for HttpMarketData {
    async fn fetch_book(
        &self,
        venue: Venue,
        symbol: &str,
        depth_limit: usize,
        sig_figs: Option<u32>,
    ) -> Result<RawBook, FetchError> {
        match venue {
            Venue::Hyperliquid => hyperliquid::fetch_l2_book(&self.http, symbol, sig_figs).await,
            Venue::Dydx => dydx::fetch_book(&self.http, symbol).await,
            Venue::Lighter => lighter::fetch_rest_book(&self.http, &self.markets, symbol, depth_limit).await,
            Venue::Asterdex | Venue::Binance => binance::fetch_depth(&self.http, venue, symbol, depth_limit).await,
            Venue::Bybit => bybit::fetch_book(&self.http, symbol, depth_limit).await,
        }
    }

    async fn fetch_stream_snapshot(&self, venue: Venue, symbol: &str) -> Result<RawBook, FetchError> {
        match venue {
            Venue::Lighter => {
                let market_id = lighter::resolve_market_id(&self.http, &self.markets, symbol).await?;
                lighter_ws::fetch_snapshot(&self.ws_url, market_id).await
            }
            other => Err(FetchError::Realtime(format!("{other} has no snapshot stream"))),
        }
    }
}
