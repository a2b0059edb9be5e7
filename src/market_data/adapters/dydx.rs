// dYdX v4 indexer. No depth parameter; the full book comes back.
// GET /v4/orderbooks/perpetualMarket/{ticker}

use serde::Deserialize;

use super::http::HttpClient;
use crate::engine::types::{OrderBookLevel, RawBook};
use crate::market_data::error::FetchError;
use crate::market_data::normaliser::level_from_strs;
use crate::venue::Venue;

#[derive(Debug, Deserialize)]
pub struct OrderbookResponse {
    pub bids: Vec<PriceSize>,
    pub asks: Vec<PriceSize>,
}

#[derive(Debug, Deserialize)]
pub struct PriceSize {
    pub price: String,
    pub size: String,
}

pub async fn fetch_book(http: &HttpClient, ticker: &str) -> Result<RawBook, FetchError> {
    let url = format!("{}/v4/orderbooks/perpetualMarket/{ticker}", Venue::Dydx.base_url());
    let book: OrderbookResponse = http.get_json(Venue::Dydx, &url).await?;
    Ok(RawBook { bids: levels(&book.bids), asks: levels(&book.asks), timestamp_ms: None })
}

pub(crate) fn levels(side: &[PriceSize]) -> Vec<OrderBookLevel> {
    side.iter().map(|l| level_from_strs(&l.price, &l.size)).collect()
}
