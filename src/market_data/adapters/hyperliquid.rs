// Hyperliquid l2Book over REST. At most 20 levels per side come back; a
// coarser nSigFigs buckets prices so those 20 levels reach deeper.

use super::http::HttpClient;
use super::hyperliquid_types::{L2Book, L2BookRequest, L2Level};
use crate::engine::types::{OrderBookLevel, RawBook};
use crate::market_data::error::FetchError;
use crate::market_data::normaliser::level_from_strs;
use crate::venue::Venue;
use tracing::debug;

pub async fn fetch_l2_book(http: &HttpClient, coin: &str, sig_figs: Option<u32>) -> Result<RawBook, FetchError> {
    let url = format!("{}/info", Venue::Hyperliquid.base_url());
    let request = L2BookRequest { kind: "l2Book", coin, n_sig_figs: sig_figs };
    let body = serde_json::to_value(&request).map_err(|e| FetchError::Unknown(e.to_string()))?;

    let book: L2Book = http.post_json(&url, &body).await?;
    debug!(coin, ?sig_figs, "Hyperliquid l2Book received");
    into_raw_book(book)
}

pub(crate) fn into_raw_book(book: L2Book) -> Result<RawBook, FetchError> {
    let mut sides = book.levels.into_iter();
    let (Some(bids), Some(asks)) = (sides.next(), sides.next()) else {
        return Err(FetchError::Parse("l2Book response missing a side".into()));
    };
    Ok(RawBook { bids: norm_side(&bids), asks: norm_side(&asks), timestamp_ms: book.time })
}

fn norm_side(side: &[L2Level]) -> Vec<OrderBookLevel> {
    side.iter().map(|lvl| level_from_strs(&lvl.px, &lvl.sz)).collect()
}
