// Lighter REST. Markets are addressed by numeric id, so symbols go through
// MarketIdCache first. The orders endpoint returns individual orders, which are
// summed per price here.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::Deserialize;
use tracing::debug;

use super::http::HttpClient;
use crate::engine::types::{OrderBookLevel, RawBook};
use crate::market_data::error::FetchError;
use crate::market_data::market_cache::MarketIdCache;
use crate::market_data::normaliser::parse_decimal;
use crate::venue::{Venue, LIGHTER_REST_MAX_DEPTH};

#[derive(Debug, Deserialize)]
pub struct OrderBooksResponse {
    pub order_books: Vec<MarketListing>,
}

#[derive(Debug, Deserialize)]
pub struct MarketListing {
    pub market_id: u32,
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderBookOrdersResponse {
    #[serde(default)]
    pub bids: Vec<RestingOrder>,
    #[serde(default)]
    pub asks: Vec<RestingOrder>,
}

#[derive(Debug, Deserialize)]
pub struct RestingOrder {
    pub price: String,
    pub remaining_base_amount: String,
}

pub async fn resolve_market_id(http: &HttpClient, cache: &MarketIdCache, symbol: &str) -> Result<u32, FetchError> {
    if let Some(id) = cache.get(symbol) {
        return Ok(id);
    }

    let url = format!("{}/api/v1/orderBooks", Venue::Lighter.base_url());
    let listing: OrderBooksResponse = http.get_json(Venue::Lighter, &url).await?;
    let id = cache_listing(cache, listing, symbol)?;
    debug!(symbol, market_id = id, "Lighter market id resolved");
    Ok(id)
}

// Cache every market in the listing, then look up the one asked for
fn cache_listing(cache: &MarketIdCache, listing: OrderBooksResponse, symbol: &str) -> Result<u32, FetchError> {
    let found = listing.order_books.iter().find(|m| m.symbol == symbol).map(|m| m.market_id);
    cache.insert_all(listing.order_books.into_iter().map(|m| (m.symbol, m.market_id)));
    found.ok_or_else(|| FetchError::Parse(format!("symbol {symbol} not listed on Lighter")))
}

pub async fn fetch_rest_book(
    http: &HttpClient,
    cache: &MarketIdCache,
    symbol: &str,
    depth_limit: usize,
) -> Result<RawBook, FetchError> {
    let market_id = resolve_market_id(http, cache, symbol).await?;
    let limit = depth_limit.min(LIGHTER_REST_MAX_DEPTH);
    let url = format!(
        "{}/api/v1/orderBookOrders?market_id={market_id}&limit={limit}",
        Venue::Lighter.base_url()
    );
    let orders: OrderBookOrdersResponse = http.get_json(Venue::Lighter, &url).await?;
    Ok(RawBook { bids: aggregate_by_price(&orders.bids), asks: aggregate_by_price(&orders.asks), timestamp_ms: None })
}

pub(crate) fn aggregate_by_price(orders: &[RestingOrder]) -> Vec<OrderBookLevel> {
    let mut by_price: BTreeMap<OrderedFloat<f64>, f64> = BTreeMap::new();
    for order in orders {
        let price = parse_decimal(&order.price);
        let size = parse_decimal(&order.remaining_base_amount);
        *by_price.entry(OrderedFloat(price)).or_insert(0.0) += size;
    }
    by_price
        .into_iter()
        .map(|(price, size)| OrderBookLevel::new(price.into_inner(), size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(price: &str, amount: &str) -> RestingOrder {
        RestingOrder { price: price.into(), remaining_base_amount: amount.into() }
    }

    #[test]
    fn test_aggregates_same_price() {
        let levels = aggregate_by_price(&[order("100.5", "1"), order("100.4", "2"), order("100.5", "0.5")]);
        assert_eq!(levels, vec![OrderBookLevel::new(100.4, 2.0), OrderBookLevel::new(100.5, 1.5)]);
    }

    #[test]
    fn test_cache_listing() {
        let cache = MarketIdCache::default();
        let listing: OrderBooksResponse = serde_json::from_str(
            r#"{"order_books":[{"market_id":0,"symbol":"ETH"},{"market_id":1,"symbol":"BTC"}]}"#,
        )
        .unwrap();
        assert_eq!(cache_listing(&cache, listing, "BTC").unwrap(), 1);
        assert_eq!(cache.get("ETH"), Some(0));
    }

    #[test]
    fn test_unknown_symbol_still_caches_listing() {
        let cache = MarketIdCache::default();
        let listing: OrderBooksResponse =
            serde_json::from_str(r#"{"order_books":[{"market_id":7,"symbol":"SOL"}]}"#).unwrap();
        assert!(matches!(cache_listing(&cache, listing, "DOGE"), Err(FetchError::Parse(_))));
        assert_eq!(cache.get("SOL"), Some(7));
    }
}
