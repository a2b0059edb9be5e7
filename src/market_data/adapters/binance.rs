// Binance-compatible /fapi/v1/depth. AsterDEX serves the identical interface.

use serde::Deserialize;

use super::http::HttpClient;
use crate::engine::types::RawBook;
use crate::market_data::error::FetchError;
use crate::market_data::normaliser::levels_from_pairs;
use crate::venue::Venue;

#[derive(Debug, Deserialize)]
pub struct DepthResponse {
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
    // transaction time, ms
    #[serde(rename = "T", default)]
    pub transaction_time: Option<i64>,
}

pub async fn fetch_depth(http: &HttpClient, venue: Venue, symbol: &str, depth_limit: usize) -> Result<RawBook, FetchError> {
    let url = format!("{}/fapi/v1/depth?symbol={symbol}&limit={depth_limit}", venue.base_url());
    let depth: DepthResponse = http.get_json(venue, &url).await?;
    Ok(into_raw_book(depth, chrono::Utc::now().timestamp_millis()))
}

fn into_raw_book(depth: DepthResponse, received_ms: i64) -> RawBook {
    RawBook {
        bids: levels_from_pairs(&depth.bids),
        asks: levels_from_pairs(&depth.asks),
        timestamp_ms: Some(depth.transaction_time.unwrap_or(received_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::OrderBookLevel;

    #[test]
    fn test_parses_depth() {
        let json = r#"{"lastUpdateId":1,"E":1700000000100,"T":1700000000050,
            "bids":[["100.10","3.5"],["100.00","1"]],"asks":[["100.20","2"]]}"#;
        let depth: DepthResponse = serde_json::from_str(json).unwrap();
        let raw = into_raw_book(depth, 0);
        assert_eq!(raw.bids[0], OrderBookLevel::new(100.10, 3.5));
        assert_eq!(raw.asks.len(), 1);
        assert_eq!(raw.timestamp_ms, Some(1_700_000_000_050));
    }

    #[test]
    fn test_falls_back_to_receive_time() {
        let depth: DepthResponse = serde_json::from_str(r#"{"bids":[],"asks":[]}"#).unwrap();
        assert_eq!(into_raw_book(depth, 42).timestamp_ms, Some(42));
    }

    #[test]
    fn test_wrong_shape_fails() {
        assert!(serde_json::from_str::<DepthResponse>(r#"{"code":-1121,"msg":"Invalid symbol."}"#).is_err());
    }
}
